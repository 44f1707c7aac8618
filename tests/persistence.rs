//! Build, persist and reload a canonical table.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use entityidentity::io::{RawSourceSpec, RawTable};
use entityidentity::models::{DecisionState, EntityProfile, ResolveHints};
use entityidentity::services::{ConsolidationConfig, Resolver, consolidate};
use entityidentity::storage::{TableCache, read_parquet, write_parquet};
use entityidentity::{EngineConfig, Error};
use std::io::Write;
use std::sync::Arc;

const MINES_CSV: &str = "\
name,country,aliases
Escondida,CL,Minera Escondida;La Escondida
Grasberg,ID,
Olympic Dam,AU,
,AU,
";

fn build(dir: &std::path::Path, profile: &EntityProfile) -> std::path::PathBuf {
    let csv_path = dir.join("mines.csv");
    let mut file = std::fs::File::create(&csv_path).unwrap();
    file.write_all(MINES_CSV.as_bytes()).unwrap();

    let spec = RawSourceSpec::new("mines", 1, "name")
        .with_context_column("country", "jurisdiction")
        .with_alias_separator(';');
    let source = RawTable::from_csv_path(&csv_path).unwrap().into_source(&spec).unwrap();
    let built = consolidate(&[source], &ConsolidationConfig::new(profile.clone())).unwrap();
    assert_eq!(built.report.dropped_empty_names, 1);
    assert_eq!(built.table.len(), 3);

    let path = dir.join(profile.table_file_name());
    write_parquet(&built.table, &path).unwrap();
    path
}

#[test]
fn test_table_round_trips_through_cache() {
    let dir = tempfile::tempdir().unwrap();
    let profile = EntityProfile::generic("mine").with_identity_context(["jurisdiction"]);
    let path = build(dir.path(), &profile);

    let stored = read_parquet(&path).unwrap();
    let config = EngineConfig::default().with_data_dir(dir.path());
    let cache = TableCache::new(profile.clone(), &config);
    let loaded = cache.get().unwrap();
    assert_eq!(loaded.table, stored);
    assert!(Arc::ptr_eq(&loaded, &cache.get().unwrap()));

    let resolver = Resolver::new(loaded, &profile, &config);
    let result = resolver.resolve("la escondida", &ResolveHints::default(), None);
    assert_eq!(result.state, DecisionState::ConfidentMatch);
    assert_eq!(result.best().unwrap().display_name, "Escondida");
}

#[test]
fn test_missing_table_is_data_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let profile = EntityProfile::generic("no-such-table-for-tests");
    let config = EngineConfig::default().with_data_dir(dir.path());
    let cache = TableCache::new(profile, &config);

    let err = cache.get().unwrap_err();
    let Error::DataNotFound { searched, remediation } = &err else {
        unreachable!("expected DataNotFound, got {err:?}");
    };
    assert_eq!(searched[0], dir.path().join("no-such-table-for-tests.parquet"));
    assert!(remediation.contains("write_parquet"));
}

#[test]
fn test_config_file_feeds_resolver() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        "top_k = 2\n\n[decision]\nhigh_confidence = 99.5\nmin_viable = 50.0\n",
    )
    .unwrap();
    let config = EngineConfig::load_from_file(&config_path).unwrap();
    assert_eq!(config.top_k, 2);

    let profile = EntityProfile::generic("mine");
    let path = build(dir.path(), &profile);
    let resolver = Resolver::from_table(read_parquet(&path).unwrap(), &profile, &config);

    let result = resolver.resolve("Escondidda", &ResolveHints::default(), None);
    assert_eq!(result.state, DecisionState::Ambiguous);
    assert!(result.candidates.len() <= 2);
}
