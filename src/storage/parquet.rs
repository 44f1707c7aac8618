//! Apache Parquet persistence for the canonical table.
//!
//! Columnar, typed and Snappy-compressed. Alternate names are a
//! `List<Utf8>` column; context fields are stored as a JSON object string
//! so the schema stays fixed across entity types.

use crate::models::{CanonicalTable, EntityId, EntityRecord};
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, ListArray, ListBuilder, StringArray, StringBuilder, UInt32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Creates the Arrow schema for canonical records.
fn schema() -> Schema {
    Schema::new(vec![
        Field::new("entity_id", DataType::Utf8, false),
        Field::new("display_name", DataType::Utf8, false),
        Field::new("match_key", DataType::Utf8, false),
        Field::new("slug", DataType::Utf8, false),
        Field::new(
            "alternate_names",
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            false,
        ),
        Field::new("context_fields", DataType::Utf8, false), // JSON object
        Field::new("external_id", DataType::Utf8, true),
        Field::new("source", DataType::Utf8, false),
        Field::new("source_priority", DataType::UInt32, false),
    ])
}

/// Converts records to a record batch.
fn to_record_batch(records: &[EntityRecord]) -> Result<RecordBatch> {
    let schema = Arc::new(schema());

    let entity_ids: StringArray = records.iter().map(|r| Some(r.entity_id.as_str())).collect();
    let display_names: StringArray = records.iter().map(|r| Some(r.display_name.as_str())).collect();
    let match_keys: StringArray = records.iter().map(|r| Some(r.match_key.as_str())).collect();
    let slugs: StringArray = records.iter().map(|r| Some(r.slug.as_str())).collect();

    let mut alternate_names = ListBuilder::new(StringBuilder::new());
    for record in records {
        for name in &record.alternate_names {
            alternate_names.values().append_value(name);
        }
        alternate_names.append(true);
    }

    let context_fields: StringArray = records
        .iter()
        .map(|r| serde_json::to_string(&r.context_fields).map(Some))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Internal(format!("Failed to encode context fields: {e}")))?;
    let external_ids: StringArray = records.iter().map(|r| r.external_id.as_deref()).collect();
    let sources: StringArray = records.iter().map(|r| Some(r.source.as_str())).collect();
    let priorities: UInt32Array = records.iter().map(|r| Some(r.source_priority)).collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(entity_ids),
        Arc::new(display_names),
        Arc::new(match_keys),
        Arc::new(slugs),
        Arc::new(alternate_names.finish()),
        Arc::new(context_fields),
        Arc::new(external_ids),
        Arc::new(sources),
        Arc::new(priorities),
    ];

    RecordBatch::try_new(schema, columns)
        .map_err(|e| Error::Internal(format!("Failed to create record batch: {e}")))
}

/// Writes a table as Parquet to any writer.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if encoding or writing fails.
pub fn write_parquet_to<W: Write + Send>(table: &CanonicalTable, writer: W) -> Result<()> {
    let schema = Arc::new(schema());
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut arrow_writer = ArrowWriter::try_new(writer, schema, Some(props))
        .map_err(|e| write_failed(format!("Failed to create Parquet writer: {e}")))?;

    let batch = to_record_batch(table.records())?;
    arrow_writer
        .write(&batch)
        .map_err(|e| write_failed(format!("Failed to write Parquet batch: {e}")))?;
    arrow_writer
        .close()
        .map_err(|e| write_failed(format!("Failed to close Parquet writer: {e}")))?;
    Ok(())
}

/// Writes a table as Parquet to `path`, creating parent directories.
///
/// The file is written beside the target and renamed into place, so a
/// reader never observes a partial table.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] on I/O or encoding failure.
#[tracing::instrument(skip(table), fields(path = %path.display(), records = table.len()))]
pub fn write_parquet(table: &CanonicalTable, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_failed(e.to_string()))?;
    }
    let tmp = path.with_extension("parquet.tmp");
    let file = File::create(&tmp).map_err(|e| write_failed(e.to_string()))?;
    let written = write_parquet_to(table, file)
        .and_then(|()| std::fs::rename(&tmp, path).map_err(|e| write_failed(e.to_string())));
    if let Err(e) = written {
        if let Err(cleanup) = std::fs::remove_file(&tmp) {
            tracing::warn!(tmp = %tmp.display(), error = %cleanup, "Failed to remove partial table file");
        }
        return Err(e);
    }
    tracing::info!("Wrote canonical table");
    Ok(())
}

/// Reads a canonical table from a Parquet file.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the file cannot be read or decoded,
/// and [`Error::Validation`] if the schema is wrong or a record violates the
/// table invariants.
#[tracing::instrument(fields(path = %path.display()))]
pub fn read_parquet(path: &Path) -> Result<CanonicalTable> {
    let file = File::open(path).map_err(|e| read_failed(e.to_string()))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| read_failed(e.to_string()))?
        .build()
        .map_err(|e| read_failed(e.to_string()))?;

    let mut records = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| read_failed(e.to_string()))?;
        records.extend(records_from_batch(&batch)?);
    }
    tracing::debug!(records = records.len(), "Read canonical table");
    CanonicalTable::new(records)
}

fn records_from_batch(batch: &RecordBatch) -> Result<Vec<EntityRecord>> {
    let entity_ids = string_column(batch, "entity_id")?;
    let display_names = string_column(batch, "display_name")?;
    let match_keys = string_column(batch, "match_key")?;
    let slugs = string_column(batch, "slug")?;
    let alternate_names = column::<ListArray>(batch, "alternate_names")?;
    let context_fields = string_column(batch, "context_fields")?;
    let external_ids = string_column(batch, "external_id")?;
    let sources = string_column(batch, "source")?;
    let priorities = column::<UInt32Array>(batch, "source_priority")?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let names = alternate_names.value(row);
        let names = names
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| schema_error("alternate_names", "List<Utf8>"))?;
        let context: BTreeMap<String, String> = serde_json::from_str(context_fields.value(row))
            .map_err(|e| Error::Validation(format!("row {row}: invalid context_fields: {e}")))?;

        records.push(EntityRecord {
            entity_id: EntityId::new(entity_ids.value(row)),
            display_name: display_names.value(row).to_string(),
            match_key: match_keys.value(row).to_string(),
            slug: slugs.value(row).to_string(),
            alternate_names: names.iter().flatten().map(str::to_string).collect(),
            context_fields: context,
            external_id: (!external_ids.is_null(row)).then(|| external_ids.value(row).to_string()),
            source: sources.value(row).to_string(),
            source_priority: priorities.value(row),
        });
    }
    Ok(records)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::Validation(format!("canonical table is missing column '{name}'")))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| schema_error(name, std::any::type_name::<T>()))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    column::<StringArray>(batch, name)
}

fn schema_error(name: &str, expected: &str) -> Error {
    Error::Validation(format!("column '{name}' has an unexpected type (expected {expected})"))
}

fn write_failed(cause: String) -> Error {
    Error::OperationFailed {
        operation: "write_parquet".to_string(),
        cause,
    }
}

fn read_failed(cause: String) -> Error {
    Error::OperationFailed {
        operation: "read_parquet".to_string(),
        cause,
    }
}
