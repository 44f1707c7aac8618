//! Raw source ingestion.
//!
//! Loaders hand the consolidation build a [`RawTable`] of named columns;
//! a [`RawSourceSpec`] says which columns hold the primary name, context,
//! aliases and external identifier. CSV is read with the `csv` crate:
//!
//! ```rust
//! use entityidentity::io::{RawSourceSpec, RawTable};
//!
//! let csv = "name,country\nAcme Corp,US\n";
//! let table = RawTable::from_csv_reader(csv.as_bytes()).unwrap();
//! let spec = RawSourceSpec::new("registry", 1, "name").with_context_column("country", "jurisdiction");
//! let source = table.into_source(&spec).unwrap();
//! assert_eq!(source.records[0].name, "Acme Corp");
//! ```

mod raw_table;

pub use raw_table::{RawSourceSpec, RawTable};
