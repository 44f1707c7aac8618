//! Column-named raw tables and their conversion into raw sources.

use crate::models::{RawRecord, RawSource};
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

/// Matches numbered alias columns (`alias1`, `Alias_2`, ...).
static ALIAS_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^alias_?\d+$").unwrap_or_else(|_| unreachable!("literal pattern compiles"))
});

/// How to read one raw table as a prioritized source.
///
/// # Example
///
/// ```rust
/// use entityidentity::io::RawSourceSpec;
///
/// let spec = RawSourceSpec::new("gleif", 1, "legal_name")
///     .with_context_column("country", "jurisdiction")
///     .with_external_id_column("lei")
///     .with_alias_separator(';');
/// assert_eq!(spec.required_columns(), vec!["legal_name", "country", "lei"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSourceSpec {
    /// Source name recorded on surviving rows.
    pub name: String,
    /// Conflict rank; lower wins.
    pub priority: u32,
    /// Column holding the primary name.
    pub name_column: String,
    /// `(column, context key)` pairs copied into record context.
    pub context_columns: Vec<(String, String)>,
    /// Alias columns. When empty, `aliasN` columns and an `aliases` column
    /// are picked up automatically.
    pub alias_columns: Vec<String>,
    /// Column holding the strong external identifier.
    pub external_id_column: Option<String>,
    /// Splits alias cells holding several names.
    pub alias_separator: Option<char>,
}

impl RawSourceSpec {
    /// Creates a spec with only a name column.
    ///
    /// At least one context column must be added before
    /// [`RawTable::into_source`] accepts it.
    #[must_use]
    pub fn new(name: impl Into<String>, priority: u32, name_column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority,
            name_column: name_column.into(),
            context_columns: Vec::new(),
            alias_columns: Vec::new(),
            external_id_column: None,
            alias_separator: None,
        }
    }

    /// Builder method to map a column into a context key.
    #[must_use]
    pub fn with_context_column(mut self, column: impl Into<String>, key: impl Into<String>) -> Self {
        self.context_columns.push((column.into(), key.into()));
        self
    }

    /// Builder method to add an explicit alias column.
    #[must_use]
    pub fn with_alias_column(mut self, column: impl Into<String>) -> Self {
        self.alias_columns.push(column.into());
        self
    }

    /// Builder method to set the external identifier column.
    #[must_use]
    pub fn with_external_id_column(mut self, column: impl Into<String>) -> Self {
        self.external_id_column = Some(column.into());
        self
    }

    /// Builder method to split alias cells on a separator.
    #[must_use]
    pub const fn with_alias_separator(mut self, separator: char) -> Self {
        self.alias_separator = Some(separator);
        self
    }

    /// Columns that must be present in the table.
    #[must_use]
    pub fn required_columns(&self) -> Vec<&str> {
        let mut required = vec![self.name_column.as_str()];
        required.extend(self.context_columns.iter().map(|(column, _)| column.as_str()));
        required.extend(self.external_id_column.as_deref());
        required.extend(self.alias_columns.iter().map(String::as_str));
        required
    }
}

/// Tabular data with named columns, as produced by a raw source loader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Creates a table from column names and rows.
    ///
    /// Short rows read as empty cells; extra cells are ignored.
    #[must_use]
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { columns, rows }
    }

    /// Reads a CSV document with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the CSV cannot be parsed.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let columns = csv_reader
            .headers()
            .map_err(|e| csv_failed("read_csv_headers", &e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(|e| csv_failed("read_csv_record", &e))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { columns, rows })
    }

    /// Reads a CSV file with a header row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the file cannot be opened or parsed.
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::OperationFailed {
            operation: "open_csv".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_csv_reader(std::io::BufReader::new(file))
    }

    /// Column names in order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of data rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if there are no data rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Converts the table into a raw source.
    ///
    /// Rows are kept as-is, including rows whose name is blank; consolidation
    /// drops and counts those.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the spec declares no context column
    /// or a required column is missing.
    pub fn into_source(self, spec: &RawSourceSpec) -> Result<RawSource> {
        if spec.context_columns.is_empty() {
            return Err(Error::Validation(format!(
                "source '{}' declares no context column; map at least one with \
                 `with_context_column`",
                spec.name
            )));
        }
        let missing: Vec<&str> = spec
            .required_columns()
            .into_iter()
            .filter(|c| self.position(c).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "source '{}' is missing required column(s) {} (available: {})",
                spec.name,
                missing.join(", "),
                self.columns.join(", ")
            )));
        }

        let name_at = self.position(&spec.name_column);
        let context_at: Vec<(usize, &str)> = spec
            .context_columns
            .iter()
            .filter_map(|(column, key)| self.position(column).map(|i| (i, key.as_str())))
            .collect();
        let external_at = spec.external_id_column.as_deref().and_then(|c| self.position(c));
        let alias_at: Vec<usize> = if spec.alias_columns.is_empty() {
            self.columns
                .iter()
                .enumerate()
                .filter(|(_, c)| ALIAS_COLUMN.is_match(c) || c.eq_ignore_ascii_case("aliases"))
                .map(|(i, _)| i)
                .collect()
        } else {
            spec.alias_columns.iter().filter_map(|c| self.position(c)).collect()
        };

        let cell = |row: &[String], idx: Option<usize>| -> String {
            idx.and_then(|i| row.get(i)).map(|s| s.trim().to_string()).unwrap_or_default()
        };

        let mut records = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let mut record = RawRecord::new(cell(row, name_at));
            for &(idx, key) in &context_at {
                let value = cell(row, Some(idx));
                if !value.is_empty() {
                    record = record.with_context(key, value);
                }
            }
            let external = cell(row, external_at);
            if !external.is_empty() {
                record = record.with_external_id(external);
            }
            let mut aliases = BTreeSet::new();
            for &idx in &alias_at {
                let value = cell(row, Some(idx));
                match spec.alias_separator {
                    Some(sep) => aliases.extend(value.split(sep).map(str::trim).map(str::to_string)),
                    None => {
                        aliases.insert(value);
                    },
                }
            }
            aliases.remove("");
            for alias in aliases {
                record = record.with_alias(alias);
            }
            records.push(record);
        }

        tracing::debug!(source = %spec.name, rows = records.len(), "Converted raw table");
        Ok(RawSource::new(spec.name.clone(), spec.priority, records))
    }
}

fn csv_failed(operation: &str, e: &csv::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}
