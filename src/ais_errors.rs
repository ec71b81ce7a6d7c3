use camino::Utf8PathBuf;
use thiserror::Error;

/// Schema-level failures raised while converting raw CSV rows.
///
/// Any of these aborts the conversion of the whole entry: partial columnar files are
/// never written.
///
/// Variants
/// -----------------
/// * `MissingColumn` – A required column is absent from the CSV header.
/// * `InvalidTimestamp` – A timestamp cell does not match the fixed format.
/// * `EmptyEntityId` – The entity identifier cell is empty.
/// * `OutOfPeriod` – A row lies outside the calendar bounds of the converted period.
/// * `MalformedRow` – The CSV reader could not split a row into the header's fields.
#[derive(Error, Debug, PartialEq)]
pub enum SchemaError {
    #[error("Required column '{0}' is missing from the header")]
    MissingColumn(String),

    #[error("Invalid timestamp in column '{column}' at line {line}: '{value}'")]
    InvalidTimestamp {
        column: String,
        line: u64,
        value: String,
    },

    #[error("Empty entity identifier at line {line}")]
    EmptyEntityId { line: u64 },

    #[error("Timestamp '{value}' at line {line} is outside period {period}")]
    OutOfPeriod {
        line: u64,
        value: String,
        period: String,
    },

    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },
}

#[derive(Error, Debug)]
pub enum AisError {
    #[error("Corrupt archive {archive}: {reason}")]
    CorruptArchive { archive: String, reason: String },

    #[error("Schema mismatch: {0}")]
    Schema(#[from] SchemaError),

    #[error("Input path does not exist: {0}")]
    MissingInput(Utf8PathBuf),

    #[error("Input is not sorted by time at row {row}: {current} follows {previous}")]
    UnsortedInput {
        row: usize,
        previous: i64,
        current: i64,
    },

    #[error("Null value in key column '{column}' at row {row}")]
    NullKey { column: String, row: usize },

    #[error("Column '{0}' not found in schema")]
    ColumnNotFound(String),

    #[error("Column '{column}' has type {found}, expected {expected}")]
    ColumnType {
        column: String,
        expected: String,
        found: String,
    },

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Invalid cascade: {0}")]
    InvalidCascade(String),

    #[error("In-flight buffer budget exhausted (cap = {cap})")]
    BudgetExhausted { cap: usize },

    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    #[error("Unable to perform file operation: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl AisError {
    /// `true` for the errors that belong to a single raw entry and are recovered
    /// locally by the ingestion loop (logged, entry skipped).
    pub fn is_entry_local(&self) -> bool {
        matches!(
            self,
            AisError::Schema(_)
                | AisError::Csv(_)
                | AisError::Io(_)
                | AisError::Zip(_)
                | AisError::Parquet(_)
                | AisError::Arrow(_)
        )
    }
}

impl PartialEq for AisError {
    fn eq(&self, other: &Self) -> bool {
        use AisError::*;
        match (self, other) {
            (
                CorruptArchive {
                    archive: a,
                    reason: r,
                },
                CorruptArchive {
                    archive: b,
                    reason: s,
                },
            ) => a == b && r == s,
            (Schema(a), Schema(b)) => a == b,
            (MissingInput(a), MissingInput(b)) => a == b,
            (
                UnsortedInput {
                    row: a,
                    previous: p,
                    current: c,
                },
                UnsortedInput {
                    row: b,
                    previous: q,
                    current: d,
                },
            ) => a == b && p == q && c == d,
            (NullKey { column: a, row: r }, NullKey { column: b, row: s }) => a == b && r == s,
            (ColumnNotFound(a), ColumnNotFound(b)) => a == b,
            (
                ColumnType {
                    column: a,
                    expected: e,
                    found: f,
                },
                ColumnType {
                    column: b,
                    expected: g,
                    found: h,
                },
            ) => a == b && e == g && f == h,
            (InvalidResolution(a), InvalidResolution(b)) => a == b,
            (InvalidPeriod(a), InvalidPeriod(b)) => a == b,
            (InvalidCascade(a), InvalidCascade(b)) => a == b,
            (BudgetExhausted { cap: a }, BudgetExhausted { cap: b }) => a == b,
            (NonUtf8Path(a), NonUtf8Path(b)) => a == b,

            // Wrapped library errors are not comparable: same variant is enough
            (Io(_), Io(_)) => true,
            (Csv(_), Csv(_)) => true,
            (Zip(_), Zip(_)) => true,
            (Parquet(_), Parquet(_)) => true,
            (Arrow(_), Arrow(_)) => true,
            (Pattern(_), Pattern(_)) => true,

            _ => false,
        }
    }
}

#[cfg(test)]
mod ais_errors_test {
    use super::*;

    #[test]
    fn test_schema_error_display() {
        let err = AisError::from(SchemaError::InvalidTimestamp {
            column: "# Timestamp".into(),
            line: 12,
            value: "2024-01-01".into(),
        });
        assert_eq!(
            err.to_string(),
            "Schema mismatch: Invalid timestamp in column '# Timestamp' at line 12: '2024-01-01'"
        );
        assert!(err.is_entry_local());
    }

    #[test]
    fn test_contract_errors_are_not_entry_local() {
        let err = AisError::UnsortedInput {
            row: 3,
            previous: 10,
            current: 5,
        };
        assert!(!err.is_entry_local());
        assert!(!AisError::MissingInput("nowhere".into()).is_entry_local());
    }

    #[test]
    fn test_partial_eq_on_wrapped_errors() {
        let a = AisError::from(std::io::Error::other("a"));
        let b = AisError::from(std::io::Error::other("b"));
        assert_eq!(a, b);
        assert_ne!(a, AisError::InvalidPeriod("x".into()));
    }
}
