//! Batch specification models, options and error types.

use std::collections::BTreeMap;

use polars::prelude::PolarsError;
use thiserror::Error;
use zip::result::ZipError;

use crate::conf::C_KEY_FILENAME_DEFAULT;

////////////////////////////////////////////////////////////////////////////////
// #region RecordSpecification

/// Scalar cell value carried from the tabular source into the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value (also booleans and dates, already formatted).
    String(String),
    /// Numeric value.
    Number(f64),
}

impl EnumCellValue {
    /// Whether the cell was empty in the source.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One source row: ordered `(column name, value)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecRecord {
    /// Zero-based position of the row among data rows (header excluded).
    pub row_index: usize,
    /// Column name/value pairs in source column order.
    pub fields: Vec<(String, EnumCellValue)>,
}

impl SpecRecord {
    /// Create a record from `(column, value)` pairs.
    pub fn new(row_index: usize, fields: Vec<(String, EnumCellValue)>) -> Self {
        Self { row_index, fields }
    }
}

/// Sanitized placeholder identifier -> value.
pub type SpecPlaceholderMapping = BTreeMap<String, EnumCellValue>;

/// Sanitized key produced by more than one source column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecIdentifierCollision {
    /// Shared sanitized identifier.
    pub identifier: String,
    /// Original columns in iteration order; the last one wins.
    pub columns: Vec<String>,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Policy for empty cells referenced by a template placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumMissingValueMode {
    /// Substitute empty text.
    #[default]
    Blank,
    /// Fail the row.
    Error,
}

/// Policy for two rows deriving the same archive entry name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumFilenameConflictStrategy {
    /// Keep both; the later entry gets a `_<row index>` suffix.
    #[default]
    Suffix,
    /// Drop the later row and record it as failed.
    Skip,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Options

/// Spreadsheet read options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecReadOptions {
    /// Sheet to read; first sheet when `None`.
    pub sheet_name: Option<String>,
}

/// Batch-wide options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecBatchOptions {
    /// Placeholder key whose value names each document.
    pub key_filename: String,
    /// Empty-cell substitution policy.
    pub rule_missing_value: EnumMissingValueMode,
    /// Duplicate entry name policy.
    pub rule_filename_conflict: EnumFilenameConflictStrategy,
    /// Spreadsheet read options.
    pub read_options: SpecReadOptions,
}

impl Default for SpecBatchOptions {
    fn default() -> Self {
        Self {
            key_filename: C_KEY_FILENAME_DEFAULT.to_string(),
            rule_missing_value: EnumMissingValueMode::Blank,
            rule_filename_conflict: EnumFilenameConflictStrategy::Suffix,
            read_options: SpecReadOptions::default(),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Spreadsheet could not be turned into records. Aborts the run.
#[derive(Debug, Error)]
pub enum ReadError {
    /// Workbook container or sheet XML is unreadable.
    #[error("Failed to read workbook: {0}")]
    Workbook(#[from] calamine::XlsxError),
    /// Requested sheet does not exist.
    #[error("Sheet not found: {0:?}")]
    SheetNotFound(String),
    /// Workbook has no worksheet at all.
    #[error("Workbook contains no sheets.")]
    NoSheets,
    /// Dataframe construction or access failed.
    #[error("Failed to build dataframe: {0}")]
    DataFrame(#[from] PolarsError),
    /// Polars IPC payload is unreadable.
    #[error("Failed to read IPC DataFrame bytes: {0}")]
    Ipc(String),
}

/// Template could not be loaded. Aborts the run.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Template is not a readable zip container.
    #[error("Failed to read template container: {0}")]
    Zip(#[from] ZipError),
    /// Template entry could not be read.
    #[error("Failed to read template part {part}: {message}")]
    Part {
        /// Part name inside the container.
        part: String,
        /// Underlying IO error text.
        message: String,
    },
    /// No `word/document.xml` part.
    #[error("Template has no main document part (word/document.xml).")]
    MissingMainDocument,
    /// A renderable XML part is not UTF-8.
    #[error("Template part {0} is not valid UTF-8.")]
    NotUtf8(String),
    /// A renderable part is not well-formed XML.
    #[error("Template part {part} is not well-formed XML: {message}")]
    Xml {
        /// Part name inside the container.
        part: String,
        /// Parser error text.
        message: String,
    },
    /// A `{{ }}` / `{% %}` tag does not compile.
    #[error("Invalid template syntax in {part}: {message}")]
    Syntax {
        /// Part name inside the container.
        part: String,
        /// Template engine error text.
        message: String,
    },
}

/// One row failed to render. Recorded, never fatal.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Template references a key the row does not provide.
    #[error("'{0}' is undefined")]
    UndefinedPlaceholder(String),
    /// Referenced cell is empty and empty cells are not allowed.
    #[error("'{0}' has no value")]
    MissingValue(String),
    /// Value carries a character XML 1.0 cannot represent.
    #[error("value of '{identifier}' contains a character not allowed in XML (U+{codepoint:04X})")]
    InvalidXmlChar {
        /// Placeholder identifier.
        identifier: String,
        /// Offending code point.
        codepoint: u32,
    },
    /// Template engine failed while evaluating a tag.
    #[error("{0}")]
    Template(String),
    /// Rendered document container could not be written.
    #[error("failed to write document: {0}")]
    Zip(#[from] ZipError),
    /// Rendered document part could not be written.
    #[error("failed to write document: {0}")]
    Io(#[from] std::io::Error),
}

/// Output archive could not be written. Aborts the run.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Zip container error.
    #[error("Failed to write archive: {0}")]
    Zip(#[from] ZipError),
    /// Entry payload write error.
    #[error("Failed to write archive entry {entry}: {message}")]
    Entry {
        /// Entry name.
        entry: String,
        /// Underlying IO error text.
        message: String,
    },
}

/// "Whole run failed" errors.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Tabular source unreadable.
    #[error(transparent)]
    Read(#[from] ReadError),
    /// Template unreadable.
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// Output archive unwritable.
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
