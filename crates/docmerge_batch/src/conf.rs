//! Batch constants and default preset factories.

use crate::spec::{SpecBatchOptions, SpecReadOptions};

/// Default placeholder key whose value names each generated document.
pub const C_KEY_FILENAME_DEFAULT: &str = "Product_Name";
/// Prefix of the positional fallback filename (`document_<row index>`).
pub const C_FILENAME_FALLBACK_PREFIX: &str = "document";
/// Extension of every generated archive entry.
pub const C_EXT_DOCUMENT: &str = "docx";
/// Default output archive name used by front ends.
pub const C_FILE_ARCHIVE_DEFAULT: &str = "product_documents.zip";
/// Maximum derived filename length, in characters.
pub const N_LEN_FILENAME_MAX: usize = 120;
/// Number of rows shown in a parsed-data preview.
pub const N_ROWS_PREVIEW_DEFAULT: usize = 5;
/// Rows above the first record (the header row), used for 1-based row numbers.
pub const N_ROWS_HEADER: usize = 1;
/// Main document part every `.docx` template must carry.
pub const C_PART_MAIN_DOCUMENT: &str = "word/document.xml";

/// Build default batch options.
pub fn derive_default_batch_options() -> SpecBatchOptions {
    SpecBatchOptions::default()
}

/// Build default read options (first sheet).
pub fn derive_default_read_options() -> SpecReadOptions {
    SpecReadOptions::default()
}
