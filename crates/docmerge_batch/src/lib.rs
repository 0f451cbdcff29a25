//! `docmerge_batch` v1:
//! Rust-side spreadsheet-to-document batch kernel.
//!
//! Architecture:
//! - `conf`    : constants and default presets
//! - `spec`    : specs/models/options and error types
//! - `util`    : pure helper functions (identifiers, filenames, cell text)
//! - `reader`  : `.xlsx` / IPC bytes -> dataframe -> records
//! - `render`  : `.docx` template loading, split-tag repair and Jinja rendering
//! - `archive` : in-memory `.zip` assembly
//! - `report`  : batch report models and builder
//! - `batch`   : per-row driver tying the above together
pub mod archive;
pub mod batch;
pub mod conf;
pub mod reader;
pub mod render;
pub mod report;
pub mod spec;
pub mod util;

pub use archive::{ArchiveAssembler, EnumAppendOutcome, derive_entry_name};
pub use batch::{
    OutputBatch, generate_documents, generate_documents_from_dataframe,
    generate_documents_from_ipc_bytes, process_batch,
};
pub use conf::{
    C_FILE_ARCHIVE_DEFAULT, C_KEY_FILENAME_DEFAULT, N_LEN_FILENAME_MAX, N_ROWS_PREVIEW_DEFAULT,
    derive_default_batch_options, derive_default_read_options,
};
pub use reader::{
    derive_preview_grid, derive_records_from_dataframe, preview_dataframe,
    read_dataframe_from_ipc_bytes, read_workbook_dataframe,
};
pub use render::{DocumentRenderer, DocxTemplate};
pub use report::{ReportBatch, ReportBatchBuilder, SpecRowFailure};
pub use spec::{
    ArchiveError, BatchError, EnumCellValue, EnumFilenameConflictStrategy, EnumMissingValueMode,
    ReadError, RenderError, SpecBatchOptions, SpecIdentifierCollision, SpecPlaceholderMapping,
    SpecReadOptions, SpecRecord, TemplateError,
};
pub use util::{
    build_placeholder_mapping, convert_cell_value_to_text, derive_filename,
    find_identifier_collisions, sanitize_identifier,
};
