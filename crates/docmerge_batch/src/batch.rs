//! Row processing driver.

use polars::prelude::DataFrame;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveAssembler, EnumAppendOutcome};
use crate::reader::{
    derive_records_from_dataframe, read_dataframe_from_ipc_bytes, read_workbook_dataframe,
};
use crate::render::{DocumentRenderer, DocxTemplate};
use crate::report::{ReportBatch, ReportBatchBuilder, SpecRowFailure, derive_row_number};
use crate::spec::{BatchError, SpecBatchOptions, SpecRecord};
use crate::util::{
    build_placeholder_mapping, convert_cell_value_to_text, derive_filename,
    find_identifier_collisions, sanitize_identifier,
};

/// Result of one batch: archive bytes plus what happened per row.
#[derive(Debug, Clone)]
pub struct OutputBatch {
    /// Finished `.zip` bytes.
    pub archive: Vec<u8>,
    /// Counters, entry names, row failures and diagnostics.
    pub report: ReportBatch,
}

#[derive(Debug)]
struct SpecRenderedDocument {
    filename: String,
    bytes: Vec<u8>,
}

/// Render one document per record and collect them into an archive.
///
/// Records are handled strictly in order. A row whose render fails is
/// recorded in [`ReportBatch::failures`] and skipped; later rows are not
/// affected. Only a failure of the archive writer itself aborts the batch.
pub fn process_batch<R>(
    records: &[SpecRecord],
    renderer: &R,
    options: &SpecBatchOptions,
) -> Result<OutputBatch, BatchError>
where
    R: DocumentRenderer + ?Sized,
{
    run_batch(records, renderer, options, Vec::new())
}

/// Parse `.xlsx` bytes and a `.docx` template, then run the batch.
///
/// An unreadable spreadsheet or template aborts before any row is rendered.
pub fn generate_documents(
    bytes_data: &[u8],
    bytes_template: &[u8],
    options: &SpecBatchOptions,
) -> Result<OutputBatch, BatchError> {
    let df = read_workbook_dataframe(bytes_data, &options.read_options)?;
    generate_documents_from_dataframe(&df, bytes_template, options)
}

/// Same as [`generate_documents`] with a polars IPC payload as the data source.
pub fn generate_documents_from_ipc_bytes(
    bytes_ipc: &[u8],
    bytes_template: &[u8],
    options: &SpecBatchOptions,
) -> Result<OutputBatch, BatchError> {
    let df = read_dataframe_from_ipc_bytes(bytes_ipc)?;
    generate_documents_from_dataframe(&df, bytes_template, options)
}

/// Run the batch over an already parsed dataframe.
pub fn generate_documents_from_dataframe(
    df: &DataFrame,
    bytes_template: &[u8],
    options: &SpecBatchOptions,
) -> Result<OutputBatch, BatchError> {
    let template = DocxTemplate::from_bytes(bytes_template)?
        .with_missing_value_mode(options.rule_missing_value);
    let l_records = derive_records_from_dataframe(df)?;

    let l_warnings = match l_records.first() {
        Some(record) => derive_unmatched_placeholder_warnings(&template, record),
        None => Vec::new(),
    };
    run_batch(&l_records, &template, options, l_warnings)
}

fn run_batch<R>(
    records: &[SpecRecord],
    renderer: &R,
    options: &SpecBatchOptions,
    warnings_init: Vec<String>,
) -> Result<OutputBatch, BatchError>
where
    R: DocumentRenderer + ?Sized,
{
    info!(n_rows = records.len(), "batch started");

    let mut builder_report = ReportBatchBuilder::default();
    for c_warning in warnings_init {
        warn!("{c_warning}");
        builder_report.add_warning(c_warning);
    }
    if let Some(record) = records.first() {
        let l_columns: Vec<String> = record.fields.iter().map(|(c, _)| c.clone()).collect();
        for collision in find_identifier_collisions(&l_columns) {
            let c_warning = format!(
                "Columns {:?} all map to placeholder '{}'; the last one ({:?}) is used.",
                collision.columns,
                collision.identifier,
                collision.columns.last().map(String::as_str).unwrap_or_default()
            );
            warn!("{c_warning}");
            builder_report.add_warning(c_warning);
        }
    }

    let mut assembler = ArchiveAssembler::new(options.rule_filename_conflict);
    for record in records {
        builder_report.add_row();

        let document = match process_row(record, renderer, &options.key_filename) {
            Ok(document) => document,
            Err(failure) => {
                warn!(row = failure.row_number, reason = %failure.reason, "row failed");
                builder_report.add_failure(failure);
                continue;
            }
        };

        match assembler.append(&document.filename, record.row_index, &document.bytes)? {
            EnumAppendOutcome::Written(c_entry) => {
                debug!(row_index = record.row_index, entry = %c_entry, "row archived");
                builder_report.add_entry(c_entry);
            }
            EnumAppendOutcome::Renamed { requested, written } => {
                let c_warning = format!(
                    "Row {}: entry {requested} already exists; written as {written}.",
                    derive_row_number(record.row_index)
                );
                warn!("{c_warning}");
                builder_report.add_warning(c_warning);
                builder_report.add_entry(written);
            }
            EnumAppendOutcome::Skipped(c_entry) => {
                let failure = SpecRowFailure::new(
                    record.row_index,
                    format!("archive entry {c_entry} already exists"),
                );
                warn!(row = failure.row_number, reason = %failure.reason, "row skipped");
                builder_report.add_failure(failure);
            }
        }
    }

    let archive = assembler.finish()?;
    let report = builder_report.build();
    info!(
        rows = report.cnt_rows,
        archived = report.cnt_archived,
        failed = report.failure_count(),
        warnings = report.warning_count(),
        "batch finished"
    );
    Ok(OutputBatch { archive, report })
}

/// `Pending -> Rendered`, or `Pending -> Failed(reason)`.
fn process_row<R>(
    record: &SpecRecord,
    renderer: &R,
    key_filename: &str,
) -> Result<SpecRenderedDocument, SpecRowFailure>
where
    R: DocumentRenderer + ?Sized,
{
    let dict_mapping = build_placeholder_mapping(record);

    let c_display = dict_mapping
        .get(key_filename)
        .filter(|value| !value.is_none())
        .map(convert_cell_value_to_text);
    let filename = derive_filename(c_display.as_deref(), record.row_index);

    let bytes = renderer
        .render(&dict_mapping)
        .map_err(|err| SpecRowFailure::new(record.row_index, err.to_string()))?;

    Ok(SpecRenderedDocument { filename, bytes })
}

fn derive_unmatched_placeholder_warnings(
    template: &DocxTemplate,
    record: &SpecRecord,
) -> Vec<String> {
    let l_keys: Vec<String> = record
        .fields
        .iter()
        .map(|(c_column, _)| sanitize_identifier(c_column))
        .collect();

    template
        .placeholders()
        .iter()
        .filter(|c_key| !l_keys.contains(c_key))
        .map(|c_key| {
            format!("Template placeholder '{c_key}' matches no column; affected rows will fail.")
        })
        .collect()
}
