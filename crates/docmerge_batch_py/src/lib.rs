use std::collections::BTreeMap;

use docmerge_batch::{
    BatchError, C_KEY_FILENAME_DEFAULT, EnumFilenameConflictStrategy, EnumMissingValueMode,
    OutputBatch, ReportBatch, SpecBatchOptions, SpecReadOptions, SpecRowFailure, derive_filename,
    derive_preview_grid, generate_documents, generate_documents_from_ipc_bytes,
    read_workbook_dataframe, sanitize_identifier,
};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyBytes;

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "docmerge.batch.generate_documents.v1";
const C_BRIDGE_TRANSPORT: &str = "bytes";

#[pyclass(name = "RowFailure")]
#[derive(Debug, Clone)]
struct PyRowFailure {
    #[pyo3(get)]
    row_index: usize,
    #[pyo3(get)]
    row_number: usize,
    #[pyo3(get)]
    reason: String,
}

impl From<SpecRowFailure> for PyRowFailure {
    fn from(failure: SpecRowFailure) -> Self {
        Self {
            row_index: failure.row_index,
            row_number: failure.row_number,
            reason: failure.reason,
        }
    }
}

#[pymethods]
impl PyRowFailure {
    fn __str__(&self) -> String {
        format!(
            "Error generating document for row {}: {}",
            self.row_number, self.reason
        )
    }
}

#[pyclass(name = "BatchResult")]
#[derive(Debug, Clone)]
struct PyBatchResult {
    v_archive: Vec<u8>,
    report: ReportBatch,
    #[pyo3(get)]
    entries: Vec<String>,
    #[pyo3(get)]
    failures: Vec<PyRowFailure>,
    #[pyo3(get)]
    warnings: Vec<String>,
}

impl From<OutputBatch> for PyBatchResult {
    fn from(output: OutputBatch) -> Self {
        Self {
            entries: output.report.entries.clone(),
            failures: output
                .report
                .failures
                .iter()
                .cloned()
                .map(PyRowFailure::from)
                .collect(),
            warnings: output.report.warnings.clone(),
            v_archive: output.archive,
            report: output.report,
        }
    }
}

#[pymethods]
impl PyBatchResult {
    /// Finished `.zip` bytes.
    #[getter]
    fn archive<'py>(&self, py: Python<'py>) -> Bound<'py, PyBytes> {
        PyBytes::new(py, &self.v_archive)
    }

    #[getter]
    fn cnt_rows(&self) -> u64 {
        self.report.cnt_rows
    }

    #[getter]
    fn cnt_archived(&self) -> u64 {
        self.report.cnt_archived
    }

    #[getter]
    fn failure_count(&self) -> usize {
        self.report.failure_count()
    }

    #[getter]
    fn warning_count(&self) -> usize {
        self.report.warning_count()
    }

    fn to_dict(&self) -> BTreeMap<String, u64> {
        self.report.to_dict()
    }

    #[pyo3(signature = (prefix = "[BATCH]"))]
    fn format(&self, prefix: &str) -> String {
        self.report.format(prefix)
    }

    fn __str__(&self) -> String {
        self.report.to_string()
    }
}

fn parse_rule_missing_value(value: &str) -> PyResult<EnumMissingValueMode> {
    match value {
        "blank" => Ok(EnumMissingValueMode::Blank),
        "error" => Ok(EnumMissingValueMode::Error),
        _ => Err(PyValueError::new_err(format!(
            "Invalid missing value mode: `{value}`. Expected one of: ['blank', 'error']"
        ))),
    }
}

fn parse_rule_filename_conflict(value: &str) -> PyResult<EnumFilenameConflictStrategy> {
    match value {
        "suffix" => Ok(EnumFilenameConflictStrategy::Suffix),
        "skip" => Ok(EnumFilenameConflictStrategy::Skip),
        _ => Err(PyValueError::new_err(format!(
            "Invalid filename conflict strategy: `{value}`. Expected one of: ['suffix', 'skip']"
        ))),
    }
}

fn map_batch_error(exception: BatchError) -> PyErr {
    PyValueError::new_err(exception.to_string())
}

fn derive_batch_options(
    key_filename: String,
    sheet_name: Option<String>,
    rule_missing_value: &str,
    rule_filename_conflict: &str,
) -> PyResult<SpecBatchOptions> {
    Ok(SpecBatchOptions {
        key_filename,
        rule_missing_value: parse_rule_missing_value(rule_missing_value)?,
        rule_filename_conflict: parse_rule_filename_conflict(rule_filename_conflict)?,
        read_options: SpecReadOptions { sheet_name },
    })
}

#[pyfunction(name = "generate_documents")]
#[pyo3(signature = (
    data,
    template,
    key_filename = C_KEY_FILENAME_DEFAULT.to_string(),
    sheet_name = None,
    rule_missing_value = "blank",
    rule_filename_conflict = "suffix"
))]
fn generate_documents_py(
    py: Python<'_>,
    data: &[u8],
    template: &[u8],
    key_filename: String,
    sheet_name: Option<String>,
    rule_missing_value: &str,
    rule_filename_conflict: &str,
) -> PyResult<PyBatchResult> {
    let spec_options = derive_batch_options(
        key_filename,
        sheet_name,
        rule_missing_value,
        rule_filename_conflict,
    )?;

    let output = py.allow_threads(|| generate_documents(data, template, &spec_options));
    let output = output.map_err(map_batch_error)?;
    Ok(PyBatchResult::from(output))
}

#[pyfunction(name = "generate_documents_from_ipc")]
#[pyo3(signature = (
    ipc_bytes,
    template,
    key_filename = C_KEY_FILENAME_DEFAULT.to_string(),
    rule_missing_value = "blank",
    rule_filename_conflict = "suffix"
))]
fn generate_documents_from_ipc_py(
    py: Python<'_>,
    ipc_bytes: &[u8],
    template: &[u8],
    key_filename: String,
    rule_missing_value: &str,
    rule_filename_conflict: &str,
) -> PyResult<PyBatchResult> {
    let spec_options = derive_batch_options(
        key_filename,
        None,
        rule_missing_value,
        rule_filename_conflict,
    )?;

    let output =
        py.allow_threads(|| generate_documents_from_ipc_bytes(ipc_bytes, template, &spec_options));
    let output = output.map_err(map_batch_error)?;
    Ok(PyBatchResult::from(output))
}

#[pyfunction(name = "preview_rows")]
#[pyo3(signature = (data, n_rows = 5, sheet_name = None))]
fn preview_rows_py(
    py: Python<'_>,
    data: &[u8],
    n_rows: usize,
    sheet_name: Option<String>,
) -> PyResult<(Vec<String>, Vec<Vec<String>>)> {
    let spec_read_options = SpecReadOptions { sheet_name };
    py.allow_threads(|| {
        let df = read_workbook_dataframe(data, &spec_read_options)?;
        derive_preview_grid(&df, n_rows)
    })
    .map_err(|err| PyValueError::new_err(err.to_string()))
}

#[pyfunction(name = "sanitize_identifier")]
fn sanitize_identifier_py(name: &str) -> String {
    sanitize_identifier(name)
}

#[pyfunction(name = "derive_filename")]
#[pyo3(signature = (display_value, fallback_index))]
fn derive_filename_py(display_value: Option<&str>, fallback_index: usize) -> String {
    derive_filename(display_value, fallback_index)
}

#[pymodule]
fn _docmerge_batch_rs(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyRowFailure>()?;
    module.add_class::<PyBatchResult>()?;
    module.add_function(wrap_pyfunction!(generate_documents_py, module)?)?;
    module.add_function(wrap_pyfunction!(generate_documents_from_ipc_py, module)?)?;
    module.add_function(wrap_pyfunction!(preview_rows_py, module)?)?;
    module.add_function(wrap_pyfunction!(sanitize_identifier_py, module)?)?;
    module.add_function(wrap_pyfunction!(derive_filename_py, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}

