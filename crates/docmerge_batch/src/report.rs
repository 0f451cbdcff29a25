//! Batch report models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;

use crate::conf::N_ROWS_HEADER;

/// One row that produced no document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecRowFailure {
    /// Zero-based data row position.
    pub row_index: usize,
    /// 1-based sheet row number (header row counted).
    pub row_number: usize,
    /// User-facing failure text.
    pub reason: String,
}

impl SpecRowFailure {
    /// Build a failure for data row `row_index`.
    pub fn new(row_index: usize, reason: String) -> Self {
        Self {
            row_index,
            row_number: derive_row_number(row_index),
            reason,
        }
    }
}

/// 1-based sheet row number of data row `row_index`.
pub fn derive_row_number(row_index: usize) -> usize {
    row_index + N_ROWS_HEADER + 1
}

impl fmt::Display for SpecRowFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error generating document for row {}: {}",
            self.row_number, self.reason
        )
    }
}

/// Aggregate counters and diagnostics for one batch run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReportBatch {
    /// Records visited.
    pub cnt_rows: u64,
    /// Documents written to the archive.
    pub cnt_archived: u64,
    /// Archive entry names, in row order.
    pub entries: Vec<String>,
    /// Per-row failures, in row order.
    pub failures: Vec<SpecRowFailure>,
    /// Non-fatal diagnostics (collisions, renames, unmatched placeholders).
    pub warnings: Vec<String>,
}

impl ReportBatch {
    /// Number of failed rows.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_rows".to_string(), self.cnt_rows);
        dict_counts.insert("cnt_archived".to_string(), self.cnt_archived);
        dict_counts.insert("cnt_failed".to_string(), self.failure_count() as u64);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} rows={} archived={} failed={} warnings={}",
            self.cnt_rows,
            self.cnt_archived,
            self.failure_count(),
            self.warning_count()
        )
    }
}

impl fmt::Display for ReportBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[BATCH]"))
    }
}

/// Mutable accumulator for batch results.
#[derive(Debug, Default, Clone)]
pub struct ReportBatchBuilder {
    /// See [`ReportBatch::cnt_rows`].
    pub cnt_rows: u64,
    /// See [`ReportBatch::entries`].
    pub entries: Vec<String>,
    /// See [`ReportBatch::failures`].
    pub failures: Vec<SpecRowFailure>,
    /// See [`ReportBatch::warnings`].
    pub warnings: Vec<String>,
}

impl ReportBatchBuilder {
    /// Count one visited record.
    pub fn add_row(&mut self) {
        self.cnt_rows += 1;
    }

    /// Record one archived entry.
    pub fn add_entry(&mut self, entry: String) {
        self.entries.push(entry);
    }

    /// Record one failed row.
    pub fn add_failure(&mut self, failure: SpecRowFailure) {
        self.failures.push(failure);
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportBatch {
        ReportBatch {
            cnt_rows: self.cnt_rows,
            cnt_archived: self.entries.len() as u64,
            entries: self.entries,
            failures: self.failures,
            warnings: self.warnings,
        }
    }
}
