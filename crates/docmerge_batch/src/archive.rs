//! Output archive assembly.

use std::collections::BTreeSet;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::conf::C_EXT_DOCUMENT;
use crate::spec::{ArchiveError, EnumFilenameConflictStrategy};

/// Where an appended document ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumAppendOutcome {
    /// Written under the requested name.
    Written(String),
    /// Written under a suffixed name because the requested one was taken.
    Renamed {
        /// Name the row derived.
        requested: String,
        /// Name actually written.
        written: String,
    },
    /// Not written: name taken and the strategy is [`EnumFilenameConflictStrategy::Skip`].
    Skipped(String),
}

/// In-memory `.zip` writer with unique entry names.
pub struct ArchiveAssembler {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    rule_conflict: EnumFilenameConflictStrategy,
    set_entry_names: BTreeSet<String>,
}

impl ArchiveAssembler {
    /// Create an empty archive.
    pub fn new(rule_conflict: EnumFilenameConflictStrategy) -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            rule_conflict,
            set_entry_names: BTreeSet::new(),
        }
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.set_entry_names.len()
    }

    /// Whether no entry was written yet.
    pub fn is_empty(&self) -> bool {
        self.set_entry_names.is_empty()
    }

    /// Append one document as `<filename_base>.docx`.
    ///
    /// `row_index` disambiguates the name when another row already took it.
    pub fn append(
        &mut self,
        filename_base: &str,
        row_index: usize,
        bytes: &[u8],
    ) -> Result<EnumAppendOutcome, ArchiveError> {
        let c_requested = derive_entry_name(filename_base);
        let outcome = if !self.set_entry_names.contains(&c_requested) {
            EnumAppendOutcome::Written(c_requested)
        } else {
            match self.rule_conflict {
                EnumFilenameConflictStrategy::Skip => {
                    return Ok(EnumAppendOutcome::Skipped(c_requested));
                }
                EnumFilenameConflictStrategy::Suffix => EnumAppendOutcome::Renamed {
                    written: self.derive_free_name(filename_base, row_index),
                    requested: c_requested,
                },
            }
        };

        let c_entry = match &outcome {
            EnumAppendOutcome::Written(name) => name,
            EnumAppendOutcome::Renamed { written, .. } => written,
            EnumAppendOutcome::Skipped(name) => name,
        };
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.writer.start_file(c_entry.as_str(), options)?;
        self.writer
            .write_all(bytes)
            .map_err(|err| ArchiveError::Entry {
                entry: c_entry.clone(),
                message: err.to_string(),
            })?;
        self.set_entry_names.insert(c_entry.clone());

        Ok(outcome)
    }

    /// Finish the container and return its bytes.
    pub fn finish(self) -> Result<Vec<u8>, ArchiveError> {
        Ok(self.writer.finish()?.into_inner())
    }

    fn derive_free_name(&self, filename_base: &str, row_index: usize) -> String {
        let c_base = format!("{filename_base}_{row_index}");
        let mut c_name = derive_entry_name(&c_base);
        let mut n_attempt = 1;
        while self.set_entry_names.contains(&c_name) {
            c_name = derive_entry_name(&format!("{c_base}_{n_attempt}"));
            n_attempt += 1;
        }
        c_name
    }
}

/// `<filename_base>.docx`
pub fn derive_entry_name(filename_base: &str) -> String {
    format!("{filename_base}.{C_EXT_DOCUMENT}")
}
