//! Caller policy: which checks abort a run and which are advisory

use serde::Serialize;

/// How a failed check is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Abort the run
    Fatal,
    /// Log a warning and continue (for entry failures: skip the entry)
    Advisory,
}

impl Severity {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Severity::Fatal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Policy {
    /// Entry table must fit in the declared header size
    pub structure_check: Severity,
    /// Data region CRC32 must match the key file
    pub checksum: Severity,
    /// Entry payload ended early or failed to inflate
    pub truncated_entry: Severity,
    /// Entry directory or output file could not be created
    pub entry_output: Severity,
}

impl Policy {
    /// Every check is fatal
    pub fn strict() -> Self {
        Self {
            structure_check: Severity::Fatal,
            checksum: Severity::Fatal,
            truncated_entry: Severity::Fatal,
            entry_output: Severity::Fatal,
        }
    }

    /// Integrity checks become advisory; entry failures stay fatal
    pub fn forced() -> Self {
        Self {
            structure_check: Severity::Advisory,
            checksum: Severity::Advisory,
            ..Self::strict()
        }
    }

    /// Skip entries that cannot be written or decoded instead of aborting
    pub fn skipping_bad_entries(self) -> Self {
        Self {
            truncated_entry: Severity::Advisory,
            entry_output: Severity::Advisory,
            ..self
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::strict()
    }
}
