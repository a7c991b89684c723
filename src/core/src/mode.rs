//! Execution mode for a single invocation.
//!
//! The mode is fixed once per command and decides which side effects run:
//!
//! | Mode               | Fetch | Relocate | Persist |
//! |--------------------|-------|----------|---------|
//! | `Live`             | yes   | yes      | yes     |
//! | `DryRun`           | yes   | no       | no      |
//! | `DryRunWithUpload` | yes   | yes      | no      |

use serde::{Deserialize, Serialize};

/// How side effects are executed for one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    #[default]
    Live,
    DryRun,
    DryRunWithUpload,
}

impl ExecutionMode {
    /// Select the mode from the two dry-run flags. `dry_run` wins if both are set.
    pub fn from_flags(dry_run: bool, dry_run_with_upload: bool) -> Self {
        if dry_run {
            ExecutionMode::DryRun
        } else if dry_run_with_upload {
            ExecutionMode::DryRunWithUpload
        } else {
            ExecutionMode::Live
        }
    }

    /// Whether `Relocate` decisions are executed against the registry.
    pub fn uploads(self) -> bool {
        !matches!(self, ExecutionMode::DryRun)
    }

    /// Whether resulting resource changes may be written back.
    pub fn persists(self) -> bool {
        matches!(self, ExecutionMode::Live)
    }

    /// Status verb for a relocation under this mode.
    pub fn verb(self) -> &'static str {
        if self.uploads() {
            "Uploading"
        } else {
            "Skipping"
        }
    }

    /// Suffix appended to status headers and result lines.
    pub fn suffix(self) -> &'static str {
        match self {
            ExecutionMode::Live => "",
            ExecutionMode::DryRun => " (dry run)",
            ExecutionMode::DryRunWithUpload => " (dry run with image upload)",
        }
    }
}
