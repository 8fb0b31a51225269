//! Presentation-facing job processing state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing state of one job class, derived on the client.
///
/// Exactly one orchestrator owns one `ProcessingState`; it is never shared
/// across job classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    /// Nothing in progress.
    #[default]
    Idle,
    /// Start request issued, backend answer pending.
    Triggering,
    /// Backend accepted the job; a poller is live.
    Running,
    /// Job finished successfully (held for display, then back to `Idle`).
    Completed,
    /// Start rejected, transport failure, or job-reported error.
    Failed,
}

impl ProcessingState {
    /// Whether a job is being started or observed.
    #[inline]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Triggering | Self::Running)
    }

    /// Whether the state is a display-hold terminal state.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Triggering => "triggering",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
