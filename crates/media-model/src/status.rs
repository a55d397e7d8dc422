//! Status enumerations for sources, sinks, pumps, and sessions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Reading state of a source demuxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Unknown,
    Reading,
    Completed,
    Failed,
    Cancelled,
}

/// Writing state of a sink muxer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkStatus {
    Unknown,
    Writing,
    Completed,
    Failed,
    Cancelled,
}

/// Lifecycle of one track pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpState {
    /// Still moving samples.
    Running,
    /// The source ran dry and the sink track was marked finished.
    Finished,
    /// Stopped early because of failure or cancellation.
    Aborted,
}

impl PumpState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PumpState::Running)
    }
}

/// Session status exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Unknown,
    Waiting,
    Exporting,
    Completed,
    Failed,
    Cancelled,
}

impl ExportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExportStatus::Completed | ExportStatus::Failed | ExportStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportStatus::Unknown => "unknown",
            ExportStatus::Waiting => "waiting",
            ExportStatus::Exporting => "exporting",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
            ExportStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
