//! The fixed pipeline-stage vocabulary.
//!
//! Every provider-specific status name is mapped onto one of these stages
//! via external status-mapping configuration (see [`crate::stages`]).
//! Statuses with no mapping resolve to `None` and are recorded as unmapped
//! rather than dropped.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stage of the delivery pipeline.
///
/// The ordering of variants reflects the nominal left-to-right flow of work
/// and is used for WIP displays; it is not enforced on transitions (work can
/// move backwards, e.g. a QA reject).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Backlog,
    Ba,
    Dev,
    CodeReview,
    Qa,
    Uat,
    Done,
    Cancelled,
}

impl PipelineStage {
    /// Whether a work item in this stage is terminal (no further transitions
    /// expected). Cycle records are only materialized for terminal tickets.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Cancelled)
    }

    /// Whether this stage counts as active work for flow-efficiency purposes.
    ///
    /// Backlog and BA are waiting stages; terminal stages accrue no time.
    pub fn is_active_work(&self) -> bool {
        matches!(
            self,
            PipelineStage::Dev | PipelineStage::CodeReview | PipelineStage::Qa | PipelineStage::Uat
        )
    }

    /// Stable string form matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Backlog => "backlog",
            PipelineStage::Ba => "ba",
            PipelineStage::Dev => "dev",
            PipelineStage::CodeReview => "code_review",
            PipelineStage::Qa => "qa",
            PipelineStage::Uat => "uat",
            PipelineStage::Done => "done",
            PipelineStage::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_stages() {
        assert!(PipelineStage::Done.is_terminal());
        assert!(PipelineStage::Cancelled.is_terminal());
        assert!(!PipelineStage::Qa.is_terminal());
    }

    #[test]
    fn active_work_excludes_waiting_and_terminal_stages() {
        assert!(PipelineStage::Dev.is_active_work());
        assert!(PipelineStage::CodeReview.is_active_work());
        assert!(!PipelineStage::Backlog.is_active_work());
        assert!(!PipelineStage::Ba.is_active_work());
        assert!(!PipelineStage::Done.is_active_work());
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&PipelineStage::CodeReview).unwrap(),
            "\"code_review\""
        );
    }
}
