//! Per-item outcomes and per-batch summaries of archival runs.

use crate::error::TierError;
use std::fmt;

/// Step of the archival sequence at which an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivalStage {
    ColdWrite,
    IndexUpdate,
    HotDelete,
}

impl ArchivalStage {
    /// Whether the index already points at the cold copy when this stage
    /// fails.
    pub fn is_committed(&self) -> bool {
        matches!(self, ArchivalStage::HotDelete)
    }
}

impl fmt::Display for ArchivalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchivalStage::ColdWrite => write!(f, "cold_write"),
            ArchivalStage::IndexUpdate => write!(f, "index_update"),
            ArchivalStage::HotDelete => write!(f, "hot_delete"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ItemOutcome {
    /// Cold copy written and indexed. `hot_deleted` is false when the hot
    /// tier no longer held the record (redelivery).
    Archived {
        id: String,
        cold_path: String,
        hot_deleted: bool,
    },
    KeptHot { id: String },
    /// Delete notifications carry nothing to archive.
    Ignored { id: Option<String> },
    Invalid { id: Option<String>, reason: String },
    Failed {
        id: String,
        stage: ArchivalStage,
        error: TierError,
    },
    /// Held back because an earlier item with the same id failed in this
    /// batch. Redelivered after it, never processed ahead of it.
    Deferred { id: String },
}

impl ItemOutcome {
    /// Resolved items may be acknowledged; unresolved ones need redelivery.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, ItemOutcome::Failed { .. } | ItemOutcome::Deferred { .. })
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            ItemOutcome::Archived { id, .. }
            | ItemOutcome::KeptHot { id }
            | ItemOutcome::Failed { id, .. }
            | ItemOutcome::Deferred { id } => Some(id),
            ItemOutcome::Ignored { id } | ItemOutcome::Invalid { id, .. } => id.as_deref(),
        }
    }
}

/// Outcomes of one batch, in the order the items were delivered.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn archived(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Archived { .. }))
    }

    pub fn kept_hot(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::KeptHot { .. }))
    }

    pub fn ignored(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Ignored { .. }))
    }

    pub fn validation_failures(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Invalid { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    pub fn deferred(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Deferred { .. }))
    }

    /// Items that did not archive or stay hot cleanly.
    pub fn failure_count(&self) -> usize {
        self.validation_failures() + self.failed()
    }

    /// Positions of items that must be redelivered.
    pub fn unresolved_positions(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, o)| !o.is_resolved())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.outcomes.extend(other.outcomes);
    }

    fn count<F: Fn(&ItemOutcome) -> bool>(&self, pred: F) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TierKind;

    #[test]
    fn test_counts_and_unresolved_positions() {
        let report = BatchReport {
            outcomes: vec![
                ItemOutcome::Archived {
                    id: "a".into(),
                    cold_path: "p".into(),
                    hot_deleted: true,
                },
                ItemOutcome::Invalid {
                    id: None,
                    reason: "missing 'id'".into(),
                },
                ItemOutcome::Failed {
                    id: "c".into(),
                    stage: ArchivalStage::ColdWrite,
                    error: TierError::transient(TierKind::Cold, "put", "down"),
                },
                ItemOutcome::KeptHot { id: "d".into() },
                ItemOutcome::Deferred { id: "c".into() },
            ],
        };
        assert_eq!(report.archived(), 1);
        assert_eq!(report.kept_hot(), 1);
        assert_eq!(report.validation_failures(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failure_count(), 2);
        assert_eq!(report.deferred(), 1);
        assert_eq!(report.unresolved_positions(), vec![2, 4]);
        assert_eq!(report.outcomes[2].id(), Some("c"));
    }

    #[test]
    fn test_only_hot_delete_failures_are_committed() {
        assert!(ArchivalStage::HotDelete.is_committed());
        assert!(!ArchivalStage::IndexUpdate.is_committed());
        assert!(!ArchivalStage::ColdWrite.is_committed());
    }
}
