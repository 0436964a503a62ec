use serde::{Deserialize, Serialize};

/// The strict total order a job's checkpoint progresses through. `Failed` is a
/// sibling terminal stage reachable from any non-completed stage rather than
/// a position in the order itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// A fresh checkpoint that hasn't run `stage_initialize` yet. Strictly
    /// before `Initialized` — a brand-new job must not look like it already
    /// reached that stage.
    NotStarted,
    Initialized,
    Downloaded,
    Analyzed,
    ThumbnailsGenerated,
    Transcoded,
    Uploaded,
    Completed,
    Failed,
}

impl Stage {
    /// Index into the strict order; `Failed` has no place in the order and is
    /// never compared positionally, so callers must special-case it.
    fn order_index(&self) -> Option<u8> {
        match self {
            Stage::NotStarted => Some(0),
            Stage::Initialized => Some(1),
            Stage::Downloaded => Some(2),
            Stage::Analyzed => Some(3),
            Stage::ThumbnailsGenerated => Some(4),
            Stage::Transcoded => Some(5),
            Stage::Uploaded => Some(6),
            Stage::Completed => Some(7),
            Stage::Failed => None,
        }
    }

    /// True only when `self` is strictly past `other` in the total order.
    /// `Failed` is never strictly past anything, and nothing is strictly past
    /// `Failed`.
    pub fn is_strictly_past(&self, other: Stage) -> bool {
        match (self.order_index(), other.order_index()) {
            (Some(a), Some(b)) => a > b,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_order_holds() {
        assert!(Stage::Downloaded.is_strictly_past(Stage::Initialized));
        assert!(!Stage::Initialized.is_strictly_past(Stage::Downloaded));
        assert!(!Stage::Initialized.is_strictly_past(Stage::Initialized));
        assert!(Stage::Completed.is_strictly_past(Stage::Transcoded));
    }

    #[test]
    fn failed_is_never_strictly_past_or_before() {
        assert!(!Stage::Failed.is_strictly_past(Stage::Initialized));
        assert!(!Stage::Completed.is_strictly_past(Stage::Failed));
    }
}
