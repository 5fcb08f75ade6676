//! Represents a stored paste and the budget of reads it still permits.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// How many more successful reads a paste allows.
///
/// A paste either has no view limit at all, or carries both its original
/// limit and the views that remain. Keeping both in one value means the two
/// can never disagree about whether a limit exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewBudget {
    Unlimited,
    Limited { max: u32, remaining: u32 },
}

impl ViewBudget {
    pub fn max(&self) -> Option<u32> {
        match self {
            ViewBudget::Unlimited => None,
            ViewBudget::Limited { max, .. } => Some(*max),
        }
    }

    pub fn remaining(&self) -> Option<u32> {
        match self {
            ViewBudget::Unlimited => None,
            ViewBudget::Limited { remaining, .. } => Some(*remaining),
        }
    }

    pub fn has_views_left(&self) -> bool {
        match self {
            ViewBudget::Unlimited => true,
            ViewBudget::Limited { remaining, .. } => *remaining > 0,
        }
    }
}

/// A short-lived text paste.
///
/// `id`, `content`, `created_at`, `expires_at` and the budget's `max` never
/// change after creation. Only the remaining views move, and only downwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paste {
    /// Short opaque identifier, unique across the store.
    pub id: String,

    /// The text payload exactly as submitted.
    pub content: String,

    /// When the paste was created.
    pub created_at: DateTime<Utc>,

    /// Absolute expiry time, or `None` when there is no time limit.
    pub expires_at: Option<DateTime<Utc>>,

    /// Remaining read allowance.
    pub views: ViewBudget,
}

impl Paste {
    /// True once `now` has reached the expiry timestamp.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }

    /// A paste can be read only while it has both time and views left.
    pub fn is_consumable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now) && self.views.has_views_left()
    }
}

/// Raw `pastes` row. Timestamps are unix milliseconds.
#[derive(FromRow, Debug)]
pub struct PasteRow {
    pub id: String,
    pub content: String,
    pub created_at: i64,
    pub expires_at: Option<i64>,
    pub max_views: Option<i64>,
    pub remaining_views: Option<i64>,
}

impl TryFrom<PasteRow> for Paste {
    type Error = String;

    fn try_from(row: PasteRow) -> Result<Self, Self::Error> {
        let created_at = DateTime::from_timestamp_millis(row.created_at)
            .ok_or_else(|| format!("created_at {} out of range", row.created_at))?;
        let expires_at = row
            .expires_at
            .map(|ms| {
                DateTime::from_timestamp_millis(ms)
                    .ok_or_else(|| format!("expires_at {} out of range", ms))
            })
            .transpose()?;

        let views = match (row.max_views, row.remaining_views) {
            (None, None) => ViewBudget::Unlimited,
            (Some(max), Some(remaining)) => {
                let max = u32::try_from(max)
                    .ok()
                    .filter(|max| *max >= 1)
                    .ok_or_else(|| format!("max_views {} out of range", max))?;
                let remaining = u32::try_from(remaining)
                    .ok()
                    .filter(|remaining| *remaining <= max)
                    .ok_or_else(|| format!("remaining_views {} out of range", remaining))?;
                ViewBudget::Limited { max, remaining }
            }
            (max, remaining) => {
                return Err(format!(
                    "max_views ({:?}) and remaining_views ({:?}) disagree on whether a limit exists",
                    max, remaining
                ));
            }
        };

        Ok(Paste {
            id: row.id,
            content: row.content,
            created_at,
            expires_at,
            views,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(max_views: Option<i64>, remaining_views: Option<i64>) -> PasteRow {
        PasteRow {
            id: "abc".into(),
            content: "body".into(),
            created_at: 1_700_000_000_000,
            expires_at: Some(1_700_000_060_000),
            max_views,
            remaining_views,
        }
    }

    #[test]
    fn exhausted_budget_has_no_views_left() {
        let budget = ViewBudget::Limited {
            max: 2,
            remaining: 0,
        };
        assert!(!budget.has_views_left());
        assert_eq!(budget.remaining(), Some(0));
        assert_eq!(budget.max(), Some(2));
        assert!(ViewBudget::Unlimited.has_views_left());
    }

    #[test]
    fn row_converts_timestamps_and_budget() {
        let paste = Paste::try_from(row(Some(5), Some(4))).unwrap();
        assert_eq!(
            paste.created_at,
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
        );
        assert_eq!(
            paste.expires_at,
            Some(Utc.timestamp_millis_opt(1_700_000_060_000).unwrap())
        );
        assert_eq!(
            paste.views,
            ViewBudget::Limited {
                max: 5,
                remaining: 4
            }
        );
    }

    #[test]
    fn row_with_half_a_limit_is_rejected() {
        assert!(Paste::try_from(row(Some(5), None)).is_err());
        assert!(Paste::try_from(row(None, Some(0))).is_err());
    }

    #[test]
    fn row_with_remaining_above_max_is_rejected() {
        assert!(Paste::try_from(row(Some(2), Some(3))).is_err());
        assert!(Paste::try_from(row(Some(2), Some(-1))).is_err());
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let paste = Paste::try_from(row(None, None)).unwrap();
        let deadline = paste.expires_at.unwrap();
        assert!(paste.is_consumable_at(deadline - chrono::Duration::milliseconds(1)));
        assert!(paste.is_expired_at(deadline));
        assert!(!paste.is_consumable_at(deadline));
    }
}
