//! Lead lifecycle statuses shown as board columns.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KanbanStatus {
    Cold,
    Warm,
    Negotiation,
    Converted,
    Trash,
}

impl KanbanStatus {
    /// Board columns, left to right.
    pub const COLUMNS: [KanbanStatus; 5] = [
        KanbanStatus::Cold,
        KanbanStatus::Warm,
        KanbanStatus::Negotiation,
        KanbanStatus::Converted,
        KanbanStatus::Trash,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
            Self::Negotiation => "negotiation",
            Self::Converted => "converted",
            Self::Trash => "trash",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cold => "Cold / Incomplete",
            Self::Warm => "Warm",
            Self::Negotiation => "In Negotiation",
            Self::Converted => "Converted",
            Self::Trash => "Discarded",
        }
    }

    /// Parse an exact column name.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::COLUMNS
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(raw.trim()))
    }

    /// Map any persisted status onto a column.
    ///
    /// The backend also stores intermediate values: `hot` leads show up in the
    /// warm column, `started`/`abandoned` and anything unknown in cold.
    #[must_use]
    pub fn from_backend(raw: &str) -> Self {
        if let Some(status) = Self::parse(raw) {
            return status;
        }
        match raw.trim().to_ascii_lowercase().as_str() {
            "hot" => Self::Warm,
            _ => Self::Cold,
        }
    }

    /// Reaching this column is the win condition of the funnel.
    #[must_use]
    pub const fn is_conversion(self) -> bool {
        matches!(self, Self::Converted)
    }
}

impl std::fmt::Display for KanbanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
