use crate::ratings::RatingFamily;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One evaluation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Risk,
    Quality,
    Category,
    Cloud,
}

/// A follow-up question resolved into one result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingSlot {
    pub column: &'static str,
    pub family: RatingFamily,
    pub instruction: &'static str,
}

const RISK_SLOTS: &[RatingSlot] = &[RatingSlot {
    column: "Risk Rating",
    family: RatingFamily::Risk,
    instruction: "Convert the final score.",
}];

const QUALITY_SLOTS: &[RatingSlot] = &[RatingSlot {
    column: "Quality Rating",
    family: RatingFamily::Quality,
    instruction: "Convert the final Match Rating to a QualityRating.",
}];

const CATEGORY_SLOTS: &[RatingSlot] = &[
    RatingSlot {
        column: "Category Rating",
        family: RatingFamily::Match,
        instruction: "Convert the final category rating.",
    },
    RatingSlot {
        column: "Category Label",
        family: RatingFamily::CategoryLabel,
        instruction: "Convert the final category label.",
    },
];

const CLOUD_SLOTS: &[RatingSlot] = &[
    RatingSlot {
        column: "Cloud Rating",
        family: RatingFamily::Match,
        instruction: "Convert the final Match Rating to a CloudRating.",
    },
    RatingSlot {
        column: "Cloud Label",
        family: RatingFamily::CloudLabel,
        instruction: "Convert the final Permission Cloud to a CloudLabel.",
    },
];

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Risk => "risk",
            Self::Quality => "quality",
            Self::Category => "category",
            Self::Cloud => "cloud",
        }
    }

    /// Rating columns filled for every record, in follow-up order.
    pub fn slots(self) -> &'static [RatingSlot] {
        match self {
            Self::Risk => RISK_SLOTS,
            Self::Quality => QUALITY_SLOTS,
            Self::Category => CATEGORY_SLOTS,
            Self::Cloud => CLOUD_SLOTS,
        }
    }

    /// The first turn uses search augmentation and must come back cited.
    pub fn requires_grounding(self) -> bool {
        matches!(self, Self::Quality)
    }

    /// Whether the annotated transcript is produced by default.
    pub fn full_fidelity(self) -> bool {
        matches!(self, Self::Quality)
    }

    /// Whether prompts see the scraped long-form description.
    pub fn uses_expanded_description(self) -> bool {
        matches!(self, Self::Risk | Self::Cloud)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
