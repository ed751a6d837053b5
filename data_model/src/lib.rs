use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display as StrumDisplay, EnumIter, EnumString};

/// The column list every manifest must carry, verbatim and in this order.
pub const MANIFEST_HEADER: [&str; 7] = [
    "NO#",
    "Frequency",
    "week",
    "Category",
    "Type",
    "claimcnt",
    "File Name",
];

pub const MANIFEST_TYPE_COLUMN: usize = 4;
pub const MANIFEST_FILE_NAME_COLUMN: usize = 6;

/// Feed categories a manifest row can name in its `Type` column. The keys
/// are matched exactly, including the lowercase `paid-Reject`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, AsRefStr, StrumDisplay,
)]
pub enum FeedCategory {
    #[strum(serialize = "Paid-Paid")]
    PaidPaid,
    #[strum(serialize = "paid-Reject")]
    PaidReject,
    #[strum(serialize = "Reject-Reject")]
    RejectReject,
    #[strum(serialize = "Reject-Paid")]
    RejectPaid,
}

impl FeedCategory {
    pub fn from_key(key: &str) -> Option<Self> {
        key.parse().ok()
    }

    /// The token a feed file name must contain to belong to this category.
    pub fn token(&self) -> &'static str {
        match self {
            FeedCategory::PaidPaid => "PAID_CVS_PAID",
            FeedCategory::PaidReject => "PAID_CVS_REJECTED",
            FeedCategory::RejectReject => "REJECTED_CVS_REJECTED",
            FeedCategory::RejectPaid => "REJECTED_CVS_PAID",
        }
    }
}

/// One data row of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRow {
    /// Raw `Type` column; may not name a known [`FeedCategory`].
    pub category: String,
    pub file_name: String,
}

impl ManifestRow {
    pub fn new(category: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            file_name: file_name.into(),
        }
    }
}

/// How the 8 character date token of a manifest name is laid out.
///
/// The two pipelines disagree on which pair of digits is the day and which
/// is the month, so both are kept and chosen explicitly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr, StrumDisplay,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DateLayout {
    /// `DDMMYYYY`
    DayMonthYear,
    /// `MMDDYYYY`
    MonthDayYear,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    StrumDisplay,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PipelineVariant {
    /// `.txt` manifests, `DDMMYYYY` dates, invalid feed files dropped.
    Legacy,
    /// `.csv` manifests, `MMDDYYYY` dates, invalid feed files uploaded to
    /// their own root.
    #[default]
    Partitioned,
}

impl PipelineVariant {
    pub fn manifest_extension(&self) -> &'static str {
        match self {
            PipelineVariant::Legacy => "txt",
            PipelineVariant::Partitioned => "csv",
        }
    }

    pub fn date_layout(&self) -> DateLayout {
        match self {
            PipelineVariant::Legacy => DateLayout::DayMonthYear,
            PipelineVariant::Partitioned => DateLayout::MonthDayYear,
        }
    }

    pub fn uploads_invalid(&self) -> bool {
        matches!(self, PipelineVariant::Partitioned)
    }
}

/// A `year/month/day` destination partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPath {
    pub year: String,
    pub month: String,
    pub day: String,
}

impl PartitionPath {
    pub fn under(&self, root: &str) -> String {
        format!("{}/{}", root.trim_end_matches('/'), self)
    }
}

impl Display for PartitionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.year, self.month, self.day)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("a ledger document must hold exactly one manifest, found {0}")]
pub struct LedgerShapeError(usize);

/// The valid feed files confirmed uploaded for one manifest.
///
/// Serialized as a single key object: `{"<manifest>": ["<feed>", ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Vec<String>>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct LedgerEntry {
    pub manifest: String,
    pub transferred: Vec<String>,
}

impl LedgerEntry {
    pub fn new(manifest: impl Into<String>) -> Self {
        Self {
            manifest: manifest.into(),
            transferred: Vec::new(),
        }
    }
}

impl TryFrom<BTreeMap<String, Vec<String>>> for LedgerEntry {
    type Error = LedgerShapeError;

    fn try_from(map: BTreeMap<String, Vec<String>>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(LedgerShapeError(map.len()));
        }
        let (manifest, transferred) = map.into_iter().next().ok_or(LedgerShapeError(0))?;
        Ok(Self {
            manifest,
            transferred,
        })
    }
}

impl From<LedgerEntry> for BTreeMap<String, Vec<String>> {
    fn from(entry: LedgerEntry) -> Self {
        BTreeMap::from([(entry.manifest, entry.transferred)])
    }
}
