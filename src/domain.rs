use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CuffError;

/// Kind of genomic feature Cuffdiff reports on.
///
/// Declaration order is the import order: isoform and CDS rows reference
/// gene and TSS rows, so those must be loaded first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Gene,
    Tss,
    Isoform,
    Cds,
}

impl TrackKind {
    pub const ALL: [TrackKind; 4] = [
        TrackKind::Gene,
        TrackKind::Tss,
        TrackKind::Isoform,
        TrackKind::Cds,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Gene => "gene",
            TrackKind::Tss => "tss",
            TrackKind::Isoform => "isoform",
            TrackKind::Cds => "cds",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TrackKind {
    type Err = CuffError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gene" | "genes" => Ok(TrackKind::Gene),
            "tss" | "tss_group" | "tss_groups" => Ok(TrackKind::Tss),
            "isoform" | "isoforms" => Ok(TrackKind::Isoform),
            "cds" => Ok(TrackKind::Cds),
            _ => Err(CuffError::UnknownTrack(value.to_string())),
        }
    }
}

/// Distribution-level differential tests (promoter usage, splicing,
/// relative CDS output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionKind {
    Promoter,
    Splicing,
    RelativeCds,
}

impl DistributionKind {
    pub const ALL: [DistributionKind; 3] = [
        DistributionKind::Promoter,
        DistributionKind::Splicing,
        DistributionKind::RelativeCds,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DistributionKind::Promoter => "promoter",
            DistributionKind::Splicing => "splicing",
            DistributionKind::RelativeCds => "relcds",
        }
    }
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DistributionKind {
    type Err = CuffError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "promoter" | "promoters" => Ok(DistributionKind::Promoter),
            "splicing" => Ok(DistributionKind::Splicing),
            "relcds" | "relative_cds" => Ok(DistributionKind::RelativeCds),
            _ => Err(CuffError::UnknownTrack(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExperimentId(i64);

impl ExperimentId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExperimentId {
    type Err = CuffError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| CuffError::InvalidArgument(format!("invalid experiment id: {value}")))
    }
}
