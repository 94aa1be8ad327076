use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{Codec, DEFAULT_MIN_GAIN};
use crate::domain::MediaKind;

pub mod document;
pub mod export;
pub mod layout;
pub mod reader;
pub mod writer;

/// Which media families go into an archive. Structured data is always there.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveProfile {
    /// data.json + voices/
    Transfer,
    /// data.json + voices/ + images/
    #[default]
    Full,
}

impl ArchiveProfile {
    pub fn includes(self, kind: MediaKind) -> bool {
        match (self, kind) {
            (_, MediaKind::Voice) => true,
            (ArchiveProfile::Full, MediaKind::Image) => true,
            (ArchiveProfile::Transfer, MediaKind::Image) => false,
        }
    }
}

impl std::str::FromStr for ArchiveProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transfer" => Ok(ArchiveProfile::Transfer),
            "full" => Ok(ArchiveProfile::Full),
            other => Err(format!("unknown profile: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveOptions {
    pub profile: ArchiveProfile,
    pub codec: Codec,
    /// Only accept compression for a media entry if it saves at least this
    /// fraction; e.g. 0.05 means "compress only if >=5% smaller than STORE".
    pub min_gain: f32,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            profile: ArchiveProfile::Full,
            codec: Codec::Deflate,
            min_gain: DEFAULT_MIN_GAIN,
        }
    }
}

/// Non-fatal degradations found while writing or reading an archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArchiveWarning {
    MissingMedia { kind: MediaKind, stored: String },
    NameCollision { entry: String, stored: String },
    DateFallback { raw: String },
    UnsafeEntry { name: String },
}

impl fmt::Display for ArchiveWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveWarning::MissingMedia { kind, stored } => {
                write!(f, "{kind:?} file not found, skipped: {stored}")
            }
            ArchiveWarning::NameCollision { entry, stored } => {
                write!(f, "{entry} already taken, skipped: {stored}")
            }
            ArchiveWarning::DateFallback { raw } => {
                write!(f, "unparseable date {raw:?} replaced with current time")
            }
            ArchiveWarning::UnsafeEntry { name } => write!(f, "ignored unsafe entry {name}"),
        }
    }
}
