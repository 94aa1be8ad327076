use serde::{Deserialize, Serialize};
use zip::CompressionMethod;

pub mod dates;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Store,
    #[default]
    Deflate,
    Zstd,
}

impl Codec {
    pub fn method(self) -> CompressionMethod {
        match self {
            Codec::Store => CompressionMethod::Stored,
            Codec::Deflate => CompressionMethod::Deflated,
            Codec::Zstd => CompressionMethod::Zstd,
        }
    }

    pub fn level(self) -> Option<i64> {
        match self {
            Codec::Store => None,
            Codec::Deflate => Some(6),
            Codec::Zstd => Some(3),
        }
    }
}

impl std::str::FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "store" => Ok(Codec::Store),
            "deflate" => Ok(Codec::Deflate),
            "zstd" => Ok(Codec::Zstd),
            other => Err(format!("unknown codec: {other}")),
        }
    }
}

pub const DEFAULT_MIN_GAIN: f32 = 0.05;

pub fn effective_min_gain(min_gain: f32) -> f32 {
    if min_gain <= 0.0 { DEFAULT_MIN_GAIN } else { min_gain }
}

fn should_compress(u: usize, c: usize, min_gain: f32) -> bool {
    // true if (u - c) >= u * min_gain  ⇔  c <= u * (1 - min_gain)
    (u as f64 - c as f64) >= (u as f64 * min_gain as f64)
}

/// Pick the method for one media entry. Already-compressed payloads (jpeg,
/// m4a) rarely shrink, so a quick zstd trial decides between `codec` and
/// STORE.
pub fn choose_method(codec: Codec, bytes: &[u8], min_gain: f32) -> CompressionMethod {
    if codec == Codec::Store || bytes.is_empty() {
        return CompressionMethod::Stored;
    }
    match zstd::bulk::compress(bytes, 1) {
        Ok(trial) if should_compress(bytes.len(), trial.len(), effective_min_gain(min_gain)) => {
            codec.method()
        }
        _ => CompressionMethod::Stored,
    }
}
