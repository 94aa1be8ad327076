// satchel_core/src/domain.rs
use serde::{Deserialize, Serialize};

use crate::codec::dates::Timestamp;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub quantity: i64,
    #[serde(default)]
    pub image_path: Option<String>,
    pub created_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    pub id: i64,
    #[serde(default)]
    pub product_id: Option<i64>,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub total: f64,
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub sold_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceNote {
    pub id: i64,
    pub title: String,
    pub file_path: String,
    #[serde(default)]
    pub duration_ms: u64,
    pub created_at: Timestamp,
}

/// Everything exportable, captured by one `RecordStore::snapshot` call.
/// The three collections are read separately; no transaction spans them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub sales: Vec<SaleRecord>,
    #[serde(default)]
    pub voice_notes: Vec<VoiceNote>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaKind {
    Image,
    Voice,
}

impl MediaKind {
    pub fn prefix(self) -> &'static str {
        match self {
            MediaKind::Image => crate::archive::layout::IMAGES_PREFIX,
            MediaKind::Voice => crate::archive::layout::VOICES_PREFIX,
        }
    }
}

/// One media path string as stored on a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRef<'a> {
    pub kind: MediaKind,
    pub stored: &'a str,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.products.is_empty() && self.sales.is_empty() && self.voice_notes.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.products.len() + self.sales.len() + self.voice_notes.len()
    }

    /// Media references in record order: product images, sale images, voices.
    pub fn media_refs(&self) -> Vec<MediaRef<'_>> {
        let images = self
            .products
            .iter()
            .filter_map(|p| p.image_path.as_deref())
            .chain(self.sales.iter().filter_map(|s| s.image_path.as_deref()))
            .map(|stored| MediaRef {
                kind: MediaKind::Image,
                stored,
            });
        let voices = self.voice_notes.iter().map(|v| MediaRef {
            kind: MediaKind::Voice,
            stored: v.file_path.as_str(),
        });
        images
            .chain(voices)
            .filter(|r| !r.stored.trim().is_empty())
            .collect()
    }
}
