use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Product, SaleRecord, Snapshot, VoiceNote};

/// Media entry name to every stored path string whose file went into it.
pub type MediaSources = BTreeMap<String, Vec<String>>;

/// `data.json` as written: the snapshot's collections plus `mediaSources`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DataOut<'a> {
    pub products: &'a [Product],
    pub sales: &'a [SaleRecord],
    pub voice_notes: &'a [VoiceNote],
    pub media_sources: &'a MediaSources,
}

impl<'a> DataOut<'a> {
    pub fn new(snapshot: &'a Snapshot, media_sources: &'a MediaSources) -> Self {
        Self {
            products: &snapshot.products,
            sales: &snapshot.sales,
            voice_notes: &snapshot.voice_notes,
            media_sources,
        }
    }
}

/// `data.json` as read. Archives from older writers have no `mediaSources`.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DataIn {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub sales: Vec<SaleRecord>,
    #[serde(default)]
    pub voice_notes: Vec<VoiceNote>,
    #[serde(default)]
    pub media_sources: Option<MediaSources>,
}

impl DataIn {
    pub fn split(self) -> (Snapshot, Option<MediaSources>) {
        let snapshot = Snapshot {
            products: self.products,
            sales: self.sales,
            voice_notes: self.voice_notes,
        };
        (snapshot, self.media_sources)
    }
}
