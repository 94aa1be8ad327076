use std::collections::HashMap;

use tracing::{debug, info};

use crate::archive::ArchiveWarning;
use crate::archive::document::MediaSources;
use crate::archive::layout::{entry_name, split_media_entry};
use crate::archive::reader::ArchiveContents;
use crate::domain::MediaKind;
use crate::error::Result;
use crate::media::MediaResolver;
use crate::store::RecordStore;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub products: usize,
    pub sales: usize,
    pub voice_notes: usize,
    pub restored_media: usize,
    pub warnings: Vec<ArchiveWarning>,
}

/// Restored media by entry name, and which stored paths may point at it.
struct Restored<'a> {
    paths: HashMap<String, String>,
    sources: Option<&'a MediaSources>,
}

impl Restored<'_> {
    /// Point `stored` at its restored file, but only if the archive says this
    /// exact path was written into that entry. Without that record (older
    /// archives) the entry name alone decides.
    fn rewrite(&self, kind: MediaKind, stored: &mut String) {
        let Some(entry) = entry_name(kind, stored) else {
            return;
        };
        let Some(new_path) = self.paths.get(&entry) else {
            return;
        };
        let archived_here = match self.sources {
            Some(sources) => sources
                .get(&entry)
                .is_some_and(|from| from.iter().any(|s| s == stored)),
            None => true,
        };
        if archived_here {
            *stored = new_path.clone();
        } else {
            debug!(entry = %entry, stored = %stored, "entry came from another file, path kept");
        }
    }
}

/// Full-replace import of an already decoded archive.
///
/// Media goes first so that a failing disk write leaves the store as it was.
/// Records whose media was not in the archive keep their path as-is.
pub fn apply(
    contents: ArchiveContents,
    store: &dyn RecordStore,
    media: &dyn MediaResolver,
) -> Result<ImportSummary> {
    let ArchiveContents {
        mut snapshot,
        media: blobs,
        sources,
        warnings,
    } = contents;

    let mut restored = Restored {
        paths: HashMap::new(),
        sources: sources.as_ref(),
    };
    for (entry, bytes) in &blobs {
        let Some((kind, name)) = split_media_entry(entry) else {
            debug!(entry = %entry, "entry outside media folders, not restored");
            continue;
        };
        let stored = media.restore(kind, name, bytes)?;
        restored.paths.insert(entry.clone(), stored);
    }

    for p in &mut snapshot.products {
        if let Some(path) = p.image_path.as_mut() {
            restored.rewrite(MediaKind::Image, path);
        }
    }
    for s in &mut snapshot.sales {
        if let Some(path) = s.image_path.as_mut() {
            restored.rewrite(MediaKind::Image, path);
        }
    }
    for v in &mut snapshot.voice_notes {
        restored.rewrite(MediaKind::Voice, &mut v.file_path);
    }

    let summary = ImportSummary {
        products: snapshot.products.len(),
        sales: snapshot.sales.len(),
        voice_notes: snapshot.voice_notes.len(),
        restored_media: restored.paths.len(),
        warnings,
    };

    store.replace_products(snapshot.products)?;
    store.replace_sales(snapshot.sales)?;
    store.replace_voice_notes(snapshot.voice_notes)?;

    info!(
        products = summary.products,
        sales = summary.sales,
        voice_notes = summary.voice_notes,
        media = summary.restored_media,
        "import complete"
    );
    Ok(summary)
}
