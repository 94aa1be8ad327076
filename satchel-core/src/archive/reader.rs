use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek};

use tracing::warn;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::archive::ArchiveWarning;
use crate::archive::document::{DataIn, MediaSources};
use crate::archive::layout::{DATA_ENTRY, is_safe_entry};
use crate::codec::dates::collect_fallbacks;
use crate::domain::Snapshot;
use crate::error::{Result, SatchelError};

const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

#[derive(Clone, Debug, Default)]
pub struct ArchiveContents {
    pub snapshot: Snapshot,
    /// Every entry other than `data.json`, keyed by its path in the archive.
    pub media: BTreeMap<String, Vec<u8>>,
    /// Which stored paths each media entry was written from. `None` for
    /// archives that do not record it.
    pub sources: Option<MediaSources>,
    pub warnings: Vec<ArchiveWarning>,
}

#[derive(Clone, Debug)]
pub struct EntryRow {
    pub name: String,
    pub size: u64,
    pub compressed_size: u64,
    pub method: String,
}

fn corrupt(e: impl std::fmt::Display) -> SatchelError {
    SatchelError::ArchiveCorrupt(e.to_string())
}

// Declared sizes come from the archive itself; don't trust them for allocation.
fn capacity_hint(declared: u64) -> usize {
    declared.min(MAX_PREALLOC) as usize
}

fn open<R: Read + Seek>(r: R) -> Result<ZipArchive<R>> {
    ZipArchive::new(r).map_err(corrupt)
}

pub fn read(bytes: &[u8]) -> Result<ArchiveContents> {
    read_from(Cursor::new(bytes))
}

pub fn read_from<R: Read + Seek>(r: R) -> Result<ArchiveContents> {
    let mut zip = open(r)?;
    let mut out = ArchiveContents::default();

    let data = {
        let mut f = match zip.by_name(DATA_ENTRY) {
            Ok(f) => f,
            Err(ZipError::FileNotFound) => {
                return Err(SatchelError::ArchiveIncomplete(DATA_ENTRY.to_string()));
            }
            Err(e) => return Err(corrupt(e)),
        };
        let mut buf = Vec::with_capacity(capacity_hint(f.size()));
        f.read_to_end(&mut buf).map_err(corrupt)?;
        buf
    };

    let (parsed, fallbacks) = collect_fallbacks(|| serde_json::from_slice::<DataIn>(&data));
    let (snapshot, sources) = parsed
        .map_err(|e| corrupt(format!("{DATA_ENTRY}: {e}")))?
        .split();
    out.snapshot = snapshot;
    out.sources = sources;
    out.warnings
        .extend(fallbacks.into_iter().map(|raw| ArchiveWarning::DateFallback { raw }));

    for i in 0..zip.len() {
        let mut f = zip.by_index(i).map_err(corrupt)?;
        if f.is_dir() {
            continue;
        }
        let name = f.name().to_string();
        if name == DATA_ENTRY {
            continue;
        }
        if !is_safe_entry(&name) {
            warn!(entry = %name, "ignoring unsafe archive entry");
            out.warnings.push(ArchiveWarning::UnsafeEntry { name });
            continue;
        }
        let mut buf = Vec::with_capacity(capacity_hint(f.size()));
        f.read_to_end(&mut buf).map_err(corrupt)?;
        out.media.insert(name, buf);
    }

    Ok(out)
}

/// Central directory listing without decompressing anything.
pub fn list_entries<R: Read + Seek>(r: R) -> Result<Vec<EntryRow>> {
    let mut zip = open(r)?;
    let mut rows = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let f = zip.by_index_raw(i).map_err(corrupt)?;
        rows.push(EntryRow {
            name: f.name().to_string(),
            size: f.size(),
            compressed_size: f.compressed_size(),
            method: format!("{:?}", f.compression()),
        });
    }
    Ok(rows)
}
