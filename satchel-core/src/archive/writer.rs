use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, warn};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::archive::layout::{DATA_ENTRY, entry_name};
use crate::archive::document::{DataOut, MediaSources};
use crate::archive::{ArchiveOptions, ArchiveWarning};
use crate::codec::{Codec, choose_method};
use crate::domain::{MediaKind, Snapshot};
use crate::error::{Result, SatchelError};
use crate::media::MediaResolver;

#[derive(Clone, Debug, Default)]
pub struct WriteSummary {
    /// Entry names in write order, `data.json` first.
    pub entries: Vec<String>,
    pub records: usize,
    pub media_bytes: u64,
    pub archive_bytes: u64,
    pub warnings: Vec<ArchiveWarning>,
}

/// One media entry. Every stored path that resolved to the same source file
/// shares it.
struct MediaPlan {
    entry: String,
    kind: MediaKind,
    stored: Vec<String>,
    src: PathBuf,
}

fn plan_media(
    snapshot: &Snapshot,
    media: &dyn MediaResolver,
    opts: &ArchiveOptions,
    warnings: &mut Vec<ArchiveWarning>,
) -> Vec<MediaPlan> {
    let mut plans: Vec<MediaPlan> = Vec::new();
    // entry name -> index into `plans`
    let mut taken: HashMap<String, usize> = HashMap::new();

    for r in snapshot.media_refs() {
        if !opts.profile.includes(r.kind) {
            continue;
        }
        let located = entry_name(r.kind, r.stored).zip(media.locate(r.stored));
        let Some((entry, src)) = located else {
            warnings.push(ArchiveWarning::MissingMedia {
                kind: r.kind,
                stored: r.stored.to_string(),
            });
            continue;
        };
        match taken.get(&entry).copied() {
            Some(i) if plans[i].src == src => {
                let plan = &mut plans[i];
                if !plan.stored.iter().any(|s| s == r.stored) {
                    plan.stored.push(r.stored.to_string());
                }
            }
            Some(_) => {
                warnings.push(ArchiveWarning::NameCollision {
                    entry,
                    stored: r.stored.to_string(),
                });
            }
            None => {
                taken.insert(entry.clone(), plans.len());
                plans.push(MediaPlan {
                    entry,
                    kind: r.kind,
                    stored: vec![r.stored.to_string()],
                    src,
                });
            }
        }
    }
    plans
}

fn read_if_present(src: &Path) -> Result<Option<Vec<u8>>> {
    if !src.is_file() {
        return Ok(None);
    }
    match fs::read(src) {
        Ok(b) => Ok(Some(b)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn entry_options(codec: Codec, method: zip::CompressionMethod) -> SimpleFileOptions {
    let opts = SimpleFileOptions::default().compression_method(method);
    if method == zip::CompressionMethod::Stored {
        opts
    } else {
        opts.compression_level(codec.level())
    }
}

/// Serialize `snapshot` and every existing media file it references into a
/// zip archive written to `out`. Missing media is skipped with a warning.
pub fn write<W: Write + Seek>(
    snapshot: &Snapshot,
    media: &dyn MediaResolver,
    opts: &ArchiveOptions,
    out: W,
) -> Result<WriteSummary> {
    let mut summary = WriteSummary {
        records: snapshot.record_count(),
        ..Default::default()
    };

    let plans = plan_media(snapshot, media, opts, &mut summary.warnings);

    // In parallel, each file independent
    let loaded: Vec<(MediaPlan, Option<Vec<u8>>)> = plans
        .into_par_iter()
        .map(|p| -> Result<(MediaPlan, Option<Vec<u8>>)> {
            let bytes = read_if_present(&p.src)?;
            Ok((p, bytes))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sources = MediaSources::new();
    let mut present = Vec::with_capacity(loaded.len());
    for (plan, bytes) in loaded {
        match bytes {
            Some(bytes) => {
                sources.insert(plan.entry.clone(), plan.stored.clone());
                present.push((plan, bytes));
            }
            None => {
                warn!(stored = ?plan.stored, "referenced media missing on disk, skipping");
                summary
                    .warnings
                    .extend(plan.stored.into_iter().map(|stored| ArchiveWarning::MissingMedia {
                        kind: plan.kind,
                        stored,
                    }));
            }
        }
    }

    let data = serde_json::to_vec(&DataOut::new(snapshot, &sources))
        .map_err(|e| SatchelError::Format(format!("data.json encode: {e}")))?;

    let mut zip = ZipWriter::new(out);

    zip.start_file(DATA_ENTRY, entry_options(opts.codec, opts.codec.method()))?;
    zip.write_all(&data)?;
    summary.entries.push(DATA_ENTRY.to_string());

    for (plan, bytes) in present {
        let method = choose_method(opts.codec, &bytes, opts.min_gain);
        zip.start_file(plan.entry.as_str(), entry_options(opts.codec, method))?;
        zip.write_all(&bytes)?;
        debug!(entry = %plan.entry, bytes = bytes.len(), ?method, "media entry written");
        summary.media_bytes += bytes.len() as u64;
        summary.entries.push(plan.entry);
    }

    let mut out = zip.finish()?;
    summary.archive_bytes = out.seek(SeekFrom::End(0))?;
    out.flush()?;
    Ok(summary)
}

pub fn write_to_vec(
    snapshot: &Snapshot,
    media: &dyn MediaResolver,
    opts: &ArchiveOptions,
) -> Result<(Vec<u8>, WriteSummary)> {
    let mut cur = Cursor::new(Vec::new());
    let summary = write(snapshot, media, opts, &mut cur)?;
    Ok((cur.into_inner(), summary))
}
