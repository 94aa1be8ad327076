use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use time::macros::format_description;
use tracing::info;

use crate::archive::ArchiveOptions;
use crate::archive::reader;
use crate::archive::writer::{self, WriteSummary};
use crate::codec::dates::local_offset;
use crate::error::{Result, SatchelError};
use crate::media::MediaResolver;
use crate::store::RecordStore;
use crate::transfer::import::{self, ImportSummary};

pub const DEFAULT_PREFIX: &str = "satchel_backup";

#[derive(Clone, Debug)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub write: WriteSummary,
}

/// `prefix_YYYYMMDD_HHMMSS.zip` in local time.
pub fn export_file_name(prefix: &str, at: OffsetDateTime) -> String {
    numbered_file_name(prefix, at, 1)
}

/// Name for the `n`th archive written in the same second: `-n` goes right
/// before the extension from the second one on.
pub fn numbered_file_name(prefix: &str, at: OffsetDateTime, n: u32) -> String {
    let stamp = at
        .to_offset(local_offset())
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| at.unix_timestamp().to_string());
    if n <= 1 {
        format!("{prefix}_{stamp}.zip")
    } else {
        format!("{prefix}_{stamp}-{n}.zip")
    }
}

/// Write a full archive of the store into `dir`. The archive is assembled in
/// a temp file next to its destination and only renamed once complete.
pub fn export_to_dir(
    store: &dyn RecordStore,
    media: &dyn MediaResolver,
    dir: &Path,
    prefix: &str,
    opts: &ArchiveOptions,
) -> Result<ExportSummary> {
    fs::create_dir_all(dir)?;
    let snapshot = store.snapshot()?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    let summary = writer::write(&snapshot, media, opts, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;

    let at = OffsetDateTime::now_utc();
    let mut n = 1;
    let mut dest = dir.join(numbered_file_name(prefix, at, n));
    loop {
        match tmp.persist_noclobber(&dest) {
            Ok(_) => break,
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists && n < 100 => {
                n += 1;
                tmp = e.file;
                dest = dir.join(numbered_file_name(prefix, at, n));
            }
            Err(e) => return Err(e.error.into()),
        }
    }

    info!(
        path = %dest.display(),
        records = summary.records,
        entries = summary.entries.len(),
        warnings = summary.warnings.len(),
        "export written"
    );
    Ok(ExportSummary {
        path: dest,
        write: summary,
    })
}

/// Decode an archive from disk and replace the store's contents with it.
/// Nothing in the store changes if the archive cannot be decoded.
pub fn import_file(
    path: &Path,
    store: &dyn RecordStore,
    media: &dyn MediaResolver,
) -> Result<ImportSummary> {
    let f = File::open(path)?;
    let contents = reader::read_from(BufReader::new(f))?;
    import::apply(contents, store, media).map_err(SatchelError::into_import_failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn suffix_goes_before_the_extension_only() {
        let at = datetime!(2024-01-05 15:04:05).assume_offset(local_offset());
        assert_eq!(
            export_file_name("shop", at),
            "shop_20240105_150405.zip"
        );
        assert_eq!(
            numbered_file_name("old.zip.copy", at, 3),
            "old.zip.copy_20240105_150405-3.zip"
        );
    }
}
