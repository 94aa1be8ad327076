use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::domain::{Product, SaleRecord, Snapshot, VoiceNote};
use crate::error::{Result, SatchelError};

/// The application's record store, seen from the transfer core.
///
/// Each `replace_*` call is delete-all followed by insert-all for one
/// collection and must be observed as a single unit. Nothing is promised
/// across collections.
pub trait RecordStore: Send + Sync {
    fn snapshot(&self) -> Result<Snapshot>;

    fn replace_products(&self, rows: Vec<Product>) -> Result<()>;

    fn replace_sales(&self, rows: Vec<SaleRecord>) -> Result<()>;

    fn replace_voice_notes(&self, rows: Vec<VoiceNote>) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Snapshot>,
}

impl MemoryStore {
    pub fn new(initial: Snapshot) -> Self {
        Self {
            inner: Mutex::new(initial),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Snapshot>> {
        self.inner
            .lock()
            .map_err(|_| SatchelError::Store("memory store lock poisoned".into()))
    }
}

impl RecordStore for MemoryStore {
    fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.lock()?.clone())
    }

    fn replace_products(&self, rows: Vec<Product>) -> Result<()> {
        self.lock()?.products = rows;
        Ok(())
    }

    fn replace_sales(&self, rows: Vec<SaleRecord>) -> Result<()> {
        self.lock()?.sales = rows;
        Ok(())
    }

    fn replace_voice_notes(&self, rows: Vec<VoiceNote>) -> Result<()> {
        self.lock()?.voice_notes = rows;
        Ok(())
    }
}

/// A whole store kept as one JSON document. Every write goes to a temp file
/// in the same directory and is renamed over the original.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Snapshot> {
        if !self.path.exists() {
            return Ok(Snapshot::default());
        }
        let bytes = fs::read(&self.path)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Snapshot::default());
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| SatchelError::Store(format!("{}: {e}", self.path.display())))
    }

    fn save(&self, snap: &Snapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let body = serde_json::to_vec_pretty(snap)
            .map_err(|e| SatchelError::Format(format!("store encode: {e}")))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut Snapshot)) -> Result<()> {
        let _g = self
            .guard
            .lock()
            .map_err(|_| SatchelError::Store("file store lock poisoned".into()))?;
        let mut snap = self.load()?;
        f(&mut snap);
        self.save(&snap)
    }
}

impl RecordStore for JsonFileStore {
    fn snapshot(&self) -> Result<Snapshot> {
        let _g = self
            .guard
            .lock()
            .map_err(|_| SatchelError::Store("file store lock poisoned".into()))?;
        self.load()
    }

    fn replace_products(&self, rows: Vec<Product>) -> Result<()> {
        self.update(|s| s.products = rows)
    }

    fn replace_sales(&self, rows: Vec<SaleRecord>) -> Result<()> {
        self.update(|s| s.sales = rows)
    }

    fn replace_voice_notes(&self, rows: Vec<VoiceNote>) -> Result<()> {
        self.update(|s| s.voice_notes = rows)
    }
}
