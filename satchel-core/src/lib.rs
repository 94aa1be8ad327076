#![forbid(unsafe_code)]

pub mod config;
pub mod domain;
pub mod error;
pub mod media;
pub mod store;

pub mod util {
    pub mod cancel;
}

pub mod codec;

pub mod archive;

pub mod net {
    pub mod channel;
    pub mod discovery;
    pub mod interfaces;
}

pub mod transfer;

// Re-exports: stable API surface
pub use archive::export::{export_to_dir, import_file};
pub use archive::reader::{ArchiveContents, read};
pub use archive::writer::{WriteSummary, write, write_to_vec};
pub use archive::{ArchiveOptions, ArchiveProfile, ArchiveWarning};
pub use config::TransferConfig;
pub use domain::{Product, SaleRecord, Snapshot, VoiceNote};
pub use media::{FsMediaResolver, MediaResolver};
pub use store::{JsonFileStore, MemoryStore, RecordStore};
pub use transfer::progress::TransferObserver;
pub use transfer::{TransferHandle, TransferReport, Transfers};
