use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use satchel_core::archive::export::{export_to_dir, import_file};
use satchel_core::archive::reader::{list_entries, read_from};
use satchel_core::codec::Codec;
use satchel_core::error::{Result, SatchelError};
use satchel_core::transfer::session::Role;
use satchel_core::{
    ArchiveOptions, ArchiveProfile, ArchiveWarning, FsMediaResolver, JsonFileStore,
    TransferConfig, TransferHandle, TransferObserver, TransferReport, Transfers,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::presentation::cli::{Location, NetArgs};

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // a second init (tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_location(at: &Location) -> (JsonFileStore, FsMediaResolver) {
    (
        JsonFileStore::open(&at.store),
        FsMediaResolver::new(&at.media_root),
    )
}

pub fn handle_export(
    at: Location,
    out_dir: PathBuf,
    prefix: String,
    profile: ArchiveProfile,
    codec: Codec,
    min_gain: f32,
) -> Result<()> {
    let (store, media) = open_location(&at);
    let opts = ArchiveOptions {
        profile,
        codec,
        min_gain,
    };
    let done = export_to_dir(&store, &media, &out_dir, &prefix, &opts)?;
    print_warnings(&done.write.warnings);
    println!(
        "{}  records={} entries={} bytes={}",
        done.path.display(),
        done.write.records,
        done.write.entries.len(),
        done.write.archive_bytes
    );
    Ok(())
}

pub fn handle_import(archive: PathBuf, at: Location) -> Result<()> {
    let (store, media) = open_location(&at);
    let summary = import_file(&archive, &store, &media)?;
    print_warnings(&summary.warnings);
    println!(
        "imported products={} sales={} voice_notes={} media={}",
        summary.products, summary.sales, summary.voice_notes, summary.restored_media
    );
    Ok(())
}

pub fn handle_list(archive: PathBuf) -> Result<()> {
    let rows = list_entries(BufReader::new(File::open(&archive)?))?;
    let contents = read_from(BufReader::new(File::open(&archive)?))?;
    let s = &contents.snapshot;
    println!(
        "products={} sales={} voice_notes={}",
        s.products.len(),
        s.sales.len(),
        s.voice_notes.len()
    );
    for r in rows {
        println!(
            "{:>10} {:>10} {:<8} {}",
            r.size, r.compressed_size, r.method, r.name
        );
    }
    print_warnings(&contents.warnings);
    Ok(())
}

pub fn handle_config(net: NetArgs) -> Result<()> {
    let cfg = effective_config(&net)?;
    let json = serde_json::to_string_pretty(&cfg)
        .map_err(|e| SatchelError::Config(format!("encode: {e}")))?;
    println!("{json}");
    Ok(())
}

pub fn handle_send(at: Location, net: NetArgs) -> Result<()> {
    run_transfer(Role::Sender, at, net)
}

pub fn handle_receive(at: Location, net: NetArgs) -> Result<()> {
    run_transfer(Role::Receiver, at, net)
}

/// Config file first, then individual flags on top.
pub fn effective_config(net: &NetArgs) -> Result<TransferConfig> {
    let mut cfg = match &net.config {
        Some(path) => TransferConfig::from_json_file(path)?,
        None => TransferConfig::default(),
    };
    if let Some(p) = net.port {
        cfg.transfer_port = p;
    }
    if let Some(p) = net.discovery_port {
        cfg.discovery_port = p;
    }
    if !net.targets.is_empty() {
        cfg.broadcast_targets = Some(net.targets.clone());
    }
    if let Some(profile) = net.profile {
        cfg.archive.profile = profile;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn run_transfer(role: Role, at: Location, net: NetArgs) -> Result<()> {
    let cfg = effective_config(&net)?;
    let (store, media) = open_location(&at);
    let transfers = Transfers::new(cfg, Arc::new(store), Arc::new(media))?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let report = rt.block_on(async {
        let observer = Arc::new(StderrProgress::default());
        let handle = match role {
            Role::Sender => transfers.send(observer)?,
            Role::Receiver => transfers.receive(observer)?,
        };
        wait_or_interrupt(handle).await
    })?;

    print_report(&report);
    Ok(())
}

async fn wait_or_interrupt(handle: TransferHandle) -> Result<TransferReport> {
    let token = handle.cancel_token();
    let role = handle.role();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(%role, "interrupted, cancelling");
            token.cancel();
        }
    });
    let out = handle.wait().await;
    watcher.abort();
    out
}

fn print_report(r: &TransferReport) {
    info!(
        role = %r.role,
        peer = ?r.peer,
        bytes = r.bytes,
        attempts = r.discovery_attempts,
        "transfer finished"
    );
    println!("{}", r.message);
}

fn print_warnings(warnings: &[ArchiveWarning]) {
    for w in warnings {
        warn!("{w}");
    }
}

/// Single-line percentage on stderr.
#[derive(Default)]
struct StderrProgress {
    shown: AtomicU64,
}

impl TransferObserver for StderrProgress {
    fn on_progress(&self, processed: u64, total: u64) {
        self.shown.store(processed, Ordering::Relaxed);
        let mut err = std::io::stderr().lock();
        let _ = write!(err, "\r{processed:>3}/{total}");
        let _ = err.flush();
    }

    fn on_complete(&self, success: bool, message: &str) {
        let status = if success { "ok" } else { "failed" };
        eprintln!("\r{:>3}/100 {status}: {message}", self.shown.load(Ordering::Relaxed));
    }

    fn on_warnings(&self, warnings: &[ArchiveWarning]) {
        eprintln!();
        print_warnings(warnings);
    }
}
