use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::NamedTempFile;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::archive::reader;
use crate::archive::writer::{self, WriteSummary};
use crate::archive::ArchiveWarning;
use crate::config::TransferConfig;
use crate::error::{Result, SatchelError};
use crate::media::MediaResolver;
use crate::net::channel::{self, Header};
use crate::net::discovery::{self, Advertiser};
use crate::net::interfaces;
use crate::store::RecordStore;
use crate::util::cancel::or_cancel;

pub mod import;
pub mod progress;
pub mod session;

use import::ImportSummary;
use progress::{ProgressTracker, TransferObserver};
use session::{Phase, Role, TransferSession};

#[derive(Clone, Debug)]
pub struct TransferReport {
    pub role: Role,
    pub peer: Option<IpAddr>,
    pub bytes: u64,
    pub discovery_attempts: u32,
    pub import: Option<ImportSummary>,
    pub warnings: Vec<ArchiveWarning>,
    pub message: String,
}

/// Caller-owned entry point for network transfers. One send or receive may
/// run at a time per instance; a second request while one is in flight is
/// rejected with `Busy`.
pub struct Transfers {
    config: TransferConfig,
    store: Arc<dyn RecordStore>,
    media: Arc<dyn MediaResolver>,
    busy: Arc<AtomicBool>,
}

/// Running operation. Dropping the handle does not stop the transfer; call
/// `cancel` for that.
pub struct TransferHandle {
    role: Role,
    cancel: CancellationToken,
    join: JoinHandle<Result<TransferReport>>,
}

impl TransferHandle {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> Result<TransferReport> {
        match self.join.await {
            Ok(r) => r,
            Err(e) => Err(SatchelError::Worker(e.to_string())),
        }
    }
}

struct BusyGuard(Arc<AtomicBool>);

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SatchelError::Busy)?;
        Ok(Self(flag.clone()))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// What the worker task needs, cloned out of `Transfers`.
struct Ctx {
    config: TransferConfig,
    store: Arc<dyn RecordStore>,
    media: Arc<dyn MediaResolver>,
    cancel: CancellationToken,
    progress: ProgressTracker,
}

impl Transfers {
    pub fn new(
        config: TransferConfig,
        store: Arc<dyn RecordStore>,
        media: Arc<dyn MediaResolver>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            media,
            busy: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Snapshot the store, find a receiver, and stream the archive to it.
    /// Must be called from within a tokio runtime.
    pub fn send(&self, observer: Arc<dyn TransferObserver>) -> Result<TransferHandle> {
        self.launch(Role::Sender, observer)
    }

    /// Advertise, accept one sender, and replace the store with what it sends.
    /// Must be called from within a tokio runtime.
    pub fn receive(&self, observer: Arc<dyn TransferObserver>) -> Result<TransferHandle> {
        self.launch(Role::Receiver, observer)
    }

    fn launch(&self, role: Role, observer: Arc<dyn TransferObserver>) -> Result<TransferHandle> {
        let rt = tokio::runtime::Handle::try_current()
            .map_err(|e| SatchelError::Config(format!("no async runtime: {e}")))?;
        let guard = BusyGuard::acquire(&self.busy)?;

        let cancel = CancellationToken::new();
        let ctx = Ctx {
            config: self.config.clone(),
            store: self.store.clone(),
            media: self.media.clone(),
            cancel: cancel.clone(),
            progress: ProgressTracker::new(observer.clone()),
        };

        let join = rt.spawn(async move {
            let _guard = guard;
            let mut session = TransferSession::new(role, &ctx.config);
            ctx.progress.start();

            let result = match role {
                Role::Sender => run_send(&ctx, &mut session).await,
                Role::Receiver => run_receive(&ctx, &mut session).await,
            };

            match &result {
                Ok(report) => {
                    session.enter(Phase::Done);
                    ctx.progress.finish(true);
                    if !report.warnings.is_empty() {
                        observer.on_warnings(&report.warnings);
                    }
                    info!(%role, bytes = report.bytes, "transfer complete");
                    observer.on_complete(true, &report.message);
                }
                Err(e) => {
                    session.enter(Phase::Failed);
                    ctx.progress.finish(false);
                    warn!(%role, error = %e, "transfer failed");
                    observer.on_complete(false, &e.to_string());
                }
            }
            result
        });

        Ok(TransferHandle { role, cancel, join })
    }
}

// A panic in a store or resolver surfaces here, not as a dead task.
fn join_failed(e: tokio::task::JoinError) -> SatchelError {
    SatchelError::Worker(e.to_string())
}

struct BuiltArchive {
    file: NamedTempFile,
    header: Header,
    summary: WriteSummary,
}

async fn build_archive(ctx: &Ctx) -> Result<BuiltArchive> {
    let store = ctx.store.clone();
    let media = ctx.media.clone();
    let cfg = ctx.config.clone();

    let work = tokio::task::spawn_blocking(move || -> Result<BuiltArchive> {
        let snapshot = store.snapshot()?;
        let opts = &cfg.archive;
        let mut file = cfg.temp_file()?;
        let summary = writer::write(&snapshot, media.as_ref(), opts, file.as_file_mut())?;

        let mut hasher = blake3::Hasher::new();
        let total = std::io::copy(&mut file.reopen()?, &mut hasher)?;
        Ok(BuiltArchive {
            file,
            header: Header {
                total,
                digest: *hasher.finalize().as_bytes(),
            },
            summary,
        })
    });
    or_cancel(&ctx.cancel, work).await?.map_err(join_failed)?
}

async fn run_send(ctx: &Ctx, session: &mut TransferSession) -> Result<TransferReport> {
    let cfg = &ctx.config;

    session.enter(Phase::BuildingArchive);
    let built = build_archive(ctx).await?;
    session.bytes_total = built.header.total;
    debug!(
        bytes = built.header.total,
        entries = built.summary.entries.len(),
        digest = %hex::encode(built.header.digest),
        "archive built"
    );

    session.enter(Phase::Discovering);
    let targets = cfg
        .broadcast_targets
        .clone()
        .unwrap_or_else(interfaces::broadcast_targets);
    let attempts = &mut session.discovery_attempts;
    let located = discovery::locate(&targets, cfg, &ctx.cancel, |n| *attempts = n).await?;
    session.peer = Some(located.addr);

    session.enter(Phase::Connecting);
    let addr = SocketAddr::new(located.addr, cfg.transfer_port);
    let mut stream = or_cancel(&ctx.cancel, timeout(cfg.connect_timeout(), TcpStream::connect(addr)))
        .await?
        .map_err(|_| SatchelError::ConnectFailed(format!("{addr}: timed out")))?
        .map_err(|e| SatchelError::ConnectFailed(format!("{addr}: {e}")))?;
    let _ = stream.set_nodelay(true);

    session.enter(Phase::Streaming);
    let mut src = tokio::fs::File::from_std(built.file.reopen()?);
    let progress = &ctx.progress;
    let sent = channel::send_archive(
        &mut stream,
        &mut src,
        &built.header,
        cfg.chunk_size,
        |done, total| progress.bytes(done, total),
        &ctx.cancel,
    )
    .await?;
    session.bytes_done = sent;

    Ok(TransferReport {
        role: Role::Sender,
        peer: session.peer,
        bytes: sent,
        discovery_attempts: session.discovery_attempts,
        import: None,
        warnings: built.summary.warnings,
        message: format!("sent {sent} bytes to {}", located.addr),
    })
}

async fn run_receive(ctx: &Ctx, session: &mut TransferSession) -> Result<TransferReport> {
    let cfg = &ctx.config;

    session.enter(Phase::AwaitingDiscovery);
    // listen before acknowledging so the sender's connect cannot race us
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, cfg.transfer_port))
        .await
        .map_err(|e| SatchelError::ConnectFailed(format!("listen :{}: {e}", cfg.transfer_port)))?;
    let advertiser = Advertiser::bind(cfg.discovery_port).await?;
    let sender = advertiser.wait_for_sender(cfg, &ctx.cancel).await?;
    session.peer = Some(sender.ip());
    session.discovery_attempts = 1;

    session.enter(Phase::ListeningForConnection);
    let (mut stream, remote) = or_cancel(&ctx.cancel, timeout(cfg.accept_timeout(), listener.accept()))
        .await?
        .map_err(|_| SatchelError::ConnectFailed("no connection from sender".into()))?
        .map_err(|e| SatchelError::ConnectFailed(format!("accept: {e}")))?;
    // one connection per session
    drop(listener);
    if remote.ip() != sender.ip() {
        debug!(%remote, discovered = %sender, "connection from a different address than discovery");
    }

    session.enter(Phase::Receiving);
    let tmp = cfg.temp_file()?;
    let mut dest = tokio::fs::File::from_std(tmp.reopen()?);
    let progress = &ctx.progress;
    let received = channel::receive_archive(
        &mut stream,
        &mut dest,
        cfg.chunk_size,
        |done, total| progress.bytes(done, total),
        &ctx.cancel,
    )
    .await?;
    drop(dest);
    drop(stream);
    session.bytes_total = received.header.total;
    session.bytes_done = received.bytes;

    session.enter(Phase::Importing);
    let store = ctx.store.clone();
    let media = ctx.media.clone();
    let summary = tokio::task::spawn_blocking(move || -> Result<ImportSummary> {
        let contents = reader::read_from(BufReader::new(tmp.reopen()?))?;
        import::apply(contents, store.as_ref(), media.as_ref())
        // tmp dropped here, removing the received copy
    })
    .await
    .map_err(join_failed)
    .and_then(|r| r)
    .map_err(SatchelError::into_import_failure)?;

    Ok(TransferReport {
        role: Role::Receiver,
        peer: session.peer,
        bytes: received.bytes,
        discovery_attempts: session.discovery_attempts,
        message: format!(
            "received {} bytes from {}: {} products, {} sales, {} voice notes",
            received.bytes, remote.ip(), summary.products, summary.sales, summary.voice_notes
        ),
        warnings: summary.warnings.clone(),
        import: Some(summary),
    })
}
