mod common;

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use satchel_core::error::SatchelError;
use satchel_core::net::{channel, discovery};
use satchel_core::transfer::session::Role;
use satchel_core::{
    FsMediaResolver, MediaResolver, MemoryStore, Product, RecordStore, SaleRecord, Snapshot,
    TransferConfig, TransferReport, Transfers, VoiceNote,
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use common::*;

const LIMIT: Duration = Duration::from_secs(20);

fn loopback_config() -> TransferConfig {
    TransferConfig {
        transfer_port: free_tcp_port(),
        discovery_port: free_udp_port(),
        ack_timeout_ms: 500,
        ack_interval_ms: 20,
        accept_timeout_ms: 5_000,
        connect_timeout_ms: 2_000,
        advertise_timeout_ms: 10_000,
        chunk_size: 4 * 1024,
        broadcast_targets: Some(vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]),
        ..Default::default()
    }
}

struct Side {
    _media_dir: tempfile::TempDir,
    store: Arc<MemoryStore>,
    transfers: Transfers,
}

fn side(cfg: &TransferConfig, store: MemoryStore, files: &[(&str, &[u8])]) -> Side {
    let dir = tempfile::tempdir().unwrap();
    for (rel, bytes) in files {
        let p = dir.path().join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, bytes).unwrap();
    }
    let store = Arc::new(store);
    let media: Arc<dyn MediaResolver> = Arc::new(FsMediaResolver::new(dir.path()));
    let transfers = Transfers::new(cfg.clone(), store.clone(), media).unwrap();
    Side {
        _media_dir: dir,
        store,
        transfers,
    }
}

async fn finish(handle: satchel_core::TransferHandle) -> satchel_core::error::Result<TransferReport> {
    tokio::time::timeout(LIMIT, handle.wait())
        .await
        .expect("transfer did not finish in time")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_replaces_receiver_store() {
    let cfg = loopback_config();
    let image = noise(10 * 1024, 5);
    let sender = side(
        &cfg,
        MemoryStore::new(sample_snapshot()),
        &[
            ("images/p1.jpg", image.as_slice()),
            ("voices/memo.m4a", b"memo".as_slice()),
        ],
    );
    let receiver = side(&cfg, MemoryStore::default(), &[]);

    let rx_obs = Arc::new(Recorder::default());
    let tx_obs = Arc::new(Recorder::default());

    let rx = receiver.transfers.receive(rx_obs.clone()).unwrap();
    let tx = sender.transfers.send(tx_obs.clone()).unwrap();

    let sent = finish(tx).await.unwrap();
    let got = finish(rx).await.unwrap();

    assert_eq!(sent.role, Role::Sender);
    assert_eq!(got.role, Role::Receiver);
    assert_eq!(sent.bytes, got.bytes);
    assert_eq!(got.peer, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    assert!(sent.discovery_attempts >= 1);

    let import = got.import.unwrap();
    assert_eq!((import.products, import.sales, import.voice_notes), (2, 1, 1));
    assert_eq!(import.restored_media, 2);
    assert_eq!(receiver.store.snapshot().unwrap(), sample_snapshot());

    for obs in [&rx_obs, &tx_obs] {
        let progress = obs.progress();
        assert_eq!(progress.first(), Some(&(0, 100)));
        assert_eq!(progress.last(), Some(&(100, 100)));
        assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0), "{progress:?}");
        let done = obs.completions();
        assert_eq!(done.len(), 1);
        assert!(done[0].0, "{}", done[0].1);
    }

    // the missing product image is reported to the sending side
    assert!(tx_obs.events().contains(&Event::Warnings(1)));
    assert!(!receiver.transfers.is_busy());
    assert!(!sender.transfers.is_busy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_operation_is_rejected_while_one_runs() {
    let cfg = loopback_config();
    let receiver = side(&cfg, MemoryStore::default(), &[]);
    let obs = Arc::new(Recorder::default());

    let first = receiver.transfers.receive(obs.clone()).unwrap();
    assert!(receiver.transfers.is_busy());
    assert!(!first.is_finished());

    let again = receiver.transfers.receive(obs.clone());
    assert!(matches!(again, Err(SatchelError::Busy)));
    let send = receiver.transfers.send(obs.clone());
    assert!(matches!(send, Err(SatchelError::Busy)));

    first.cancel();
    let err = finish(first).await.unwrap_err();
    assert!(matches!(err, SatchelError::Cancelled), "{err:?}");
    assert!(!receiver.transfers.is_busy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_reports_one_failed_completion() {
    let cfg = loopback_config();
    let receiver = side(&cfg, MemoryStore::new(sample_snapshot()), &[]);
    let obs = Arc::new(Recorder::default());

    let handle = receiver.transfers.receive(obs.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();
    let err = finish(handle).await.unwrap_err();
    assert!(matches!(err, SatchelError::Cancelled), "{err:?}");

    let done = obs.completions();
    assert_eq!(done.len(), 1);
    assert!(!done[0].0);
    assert_eq!(obs.progress().last(), Some(&(0, 100)));
    assert_eq!(receiver.store.snapshot().unwrap(), sample_snapshot());
}

/// Play the sender by hand: discover the receiver and open the stream.
async fn connect_to_receiver(cfg: &TransferConfig) -> TcpStream {
    let targets = [IpAddr::V4(Ipv4Addr::LOCALHOST)];
    let located = discovery::locate(&targets, cfg, &CancellationToken::new(), |_| {})
        .await
        .unwrap();
    TcpStream::connect((located.addr, cfg.transfer_port))
        .await
        .unwrap()
}

async fn push_archive(cfg: &TransferConfig, archive: &[u8]) {
    let mut stream = connect_to_receiver(cfg).await;
    let header = channel::Header {
        total: archive.len() as u64,
        digest: *blake3::hash(archive).as_bytes(),
    };
    let mut src = archive;
    channel::send_archive(
        &mut stream,
        &mut src,
        &header,
        cfg.chunk_size,
        |_, _| {},
        &CancellationToken::new(),
    )
    .await
    .unwrap();
}

async fn assert_rejected_and_untouched(archive: &[u8]) {
    let cfg = loopback_config();
    let receiver = side(&cfg, MemoryStore::new(sample_snapshot()), &[]);
    let obs = Arc::new(Recorder::default());
    let rx = receiver.transfers.receive(obs.clone()).unwrap();

    push_archive(&cfg, archive).await;

    let err = finish(rx).await.unwrap_err();
    assert!(matches!(err, SatchelError::ImportFailed(_)), "{err:?}");
    assert_eq!(receiver.store.snapshot().unwrap(), sample_snapshot());
    let done = obs.completions();
    assert_eq!(done.len(), 1);
    assert!(!done[0].0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn undecodable_archive_fails_import_and_keeps_store() {
    assert_rejected_and_untouched(b"this is not a zip archive").await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unparsable_data_json_fails_import_and_keeps_store() {
    let archive = zip_with(&[
        ("data.json", b"{\"products\": ["),
        ("images/p1.jpg", b"img"),
    ]);
    assert_rejected_and_untouched(&archive).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn truncated_stream_fails_and_leaves_no_staging_file() {
    let staging = tempfile::tempdir().unwrap();
    let cfg = TransferConfig {
        temp_dir: Some(staging.path().to_path_buf()),
        ..loopback_config()
    };
    let receiver = side(&cfg, MemoryStore::new(sample_snapshot()), &[]);
    let obs = Arc::new(Recorder::default());
    let rx = receiver.transfers.receive(obs.clone()).unwrap();

    let body = noise(10_000, 9);
    let header = channel::Header {
        total: body.len() as u64,
        digest: *blake3::hash(&body).as_bytes(),
    };
    let mut stream = connect_to_receiver(&cfg).await;
    stream.write_all(&header.encode()).await.unwrap();
    stream.write_all(&body[..5_000]).await.unwrap();
    stream.shutdown().await.unwrap();
    drop(stream);

    let err = finish(rx).await.unwrap_err();
    assert!(matches!(err, SatchelError::StreamIo(_)), "{err:?}");
    let done = obs.completions();
    assert_eq!(done.len(), 1);
    assert!(!done[0].0);
    assert!(done[0].1.contains("5000 of 10000"), "{}", done[0].1);

    assert_eq!(fs::read_dir(staging.path()).unwrap().count(), 0);
    assert_eq!(receiver.store.snapshot().unwrap(), sample_snapshot());
}

/// A store backend that blows up instead of returning an error.
struct ExplodingStore {
    on_snapshot: bool,
}

impl RecordStore for ExplodingStore {
    fn snapshot(&self) -> satchel_core::error::Result<Snapshot> {
        if self.on_snapshot {
            panic!("snapshot exploded");
        }
        Ok(Snapshot::default())
    }

    fn replace_products(&self, _rows: Vec<Product>) -> satchel_core::error::Result<()> {
        panic!("replace exploded");
    }

    fn replace_sales(&self, _rows: Vec<SaleRecord>) -> satchel_core::error::Result<()> {
        panic!("replace exploded");
    }

    fn replace_voice_notes(&self, _rows: Vec<VoiceNote>) -> satchel_core::error::Result<()> {
        panic!("replace exploded");
    }
}

fn exploding(cfg: &TransferConfig, on_snapshot: bool) -> (tempfile::TempDir, Transfers) {
    let dir = tempfile::tempdir().unwrap();
    let transfers = Transfers::new(
        cfg.clone(),
        Arc::new(ExplodingStore { on_snapshot }),
        Arc::new(FsMediaResolver::new(dir.path())),
    )
    .unwrap();
    (dir, transfers)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_store_on_send_still_completes_once() {
    let cfg = loopback_config();
    let (_dir, transfers) = exploding(&cfg, true);
    let obs = Arc::new(Recorder::default());

    let err = finish(transfers.send(obs.clone()).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, SatchelError::Worker(_)), "{err:?}");
    let done = obs.completions();
    assert_eq!(done.len(), 1);
    assert!(!done[0].0);
    assert!(!transfers.is_busy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_store_on_import_is_an_import_failure() {
    let cfg = loopback_config();
    let sender = side(&cfg, MemoryStore::new(sample_snapshot()), &[]);
    let (_dir, receiver) = exploding(&cfg, false);
    let rx_obs = Arc::new(Recorder::default());

    let rx = receiver.receive(rx_obs.clone()).unwrap();
    let tx = sender.transfers.send(Arc::new(Recorder::default())).unwrap();
    finish(tx).await.unwrap();

    let err = finish(rx).await.unwrap_err();
    assert!(matches!(err, SatchelError::ImportFailed(_)), "{err:?}");
    let done = rx_obs.completions();
    assert_eq!(done.len(), 1);
    assert!(!done[0].0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sender_without_receiver_gives_up() {
    let cfg = TransferConfig {
        max_discovery_attempts: 2,
        ack_timeout_ms: 200,
        ..loopback_config()
    };
    let sender = side(&cfg, MemoryStore::new(sample_snapshot()), &[]);
    let obs = Arc::new(Recorder::default());

    let tx = sender.transfers.send(obs.clone()).unwrap();
    let err = finish(tx).await.unwrap_err();
    assert!(
        matches!(err, SatchelError::DiscoveryTimeout { attempts: 2 }),
        "{err:?}"
    );
    let done = obs.completions();
    assert_eq!(done.len(), 1);
    assert!(!done[0].0);
}

#[test]
fn launching_outside_a_runtime_is_an_error() {
    let cfg = loopback_config();
    let sender = side(&cfg, MemoryStore::default(), &[]);
    let obs = Arc::new(Recorder::default());
    assert!(matches!(
        sender.transfers.send(obs),
        Err(SatchelError::Config(_))
    ));
    assert!(!sender.transfers.is_busy());
}
