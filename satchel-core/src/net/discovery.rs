use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TransferConfig;
use crate::error::{Result, SatchelError};
use crate::util::cancel::{or_cancel, pause};

pub const DISCOVER_TOKEN: &[u8] = b"SATCHEL_DISCOVER_V1";
pub const ACK_TOKEN: &[u8] = b"SATCHEL_HERE_V1";

const DATAGRAM_BUF: usize = 512;

fn is_transient(e: &std::io::Error) -> bool {
    // ICMP port-unreachable from an earlier send surfaces here on some platforms
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused
    )
}

/// Receiver half: answers exactly one discovery request.
pub struct Advertiser {
    socket: UdpSocket,
}

impl Advertiser {
    pub async fn bind(port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|e| SatchelError::ConnectFailed(format!("discovery bind :{port}: {e}")))?;
        socket
            .set_broadcast(true)
            .map_err(|e| SatchelError::ConnectFailed(format!("discovery socket: {e}")))?;
        Ok(Self { socket })
    }

    pub fn local_port(&self) -> Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Wait for the discovery token, acknowledge it `ack_repeats` times, and
    /// stop listening. Returns the sender's address.
    pub async fn wait_for_sender(
        self,
        cfg: &TransferConfig,
        cancel: &CancellationToken,
    ) -> Result<SocketAddr> {
        let wait = cfg.advertise_timeout();
        let deadline = Instant::now() + wait;
        let mut buf = [0u8; DATAGRAM_BUF];

        let src = loop {
            let r = or_cancel(cancel, timeout_at(deadline, self.socket.recv_from(&mut buf))).await?;
            match r {
                Err(_) => return Err(SatchelError::AdvertiseTimeout(wait)),
                Ok(Ok((n, src))) if &buf[..n] == DISCOVER_TOKEN => break src,
                Ok(Ok((n, src))) => {
                    debug!(%src, len = n, "ignoring unrelated datagram");
                }
                Ok(Err(e)) if is_transient(&e) => continue,
                Ok(Err(e)) => return Err(SatchelError::ConnectFailed(format!("discovery recv: {e}"))),
            }
        };
        debug!(%src, "discovery request received");

        let repeats = cfg.ack_repeats.max(1);
        let mut delivered = 0;
        for i in 0..repeats {
            match self.socket.send_to(ACK_TOKEN, src).await {
                Ok(_) => delivered += 1,
                Err(e) => debug!(%src, error = %e, "ack send failed"),
            }
            if i + 1 < repeats {
                pause(cancel, cfg.ack_interval()).await?;
            }
        }
        if delivered == 0 {
            warn!(%src, "no acknowledgment could be sent");
        }
        Ok(src)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Located {
    pub addr: IpAddr,
    pub attempts: u32,
}

/// Sender half: broadcast the token to every target, wait for an ack, and
/// repeat up to `max_discovery_attempts` times. No datagram is sent after
/// the last attempt's wait expires.
pub async fn locate(
    targets: &[IpAddr],
    cfg: &TransferConfig,
    cancel: &CancellationToken,
    mut on_attempt: impl FnMut(u32),
) -> Result<Located> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(|e| SatchelError::ConnectFailed(format!("discovery bind: {e}")))?;
    socket
        .set_broadcast(true)
        .map_err(|e| SatchelError::ConnectFailed(format!("discovery socket: {e}")))?;

    let attempts = cfg.max_discovery_attempts.max(1);
    for attempt in 1..=attempts {
        on_attempt(attempt);
        let mut sent = 0usize;
        for ip in targets {
            let to = SocketAddr::new(*ip, cfg.discovery_port);
            match or_cancel(cancel, socket.send_to(DISCOVER_TOKEN, to)).await? {
                Ok(_) => sent += 1,
                Err(e) => debug!(%to, error = %e, "discovery send failed"),
            }
        }
        debug!(attempt, sent, targets = targets.len(), "discovery round sent");

        if let Some(addr) = wait_ack(&socket, cfg.ack_timeout(), cancel).await? {
            debug!(%addr, attempt, "receiver located");
            return Ok(Located { addr, attempts: attempt });
        }
    }
    Err(SatchelError::DiscoveryTimeout { attempts })
}

async fn wait_ack(
    socket: &UdpSocket,
    wait: Duration,
    cancel: &CancellationToken,
) -> Result<Option<IpAddr>> {
    let deadline = Instant::now() + wait;
    let mut buf = [0u8; DATAGRAM_BUF];
    loop {
        match or_cancel(cancel, timeout_at(deadline, socket.recv_from(&mut buf))).await? {
            Err(_) => return Ok(None),
            Ok(Ok((n, src))) if &buf[..n] == ACK_TOKEN => return Ok(Some(src.ip())),
            Ok(Ok(_)) => continue,
            Ok(Err(e)) if is_transient(&e) => continue,
            Ok(Err(e)) => return Err(SatchelError::ConnectFailed(format!("discovery recv: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config(port: u16) -> TransferConfig {
        TransferConfig {
            discovery_port: port,
            ack_timeout_ms: 200,
            ack_interval_ms: 5,
            advertise_timeout_ms: 5_000,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn sender_finds_advertiser_on_loopback() {
        let adv = Advertiser::bind(0).await.unwrap();
        let port = adv.local_port().unwrap();
        let cfg = fast_config(port);
        let cancel = CancellationToken::new();

        let cfg2 = cfg.clone();
        let c2 = cancel.clone();
        let waiter = tokio::spawn(async move { adv.wait_for_sender(&cfg2, &c2).await });

        let found = locate(&[IpAddr::V4(Ipv4Addr::LOCALHOST)], &cfg, &cancel, |_| {})
            .await
            .unwrap();
        assert_eq!(found.addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(found.attempts, 1);

        let sender = waiter.await.unwrap().unwrap();
        assert!(sender.ip().is_loopback());
    }

    #[tokio::test]
    async fn advertiser_ignores_foreign_datagrams() {
        let adv = Advertiser::bind(0).await.unwrap();
        let port = adv.local_port().unwrap();
        let cfg = fast_config(port);
        let cancel = CancellationToken::new();
        let cfg2 = cfg.clone();
        let c2 = cancel.clone();
        let waiter = tokio::spawn(async move { adv.wait_for_sender(&cfg2, &c2).await });

        let noise = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        noise.send_to(b"hello?", (Ipv4Addr::LOCALHOST, port)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        locate(&[IpAddr::V4(Ipv4Addr::LOCALHOST)], &cfg, &cancel, |_| {})
            .await
            .unwrap();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_and_stops_sending() {
        // a silent peer that only counts discovery datagrams
        let sink = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = sink.local_addr().unwrap().port();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let counter = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            while let Ok((n, _)) = sink.recv_from(&mut buf).await {
                if &buf[..n] == DISCOVER_TOKEN {
                    seen2.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let cfg = TransferConfig {
            discovery_port: port,
            ack_timeout_ms: 40,
            max_discovery_attempts: 5,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let mut rounds = 0;
        let err = locate(&[IpAddr::V4(Ipv4Addr::LOCALHOST)], &cfg, &cancel, |n| rounds = n)
            .await
            .unwrap_err();
        assert!(matches!(err, SatchelError::DiscoveryTimeout { attempts: 5 }));
        assert_eq!(rounds, 5);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 5);
        counter.abort();
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_wait() {
        let cfg = TransferConfig {
            discovery_port: 9,
            ack_timeout_ms: 10_000,
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let c2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            c2.cancel();
        });
        let err = locate(&[IpAddr::V4(Ipv4Addr::LOCALHOST)], &cfg, &cancel, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SatchelError::Cancelled));
    }
}
