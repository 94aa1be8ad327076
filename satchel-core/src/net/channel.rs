//! Single-connection archive stream.
//!
//! Wire layout, sender to receiver:
//!
//! ```text
//! u8 n | n ASCII digits (archive size) | 32-byte BLAKE3 digest | archive bytes
//! ```
//!
//! The sender closes its write half after the last byte.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, SatchelError};
use crate::util::cancel::or_cancel;

pub const DIGEST_LEN: usize = 32;
// u64::MAX has 20 digits
pub const MAX_SIZE_DIGITS: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub total: u64,
    pub digest: [u8; DIGEST_LEN],
}

impl Header {
    pub fn encode(&self) -> Vec<u8> {
        let digits = self.total.to_string();
        let mut out = Vec::with_capacity(1 + digits.len() + DIGEST_LEN);
        out.push(digits.len() as u8);
        out.extend_from_slice(digits.as_bytes());
        out.extend_from_slice(&self.digest);
        out
    }
}

pub async fn read_header<R: AsyncRead + Unpin>(
    r: &mut R,
    cancel: &CancellationToken,
) -> Result<Header> {
    let n = or_cancel(cancel, r.read_u8())
        .await?
        .map_err(SatchelError::stream)? as usize;
    if n == 0 || n > MAX_SIZE_DIGITS {
        return Err(SatchelError::StreamIo(format!("bad size prefix length {n}")));
    }
    let mut digits = vec![0u8; n];
    or_cancel(cancel, r.read_exact(&mut digits))
        .await?
        .map_err(SatchelError::stream)?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return Err(SatchelError::StreamIo("size prefix is not decimal".into()));
    }
    let total = std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| SatchelError::StreamIo("size prefix out of range".into()))?;

    let mut digest = [0u8; DIGEST_LEN];
    or_cancel(cancel, r.read_exact(&mut digest))
        .await?
        .map_err(SatchelError::stream)?;
    Ok(Header { total, digest })
}

/// Stream `header.total` bytes from `src` to `w`. `progress` gets
/// `(sent, total)` after every chunk.
pub async fn send_archive<W, R, P>(
    w: &mut W,
    src: &mut R,
    header: &Header,
    chunk_size: usize,
    mut progress: P,
    cancel: &CancellationToken,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    P: FnMut(u64, u64),
{
    or_cancel(cancel, w.write_all(&header.encode()))
        .await?
        .map_err(SatchelError::stream)?;

    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut sent = 0u64;
    while sent < header.total {
        let want = buf.len().min((header.total - sent) as usize);
        let k = or_cancel(cancel, src.read(&mut buf[..want]))
            .await?
            .map_err(SatchelError::stream)?;
        if k == 0 {
            return Err(SatchelError::StreamIo(format!(
                "archive ended after {sent} of {} bytes",
                header.total
            )));
        }
        or_cancel(cancel, w.write_all(&buf[..k]))
            .await?
            .map_err(SatchelError::stream)?;
        sent += k as u64;
        progress(sent, header.total);
    }

    or_cancel(cancel, w.flush())
        .await?
        .map_err(SatchelError::stream)?;
    // peer may already be gone once it has everything
    let _ = w.shutdown().await;
    debug!(bytes = sent, "archive stream sent");
    Ok(sent)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Received {
    pub header: Header,
    pub bytes: u64,
}

/// Read one framed archive from `r` into `dest`, verifying its digest.
/// Reads stop at the declared size; trailing bytes are not consumed.
pub async fn receive_archive<R, W, P>(
    r: &mut R,
    dest: &mut W,
    chunk_size: usize,
    mut progress: P,
    cancel: &CancellationToken,
) -> Result<Received>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    P: FnMut(u64, u64),
{
    let header = read_header(r, cancel).await?;
    debug!(total = header.total, "archive stream announced");
    progress(0, header.total);

    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut got = 0u64;
    while got < header.total {
        let want = buf.len().min((header.total - got) as usize);
        let k = or_cancel(cancel, r.read(&mut buf[..want]))
            .await?
            .map_err(SatchelError::stream)?;
        if k == 0 {
            return Err(SatchelError::StreamIo(format!(
                "connection closed after {got} of {} bytes",
                header.total
            )));
        }
        hasher.update(&buf[..k]);
        dest.write_all(&buf[..k])
            .await
            .map_err(SatchelError::stream)?;
        got += k as u64;
        progress(got, header.total);
    }
    dest.flush().await.map_err(SatchelError::stream)?;

    let actual = hasher.finalize();
    if actual.as_bytes() != &header.digest {
        return Err(SatchelError::IntegrityMismatch {
            expected: hex::encode(header.digest),
            actual: actual.to_hex().to_string(),
        });
    }
    Ok(Received { header, bytes: got })
}
