//! Helper utilities for Sshgate
//!
//! This module provides common utility functions used throughout the application.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// Default buffer size for IO operations
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Largest datagram accepted on a relay socket
pub const MAX_DATAGRAM_SIZE: usize = 65535;

/// Copy bytes from `reader` to `writer` until EOF, an IO error, or cancellation
///
/// `on_bytes` is called with the size of every chunk written. On exit the
/// writer is shut down and `token` is cancelled, so a sibling pump sharing
/// the token stops as well.
pub async fn pump<R, W, F>(
    mut reader: R,
    mut writer: W,
    token: CancellationToken,
    mut on_bytes: F,
) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(u64),
{
    let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
    let mut total = 0u64;

    let result = loop {
        let n = tokio::select! {
            _ = token.cancelled() => break Ok(total),
            read = reader.read(&mut buf) => match read {
                Ok(0) => break Ok(total),
                Ok(n) => n,
                Err(e) => break Err(e),
            },
        };

        let written = tokio::select! {
            _ = token.cancelled() => break Ok(total),
            written = writer.write_all(&buf[..n]) => written,
        };

        if let Err(e) = written {
            break Err(e);
        }

        total += n as u64;
        on_bytes(n as u64);
    };

    token.cancel();
    let _ = writer.shutdown().await;

    result
}
