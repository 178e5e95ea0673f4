//! SOCKS5 method negotiation
//!
//! Only "no authentication" is offered. The client's method list is read
//! and ignored, and the reply is always `05 00`.

use super::consts::*;
use crate::error::Socks5Error;
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Perform the method negotiation
///
/// A version byte other than 5 fails before anything is written, so the
/// caller can drop the connection silently.
pub async fn negotiate<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = stream
        .read_u8()
        .await
        .context("Failed to read negotiation version")?;

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version).into());
    }

    let num_methods = stream
        .read_u8()
        .await
        .context("Failed to read method count")?;

    let mut methods = vec![0u8; num_methods as usize];
    stream
        .read_exact(&mut methods)
        .await
        .context("Failed to read method list")?;

    tracing::trace!(?methods, "Client offered authentication methods");

    stream
        .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE])
        .await?;
    stream.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_negotiate_no_auth() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();

        negotiate(&mut server).await.unwrap();

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn test_negotiate_accepts_any_method_list() {
        let (mut client, mut server) = duplex(64);
        client
            .write_all(&[0x05, 0x03, 0x01, 0x02, 0x80])
            .await
            .unwrap();

        negotiate(&mut server).await.unwrap();

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn test_negotiate_rejects_socks4_without_reply() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x04, 0x01, 0x00]).await.unwrap();

        let err = negotiate(&mut server).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported SOCKS version: 4"));

        drop(server);
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_negotiate_short_read() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x05, 0x02, 0x00]).await.unwrap();
        drop(client);

        assert!(negotiate(&mut server).await.is_err());
    }

    #[tokio::test]
    async fn test_negotiate_accumulates_fragmented_greeting() {
        let mut stream = tokio_test::io::Builder::new()
            .read(&[0x05])
            .read(&[0x02, 0x00])
            .read(&[0x02])
            .write(&[0x05, 0x00])
            .build();

        negotiate(&mut stream).await.unwrap();
    }

    #[tokio::test]
    async fn test_negotiate_bad_version_writes_nothing() {
        // Any write would fail the mock
        let mut stream = tokio_test::io::Builder::new().read(&[0x04, 0x01, 0x00]).build();

        assert!(negotiate(&mut stream).await.is_err());
    }
}
