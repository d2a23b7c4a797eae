//! Deadline-raced single reads and writes.
//!
//! Each operation races exactly one I/O future against a timer. The loser
//! of the race is dropped, so its completion can never be observed: a
//! timed-out operation cannot later surface as a successful read or write,
//! and a cancelled timer never raises an error.
//!
//! Outcomes are three-way:
//! - `Ok(true)`: the I/O finished within the deadline (timer cancelled).
//! - `Ok(false)`: the deadline fired first; the connection has been shut
//!   down to abort the pending I/O.
//! - `Err(..)`: a genuine transport error, reported distinctly so callers
//!   can apply a different retry policy than for timeouts.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

async fn race_deadline<F>(duration: Duration, operation: F) -> std::io::Result<Option<()>>
where
    F: Future<Output = std::io::Result<()>>,
{
    match timeout(duration, operation).await {
        Ok(Ok(())) => Ok(Some(())),
        Ok(Err(e)) => Err(e),
        Err(_elapsed) => Ok(None),
    }
}

/// Reads exactly `buf.len()` bytes, racing the read against `duration`.
pub async fn read_exact_with_deadline<S>(
    stream: &mut S,
    buf: &mut [u8],
    duration: Duration,
) -> std::io::Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let completed = {
        let read_future = async {
            stream.read_exact(buf).await?;
            Ok(())
        };
        race_deadline(duration, read_future).await?
    };

    if completed.is_none() {
        let _ = stream.shutdown().await;
        return Ok(false);
    }
    Ok(true)
}

/// Writes all of `buf`, racing the write against `duration`.
pub async fn write_all_with_deadline<S>(
    stream: &mut S,
    buf: &[u8],
    duration: Duration,
) -> std::io::Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let completed = {
        let write_future = async {
            stream.write_all(buf).await?;
            stream.flush().await?;
            Ok(())
        };
        race_deadline(duration, write_future).await?
    };

    if completed.is_none() {
        let _ = stream.shutdown().await;
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_read_completes_within_deadline() {
        let (mut client, mut server) = duplex(64);
        server.write_all(b"hello").await.unwrap();

        let mut buf = [0u8; 5];
        let completed = read_exact_with_deadline(&mut client, &mut buf, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(completed);
        assert_eq!(&buf, b"hello");

        // The stream must still be usable: the timer lost the race without
        // closing anything.
        client.write_all(b"ack").await.unwrap();
        let mut ack = [0u8; 3];
        server.read_exact(&mut ack).await.unwrap();
        assert_eq!(&ack, b"ack");
    }

    #[tokio::test]
    async fn test_read_deadline_exceeded() {
        let (mut client, server) = duplex(64);
        // Keep the peer alive so the read stalls instead of erroring.
        let _server = server;

        let mut buf = [0u8; 5];
        let completed = read_exact_with_deadline(&mut client, &mut buf, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(!completed);
    }

    #[tokio::test]
    async fn test_read_error_is_not_a_timeout() {
        let (mut client, server) = duplex(64);
        drop(server);

        let mut buf = [0u8; 5];
        let result =
            read_exact_with_deadline(&mut client, &mut buf, Duration::from_secs(5)).await;
        assert_eq!(
            result.unwrap_err().kind(),
            std::io::ErrorKind::UnexpectedEof
        );
    }

    #[tokio::test]
    async fn test_write_completes_within_deadline() {
        let (mut client, mut server) = duplex(64);

        let completed = write_all_with_deadline(&mut client, b"hello", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(completed);

        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[tokio::test]
    async fn test_write_deadline_exceeded_closes_stream() {
        // A tiny duplex buffer with a peer that never reads stalls the write.
        let (mut client, server) = duplex(4);
        let _server = server;

        let completed =
            write_all_with_deadline(&mut client, &[0u8; 1024], Duration::from_millis(50))
                .await
                .unwrap();
        assert!(!completed);

        // The connection was shut down as a side effect.
        assert!(client.write_all(b"more").await.is_err());
    }
}
