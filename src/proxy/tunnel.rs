use std::{
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::net::conn::is_connection_error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Byte counts of a finished [`relay`].
pub struct RelayStats {
    /// Bytes read from the client to be written to the remote.
    pub client_to_remote: u64,
    /// Bytes read from the remote to be written to the client.
    pub remote_to_client: u64,
}

/// Relay bytes between `client` and `remote` until either direction ends.
///
/// Both directions are copied concurrently. As soon as one of them reaches
/// end-of-stream or fails, the other direction is abandoned and both streams
/// are dropped, which closes them. A clean end-of-stream is propagated as
/// a write shutdown to the opposite side before that happens.
///
/// Errors are logged, never returned.
pub async fn relay<C, R>(client: C, remote: R) -> RelayStats
where
    C: AsyncRead + AsyncWrite,
    R: AsyncRead + AsyncWrite,
{
    let (mut client_reader, mut client_writer) = tokio::io::split(client);
    let (mut remote_reader, mut remote_writer) = tokio::io::split(remote);

    let mut stats = RelayStats::default();
    let (direction, result) = {
        let upstream = copy_and_shutdown(
            &mut client_reader,
            &mut remote_writer,
            &mut stats.client_to_remote,
        );
        let downstream = copy_and_shutdown(
            &mut remote_reader,
            &mut client_writer,
            &mut stats.remote_to_client,
        );
        tokio::select! {
            result = upstream => ("client to remote", result),
            result = downstream => ("remote to client", result),
        }
    };

    match result {
        Ok(()) => tracing::trace!(
            direction,
            client_to_remote = stats.client_to_remote,
            remote_to_client = stats.remote_to_client,
            "relay finished",
        ),
        Err(err) if is_connection_error(&err) => {
            tracing::debug!(direction, error = %err, "relay ended by connection error");
        }
        Err(err) => tracing::error!(direction, error = %err, "relay failed"),
    }

    stats
}

async fn copy_and_shutdown<R, W>(reader: &mut R, writer: &mut W, copied: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = CountingReader {
        inner: reader,
        count: copied,
    };
    tokio::io::copy(&mut reader, writer).await?;
    writer.shutdown().await
}

/// Counts the bytes read, so that partial copies are still accounted for.
struct CountingReader<'a, R> {
    inner: &'a mut R,
    count: &'a mut u64,
}

impl<R: AsyncRead + Unpin> AsyncRead for CountingReader<'_, R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        ready!(Pin::new(&mut *this.inner).poll_read(cx, buf))?;
        *this.count += (buf.filled().len() - before) as u64;
        Poll::Ready(Ok(()))
    }
}
