//! Data forwarding module
//!
//! This module handles data forwarding between a routed client connection
//! and its backend.

use log::debug;
use metrics::counter;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::Result;

/// Copy one direction until EOF, then half-close the writer
async fn pipe<R, W>(mut reader: R, mut writer: W, buffer_size: usize, metric: &'static str) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut total_bytes = 0u64;

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buffer[..n]).await?;
        total_bytes += n as u64;
        counter!(metric).increment(n as u64);
    }

    // Peer may already be gone; the byte count is still accurate.
    let _ = writer.shutdown().await;
    Ok(total_bytes)
}

/// Forward data between two streams
///
/// Each direction runs until its reader hits EOF, so half-closed
/// connections keep flowing the other way. An error in either direction
/// ends both.
///
/// # Parameters
///
/// * `client` - Routed client connection
/// * `target` - Backend connection
/// * `buffer_size` - Copy buffer size per direction
///
/// # Returns
///
/// Returns the bytes sent upstream (client to target) and downstream.
pub async fn proxy_data<C, T>(client: C, target: T, buffer_size: usize) -> Result<(u64, u64)>
where
    C: AsyncRead + AsyncWrite,
    T: AsyncRead + AsyncWrite,
{
    let (client_reader, client_writer) = tokio::io::split(client);
    let (target_reader, target_writer) = tokio::io::split(target);

    let (upstream, downstream) = tokio::try_join!(
        pipe(client_reader, target_writer, buffer_size, "gateway.bytes.upstream"),
        pipe(target_reader, client_writer, buffer_size, "gateway.bytes.downstream"),
    )?;

    debug!(
        "Forwarding finished: {} bytes upstream, {} bytes downstream",
        upstream, downstream
    );
    Ok((upstream, downstream))
}
