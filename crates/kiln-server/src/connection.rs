//! Per-client connection loop.
//!
//! Reads bytes into a buffer, parses complete frames, dispatches each
//! through the command pipeline, and writes the reply back before the
//! next command is parsed, so replies stay in request order per
//! connection. Parsing ahead of reading makes pipelined batches work: a
//! single read may yield many frames.

use std::io;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::BytesMut;
use kiln_protocol::{parse_frame, Frame};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::dispatch::{dispatch, Session};
use crate::state::ServerState;

/// Initial buffer capacity. 4KB covers typical commands without
/// over-allocating for simple SET/GET workloads.
const BUF_CAPACITY: usize = 4096;

/// Maximum read buffer size before the client is disconnected. Caps the
/// memory one client can pin with an incomplete frame.
const MAX_BUF_SIZE: usize = 64 * 1024 * 1024;

/// Drives a single client connection to completion.
///
/// The loop exits when the client disconnects or sends bytes that don't
/// parse as RESP: a protocol error gets a final error frame (when the
/// socket still accepts one) and the connection is dropped. Command
/// errors keep the connection open.
pub async fn handle(mut stream: TcpStream, state: Arc<ServerState>) -> io::Result<()> {
    let mut buf = BytesMut::with_capacity(BUF_CAPACITY);
    let mut out = BytesMut::with_capacity(BUF_CAPACITY);
    let mut session = Session::default();

    loop {
        // drain every complete frame before reading more
        loop {
            match parse_frame(&buf) {
                Ok(Some((frame, consumed))) => {
                    let _ = buf.split_to(consumed);
                    state.commands_total.fetch_add(1, Ordering::Relaxed);

                    let reply = dispatch(frame, &mut session, &state).await;
                    out.clear();
                    reply.serialize(&mut out);
                    // the reply reaches the socket before the next
                    // command is parsed
                    stream.write_all(&out).await?;
                }
                Ok(None) => break,
                Err(e) => {
                    out.clear();
                    Frame::Error(format!("ERR protocol error: {e}")).serialize(&mut out);
                    let _ = stream.write_all(&out).await;
                    return Ok(());
                }
            }
        }

        if buf.len() > MAX_BUF_SIZE {
            out.clear();
            Frame::Error("ERR max buffer size exceeded, closing connection".into())
                .serialize(&mut out);
            let _ = stream.write_all(&out).await;
            return Ok(());
        }

        let n = stream.read_buf(&mut buf).await?;
        if n == 0 {
            if !buf.is_empty() {
                debug!("client closed connection mid-frame");
            }
            return Ok(());
        }
    }
}
