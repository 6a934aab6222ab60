//! Test helpers: an in-process server and a minimal RESP client.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use kiln_protocol::{parse_frame, Frame};
use kiln_server::{Config, Server, ServerState};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A kiln server running in-process on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
}

/// Starts a server with the given config on 127.0.0.1:0.
pub async fn start(config: Config) -> TestServer {
    let server = Server::bind(config, "127.0.0.1:0".parse().unwrap())
        .await
        .expect("bind test server");
    let addr = server.local_addr().expect("local addr");
    let state = server.state().clone();
    tokio::spawn(server.run());
    TestServer { addr, state }
}

impl TestServer {
    /// Connects a test client to this server.
    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }
}

/// A minimal RESP client for integration testing.
pub struct TestClient {
    pub stream: TcpStream,
    buf: BytesMut,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .unwrap_or_else(|e| panic!("failed to connect to {addr}: {e}"));
        Self {
            stream,
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Sends a command and returns the parsed response frame.
    pub async fn cmd(&mut self, args: &[&str]) -> Frame {
        let parts: Vec<Frame> = args
            .iter()
            .map(|a| Frame::Bulk(Bytes::copy_from_slice(a.as_bytes())))
            .collect();
        let frame = Frame::Array(parts);

        let mut out = BytesMut::new();
        frame.serialize(&mut out);
        self.stream.write_all(&out).await.unwrap();

        self.read_frame().await
    }

    /// Reads the next frame from the connection.
    pub async fn read_frame(&mut self) -> Frame {
        loop {
            match parse_frame(&self.buf) {
                Ok(Some((frame, consumed))) => {
                    let _ = self.buf.split_to(consumed);
                    return frame;
                }
                Ok(None) => {
                    let n = self.stream.read_buf(&mut self.buf).await.unwrap();
                    if n == 0 {
                        panic!("server closed connection while waiting for response");
                    }
                }
                Err(e) => panic!("protocol error: {e}"),
            }
        }
    }

    /// Sends a command and extracts the bulk string value.
    pub async fn get_bulk(&mut self, args: &[&str]) -> Option<String> {
        match self.cmd(args).await {
            Frame::Bulk(data) => Some(String::from_utf8_lossy(&data).to_string()),
            Frame::Null => None,
            other => panic!("expected Bulk or Null, got {other:?}"),
        }
    }

    /// Sends a command and extracts the integer value.
    pub async fn get_int(&mut self, args: &[&str]) -> i64 {
        match self.cmd(args).await {
            Frame::Integer(n) => n,
            other => panic!("expected Integer, got {other:?}"),
        }
    }

    /// Sends a command and expects a Simple "OK" response.
    pub async fn ok(&mut self, args: &[&str]) {
        match self.cmd(args).await {
            Frame::Simple(s) if s == "OK" => {}
            other => panic!("expected OK, got {other:?}"),
        }
    }

    /// Sends a command and expects an error response. Returns the message.
    pub async fn err(&mut self, args: &[&str]) -> String {
        match self.cmd(args).await {
            Frame::Error(msg) => msg,
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
