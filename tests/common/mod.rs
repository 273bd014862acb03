//! Shared test utilities for `fwstream` integration tests.
//!
//! This module provides helpers for laying out firmware catalogs on disk,
//! starting a live server and talking to it as a device would.

// Allow dead code since not all test files use all helpers
#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use fwstream::api::router::api_router;
use fwstream::catalog::Catalog;
use fwstream::descriptor::Descriptor;
use fwstream::protocol::SessionOptions;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type DeviceSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Deterministic firmware content of the given length.
pub fn firmware_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// Builder for a firmware catalog directory.
pub struct CatalogDir {
    dir: TempDir,
}

impl CatalogDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    /// Writes a descriptor and binary pair for the firmware and board version.
    pub fn with_firmware(self, firmware: &str, board: &str, version: &str, content: &[u8]) -> Self {
        let dir = self.dir.path().join(firmware).join(board);
        fs::create_dir_all(&dir).expect("create board dir");
        fs::write(dir.join(format!("{firmware}.bin")), content).expect("write binary");
        let size = u32::try_from(content.len()).expect("content fits u32");
        fs::write(
            dir.join(format!("{firmware}.des")),
            Descriptor::new(size, version).encode(),
        )
        .expect("write descriptor");
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn load(&self) -> Arc<Catalog> {
        Arc::new(Catalog::load(self.path()).expect("load catalog"))
    }
}

/// Starts the API router on an ephemeral port and returns its address.
pub async fn spawn_server(catalog: Arc<Catalog>, options: SessionOptions) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, api_router(catalog, options))
            .await
            .expect("serve");
    });
    addr
}

/// Opens a device WebSocket connection.
pub async fn connect(addr: SocketAddr) -> DeviceSocket {
    let (socket, _) = connect_async(format!("ws://{addr}/"))
        .await
        .expect("connect websocket");
    socket
}

pub async fn send_text(socket: &mut DeviceSocket, text: &str) {
    socket.send(Message::text(text.to_string())).await.expect("send text");
}

pub async fn send_binary(socket: &mut DeviceSocket, data: Vec<u8>) {
    socket.send(Message::binary(data)).await.expect("send binary");
}

/// Binary `data_block` command: offset then length in native byte order.
pub fn data_block_frame(offset: u32, length: u32) -> Vec<u8> {
    let mut frame = offset.to_ne_bytes().to_vec();
    frame.extend_from_slice(&length.to_ne_bytes());
    frame
}

/// Waits for the next text or binary message from the server.
pub async fn recv(socket: &mut DeviceSocket) -> Message {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("reply within timeout")
            .expect("connection open")
            .expect("valid message");
        match message {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return other,
        }
    }
}

pub async fn recv_text(socket: &mut DeviceSocket) -> String {
    match recv(socket).await {
        Message::Text(text) => text.as_str().to_string(),
        other => panic!("expected text message, got {other:?}"),
    }
}

pub async fn recv_binary(socket: &mut DeviceSocket) -> Vec<u8> {
    match recv(socket).await {
        Message::Binary(data) => data.to_vec(),
        other => panic!("expected binary message, got {other:?}"),
    }
}

/// Initialize tracing for tests (only once).
///
/// Defaults to `warn` level to reduce noise. Use `RUST_LOG=debug` for verbose output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .with_test_writer()
        .try_init();
}
