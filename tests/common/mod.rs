//! Shared fixtures: a scripted in-memory transport and a loopback HTTP
//! server running on its own tokio runtime.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nbhttp::io::Transport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// In-memory transport. Reads follow the script (an empty script blocks
/// unless `closed`); each entry of `write_caps` bounds one write call, with
/// `0` meaning that call would block.
#[derive(Debug, Default)]
pub struct MockStream {
    pub reads: VecDeque<Vec<u8>>,
    pub closed: bool,
    pub written: Vec<u8>,
    pub write_caps: VecDeque<usize>,
    pub write_calls: usize,
}

impl MockStream {
    pub fn reading(chunks: &[&[u8]]) -> Self {
        Self {
            reads: chunks.iter().map(|c| c.to_vec()).collect(),
            closed: true,
            ..Self::default()
        }
    }

    pub fn writing(caps: &[usize]) -> Self {
        Self {
            write_caps: caps.iter().copied().collect(),
            ..Self::default()
        }
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.reads.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.reads.push_front(chunk.split_off(n));
                }
                Ok(n)
            }
            None if self.closed => Ok(0),
            None => Err(ErrorKind::WouldBlock.into()),
        }
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_calls += 1;
        let n = match self.write_caps.pop_front() {
            Some(0) => return Err(ErrorKind::WouldBlock.into()),
            Some(cap) => cap.min(buf.len()),
            None => buf.len(),
        };
        self.written.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MockStream {}

/// What the fixture server does with one parsed request.
pub enum Reply {
    /// Write these spans with a short pause between them, then close.
    Spans(Vec<Vec<u8>>),
    /// Accept the request and never answer.
    Silence,
}

type Handler = dyn Fn(&[u8]) -> Reply + Send + Sync;

/// Starts a loopback server; `handler` sees each raw request (head and
/// body) and decides the reply.
pub fn serve<F>(handler: F) -> SocketAddr
where
    F: Fn(&[u8]) -> Reply + Send + Sync + 'static,
{
    let handler: Arc<Handler> = Arc::new(handler);
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("fixture runtime");
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fixture");
            tx.send(listener.local_addr().expect("fixture addr")).expect("report addr");
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _ = handle(socket, handler).await;
                });
            }
        });
    });
    rx.recv().expect("fixture server started")
}

/// Serves the same canned response to every request.
pub fn serve_static(response: &'static [u8]) -> SocketAddr {
    serve(move |_| Reply::Spans(vec![response.to_vec()]))
}

async fn handle(mut socket: TcpStream, handler: Arc<Handler>) -> anyhow::Result<()> {
    let request = read_request(&mut socket).await?;
    match handler(&request) {
        Reply::Spans(spans) => {
            for span in spans {
                socket.write_all(&span).await?;
                socket.flush().await?;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            socket.shutdown().await?;
        }
        Reply::Silence => {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
    Ok(())
}

/// Reads one request: the head plus a `Content-Length` or chunked body.
async fn read_request(socket: &mut TcpStream) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    loop {
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body_done = if head.contains("transfer-encoding: chunked") {
                find(&buf[end..], b"0\r\n\r\n").is_some()
            } else {
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                buf.len() >= end + 4 + len
            };
            if body_done {
                return Ok(buf);
            }
        }
        let n = socket.read(&mut tmp).await?;
        if n == 0 {
            return Ok(buf);
        }
        buf.extend_from_slice(&tmp[..n]);
    }
}

pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// An address nothing listens on.
pub fn closed_port() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    addr
}
