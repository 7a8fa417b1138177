//! Minimal HTTP stubs for exercising network paths in tests, built on plain
//! tokio sockets so tests need no extra server machinery.

use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct StubServer {
  pub addr: SocketAddr,
  handle: JoinHandle<()>,
}

impl Drop for StubServer {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

fn reason(status: u16) -> &'static str {
  match status {
    200 => "OK",
    201 => "Created",
    204 => "No Content",
    401 => "Unauthorized",
    404 => "Not Found",
    500 => "Internal Server Error",
    _ => "Unknown",
  }
}

/// Serve the same response to every request until the server is dropped.
pub async fn http_stub(status: u16, content_type: &str, body: &str) -> StubServer {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  let response = format!(
    "HTTP/1.1 {status} {}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
    reason(status),
    body.len(),
  );

  let handle = tokio::spawn(async move {
    loop {
      let Ok((mut socket, _)) = listener.accept().await else {
        break;
      };
      let response = response.clone();
      tokio::spawn(async move {
        read_request(&mut socket).await;
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
      });
    }
  });

  StubServer { addr, handle }
}

/// Serve a response only after a delay, for exercising probe deadlines
/// against a backend that answers too late.
pub async fn delayed_stub(delay: std::time::Duration, status: u16, body: &str) -> StubServer {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  let response = format!(
    "HTTP/1.1 {status} {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
    reason(status),
    body.len(),
  );

  let handle = tokio::spawn(async move {
    loop {
      let Ok((mut socket, _)) = listener.accept().await else {
        break;
      };
      let response = response.clone();
      tokio::spawn(async move {
        read_request(&mut socket).await;
        tokio::time::sleep(delay).await;
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
      });
    }
  });

  StubServer { addr, handle }
}

/// Accept connections but never answer, so clients hit their own timeout.
pub async fn silent_stub() -> StubServer {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();

  let handle = tokio::spawn(async move {
    let mut held = Vec::new();
    loop {
      let Ok((socket, _)) = listener.accept().await else {
        break;
      };
      held.push(socket);
    }
  });

  StubServer { addr, handle }
}

/// An address nothing is listening on; connections are refused immediately.
pub async fn dead_addr() -> SocketAddr {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  listener.local_addr().unwrap()
}

/// Read the request head plus any content-length body before answering, so
/// the client never sees its request truncated.
async fn read_request(socket: &mut tokio::net::TcpStream) {
  let mut buf = Vec::with_capacity(4096);
  let mut chunk = [0u8; 4096];

  loop {
    let Ok(n) = socket.read(&mut chunk).await else {
      return;
    };
    if n == 0 {
      return;
    }
    buf.extend_from_slice(&chunk[..n]);

    let Some(head_end) = find_headers_end(&buf) else {
      continue;
    };
    let head = String::from_utf8_lossy(&buf[..head_end]);
    let content_length = head
      .lines()
      .find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("content-length")
          .then(|| value.trim().parse::<usize>().ok())?
      })
      .unwrap_or(0);

    if buf.len() >= head_end + content_length {
      return;
    }
  }
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
  buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}
