//! Length-prefixed bincode framing over TCP, plus bind/connect helpers with
//! retry. Every RPC in this crate is one connection: connect, write one
//! frame, read one frame, drop the stream.

use std::net::SocketAddr;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;

/// Frames larger than this are refused rather than trusted at face value;
/// a corrupt or hostile length prefix should not drive an unbounded alloc.
const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

pub(crate) async fn safe_tcp_write<T: Serialize>(
    stream: &mut TcpStream,
    msg: &T,
) -> std::io::Result<()> {
    let bytes = bincode::serialize(msg)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(bytes.len())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    stream.write_all(&len.to_le_bytes()).await?;
    stream.write_all(&bytes).await?;
    stream.flush().await
}

pub(crate) async fn safe_tcp_read<T: DeserializeOwned>(
    stream: &mut TcpStream,
) -> std::io::Result<T> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds {MAX_FRAME_BYTES}"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    bincode::deserialize(&buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Binds a listener, retrying on failure a fixed number of times with a
/// fixed delay (a port recently released by a crashed sibling process may
/// take a moment to free up).
pub(crate) async fn tcp_bind_with_retry(
    addr: SocketAddr,
    attempts: u32,
    delay: Duration,
) -> std::io::Result<TcpListener> {
    let mut last_err = None;
    for attempt in 0..attempts.max(1) {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < attempts {
                    time::sleep(delay).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "bind failed")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let msg: String = safe_tcp_read(&mut stream).await.unwrap();
            safe_tcp_write(&mut stream, &format!("echo:{msg}"))
                .await
                .unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        safe_tcp_write(&mut client, &"hello".to_string())
            .await
            .unwrap();
        let reply: String = safe_tcp_read(&mut client).await.unwrap();
        assert_eq!(reply, "echo:hello");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn bind_retries_then_succeeds() {
        let held = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = held.local_addr().unwrap();

        let release_after_delay = tokio::spawn(async move {
            time::sleep(Duration::from_millis(50)).await;
            drop(held);
        });

        let result = tcp_bind_with_retry(addr, 5, Duration::from_millis(30)).await;
        assert!(result.is_ok());
        release_after_delay.await.unwrap();
    }
}
