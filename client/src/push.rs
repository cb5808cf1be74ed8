//! Pushed-speech channel.
//!
//! An external controller can push lines of text over a plain TCP
//! socket; each line is spoken through the regular synthesis and
//! lip-sync path without going through a chat turn. A leading style
//! tag in the pushed text is honored just like in a model reply.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Connect to `addr` and forward each pushed line. The connection task
/// reconnects on close and runs until the receiver is dropped.
pub fn spawn_push_listener(addr: String) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            if tx.is_closed() {
                return;
            }
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    info!(%addr, "push channel connected");
                    read_lines(stream, &tx).await;
                    warn!(%addr, "push channel closed");
                }
                Err(e) => warn!(%addr, "push connect failed: {e}"),
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    });
    rx
}

async fn read_lines(stream: TcpStream, tx: &mpsc::UnboundedSender<String>) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                debug!(chars = line.len(), "pushed text received");
                if tx.send(line.to_string()).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!("push read failed: {e}");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn forwards_pushed_lines_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all("おはよう。\n\n[happy] いい天気ですね。\n".as_bytes())
                .await
                .unwrap();
        });

        let mut rx = spawn_push_listener(addr);
        assert_eq!(rx.recv().await.unwrap(), "おはよう。");
        assert_eq!(rx.recv().await.unwrap(), "[happy] いい天気ですね。");
    }
}
