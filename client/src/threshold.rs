//! Remote microphone-gate channel.
//!
//! An external controller publishes the capture threshold as
//! newline-delimited numbers over a plain TCP socket. The listener
//! mirrors the latest value into a watch channel and reconnects after
//! a fixed delay whenever the peer goes away.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Gate applied until the remote sends its first value. High enough
/// that no ambient audio passes.
pub const DEFAULT_THRESHOLD: f32 = 255.0;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Connect to `addr` and keep the returned receiver updated with the
/// most recent threshold. The connection task runs until every
/// receiver is dropped.
pub fn spawn_threshold_listener(addr: String) -> watch::Receiver<f32> {
    let (tx, rx) = watch::channel(DEFAULT_THRESHOLD);
    tokio::spawn(async move {
        loop {
            if tx.is_closed() {
                return;
            }
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    info!(%addr, "threshold channel connected");
                    read_values(stream, &tx).await;
                    warn!(%addr, "threshold channel closed");
                }
                Err(e) => warn!(%addr, "threshold connect failed: {e}"),
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    });
    rx
}

async fn read_values(stream: TcpStream, tx: &watch::Sender<f32>) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line.parse::<f32>() {
                    Ok(value) => {
                        debug!(value, "threshold update");
                        if tx.send(value).is_err() {
                            return;
                        }
                    }
                    Err(_) => warn!(payload = %line, "ignoring non-numeric threshold"),
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!("threshold read failed: {e}");
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
    async fn listener_keeps_latest_value_and_skips_garbage() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(b"12.5\nnot-a-number\n80\n").await.unwrap();
        });

        // The watch channel coalesces bursts, so only the latest value
        // is guaranteed to be observed. Reaching 80 also proves the
        // garbage line in between did not kill the connection.
        let mut rx = spawn_threshold_listener(addr);
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                rx.changed().await.unwrap();
                if *rx.borrow_and_update() == 80.0 {
                    break;
                }
            }
        })
        .await
        .expect("latest threshold never arrived");
    }

    #[tokio::test]
    async fn gate_defaults_high_before_first_value() {
        let rx = spawn_threshold_listener("127.0.0.1:9".to_string());
        assert_eq!(*rx.borrow(), DEFAULT_THRESHOLD);
    }
}
