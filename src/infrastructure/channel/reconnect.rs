//! Retry schedule for re-opening a dropped Socket.IO session

use std::time::Duration;

use reqwest::Url;
use tokio_util::sync::CancellationToken;

use super::websocket::{open, Session};

/// Delays between attempts to re-open the session
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Wait that follows `current` when another attempt fails
    fn after(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_delay)
    }
}

/// Keep re-opening `url` until a session is back or `cancel` fires.
/// The first attempt is immediate.
pub(super) async fn reconnect_loop(
    url: &Url,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<Session> {
    let mut wait = config.initial_delay;
    for attempt in 1u32.. {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return None,
            outcome = open(url) => outcome,
        };

        match outcome {
            Ok(session) => {
                tracing::info!(url = %url, attempt, "Progress channel back online");
                return Some(session);
            }
            Err(e) => tracing::warn!(
                url = %url,
                attempt,
                error = %e,
                retry_in_ms = wait.as_millis() as u64,
                "Progress channel still unreachable",
            ),
        }

        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(wait) => {}
        }
        wait = config.after(wait);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn waits_grow_until_the_cap() {
        let config = ReconnectConfig::default();
        let waits: Vec<u64> = std::iter::successors(Some(config.initial_delay), |w| Some(config.after(*w)))
            .take(8)
            .map(|w| w.as_secs())
            .collect();
        assert_eq!(waits, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn custom_schedule_is_honoured() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(1),
            multiplier: 3.0,
        };
        assert_eq!(config.after(Duration::from_millis(250)), Duration::from_millis(750));
        assert_eq!(config.after(Duration::from_millis(750)), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_when_disposed_mid_wait() {
        let cancel = CancellationToken::new();
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(3600),
            ..ReconnectConfig::default()
        };
        let dispose = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            dispose.cancel();
        });

        // Nothing listens on the discard port, so every attempt fails
        let url = Url::parse("ws://127.0.0.1:9/socket.io/").unwrap();
        assert!(reconnect_loop(&url, &config, &cancel).await.is_none());
    }

    #[tokio::test]
    async fn returns_the_session_once_the_service_answers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("ws://{}/socket.io/", listener.local_addr().unwrap())).unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"0{"sid":"s2","pingInterval":1000,"pingTimeout":500}"#.to_string()))
                .await
                .unwrap();
            let _connect = ws.next().await;
            ws.send(Message::Text("40".to_string())).await.unwrap();
            while ws.next().await.is_some() {}
        });

        let session = reconnect_loop(&url, &ReconnectConfig::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(session.liveness, Duration::from_millis(1500));
    }
}
