//! Websocket stream loop shared by the streaming sources.
//!
//! Connects, sends the handler's subscribe frames, feeds every text frame to
//! the handler and reconnects after a fixed delay until cancelled.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SourceError;
use crate::adapters::rpc_pool::redact_url;
use crate::application::queue::QueueProducer;

/// Delay before reconnecting after the stream drops
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
/// Connect attempt timeout
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
/// A connection silent for this long is treated as dead
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 90;
/// Maximum frame size in bytes
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    pub idle_timeout: Duration,
    pub max_message_size: usize,
}

impl StreamConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Per-source frame handling
#[async_trait]
pub trait FrameHandler: Send {
    /// Frames sent right after every (re)connect
    fn subscribe_messages(&self) -> Vec<String>;

    /// Handle one JSON text frame; returned frames are sent back upstream
    async fn on_frame(&mut self, frame: &str, queue: &QueueProducer) -> Result<Vec<String>, SourceError>;
}

/// Size/shape checks done before any JSON parsing.
///
/// `Ok(None)` means the frame is empty and should be ignored.
pub fn validate_frame(raw: &str, max_size: usize) -> Result<Option<&str>, SourceError> {
    if raw.len() > max_size {
        return Err(SourceError::InvalidMessageFormat(format!(
            "Message too large: {} bytes",
            raw.len()
        )));
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return Err(SourceError::InvalidMessageFormat(
            "Message is not a JSON object or array".to_string(),
        ));
    }
    Ok(Some(trimmed))
}

/// Short preview for log lines
pub fn preview(raw: &str) -> String {
    if raw.len() > 200 {
        let cut: String = raw.chars().take(200).collect();
        format!("{}...[truncated]", cut)
    } else {
        raw.to_string()
    }
}

/// Run until `cancel` fires, reconnecting on every failure
pub async fn run_stream<H: FrameHandler>(
    source: &'static str,
    config: &StreamConfig,
    handler: &mut H,
    queue: &QueueProducer,
    cancel: &CancellationToken,
) {
    let mut reconnects: u32 = 0;

    while !cancel.is_cancelled() {
        match connect_and_process(source, config, handler, queue, cancel).await {
            Ok(()) if cancel.is_cancelled() => break,
            Ok(()) => info!(source, "Stream closed by remote"),
            Err(e) => warn!(source, error = %e, "Stream error"),
        }

        reconnects = reconnects.saturating_add(1);
        warn!(
            source,
            attempt = reconnects,
            delay_ms = config.reconnect_delay.as_millis() as u64,
            "Reconnecting"
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }

    info!(source, "Stream stopped");
}

async fn connect_and_process<H: FrameHandler>(
    source: &'static str,
    config: &StreamConfig,
    handler: &mut H,
    queue: &QueueProducer,
    cancel: &CancellationToken,
) -> Result<(), SourceError> {
    let connect = tokio::time::timeout(
        Duration::from_secs(CONNECT_TIMEOUT_SECS),
        connect_async(config.url.as_str()),
    );
    let (ws, _) = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        res = connect => res
            .map_err(|_| SourceError::ConnectionFailed("connect timed out".into()))?
            .map_err(|e| SourceError::ConnectionFailed(e.to_string()))?,
    };
    info!(source, url = %redact_url(&config.url), "Connected");

    let (mut write, mut read) = ws.split();
    for msg in handler.subscribe_messages() {
        write
            .send(Message::Text(msg.into()))
            .await
            .map_err(|e| SourceError::WebSocket(e.to_string()))?;
    }

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(());
            }
            next = tokio::time::timeout(config.idle_timeout, read.next()) => next,
        };

        let msg = match next {
            Err(_) => {
                return Err(SourceError::WebSocket(format!(
                    "no frames for {}s",
                    config.idle_timeout.as_secs()
                )))
            }
            Ok(None) => return Ok(()),
            Ok(Some(Err(e))) => return Err(SourceError::WebSocket(e.to_string())),
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Text(text) => {
                let frame = match validate_frame(text.as_str(), config.max_message_size) {
                    Ok(Some(frame)) => frame,
                    Ok(None) => continue,
                    Err(e) => {
                        debug!(source, error = %e, "Skipping frame");
                        continue;
                    }
                };
                match handler.on_frame(frame, queue).await {
                    Ok(replies) => {
                        for reply in replies {
                            write
                                .send(Message::Text(reply.into()))
                                .await
                                .map_err(|e| SourceError::WebSocket(e.to_string()))?;
                        }
                    }
                    Err(e) => {
                        debug!(source, error = %e, preview = %preview(frame), "Skipping malformed frame")
                    }
                }
            }
            Message::Ping(payload) => {
                write
                    .send(Message::Pong(payload))
                    .await
                    .map_err(|e| SourceError::WebSocket(e.to_string()))?;
            }
            Message::Close(frame) => {
                debug!(source, ?frame, "Close frame received");
                return Ok(());
            }
            _ => {}
        }
    }
}
