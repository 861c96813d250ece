//! nsqd subscriber.
//!
//! Connects to a single nsqd over TCP, subscribes to one topic/channel and
//! keeps at most one message in flight (`RDY 1`). A background reader task
//! decodes frames, answers heartbeats and forwards messages over a channel;
//! commands from the intake loop share the write half with it.

pub mod frame;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::config::{Config, NSQ_CLOSE_TIMEOUT, NSQ_HEARTBEAT_INTERVAL_MS, QUEUE_CHANNEL_CAPACITY};
use crate::error_handling::QueueError;
use crate::queue::{Delivery, MessageId, MessageSource};
use crate::utils::sanitize::preview_body;
use crate::utils::{retry_with_backoff, BackoffPolicy};

use frame::{read_frame, Command, Frame, CLOSE_WAIT, HEARTBEAT, MAGIC_V2, RESPONSE_OK};

type SharedWriter = Arc<Mutex<OwnedWriteHalf>>;
type DeliveryResult = Result<Delivery, QueueError>;

/// Errors nsqd reports for a single command without closing the connection.
const NON_FATAL_ERRORS: &[&str] = &["E_FIN_FAILED", "E_REQ_FAILED", "E_TOUCH_FAILED"];

/// Where and how to subscribe.
#[derive(Debug, Clone)]
pub struct NsqConfig {
    /// nsqd TCP address (`host:port`)
    pub address: String,
    /// Topic to subscribe to
    pub topic: String,
    /// Channel to subscribe with
    pub channel: String,
    /// Client identifier sent in IDENTIFY
    pub client_id: String,
    /// Delay policy between connection attempts
    pub policy: BackoffPolicy,
    /// Connection attempts before giving up
    pub max_attempts: usize,
}

impl NsqConfig {
    /// Subscription settings from the consumer configuration.
    pub fn from_config(config: &Config) -> Self {
        let client_id = std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        NsqConfig {
            address: config.nsqd_address.clone(),
            topic: config.topic.clone(),
            channel: config.channel.clone(),
            client_id,
            policy: config.backoff_policy(),
            max_attempts: config.connect_max_attempts,
        }
    }

    fn identify_body(&self) -> Result<Vec<u8>, QueueError> {
        let body = Identify {
            client_id: &self.client_id,
            hostname: &self.client_id,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")),
            feature_negotiation: false,
            heartbeat_interval: NSQ_HEARTBEAT_INTERVAL_MS,
        };
        serde_json::to_vec(&body)
            .map_err(|e| QueueError::Protocol(format!("cannot encode IDENTIFY: {}", e)))
    }
}

/// IDENTIFY payload. Feature negotiation stays off, so nsqd answers `OK`.
#[derive(Serialize)]
struct Identify<'a> {
    client_id: &'a str,
    hostname: &'a str,
    user_agent: &'static str,
    feature_negotiation: bool,
    heartbeat_interval: u64,
}

/// A live nsqd subscription.
pub struct NsqSource {
    config: NsqConfig,
    writer: SharedWriter,
    deliveries: mpsc::Receiver<DeliveryResult>,
    reader_task: JoinHandle<()>,
}

impl NsqSource {
    /// Connects, identifies, subscribes and signals readiness for one message.
    ///
    /// The TCP connect is retried according to `config.policy`; a broker that
    /// rejects IDENTIFY or SUB fails immediately.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::ConnectExhausted` when no TCP connection could be
    /// made, or the error of the failed handshake step.
    pub async fn connect(config: NsqConfig) -> Result<Self, QueueError> {
        let (writer, deliveries, reader_task) = establish(&config).await?;
        Ok(NsqSource {
            config,
            writer,
            deliveries,
            reader_task,
        })
    }

    /// Subscription settings in use.
    pub fn config(&self) -> &NsqConfig {
        &self.config
    }
}

async fn establish(
    config: &NsqConfig,
) -> Result<(SharedWriter, mpsc::Receiver<DeliveryResult>, JoinHandle<()>), QueueError> {
    let subject = format!("Connecting to nsqd {}", config.address);
    let (result, attempts) = retry_with_backoff(&config.policy, config.max_attempts, &subject, || {
        TcpStream::connect(config.address.clone())
    })
    .await;
    let mut stream = result.map_err(|source| QueueError::ConnectExhausted {
        address: config.address.clone(),
        attempts,
        source,
    })?;
    stream.set_nodelay(true)?;

    stream.write_all(MAGIC_V2).await?;
    let identify = config.identify_body()?;
    stream
        .write_all(&Command::Identify(&identify).encode())
        .await?;
    expect_ok(&mut stream, "IDENTIFY").await?;
    stream
        .write_all(
            &Command::Sub {
                topic: &config.topic,
                channel: &config.channel,
            }
            .encode(),
        )
        .await?;
    expect_ok(&mut stream, "SUB").await?;
    stream.write_all(&Command::Rdy(1).encode()).await?;

    info!(
        "Subscribed to {}/{} on nsqd {} after {} attempt(s)",
        config.topic, config.channel, config.address, attempts
    );

    let (read_half, write_half) = stream.into_split();
    let writer = Arc::new(Mutex::new(write_half));
    let (tx, rx) = mpsc::channel(QUEUE_CHANNEL_CAPACITY);
    let reader_task = tokio::spawn(read_loop(BufReader::new(read_half), Arc::clone(&writer), tx));
    Ok((writer, rx, reader_task))
}

async fn expect_ok(stream: &mut TcpStream, step: &str) -> Result<(), QueueError> {
    loop {
        match read_frame(stream).await? {
            Frame::Response(data) if data == RESPONSE_OK => return Ok(()),
            Frame::Response(data) if data == HEARTBEAT => {
                stream.write_all(&Command::Nop.encode()).await?;
            }
            Frame::Error(data) => {
                return Err(QueueError::Broker(format!(
                    "{} rejected: {}",
                    step,
                    String::from_utf8_lossy(&data)
                )))
            }
            other => {
                return Err(QueueError::Protocol(format!(
                    "unexpected reply to {}: {:?}",
                    step, other
                )))
            }
        }
    }
}

async fn send_command(writer: &SharedWriter, command: &Command<'_>) -> Result<(), QueueError> {
    let mut writer = writer.lock().await;
    writer.write_all(&command.encode()).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    writer: SharedWriter,
    tx: mpsc::Sender<DeliveryResult>,
) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        match frame {
            Frame::Message(delivery) => {
                if tx.send(Ok(delivery)).await.is_err() {
                    return;
                }
            }
            Frame::Response(data) if data == HEARTBEAT => {
                debug!("Answering nsqd heartbeat");
                if let Err(e) = send_command(&writer, &Command::Nop).await {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
            Frame::Response(data) if data == CLOSE_WAIT => {
                debug!("nsqd acknowledged close");
                return;
            }
            Frame::Response(data) => {
                debug!("nsqd response: {}", preview_body(&data));
            }
            Frame::Error(data) => {
                let message = String::from_utf8_lossy(&data).into_owned();
                if NON_FATAL_ERRORS.iter().any(|code| message.starts_with(code)) {
                    warn!("nsqd rejected a command: {}", message);
                } else {
                    let _ = tx.send(Err(QueueError::Broker(message))).await;
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl MessageSource for NsqSource {
    async fn next_message(&mut self) -> Result<Option<Delivery>, QueueError> {
        match self.deliveries.recv().await {
            Some(Ok(delivery)) => Ok(Some(delivery)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn finish(&mut self, id: &MessageId) -> Result<(), QueueError> {
        send_command(&self.writer, &Command::Fin(id)).await
    }

    async fn requeue(&mut self, id: &MessageId, delay: Duration) -> Result<(), QueueError> {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        send_command(&self.writer, &Command::Req(id, delay_ms)).await
    }

    /// Stops new deliveries and waits briefly for nsqd to confirm the close.
    async fn close(&mut self) -> Result<(), QueueError> {
        if self.reader_task.is_finished() {
            return Ok(());
        }
        send_command(&self.writer, &Command::Rdy(0)).await?;
        send_command(&self.writer, &Command::Cls).await?;
        self.deliveries.close();
        if tokio::time::timeout(NSQ_CLOSE_TIMEOUT, &mut self.reader_task)
            .await
            .is_err()
        {
            warn!("nsqd did not confirm close within {:?}", NSQ_CLOSE_TIMEOUT);
            self.reader_task.abort();
        }
        info!(
            "Closed subscription to {}/{}",
            self.config.topic, self.config.channel
        );
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), QueueError> {
        self.reader_task.abort();
        let (writer, deliveries, reader_task) = establish(&self.config).await?;
        self.writer = writer;
        self.deliveries = deliveries;
        self.reader_task = reader_task;
        Ok(())
    }
}

impl Drop for NsqSource {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_body_fields() {
        let config = NsqConfig {
            address: "127.0.0.1:4150".to_string(),
            topic: "system_info".to_string(),
            channel: "channel".to_string(),
            client_id: "web-1".to_string(),
            policy: BackoffPolicy::Fixed(Duration::from_millis(1)),
            max_attempts: 1,
        };
        let body: serde_json::Value =
            serde_json::from_slice(&config.identify_body().unwrap()).unwrap();
        assert_eq!(body["client_id"], "web-1");
        assert_eq!(body["hostname"], "web-1");
        assert_eq!(body["feature_negotiation"], false);
        assert_eq!(body["heartbeat_interval"], 30_000);
        assert!(body["user_agent"]
            .as_str()
            .unwrap()
            .starts_with("telemetry_consumer/"));
    }
}
