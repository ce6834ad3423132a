//! TCP client transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::frame::{read_frame, write_frame, Frame};
use crate::config::MqttConfig;
use crate::message::Message;
use crate::topic;
use crate::transport::{Inbound, Transport, TransportError};
use crate::DEFAULT_CHANNEL_CAPACITY;

type PendingSubscriptions = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<(), String>>>>>;

/// Client connection to a [`super::Broker`].
pub struct TcpTransport {
    client_id: String,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: PendingSubscriptions,
    next_subscription: AtomicU64,
    connected: Arc<AtomicBool>,
}

impl TcpTransport {
    /// Connect, authenticate and start delivering inbound messages.
    ///
    /// The whole handshake is bounded by `config.connect_timeout_seconds`.
    pub async fn connect(config: &MqttConfig, client_id: &str) -> Result<(Self, Inbound), TransportError> {
        let timeout = Duration::from_secs(config.connect_timeout_seconds);
        tokio::time::timeout(timeout, Self::handshake(config, client_id))
            .await
            .map_err(|_| TransportError::ConnectionTimeout)?
    }

    async fn handshake(config: &MqttConfig, client_id: &str) -> Result<(Self, Inbound), TransportError> {
        let address = config.address();
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", address, e)))?;
        stream.set_nodelay(true)?;

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let connect = Frame::Connect {
            client_id: client_id.to_string(),
            username: non_empty(&config.username),
            password: non_empty(&config.password),
        };
        write_frame(&mut write_half, &connect).await?;

        match read_frame(&mut reader).await? {
            Some(Frame::Connack { accepted: true, .. }) => {}
            Some(Frame::Connack { reason, .. }) => {
                return Err(TransportError::Rejected(
                    reason.unwrap_or_else(|| "no reason given".to_string()),
                ))
            }
            Some(other) => {
                return Err(TransportError::Protocol(format!(
                    "expected connack, got {:?}",
                    other
                )))
            }
            None => return Err(TransportError::Closed),
        }

        info!(server = %config.server(), client_id, "Connected to broker");

        let (inbound_tx, inbound_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let pending: PendingSubscriptions = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        tokio::spawn(read_loop(
            reader,
            inbound_tx,
            Arc::clone(&pending),
            Arc::clone(&connected),
            client_id.to_string(),
        ));

        let transport = Self {
            client_id: client_id.to_string(),
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            next_subscription: AtomicU64::new(1),
            connected,
        };
        Ok((transport, inbound_rx))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, frame).await
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

async fn read_loop(
    mut reader: BufReader<OwnedReadHalf>,
    inbound: mpsc::Sender<Message>,
    pending: PendingSubscriptions,
    connected: Arc<AtomicBool>,
    client_id: String,
) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(client_id = %client_id, "Broker closed the connection");
                break;
            }
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Failed to read from broker");
                break;
            }
        };

        match frame {
            publish @ Frame::Publish { .. } => match publish.into_message() {
                Ok(message) => {
                    if inbound.send(message).await.is_err() {
                        debug!(client_id = %client_id, "Inbound receiver dropped");
                        break;
                    }
                }
                Err(e) => warn!(client_id = %client_id, error = %e, "Discarding malformed publish"),
            },
            Frame::Suback { id, error } => {
                let waiter = pending.lock().ok().and_then(|mut p| p.remove(&id));
                match waiter {
                    Some(waiter) => {
                        let _ = waiter.send(error.map_or(Ok(()), Err));
                    }
                    None => debug!(id, "Suback for unknown subscription"),
                }
            }
            Frame::Disconnect => {
                info!(client_id = %client_id, "Broker requested disconnect");
                break;
            }
            other => warn!(client_id = %client_id, frame = ?other, "Unexpected frame from broker"),
        }
    }

    connected.store(false, Ordering::SeqCst);
    // Dropping the waiters fails any subscribe still in flight.
    if let Ok(mut pending) = pending.lock() {
        pending.clear();
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn publish(&self, message: Message) -> Result<(), TransportError> {
        topic::validate_topic(&message.topic)?;
        self.send(&Frame::publish(&message)).await?;
        debug!(topic = %message.topic, bytes = message.payload.len(), "Message published");
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        topic::validate_filter(filter)?;

        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(id, tx);
        }

        let frame = Frame::Subscribe {
            id,
            filter: filter.to_string(),
        };
        if let Err(e) = self.send(&frame).await {
            if let Ok(mut pending) = self.pending.lock() {
                pending.remove(&id);
            }
            return Err(e);
        }

        match rx.await {
            Ok(Ok(())) => {
                debug!(filter, client_id = %self.client_id, "Subscribed");
                Ok(())
            }
            Ok(Err(reason)) => Err(TransportError::SubscribeFailed(reason)),
            Err(_) => Err(TransportError::Closed),
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &Frame::Disconnect).await?;
        writer.shutdown().await?;
        info!(client_id = %self.client_id, "Disconnected from broker");
        Ok(())
    }
}
