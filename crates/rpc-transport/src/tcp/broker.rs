//! TCP broker.
//!
//! Accepts clients, tracks their subscriptions and forwards each publish to
//! every session with a matching filter. Delivery is at most once; nothing
//! is retained for clients that subscribe later.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::frame::{read_frame, write_frame, Frame};
use crate::gate::Gate;
use crate::routing::SubscriptionTable;
use crate::topic;
use crate::transport::TransportError;
use crate::DEFAULT_CHANNEL_CAPACITY;

/// Pause after a failed accept, e.g. while the process is out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Source of incoming connections.
#[async_trait]
pub(crate) trait Acceptor: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Broker settings.
#[derive(Debug, Clone, Default)]
pub struct BrokerConfig {
    /// When set, clients must present exactly these credentials.
    pub credentials: Option<(String, String)>,
}

type Table = SubscriptionTable<mpsc::Sender<Frame>>;

/// Message broker serving [`super::TcpTransport`] clients.
pub struct Broker {
    config: BrokerConfig,
    table: Mutex<Table>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            table: Mutex::new(SubscriptionTable::new()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of connected sessions.
    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    /// Accept connections until `shutdown` opens.
    ///
    /// A failed accept is logged and retried after a short pause; it never
    /// ends the broker.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: Gate) -> Result<(), TransportError> {
        info!(address = ?listener.local_addr().ok(), "Broker listening");
        self.accept_loop(&listener, &shutdown).await;
        Ok(())
    }

    pub(crate) async fn accept_loop<A: Acceptor>(self: Arc<Self>, acceptor: &A, shutdown: &Gate) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Broker shutting down");
                    return;
                }
                accepted = acceptor.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let broker = Arc::clone(&self);
                        tokio::spawn(async move {
                            if let Err(e) = broker.handle_connection(stream, peer).await {
                                warn!(peer = %peer, error = %e, "Session ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::select! {
                            _ = shutdown.wait() => {}
                            _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                        }
                    }
                },
            }
        }
    }

    fn authorize(&self, username: Option<&str>, password: Option<&str>) -> Result<(), String> {
        match &self.config.credentials {
            None => Ok(()),
            Some((user, pass)) if Some(user.as_str()) == username && Some(pass.as_str()) == password => Ok(()),
            Some(_) => Err("bad username or password".to_string()),
        }
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), TransportError> {
        stream.set_nodelay(true)?;
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let client_id = match read_frame(&mut reader).await? {
            Some(Frame::Connect {
                client_id,
                username,
                password,
            }) => {
                if let Err(reason) = self.authorize(username.as_deref(), password.as_deref()) {
                    warn!(peer = %peer, client_id = %client_id, "Rejected connection");
                    let refusal = Frame::Connack {
                        accepted: false,
                        reason: Some(reason),
                    };
                    write_frame(&mut write_half, &refusal).await?;
                    return Ok(());
                }
                client_id
            }
            Some(other) => {
                return Err(TransportError::Protocol(format!(
                    "expected connect, got {:?}",
                    other
                )))
            }
            None => return Ok(()),
        };

        write_frame(
            &mut write_half,
            &Frame::Connack {
                accepted: true,
                reason: None,
            },
        )
        .await?;

        let (outbound_tx, outbound_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
        let session = self.lock().insert(client_id.clone(), outbound_tx.clone());
        info!(peer = %peer, client_id = %client_id, session, "Client connected");

        let writer = tokio::spawn(write_loop(write_half, outbound_rx));
        let result = self.session_loop(&mut reader, session, &outbound_tx).await;

        self.lock().remove(session);
        drop(outbound_tx);
        let _ = writer.await;
        info!(client_id = %client_id, session, "Client disconnected");
        result
    }

    async fn session_loop(
        &self,
        reader: &mut BufReader<tokio::net::tcp::OwnedReadHalf>,
        session: u64,
        outbound: &mpsc::Sender<Frame>,
    ) -> Result<(), TransportError> {
        while let Some(frame) = read_frame(reader).await? {
            match frame {
                Frame::Subscribe { id, filter } => {
                    let error = match topic::validate_filter(&filter) {
                        Ok(()) => {
                            self.lock().subscribe(session, &filter);
                            debug!(session, filter = %filter, "Subscription added");
                            None
                        }
                        Err(e) => Some(e.to_string()),
                    };
                    // The suback is queued after the table update, so any
                    // publish routed after this point reaches the session.
                    if outbound.send(Frame::Suback { id, error }).await.is_err() {
                        return Err(TransportError::Closed);
                    }
                }
                publish @ Frame::Publish { .. } => self.forward(publish).await,
                Frame::Disconnect => return Ok(()),
                other => {
                    return Err(TransportError::Protocol(format!(
                        "unexpected frame from client: {:?}",
                        other
                    )))
                }
            }
        }
        Ok(())
    }

    async fn forward(&self, publish: Frame) {
        let Frame::Publish { topic, .. } = &publish else {
            return;
        };
        if let Err(e) = topic::validate_topic(topic) {
            warn!(error = %e, "Dropping publish with invalid topic");
            return;
        }

        let targets = self.lock().targets(topic);
        if targets.is_empty() {
            debug!(topic = %topic, "No subscribers for publish");
        }
        for (session, sender) in targets {
            if sender.send(publish.clone()).await.is_err() {
                debug!(session, "Session closed before delivery");
            }
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut outbound: mpsc::Receiver<Frame>) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            debug!(error = %e, "Write to client failed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MqttConfig;
    use crate::message::Message;
    use crate::tcp::TcpTransport;
    use crate::transport::Transport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn start_broker(config: BrokerConfig) -> (MqttConfig, Gate, Arc<Broker>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shutdown = Gate::new();
        let broker = Broker::new(config);
        tokio::spawn(Arc::clone(&broker).serve(listener, shutdown.clone()));

        let client_config = MqttConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..MqttConfig::default()
        };
        (client_config, shutdown, broker)
    }

    #[tokio::test]
    async fn test_publish_subscribe_over_tcp() {
        let (config, shutdown, _broker) = start_broker(BrokerConfig::default()).await;

        let (listener, mut inbound) = TcpTransport::connect(&config, "listener").await.unwrap();
        let (sender, _sender_inbound) = TcpTransport::connect(&config, "sender").await.unwrap();

        listener.subscribe("request").await.unwrap();
        sender
            .publish(
                Message::new("request", b"{\"function\":\"quit\"}".to_vec())
                    .with_correlation_data(b"token-1".to_vec())
                    .with_response_topic("response/sender"),
            )
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), inbound.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.topic, "request");
        assert_eq!(received.correlation_data(), Some(&b"token-1"[..]));
        assert_eq!(received.response_topic(), Some("response/sender"));

        listener.disconnect().await.unwrap();
        sender.disconnect().await.unwrap();
        shutdown.set();
    }

    #[tokio::test]
    async fn test_invalid_subscription_is_reported() {
        let (config, shutdown, _broker) = start_broker(BrokerConfig::default()).await;
        let (client, _inbound) = TcpTransport::connect(&config, "client").await.unwrap();

        // Rejected locally before reaching the broker.
        assert!(matches!(client.subscribe("a/#/b").await, Err(TransportError::InvalidTopic(_))));
        shutdown.set();
    }

    #[tokio::test]
    async fn test_credentials_enforced() {
        let (mut config, shutdown, _broker) = start_broker(BrokerConfig {
            credentials: Some(("diaries".to_string(), "secret".to_string())),
        })
        .await;

        let rejected = TcpTransport::connect(&config, "intruder").await;
        assert!(matches!(rejected, Err(TransportError::Rejected(_))));

        config.username = "diaries".to_string();
        config.password = "secret".to_string();
        let (client, _inbound) = TcpTransport::connect(&config, "client").await.unwrap();
        client.disconnect().await.unwrap();
        shutdown.set();
    }

    #[tokio::test]
    async fn test_session_removed_on_disconnect() {
        let (config, shutdown, broker) = start_broker(BrokerConfig::default()).await;
        let (client, _inbound) = TcpTransport::connect(&config, "client").await.unwrap();
        client.subscribe("request").await.unwrap();
        assert_eq!(broker.session_count(), 1);

        client.disconnect().await.unwrap();
        for _ in 0..50 {
            if broker.session_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(broker.session_count(), 0);
        shutdown.set();
    }

    /// Listener whose first `failures` accepts fail.
    struct FlakyListener {
        listener: TcpListener,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl Acceptor for FlakyListener {
        async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                return Err(io::Error::from_raw_os_error(24));
            }
            self.listener.accept().await
        }
    }

    #[tokio::test]
    async fn test_accept_errors_do_not_stop_broker() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let acceptor = Arc::new(FlakyListener {
            listener,
            failures: AtomicUsize::new(2),
        });
        let shutdown = Gate::new();
        let broker = Broker::new(BrokerConfig::default());

        let serving = {
            let acceptor = Arc::clone(&acceptor);
            let shutdown = shutdown.clone();
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.accept_loop(acceptor.as_ref(), &shutdown).await })
        };

        let config = MqttConfig {
            host: "127.0.0.1".to_string(),
            port,
            ..MqttConfig::default()
        };
        let (client, _inbound) = TcpTransport::connect(&config, "client").await.unwrap();
        client.subscribe("request").await.unwrap();
        assert_eq!(acceptor.failures.load(Ordering::SeqCst), 0);
        assert_eq!(broker.session_count(), 1);
        assert!(!serving.is_finished());

        shutdown.set();
        tokio::time::timeout(Duration::from_secs(1), serving)
            .await
            .expect("accept loop stops on shutdown")
            .unwrap();
    }
}
