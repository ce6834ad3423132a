//! Responder loop.
//!
//! Consumes inbound messages from the request subscription one at a time,
//! dispatches each request and publishes the reply to the response topic
//! the requester named. State moves `Running -> Draining -> Stopped`.

use std::sync::Arc;
use std::time::Duration;

use rpc_protocol::REQUEST_TOPIC;
use rpc_transport::{Gate, Inbound, Message, MqttConfig, TcpTransport, Transport, TransportError};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;

/// Responder lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderState {
    /// Accepting and answering requests.
    Running,
    /// No further requests are accepted; teardown pending.
    Draining,
    /// Transport disconnected.
    Stopped,
}

/// Why [`Responder::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    QuitRequested,
    Cancelled,
    TransportClosed,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderSummary {
    /// Requests dispatched.
    pub handled: u64,
    /// Replies published.
    pub replied: u64,
    /// Messages discarded without a reply.
    pub dropped: u64,
    pub stop_reason: StopReason,
}

#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    #[error("Cancelled")]
    Cancelled,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Connect to the broker, retrying every `connect_retry_delay_seconds`
/// until connected or `cancel` opens.
pub async fn connect_with_retry(
    config: &MqttConfig,
    client_id: &str,
    cancel: &Gate,
) -> Result<(TcpTransport, Inbound), ResponderError> {
    let delay = Duration::from_secs(config.connect_retry_delay_seconds);
    loop {
        let attempt = tokio::select! {
            biased;
            _ = cancel.wait() => return Err(ResponderError::Cancelled),
            attempt = TcpTransport::connect(config, client_id) => attempt,
        };
        match attempt {
            Ok(connected) => return Ok(connected),
            Err(e) => warn!(server = %config.server(), error = %e, "Connect failed, retrying"),
        }

        tokio::select! {
            biased;
            _ = cancel.wait() => return Err(ResponderError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

pub struct Responder {
    dispatcher: Dispatcher,
    transport: Arc<dyn Transport>,
    quit: Gate,
    state: watch::Sender<ResponderState>,
}

impl Responder {
    pub fn new(dispatcher: Dispatcher, transport: Arc<dyn Transport>) -> Self {
        let (state, _) = watch::channel(ResponderState::Running);
        Self {
            dispatcher,
            transport,
            quit: Gate::new(),
            state,
        }
    }

    /// Opens once the first quit reply has been published.
    pub fn quit_gate(&self) -> Gate {
        self.quit.clone()
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<ResponderState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> ResponderState {
        *self.state.borrow()
    }

    /// Subscribe to the request topic, retrying every `retry_delay` until
    /// it succeeds or `cancel` opens.
    pub async fn subscribe(&self, cancel: &Gate, retry_delay: Duration) -> Result<(), ResponderError> {
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.wait() => return Err(ResponderError::Cancelled),
                result = self.transport.subscribe(REQUEST_TOPIC) => result,
            };
            match result {
                Ok(()) => {
                    info!(topic = REQUEST_TOPIC, "Subscribed");
                    return Ok(());
                }
                Err(TransportError::Closed) => return Err(TransportError::Closed.into()),
                Err(e) => warn!(topic = REQUEST_TOPIC, error = %e, "Subscribe failed, retrying"),
            }

            tokio::select! {
                biased;
                _ = cancel.wait() => return Err(ResponderError::Cancelled),
                _ = tokio::time::sleep(retry_delay) => {}
            }
        }
    }

    /// Answer requests until quit, cancellation, or the inbound channel
    /// closing. Queued messages left after a quit are not answered.
    pub async fn run(&self, mut inbound: Inbound, cancel: &Gate) -> ResponderSummary {
        let mut summary = ResponderSummary {
            handled: 0,
            replied: 0,
            dropped: 0,
            stop_reason: StopReason::TransportClosed,
        };

        info!("Responder running");
        summary.stop_reason = loop {
            if self.quit.is_set() {
                break StopReason::QuitRequested;
            }
            let message = tokio::select! {
                biased;
                _ = cancel.wait() => break StopReason::Cancelled,
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break StopReason::TransportClosed,
                },
            };
            self.handle_message(message, &mut summary).await;
        };

        self.state.send_if_modified(|state| {
            let changed = *state == ResponderState::Running;
            if changed {
                *state = ResponderState::Draining;
            }
            changed
        });
        info!(
            reason = ?summary.stop_reason,
            handled = summary.handled,
            replied = summary.replied,
            dropped = summary.dropped,
            "Responder loop stopped"
        );
        summary
    }

    async fn handle_message(&self, message: Message, summary: &mut ResponderSummary) {
        let Some(correlation) = message.correlation_data() else {
            warn!(topic = %message.topic, "Discarding request without correlation data");
            summary.dropped += 1;
            return;
        };
        let Some(response_topic) = message.response_topic() else {
            warn!(topic = %message.topic, "Discarding request without response topic");
            summary.dropped += 1;
            return;
        };

        summary.handled += 1;
        let dispatched = self.dispatcher.dispatch(&message.payload);
        debug!(
            topic = %response_topic,
            status = dispatched.response.status,
            correlation = %String::from_utf8_lossy(correlation),
            "Request dispatched"
        );

        let payload = match dispatched.response.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to encode response");
                summary.dropped += 1;
                return;
            }
        };

        let reply = Message::new(response_topic, payload).with_correlation_data(correlation.to_vec());
        if let Err(e) = self.transport.publish(reply).await {
            warn!(topic = %response_topic, error = %e, "Failed to publish response");
            summary.dropped += 1;
            return;
        }
        summary.replied += 1;

        if dispatched.should_quit && self.quit.set() {
            info!("Quit requested");
            self.state.send_replace(ResponderState::Draining);
        }
    }

    /// Disconnect the transport and mark the responder stopped.
    pub async fn shutdown(&self) -> Result<(), ResponderError> {
        let result = self.transport.disconnect().await;
        self.state.send_replace(ResponderState::Stopped);
        info!("Responder stopped");
        result.map_err(ResponderError::from)
    }
}
