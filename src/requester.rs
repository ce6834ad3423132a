//! Requester correlation client.
//!
//! Sends requests to the request topic and matches replies arriving on the
//! client's private response topic by correlation token. Any number of
//! calls may be in flight at once; each one waits only for its own token.
//!
//! The response subscription must be active before anything is published,
//! otherwise a fast reply could arrive with nothing there to catch it.
//! [`Requester::call`] therefore waits on the subscription-ready gate first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use rpc_protocol::{response_topic, DecodeError, EncodeError, Request, Response, REQUEST_TOPIC};
use rpc_transport::signal::EXIT_CODE_INTERRUPTED;
use rpc_transport::{Gate, Inbound, Message, Transport, TransportError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Client id used when the config does not name one.
pub const DEFAULT_CLIENT_ID: &str = "requester";

/// Default bound on waiting for a reply.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on waiting for the response subscription.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Exit code for timeouts.
pub const EXIT_CODE_TIMEOUT: u8 = 2;

/// Requester settings.
#[derive(Debug, Clone)]
pub struct RequesterOptions {
    /// Identity; the response topic is `response/<client_id>`.
    pub client_id: String,
    /// Bound on waiting for the response subscription.
    pub connect_timeout: Duration,
    /// Bound on waiting for each reply.
    pub call_timeout: Duration,
}

impl Default for RequesterOptions {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Call errors.
///
/// These mean "no usable answer". A reply whose status is not 200 is still
/// returned as `Ok(Response)`.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("response subscription not ready after {0:?}")]
    SubscribeTimeout(Duration),

    #[error("call cancelled")]
    Cancelled,

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    #[error("reply could not be decoded: {0}")]
    Decode(#[from] DecodeError),

    #[error("request could not be encoded: {0}")]
    Encode(#[from] EncodeError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("requester closed before a reply arrived")]
    Closed,
}

impl CallError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CallError::SubscribeTimeout(_) | CallError::Timeout(_) => EXIT_CODE_TIMEOUT,
            CallError::Cancelled => EXIT_CODE_INTERRUPTED,
            _ => 1,
        }
    }
}

/// Calls waiting for a reply, by correlation token. `None` once the router
/// has stopped.
type PendingMap = Arc<Mutex<Option<HashMap<Vec<u8>, oneshot::Sender<Vec<u8>>>>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, Option<HashMap<Vec<u8>, oneshot::Sender<Vec<u8>>>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes a call's pending entry however the call ends.
struct PendingGuard {
    pending: PendingMap,
    token: Vec<u8>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(map) = lock(&self.pending).as_mut() {
            map.remove(&self.token);
        }
    }
}

/// Correlating RPC client over a [`Transport`].
pub struct Requester {
    transport: Arc<dyn Transport>,
    options: RequesterOptions,
    response_topic: String,
    ready: Gate,
    subscribe_failed: Gate,
    subscribe_error: Arc<OnceLock<String>>,
    cancel: Gate,
    pending: PendingMap,
    tasks: Vec<JoinHandle<()>>,
}

impl Requester {
    /// Start the subscription and router tasks.
    ///
    /// `inbound` must be the receiver paired with `transport`. Must be
    /// called from within a tokio runtime.
    pub fn start(
        transport: Arc<dyn Transport>,
        inbound: Inbound,
        options: RequesterOptions,
        cancel: Gate,
    ) -> Self {
        let response_topic = response_topic(&options.client_id);
        let ready = Gate::new();
        let subscribe_failed = Gate::new();
        let subscribe_error = Arc::new(OnceLock::new());
        let pending: PendingMap = Arc::new(Mutex::new(Some(HashMap::new())));

        let subscription = tokio::spawn(subscribe_task(
            Arc::clone(&transport),
            response_topic.clone(),
            ready.clone(),
            subscribe_failed.clone(),
            Arc::clone(&subscribe_error),
            cancel.clone(),
        ));
        let router = tokio::spawn(route_replies(inbound, Arc::clone(&pending), cancel.clone()));

        Self {
            transport,
            options,
            response_topic,
            ready,
            subscribe_failed,
            subscribe_error,
            cancel,
            pending,
            tasks: vec![subscription, router],
        }
    }

    pub fn response_topic(&self) -> &str {
        &self.response_topic
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_set()
    }

    /// Number of calls waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        lock(&self.pending).as_ref().map_or(0, HashMap::len)
    }

    /// Wait until the response subscription is active.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), CallError> {
        tokio::select! {
            biased;
            _ = self.cancel.wait() => Err(CallError::Cancelled),
            _ = self.ready.wait() => Ok(()),
            _ = self.subscribe_failed.wait() => {
                let reason = self.subscribe_error.get().cloned().unwrap_or_default();
                Err(TransportError::SubscribeFailed(reason).into())
            }
            _ = tokio::time::sleep(timeout) => Err(CallError::SubscribeTimeout(timeout)),
        }
    }

    /// Send `request` and wait up to the configured call timeout for its reply.
    pub async fn call(&self, request: &Request) -> Result<Response, CallError> {
        self.call_with_timeout(request, self.options.call_timeout).await
    }

    /// Send `request` and wait up to `timeout` for its reply.
    ///
    /// The timeout starts once the response subscription is ready.
    pub async fn call_with_timeout(&self, request: &Request, timeout: Duration) -> Result<Response, CallError> {
        self.wait_ready(self.options.connect_timeout).await?;

        let payload = request.encode()?;
        let token = Uuid::new_v4().to_string().into_bytes();
        let (reply_tx, reply_rx) = oneshot::channel();
        let _guard = self.register(token.clone(), reply_tx)?;

        let message = Message::new(REQUEST_TOPIC, payload)
            .with_correlation_data(token)
            .with_response_topic(self.response_topic.clone());
        let deadline = tokio::time::Instant::now() + timeout;

        debug!(function = %request.function, topic = REQUEST_TOPIC, "Publishing request");
        tokio::select! {
            biased;
            _ = self.cancel.wait() => return Err(CallError::Cancelled),
            published = self.transport.publish(message) => published?,
            _ = tokio::time::sleep_until(deadline) => return Err(CallError::Timeout(timeout)),
        }

        let payload = tokio::select! {
            biased;
            _ = self.cancel.wait() => return Err(CallError::Cancelled),
            reply = reply_rx => reply.map_err(|_| CallError::Closed)?,
            _ = tokio::time::sleep_until(deadline) => {
                warn!(function = %request.function, timeout = ?timeout, "Call timed out");
                return Err(CallError::Timeout(timeout));
            }
        };

        let response = Response::decode(&payload)?;
        debug!(function = %request.function, status = response.status, "Reply received");
        Ok(response)
    }

    fn register(&self, token: Vec<u8>, reply: oneshot::Sender<Vec<u8>>) -> Result<PendingGuard, CallError> {
        let mut pending = lock(&self.pending);
        let map = pending.as_mut().ok_or(CallError::Closed)?;
        map.insert(token.clone(), reply);
        Ok(PendingGuard {
            pending: Arc::clone(&self.pending),
            token,
        })
    }

    /// Disconnect the transport. Pending calls end with [`CallError::Closed`].
    pub async fn disconnect(&self) -> Result<(), CallError> {
        self.transport.disconnect().await?;
        info!(topic = %self.response_topic, "Requester disconnected");
        Ok(())
    }
}

impl Drop for Requester {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn subscribe_task(
    transport: Arc<dyn Transport>,
    topic: String,
    ready: Gate,
    failed: Gate,
    error: Arc<OnceLock<String>>,
    cancel: Gate,
) {
    let result = tokio::select! {
        biased;
        _ = cancel.wait() => return,
        result = transport.subscribe(&topic) => result,
    };
    match result {
        Ok(()) => {
            info!(topic = %topic, "Response subscription ready");
            ready.set();
        }
        Err(e) => {
            warn!(topic = %topic, error = %e, "Response subscription failed");
            let _ = error.set(e.to_string());
            failed.set();
        }
    }
}

async fn route_replies(mut inbound: Inbound, pending: PendingMap, cancel: Gate) {
    loop {
        let message = tokio::select! {
            biased;
            _ = cancel.wait() => break,
            message = inbound.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        let Some(token) = message.correlation_data() else {
            warn!(topic = %message.topic, "Discarding reply without correlation data");
            continue;
        };
        let waiter = lock(&pending).as_mut().and_then(|map| map.remove(token));
        match waiter {
            Some(reply) => {
                // The caller may have given up already.
                let _ = reply.send(message.payload);
            }
            None => warn!(
                topic = %message.topic,
                correlation = %String::from_utf8_lossy(token),
                "Discarding reply with unknown correlation token"
            ),
        }
    }

    // Dropping the senders wakes every waiting call with `Closed`.
    lock(&pending).take();
    debug!("Reply router stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpc_transport::MemoryBroker;

    async fn echo_responder(broker: &MemoryBroker) {
        let (transport, mut inbound) = broker.connect("listener");
        transport.subscribe(REQUEST_TOPIC).await.unwrap();
        tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let request = Request::decode(&message.payload).unwrap();
                let mut response = Response::ok();
                response.put_string("echo", request.function.clone()).unwrap();
                let reply = Message::new(message.response_topic().unwrap(), response.encode().unwrap())
                    .with_correlation_data(message.correlation_data().unwrap().to_vec());
                transport.publish(reply).await.unwrap();
            }
        });
    }

    fn start(broker: &MemoryBroker, cancel: Gate) -> Requester {
        let (transport, inbound) = broker.connect("requester");
        Requester::start(Arc::new(transport), inbound, RequesterOptions::default(), cancel)
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let broker = MemoryBroker::new();
        echo_responder(&broker).await;
        let requester = start(&broker, Gate::new());

        let response = requester.call(&Request::new("buildinfo")).await.unwrap();
        assert_eq!(response.get_string("echo").unwrap(), "buildinfo");
        assert!(requester.is_ready());
        assert_eq!(requester.pending_calls(), 0);
        assert_eq!(requester.response_topic(), "response/requester");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cleans_up() {
        let broker = MemoryBroker::new();
        let (_listener, _inbound) = broker.connect("listener");
        let requester = start(&broker, Gate::new());

        let result = requester
            .call_with_timeout(&Request::new("quit"), Duration::from_secs(3))
            .await;
        assert!(matches!(result, Err(CallError::Timeout(_))));
        assert_eq!(requester.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_aborts_call() {
        let broker = MemoryBroker::new();
        let cancel = Gate::new();
        let requester = start(&broker, cancel.clone());
        requester.wait_ready(Duration::from_secs(1)).await.unwrap();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.set();
        });
        let result = requester.call(&Request::new("getPages")).await;
        assert!(matches!(result, Err(CallError::Cancelled)));
        assert_eq!(requester.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_function_is_encode_error() {
        let broker = MemoryBroker::new();
        let requester = start(&broker, Gate::new());
        let result = requester.call(&Request::new("")).await;
        assert!(matches!(result, Err(CallError::Encode(_))));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_decode_error() {
        let broker = MemoryBroker::new();
        let (listener, mut inbound) = broker.connect("listener");
        listener.subscribe(REQUEST_TOPIC).await.unwrap();
        tokio::spawn(async move {
            let message = inbound.recv().await.unwrap();
            let reply = Message::new(message.response_topic().unwrap(), b"{\"no\": \"status\"}".to_vec())
                .with_correlation_data(message.correlation_data().unwrap().to_vec());
            listener.publish(reply).await.unwrap();
        });

        let requester = start(&broker, Gate::new());
        let result = requester.call(&Request::new("getPages")).await;
        assert!(matches!(result, Err(CallError::Decode(_))));
    }

    #[tokio::test]
    async fn test_disconnect_closes_pending_calls() {
        let broker = MemoryBroker::new();
        let requester = Arc::new(start(&broker, Gate::new()));
        requester.wait_ready(Duration::from_secs(1)).await.unwrap();

        let caller = {
            let requester = Arc::clone(&requester);
            tokio::spawn(async move { requester.call(&Request::new("getPages")).await })
        };
        while requester.pending_calls() == 0 {
            tokio::task::yield_now().await;
        }
        requester.disconnect().await.unwrap();

        let result = caller.await.unwrap();
        assert!(matches!(result, Err(CallError::Closed)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CallError::Timeout(Duration::from_secs(1)).exit_code(), 2);
        assert_eq!(CallError::SubscribeTimeout(Duration::from_secs(1)).exit_code(), 2);
        assert_eq!(CallError::Cancelled.exit_code(), 130);
        assert_eq!(CallError::Closed.exit_code(), 1);
    }
}
