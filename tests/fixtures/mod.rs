//! Shared test fixtures.
//!
//! [`FakeTransport`] stands in for a broker connection: it records every
//! subscribe and publish with a timestamp and answers requests according
//! to its [`ReplyMode`].

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rpc_protocol::{Request, Response};
use rpc_transport::{Inbound, Message, Transport, TransportError};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// What the fake does with published requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    /// Swallow requests.
    Never,
    /// Reply to each request immediately.
    Echo,
    /// Hold requests until this many arrived, then reply to all of them
    /// in random order.
    ShuffledBatch(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SubscribeStarted { filter: String, at: Instant },
    Subscribed { filter: String, at: Instant },
    Published { topic: String, at: Instant },
}

pub struct FakeTransport {
    mode: ReplyMode,
    subscribe_delay: Duration,
    fail_subscribe: bool,
    events: Mutex<Vec<Event>>,
    held: Mutex<Vec<Message>>,
    inbound: mpsc::Sender<Message>,
}

impl FakeTransport {
    pub fn new(mode: ReplyMode) -> (Arc<Self>, Inbound) {
        Self::build(mode, Duration::ZERO, false)
    }

    /// Subscriptions take `delay` to become active.
    pub fn with_subscribe_delay(mode: ReplyMode, delay: Duration) -> (Arc<Self>, Inbound) {
        Self::build(mode, delay, false)
    }

    /// Every subscribe is refused.
    pub fn refusing_subscriptions() -> (Arc<Self>, Inbound) {
        Self::build(ReplyMode::Never, Duration::ZERO, true)
    }

    fn build(mode: ReplyMode, subscribe_delay: Duration, fail_subscribe: bool) -> (Arc<Self>, Inbound) {
        let (inbound, receiver) = mpsc::channel(1024);
        let transport = Arc::new(Self {
            mode,
            subscribe_delay,
            fail_subscribe,
            events: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            inbound,
        });
        (transport, receiver)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn published(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Published { .. }))
            .count()
    }

    /// Deliver an arbitrary message to the client.
    pub async fn inject(&self, message: Message) {
        self.inbound.send(message).await.unwrap();
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    async fn deliver(&self, replies: Vec<Message>) {
        for reply in replies {
            let _ = self.inbound.send(reply).await;
        }
    }
}

/// Reply carrying the request's function and, when present, its integer
/// `index` argument.
pub fn echo_reply(request: &Message) -> Message {
    let decoded = Request::decode(&request.payload).unwrap();
    let mut response = Response::ok();
    response.put_string("function", decoded.function.clone()).unwrap();
    if let Ok(index) = decoded.get_integer("index") {
        response.put_integer("index", index).unwrap();
    }

    Message::new(request.response_topic().unwrap(), response.encode().unwrap())
        .with_correlation_data(request.correlation_data().unwrap().to_vec())
}

#[async_trait]
impl Transport for FakeTransport {
    async fn publish(&self, message: Message) -> Result<(), TransportError> {
        self.record(Event::Published {
            topic: message.topic.clone(),
            at: Instant::now(),
        });

        match self.mode {
            ReplyMode::Never => {}
            ReplyMode::Echo => self.deliver(vec![echo_reply(&message)]).await,
            ReplyMode::ShuffledBatch(size) => {
                let batch = {
                    let mut held = self.held.lock().unwrap();
                    held.push(message);
                    if held.len() < size {
                        return Ok(());
                    }
                    let mut batch: Vec<Message> = held.drain(..).collect();
                    batch.shuffle(&mut rand::thread_rng());
                    batch
                };
                self.deliver(batch.iter().map(echo_reply).collect()).await;
            }
        }
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        self.record(Event::SubscribeStarted {
            filter: filter.to_string(),
            at: Instant::now(),
        });
        tokio::time::sleep(self.subscribe_delay).await;
        if self.fail_subscribe {
            return Err(TransportError::SubscribeFailed("not authorized".to_string()));
        }
        self.record(Event::Subscribed {
            filter: filter.to_string(),
            at: Instant::now(),
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
