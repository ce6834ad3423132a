//! Concurrent calls from one requester.
//!
//! Replies arrive in random order; each call must receive only the reply
//! carrying its own correlation token.

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use fixtures::{FakeTransport, ReplyMode};
use pubsub_rpc::{Requester, RequesterOptions};
use rpc_protocol::{Request, Response};
use rpc_transport::{Gate, Message};

const CALLS: usize = 64;

fn indexed_request(index: usize) -> Request {
    let mut request = Request::new("calculator");
    request.put_integer("index", index as i64);
    request
}

async fn run_round(requester: &Arc<Requester>) {
    let handles: Vec<_> = (0..CALLS)
        .map(|index| {
            let requester = Arc::clone(requester);
            tokio::spawn(async move { (index, requester.call(&indexed_request(index)).await) })
        })
        .collect();

    for handle in handles {
        let (index, result) = handle.await.unwrap();
        let response = result.unwrap_or_else(|e| panic!("call {} failed: {}", index, e));
        assert_eq!(
            response.get_integer("index").unwrap(),
            index as i64,
            "call {} received another call's reply",
            index
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replies_in_random_order_reach_their_callers() {
    let (transport, inbound) = FakeTransport::new(ReplyMode::ShuffledBatch(CALLS));
    let requester = Arc::new(Requester::start(
        transport.clone(),
        inbound,
        RequesterOptions {
            call_timeout: Duration::from_secs(10),
            ..RequesterOptions::default()
        },
        Gate::new(),
    ));

    for _ in 0..3 {
        run_round(&requester).await;
    }

    assert_eq!(transport.published(), CALLS * 3);
    assert_eq!(requester.pending_calls(), 0);
}

#[tokio::test]
async fn test_foreign_replies_are_ignored() {
    let (transport, inbound) = FakeTransport::new(ReplyMode::ShuffledBatch(2));
    let requester = Arc::new(Requester::start(
        transport.clone(),
        inbound,
        RequesterOptions::default(),
        Gate::new(),
    ));
    requester.wait_ready(Duration::from_secs(1)).await.unwrap();

    let mut bogus = Response::ok();
    bogus.put_integer("index", 999).unwrap();
    let topic = requester.response_topic().to_string();
    transport
        .inject(Message::new(topic.clone(), bogus.encode().unwrap()).with_correlation_data(b"someone-else".to_vec()))
        .await;
    transport
        .inject(Message::new(topic, bogus.encode().unwrap()))
        .await;

    let first = {
        let requester = Arc::clone(&requester);
        tokio::spawn(async move { requester.call(&indexed_request(0)).await })
    };
    let second = requester.call(&indexed_request(1)).await.unwrap();

    assert_eq!(second.get_integer("index").unwrap(), 1);
    assert_eq!(first.await.unwrap().unwrap().get_integer("index").unwrap(), 0);
}
