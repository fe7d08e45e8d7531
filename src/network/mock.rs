//! Scripted transport for unit tests

use super::transport::{
    Connection, RawResponse, Transport, TransportError, TransportErrorKind, TransportRequest,
};
use crate::search::Endpoint;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a single send (or connect) should produce
#[derive(Debug, Clone)]
pub(crate) enum MockReply {
    Respond { status: u16, body: Vec<u8> },
    Fail(TransportErrorKind),
}

impl MockReply {
    pub(crate) fn json(status: u16, body: &str) -> Self {
        Self::Respond {
            status,
            body: body.as_bytes().to_vec(),
        }
    }
}

#[derive(Default)]
struct State {
    replies: Mutex<VecDeque<MockReply>>,
    connect_failures: Mutex<VecDeque<TransportErrorKind>>,
    fallback: Mutex<Option<MockReply>>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<TransportRequest>>,
    next_id: AtomicU64,
    connects: AtomicUsize,
    sends: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    in_use: Mutex<HashSet<u64>>,
    double_use: AtomicBool,
}

/// Transport whose replies are scripted by the test
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    state: Arc<State>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Always answer with `status` and `body` once the script is exhausted
    pub(crate) fn always(status: u16, body: &str) -> Self {
        let mock = Self::new();
        *mock.state.fallback.lock().unwrap() = Some(MockReply::json(status, body));
        mock
    }

    /// Queue a reply for the next send
    pub(crate) fn push(&self, reply: MockReply) -> &Self {
        self.state.replies.lock().unwrap().push_back(reply);
        self
    }

    /// Make the next connect attempt fail
    pub(crate) fn fail_next_connect(&self, kind: TransportErrorKind) -> &Self {
        self.state.connect_failures.lock().unwrap().push_back(kind);
        self
    }

    /// Hold every send for `delay` before replying
    pub(crate) fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(Some(delay));
        self
    }

    pub(crate) fn set_delay(&self, delay: Option<Duration>) {
        *self.state.delay.lock().unwrap() = delay;
    }

    pub(crate) fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn sends(&self) -> usize {
        self.state.sends.load(Ordering::SeqCst)
    }

    pub(crate) fn max_active(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }

    pub(crate) fn saw_double_use(&self) -> bool {
        self.state.double_use.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<TransportRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub(crate) fn into_transport(self) -> Arc<dyn Transport> {
        Arc::new(self)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn Connection>, TransportError> {
        let failure = self.state.connect_failures.lock().unwrap().pop_front();
        if let Some(kind) = failure {
            return Err(TransportError::new(
                kind,
                endpoint.select_url(),
                "scripted connect failure",
            ));
        }

        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            id,
            state: self.state.clone(),
        }))
    }
}

struct MockConnection {
    id: u64,
    state: Arc<State>,
}

/// Undoes the busy markers even when the send future is dropped
struct Busy<'a> {
    id: u64,
    state: &'a State,
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        self.state.active.fetch_sub(1, Ordering::SeqCst);
        self.state.in_use.lock().unwrap().remove(&self.id);
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> u64 {
        self.id
    }

    async fn send(&mut self, request: &TransportRequest) -> Result<RawResponse, TransportError> {
        let state = &self.state;
        state.sends.fetch_add(1, Ordering::SeqCst);
        state.requests.lock().unwrap().push(request.clone());

        if !state.in_use.lock().unwrap().insert(self.id) {
            state.double_use.store(true, Ordering::SeqCst);
        }
        let active = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_active.fetch_max(active, Ordering::SeqCst);
        let _busy = Busy { id: self.id, state };

        let delay = *state.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = state.replies.lock().unwrap().pop_front();
        let reply = scripted
            .or_else(|| state.fallback.lock().unwrap().clone())
            .unwrap_or_else(|| MockReply::json(200, "{}"));

        let url = format!(
            "{}?{}",
            request.url,
            request
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&")
        );

        match reply {
            MockReply::Respond { status, body } => Ok(RawResponse::new(status, url, body)),
            MockReply::Fail(kind) => Err(TransportError::new(kind, url, "scripted failure")),
        }
    }
}
