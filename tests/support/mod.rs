#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agromart::cache::{
    CacheConfig, CacheKey, MutationKind, MutationRequest, QueryClient, Transport, TransportError,
};
use async_trait::async_trait;
use serde_json::Value;

struct Reply {
    delay: Duration,
    result: Result<Value, TransportError>,
}

/// In-memory backend. Per-key replies are consumed in order; once a key's
/// script runs out, its standing reply (if any) answers every fetch.
#[derive(Default)]
pub struct ScriptedTransport {
    scripted: Mutex<HashMap<String, VecDeque<Reply>>>,
    standing: Mutex<HashMap<String, Value>>,
    mutation_replies: Mutex<HashMap<MutationKind, Result<Value, TransportError>>>,
    fetch_counts: Mutex<HashMap<String, usize>>,
    mutations: Mutex<Vec<MutationRequest>>,
    total_fetches: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, key: &CacheKey, value: Value) {
        self.standing
            .lock()
            .expect("standing")
            .insert(key.to_string(), value);
    }

    pub fn script(&self, key: &CacheKey, delay: Duration, result: Result<Value, TransportError>) {
        self.scripted
            .lock()
            .expect("scripted")
            .entry(key.to_string())
            .or_default()
            .push_back(Reply { delay, result });
    }

    pub fn respond_mutation(&self, kind: MutationKind, result: Result<Value, TransportError>) {
        self.mutation_replies
            .lock()
            .expect("mutation replies")
            .insert(kind, result);
    }

    pub fn fetches(&self, key: &CacheKey) -> usize {
        self.fetch_counts
            .lock()
            .expect("fetch counts")
            .get(&key.to_string())
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.total_fetches.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> Vec<MutationRequest> {
        self.mutations.lock().expect("mutations").clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch_resource(&self, key: &CacheKey) -> Result<Value, TransportError> {
        let name = key.to_string();
        self.total_fetches.fetch_add(1, Ordering::SeqCst);
        *self
            .fetch_counts
            .lock()
            .expect("fetch counts")
            .entry(name.clone())
            .or_default() += 1;

        let scripted = self
            .scripted
            .lock()
            .expect("scripted")
            .get_mut(&name)
            .and_then(VecDeque::pop_front);
        if let Some(reply) = scripted {
            if !reply.delay.is_zero() {
                tokio::time::sleep(reply.delay).await;
            }
            return reply.result;
        }

        let standing = self.standing.lock().expect("standing").get(&name).cloned();
        standing.ok_or_else(|| TransportError::status(404, format!("no reply for {name}")))
    }

    async fn send_mutation(&self, request: &MutationRequest) -> Result<Value, TransportError> {
        self.mutations.lock().expect("mutations").push(request.clone());
        self.mutation_replies
            .lock()
            .expect("mutation replies")
            .get(&request.kind)
            .cloned()
            .unwrap_or(Ok(Value::Null))
    }
}

pub fn client(transport: &Arc<ScriptedTransport>) -> QueryClient {
    QueryClient::new(CacheConfig::default(), transport.clone())
}

pub fn client_with(config: CacheConfig, transport: &Arc<ScriptedTransport>) -> QueryClient {
    QueryClient::new(config, transport.clone())
}
