//! Scripted transport and fixtures shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::api::{ApiClient, ApiRequest, ApiResponse, Method, Transport};
use crate::errors::TransportError;
use crate::storage::MemoryTokenStorage;

#[derive(Debug, Clone)]
pub enum Reply {
    Response { status: u16, body: String },
    NetworkDown,
    /// Never resolves, like a request stuck in flight.
    Hang,
    /// Answers with the inner reply once the delay has elapsed on the tokio clock.
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn json(status: u16, body: Value) -> Self {
        Reply::Response { status, body: body.to_string() }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Reply::Response { status, body: body.to_string() }
    }

    pub fn status(status: u16) -> Self {
        Reply::Response { status, body: String::new() }
    }

    pub fn ok() -> Self {
        Reply::json(200, json!({ "message": "ok" }))
    }

    pub fn after(self, delay: Duration) -> Self {
        Reply::Delayed(delay, Box::new(self))
    }
}

#[derive(Default)]
struct Script {
    queued: HashMap<(Method, String), VecDeque<Reply>>,
    sticky: HashMap<(Method, String), Reply>,
    calls: Vec<ApiRequest>,
}

/// Transport that answers from a per-route script and records every request.
/// Unscripted routes answer 404.
#[derive(Clone, Default)]
pub struct FakeTransport {
    script: Arc<Mutex<Script>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every call to the route with `reply`.
    pub fn on(&self, method: Method, path: &str, reply: Reply) -> &Self {
        self.script.lock().sticky.insert((method, path.to_string()), reply);
        self
    }

    /// Answers the next call to the route with `reply`, ahead of any sticky reply.
    pub fn once(&self, method: Method, path: &str, reply: Reply) -> &Self {
        self.script
            .lock()
            .queued
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.script.lock().calls.clone()
    }

    pub fn calls_to(&self, method: Method, path: &str) -> Vec<ApiRequest> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method && call.path == path)
            .collect()
    }

    pub fn last_call(&self) -> Option<ApiRequest> {
        self.script.lock().calls.last().cloned()
    }
}

impl Transport for FakeTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let reply = {
            let mut script = self.script.lock();
            let key = (request.method, request.path.clone());
            script.calls.push(request);
            let queued = script.queued.get_mut(&key).and_then(VecDeque::pop_front);
            queued
                .or_else(|| script.sticky.get(&key).cloned())
                .unwrap_or_else(|| Reply::status(404))
        };
        answer(reply).await
    }
}

async fn answer(reply: Reply) -> Result<ApiResponse, TransportError> {
    let mut reply = reply;
    loop {
        match reply {
            Reply::Response { status, body } => return Ok(ApiResponse { status, body }),
            Reply::NetworkDown => return Err(TransportError::new("connection refused")),
            Reply::Hang => return std::future::pending().await,
            Reply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
        }
    }
}

pub fn api(fake: &FakeTransport, token: Option<&str>) -> ApiClient<FakeTransport> {
    let storage = match token {
        Some(token) => MemoryTokenStorage::with_token(token),
        None => MemoryTokenStorage::new(),
    };
    ApiClient::new(fake.clone(), Arc::new(storage))
}

pub fn profile_json(id: i64, username: &str) -> Value {
    json!({
        "id": id,
        "email": format!("{username}@example.com"),
        "username": username,
        "display_name": username,
        "created_at": "2025-01-01T00:00:00",
        "total_points": 120,
        "streak": 4,
        "rank": 12,
        "friends_count": 2,
        "total_tasks": 15,
        "completed_tasks": 12
    })
}

pub fn user_json(id: i64, username: &str) -> Value {
    json!({
        "id": id,
        "email": format!("{username}@example.com"),
        "username": username,
        "display_name": username,
        "created_at": "2025-01-01T00:00:00"
    })
}

pub fn message_json(id: i64, sender_id: i64, content: &str) -> Value {
    json!({
        "id": id,
        "sender_id": sender_id,
        "receiver_id": 99,
        "content": content,
        "is_read": false,
        "created_at": "2026-10-14T09:00:00"
    })
}

pub fn chat_json(id: i64, friend_id: i64, unread: u32) -> Value {
    json!({
        "id": id,
        "friend": { "id": friend_id, "username": format!("friend{friend_id}"), "display_name": format!("Friend {friend_id}") },
        "unread_count": unread
    })
}
