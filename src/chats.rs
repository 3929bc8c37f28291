use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use futures_util::future::join;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, Transport};
use crate::cell::{Shared, StateCell};
use crate::models::{Chat, Message};
use crate::optimistic::{reconcile, Optimistic, TempIds};

/// Messages of the chat currently on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatThread {
    pub chat_id: i64,
    pub messages: Vec<Optimistic<Message>>,
    pub loading: bool,
    /// Which `open` call created this thread.
    generation: u64,
}

impl ChatThread {
    fn opening(chat_id: i64, generation: u64) -> Self {
        Self { chat_id, messages: Vec::new(), loading: true, generation }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatInbox {
    pub chats: Vec<Chat>,
    pub thread: Option<ChatThread>,
    /// Set while a send is in flight; gates the send control.
    pub sending: bool,
    opens: u64,
}

impl ChatInbox {
    pub fn total_unread(&self) -> u32 {
        self.chats.iter().map(|chat| chat.unread_count).sum()
    }

    pub fn open_chat(&self) -> Option<&Chat> {
        let chat_id = self.thread.as_ref()?.chat_id;
        self.chats.iter().find(|chat| chat.id == chat_id)
    }

    fn chat_mut(&mut self, chat_id: i64) -> Option<&mut Chat> {
        self.chats.iter_mut().find(|chat| chat.id == chat_id)
    }

    fn thread_for(&mut self, chat_id: i64) -> Option<&mut ChatThread> {
        self.thread.as_mut().filter(|thread| thread.chat_id == chat_id)
    }

    fn thread_opened_by(&mut self, generation: u64) -> Option<&mut ChatThread> {
        self.thread.as_mut().filter(|thread| thread.generation == generation)
    }
}

pub struct ChatController<T, C = Shared<ChatInbox>> {
    api: ApiClient<T>,
    cell: C,
    ids: Arc<TempIds>,
}

impl<T, C: Clone> Clone for ChatController<T, C> {
    fn clone(&self) -> Self {
        Self { api: self.api.clone(), cell: self.cell.clone(), ids: Arc::clone(&self.ids) }
    }
}

impl<T: Transport, C: StateCell<ChatInbox>> ChatController<T, C> {
    pub fn new(api: ApiClient<T>, cell: C) -> Self {
        Self { api, cell, ids: Arc::new(TempIds::new()) }
    }

    pub fn cell(&self) -> &C {
        &self.cell
    }

    /// A failed load shows an empty inbox rather than stale or placeholder chats.
    pub async fn load_chats(&self) {
        let chats = self.api.chats().await.unwrap_or_else(|e| {
            warn!("Failed to load chats: {e}");
            Vec::new()
        });
        debug!(count = chats.len(), "Chats loaded");
        self.cell.update(|inbox| inbox.chats = chats);
    }

    /// Opens a thread. The unread badge clears before anything is sent; the
    /// messages are applied as soon as they arrive while mark-read runs
    /// alongside, best-effort. Messages that arrive after the thread was closed
    /// or opened again are dropped.
    pub async fn open(&self, chat_id: i64) {
        let opened = self.cell.update(|inbox| {
            if let Some(chat) = inbox.chat_mut(chat_id) {
                chat.unread_count = 0;
            }
            inbox.opens += 1;
            inbox.thread = Some(ChatThread::opening(chat_id, inbox.opens));
            inbox.opens
        });
        let Some(generation) = opened else {
            return;
        };

        let load_messages = async {
            let messages = match self.api.messages(chat_id).await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(chat_id, "Failed to load messages: {e}");
                    Vec::new()
                }
            };
            self.cell.update(|inbox| match inbox.thread_opened_by(generation) {
                Some(thread) => {
                    thread.messages = messages.into_iter().map(Optimistic::from).collect();
                    thread.loading = false;
                }
                None => debug!(chat_id, "Thread was reopened or closed; dropping loaded messages"),
            });
        };
        let mark_read = async {
            if let Err(e) = self.api.mark_read(chat_id).await {
                debug!(chat_id, "Mark-read not confirmed: {e}");
            }
        };
        join(load_messages, mark_read).await;
    }

    pub fn close(&self) {
        self.cell.update(|inbox| inbox.thread = None);
    }

    /// Appends the message to the open thread at once and replaces it with the
    /// server's copy on success. A failed send leaves the local copy in place.
    ///
    /// Returns `false` without touching state or the network when the trimmed
    /// content is empty, no thread is open, or another send is in flight.
    pub async fn send_message(&self, sender_id: i64, content: &str) -> bool {
        let text = content.trim();
        if text.is_empty() {
            return false;
        }

        let key = self.ids.next();
        let started = self.cell.update(|inbox| {
            if inbox.sending {
                return None;
            }
            let chat_id = inbox.thread.as_ref()?.chat_id;
            let receiver_id = inbox.chat_mut(chat_id).map(|chat| chat.friend.id).unwrap_or_default();
            let provisional = Message {
                id: key,
                sender_id,
                receiver_id,
                content: text.to_string(),
                is_read: false,
                created_at: Utc::now().to_rfc3339(),
            };
            inbox.thread.as_mut()?.messages.push(Optimistic::pending(key, provisional));
            inbox.sending = true;
            Some(chat_id)
        });
        let Some(chat_id) = started.flatten() else {
            return false;
        };

        let outcome = self.api.send_message(chat_id, text).await;
        self.cell.update(|inbox| {
            inbox.sending = false;
            match outcome {
                Ok(sent) => {
                    info!(chat_id, message_id = sent.id, "Message sent");
                    if let Some(thread) = inbox.thread_for(chat_id) {
                        reconcile(&mut thread.messages, key, sent.clone());
                    }
                    if let Some(chat) = inbox.chat_mut(chat_id) {
                        chat.last_message = Some(sent);
                    }
                }
                Err(e) => warn!(chat_id, "Message kept locally only: {e}"),
            }
        });
        true
    }
}

/// Relative age of a server timestamp: "Just now", "5m ago", "3h ago", "2d ago".
/// Accepts RFC 3339 and the naive ISO form the API emits (read as UTC); anything
/// else renders as an empty string.
pub fn time_ago(created_at: &str, now: DateTime<Utc>) -> String {
    let Some(then) = parse_timestamp(created_at) else {
        return String::new();
    };
    let minutes = (now - then).num_minutes();
    if minutes < 1 {
        return "Just now".to_string();
    }
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    format!("{}d ago", hours / 24)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
