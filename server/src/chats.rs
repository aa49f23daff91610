use crate::{
    error::AppError,
    model::{new_id, now_millis, Chat, Message},
};
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("message content must be a non-empty string")]
    EmptyContent,
    #[error("a chat already exists for this circle and user")]
    Conflict,
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EmptyContent => AppError::validation("content", err.to_string()),
            StoreError::Conflict => AppError::conflict(err.to_string()),
        }
    }
}

/// A message that has been validated but not yet assigned to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    sender_id: String,
    content: String,
    system: bool,
}

impl NewMessage {
    /// Content is trimmed; an empty result is refused.
    pub fn new(sender_id: impl Into<String>, content: &str) -> Result<Self, StoreError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::EmptyContent);
        }
        Ok(Self {
            sender_id: sender_id.into(),
            content: content.to_string(),
            system: false,
        })
    }

    /// A message generated by the service on behalf of `sender_id`.
    pub fn system(sender_id: impl Into<String>, content: &str) -> Result<Self, StoreError> {
        let mut msg = Self::new(sender_id, content)?;
        msg.system = true;
        Ok(msg)
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    fn stamp(self, chat_id: &str, now: i64) -> Message {
        Message {
            id: new_id(),
            chat_id: chat_id.to_string(),
            sender_id: self.sender_id,
            content: self.content,
            timestamp: now,
            read_status: false,
            system: self.system,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Default)]
struct Indices {
    /// circle id -> user id -> chat
    by_circle: HashMap<String, HashMap<String, Chat>>,
    /// chat id -> (circle id, user id)
    by_id: HashMap<String, (String, String)>,
}

/// In-memory conversations between applicants and circle owners.
///
/// At most one chat exists per (circle, user). Both indices are only ever
/// modified under the same write guard.
#[derive(Default)]
pub struct ChatStore {
    inner: RwLock<Indices>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_by_user_and_circle(&self, circle_id: &str, user_id: &str) -> Option<Chat> {
        let guard = self.inner.read();
        guard.by_circle.get(circle_id)?.get(user_id).cloned()
    }

    pub fn find_by_id(&self, chat_id: &str) -> Option<Chat> {
        let guard = self.inner.read();
        let (circle_id, user_id) = guard.by_id.get(chat_id)?;
        guard.by_circle.get(circle_id)?.get(user_id).cloned()
    }

    /// Open a chat for the pair, optionally seeded with a first message.
    pub fn create(
        &self,
        circle_id: &str,
        user_id: &str,
        initial: Option<NewMessage>,
    ) -> Result<Chat, StoreError> {
        let mut guard = self.inner.write();
        let Indices { by_circle, by_id } = &mut *guard;
        let chats = by_circle.entry(circle_id.to_string()).or_default();
        if chats.contains_key(user_id) {
            return Err(StoreError::Conflict);
        }
        let now = now_millis();
        let id = new_id();
        let chat = Chat {
            messages: initial.into_iter().map(|m| m.stamp(&id, now)).collect(),
            id: id.clone(),
            circle_id: circle_id.to_string(),
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
        };
        chats.insert(user_id.to_string(), chat.clone());
        by_id.insert(id, (circle_id.to_string(), user_id.to_string()));
        tracing::debug!(chat_id = %chat.id, circle_id, user_id, "chat created");
        Ok(chat)
    }

    /// Append to an existing chat. `None` when the chat is unknown.
    pub fn add_message(&self, chat_id: &str, msg: NewMessage) -> Option<Chat> {
        let mut guard = self.inner.write();
        let Indices { by_circle, by_id } = &mut *guard;
        let (circle_id, user_id) = by_id.get(chat_id)?;
        let chat = by_circle.get_mut(circle_id)?.get_mut(user_id)?;
        let now = now_millis().max(chat.updated_at);
        chat.messages.push(msg.stamp(&chat.id, now));
        chat.updated_at = now;
        Some(chat.clone())
    }

    /// All chats of a circle, oldest first.
    pub fn list_by_circle(&self, circle_id: &str) -> Vec<Chat> {
        let guard = self.inner.read();
        let mut chats: Vec<Chat> = guard
            .by_circle
            .get(circle_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        chats.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        chats
    }

    /// Mark every message not sent by `reader_id` as read. Returns how many
    /// messages changed, or `None` when the chat is unknown.
    pub fn mark_read(&self, chat_id: &str, reader_id: &str) -> Option<usize> {
        let mut guard = self.inner.write();
        let Indices { by_circle, by_id } = &mut *guard;
        let (circle_id, user_id) = by_id.get(chat_id)?;
        let chat = by_circle.get_mut(circle_id)?.get_mut(user_id)?;
        let now = now_millis();
        let mut changed = 0;
        for msg in chat
            .messages
            .iter_mut()
            .filter(|m| !m.read_status && m.sender_id != reader_id)
        {
            msg.read_status = true;
            msg.updated_at = now.max(msg.updated_at);
            changed += 1;
        }
        Some(changed)
    }

    /// Forget every chat of a circle. Returns how many were dropped.
    pub fn remove_circle(&self, circle_id: &str) -> usize {
        let mut guard = self.inner.write();
        let Indices { by_circle, by_id } = &mut *guard;
        let Some(chats) = by_circle.remove(circle_id) else {
            return 0;
        };
        for chat in chats.values() {
            by_id.remove(&chat.id);
        }
        chats.len()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut guard = self.inner.write();
        guard.by_circle.clear();
        guard.by_id.clear();
    }
}
