use crate::{
    chats::{ChatStore, NewMessage},
    directory,
    error::{AppError, AppResult},
    model::Chat,
};
use parking_lot::{Mutex, RwLock};
use rusqlite::Connection;
use std::{collections::HashMap, hash::Hash, sync::Arc};

/// Lock objects keyed by id, created on demand and dropped once idle.
struct Slots<K, L> {
    map: Mutex<HashMap<K, Arc<L>>>,
}

impl<K: Eq + Hash + Clone, L: Default> Slots<K, L> {
    fn checkout(&self, key: &K) -> Arc<L> {
        self.map.lock().entry(key.clone()).or_default().clone()
    }

    fn release(&self, key: &K, slot: Arc<L>) {
        // clones are only taken under `map`, so a count of two (map + ours)
        // means nobody else is holding or waiting on this slot
        let mut map = self.map.lock();
        if map
            .get(key)
            .is_some_and(|s| Arc::ptr_eq(s, &slot) && Arc::strong_count(s) == 2)
        {
            map.remove(key);
        }
    }

    fn len(&self) -> usize {
        self.map.lock().len()
    }
}

impl<K, L> Default for Slots<K, L> {
    fn default() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }
}

/// Serializes conversation updates.
///
/// Updates to one (circle, user) pair run one at a time and share the
/// circle; deleting a circle waits for them and keeps new ones out until
/// its conversations are gone. The circle is always taken before the pair.
#[derive(Default)]
pub struct ConversationLocks {
    circles: Slots<String, RwLock<()>>,
    pairs: Slots<(String, String), Mutex<()>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the pair's lock and a shared hold on the circle.
    pub fn with<R>(&self, circle_id: &str, user_id: &str, f: impl FnOnce() -> R) -> R {
        let circle_key = circle_id.to_string();
        let pair_key = (circle_key.clone(), user_id.to_string());
        let circle = self.circles.checkout(&circle_key);
        let pair = self.pairs.checkout(&pair_key);
        let out = {
            let _shared = circle.read();
            let _held = pair.lock();
            f()
        };
        self.pairs.release(&pair_key, pair);
        self.circles.release(&circle_key, circle);
        out
    }

    /// Run `f` with the circle to itself: no pair of it is being updated.
    pub fn exclusive<R>(&self, circle_id: &str, f: impl FnOnce() -> R) -> R {
        let key = circle_id.to_string();
        let circle = self.circles.checkout(&key);
        let out = {
            let _only = circle.write();
            f()
        };
        self.circles.release(&key, circle);
        out
    }

    /// Number of circles and pairs currently locked or waited on.
    pub fn active(&self) -> usize {
        self.circles.len() + self.pairs.len()
    }
}

/// Result of a find-or-create on a conversation.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub chat: Chat,
    pub created: bool,
}

/// Content of the system message announcing a join request.
pub fn join_message(display_name: &str) -> String {
    format!("{display_name} wants to join this circle.")
}

/// Append `msg` to the pair's chat, opening the chat first if needed.
/// Callers hold the pair's lock.
fn append_or_open(
    store: &ChatStore,
    circle_id: &str,
    user_id: &str,
    msg: NewMessage,
) -> AppResult<JoinOutcome> {
    match store.find_by_user_and_circle(circle_id, user_id) {
        Some(existing) => {
            let chat = store.add_message(&existing.id, msg).ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!(
                    "chat {} vanished while appending",
                    existing.id
                ))
            })?;
            Ok(JoinOutcome {
                chat,
                created: false,
            })
        }
        None => {
            let chat = store.create(circle_id, user_id, Some(msg))?;
            Ok(JoinOutcome {
                chat,
                created: true,
            })
        }
    }
}

/// Check the circle exists, then append or open, all under the pair's lock.
fn deliver(
    conn: &Connection,
    store: &ChatStore,
    locks: &ConversationLocks,
    circle_id: &str,
    user_id: &str,
    msg: NewMessage,
) -> AppResult<JoinOutcome> {
    locks.with(circle_id, user_id, || {
        if !directory::exists(conn, circle_id)? {
            return Err(AppError::NotFound("Circle"));
        }
        append_or_open(store, circle_id, user_id, msg)
    })
}

/// Record that `user_id` wants to join `circle_id`.
pub fn submit_join_request(
    conn: &Connection,
    store: &ChatStore,
    locks: &ConversationLocks,
    circle_id: &str,
    user_id: &str,
    display_name: &str,
) -> AppResult<JoinOutcome> {
    let display_name = display_name.trim();
    if display_name.is_empty() {
        if !directory::exists(conn, circle_id)? {
            return Err(AppError::NotFound("Circle"));
        }
        return Err(AppError::validation("userName", "userName is required"));
    }
    let msg = NewMessage::system(user_id, &join_message(display_name))?;
    let outcome = deliver(conn, store, locks, circle_id, user_id, msg)?;
    tracing::info!(
        circle_id,
        user_id,
        chat_id = %outcome.chat.id,
        created = outcome.created,
        "join request recorded"
    );
    Ok(outcome)
}

/// Post a message into the conversation between `user_id` and the circle owner.
pub fn send_message(
    conn: &Connection,
    store: &ChatStore,
    locks: &ConversationLocks,
    circle_id: &str,
    user_id: &str,
    msg: NewMessage,
) -> AppResult<JoinOutcome> {
    deliver(conn, store, locks, circle_id, user_id, msg)
}

/// Delete a circle and drop its conversations. Returns false if it did not exist.
pub fn delete_circle(
    conn: &Connection,
    store: &ChatStore,
    locks: &ConversationLocks,
    circle_id: &str,
) -> AppResult<bool> {
    locks.exclusive(circle_id, || {
        if !directory::delete(conn, circle_id)? {
            return Ok(false);
        }
        let dropped = store.remove_circle(circle_id);
        tracing::info!(circle_id, dropped_chats = dropped, "circle deleted");
        Ok(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, model::Circle, model::CircleType};
    use std::thread;

    fn seed_circle(conn: &Connection, id: &str) {
        directory::insert(
            conn,
            &Circle {
                id: id.into(),
                name: "Chess Club".into(),
                description: "Weekly chess meetups for all levels".into(),
                circle_type: CircleType::University,
                tags: vec![],
                members_count: 1,
                location: String::new(),
                active_days: vec![],
                owner_id: "owner".into(),
                created_at: 0,
                updated_at: 0,
            },
        )
        .unwrap();
    }

    #[test]
    fn first_request_creates_chat() {
        let conn = db::init_db(":memory:").unwrap();
        seed_circle(&conn, "circle-001");
        let store = ChatStore::new();
        let locks = ConversationLocks::new();
        let out =
            submit_join_request(&conn, &store, &locks, "circle-001", "user-42", "Alice").unwrap();
        assert!(out.created);
        assert_eq!(out.chat.messages.len(), 1);
        assert!(out.chat.messages[0].content.contains("Alice"));
        assert!(out.chat.messages[0].system);
        assert_eq!(out.chat.messages[0].sender_id, "user-42");
    }

    #[test]
    fn repeat_request_appends_to_same_chat() {
        let conn = db::init_db(":memory:").unwrap();
        seed_circle(&conn, "circle-001");
        let store = ChatStore::new();
        let locks = ConversationLocks::new();
        let first =
            submit_join_request(&conn, &store, &locks, "circle-001", "user-42", "Alice").unwrap();
        let second =
            submit_join_request(&conn, &store, &locks, "circle-001", "user-42", "Alice").unwrap();
        assert!(!second.created);
        assert_eq!(second.chat.id, first.chat.id);
        assert_eq!(second.chat.messages.len(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(locks.active(), 0);
    }

    #[test]
    fn unknown_circle_and_blank_name() {
        let conn = db::init_db(":memory:").unwrap();
        seed_circle(&conn, "circle-001");
        let store = ChatStore::new();
        let locks = ConversationLocks::new();
        assert!(matches!(
            submit_join_request(&conn, &store, &locks, "circle-404", "u", "Alice"),
            Err(AppError::NotFound("Circle"))
        ));
        assert!(matches!(
            submit_join_request(&conn, &store, &locks, "circle-001", "u", "   "),
            Err(AppError::Validation { field: "userName", .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn send_message_opens_then_appends() {
        let conn = db::init_db(":memory:").unwrap();
        seed_circle(&conn, "c1");
        let store = ChatStore::new();
        let locks = ConversationLocks::new();
        let m = NewMessage::new("owner", "hello there").unwrap();
        let first = send_message(&conn, &store, &locks, "c1", "u1", m.clone()).unwrap();
        let second = send_message(&conn, &store, &locks, "c1", "u1", m).unwrap();
        assert!(first.created && !second.created);
        assert_eq!(second.chat.messages.len(), 2);
        assert!(!second.chat.messages[1].system);
    }

    #[test]
    fn concurrent_requests_share_one_chat() {
        let store = Arc::new(ChatStore::new());
        let locks = Arc::new(ConversationLocks::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                let locks = locks.clone();
                thread::spawn(move || {
                    let msg = NewMessage::system("u1", &format!("knock {i}")).unwrap();
                    locks
                        .with("c1", "u1", || append_or_open(&store, "c1", "u1", msg))
                        .unwrap()
                        .created
                })
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|c| *c)
            .count();
        assert_eq!(created, 1);
        assert_eq!(store.len(), 1);
        let chat = store.find_by_user_and_circle("c1", "u1").unwrap();
        assert_eq!(chat.messages.len(), 16);
        assert_eq!(locks.active(), 0);
    }

    #[test]
    fn delete_drops_conversations_and_blocks_later_joins() {
        let conn = db::init_db(":memory:").unwrap();
        seed_circle(&conn, "c1");
        seed_circle(&conn, "c2");
        let store = ChatStore::new();
        let locks = ConversationLocks::new();
        submit_join_request(&conn, &store, &locks, "c1", "u1", "Alice").unwrap();
        submit_join_request(&conn, &store, &locks, "c2", "u1", "Alice").unwrap();

        assert!(delete_circle(&conn, &store, &locks, "c1").unwrap());
        assert!(!delete_circle(&conn, &store, &locks, "c1").unwrap());
        assert!(store.list_by_circle("c1").is_empty());
        assert_eq!(store.len(), 1);
        assert!(matches!(
            submit_join_request(&conn, &store, &locks, "c1", "u1", "Alice"),
            Err(AppError::NotFound("Circle"))
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(locks.active(), 0);
    }

    #[test]
    fn exclusive_waits_for_pair_holders() {
        let locks = Arc::new(ConversationLocks::new());
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (go_tx, go_rx) = std::sync::mpsc::channel::<()>();
        let holder = {
            let locks = locks.clone();
            thread::spawn(move || {
                locks.with("c1", "u1", || {
                    entered_tx.send(()).unwrap();
                    go_rx.recv().unwrap();
                })
            })
        };
        entered_rx.recv().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let deleter = {
            let locks = locks.clone();
            let order = order.clone();
            thread::spawn(move || locks.exclusive("c1", || order.lock().push("delete")))
        };
        thread::sleep(std::time::Duration::from_millis(50));
        order.lock().push("join done");
        go_tx.send(()).unwrap();
        holder.join().unwrap();
        deleter.join().unwrap();
        assert_eq!(*order.lock(), vec!["join done", "delete"]);
        assert_eq!(locks.active(), 0);
    }
}
