use crate::engine::types::{Message, Session};
use crate::events::hook::Event;
use crate::store::captured_message::CapturedMessage;
use log::debug;
use std::sync::Arc;
use uuid::Uuid;

/// Mutation notifications, emitted synchronously after each mutation has been
/// applied, never before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    MessageAdded(Uuid),
    MessagesRemoved(Vec<Uuid>),
    SessionAdded(Uuid),
    SessionsRemoved(Vec<Uuid>),
    Cleared,
}

/// Bounded, insertion-ordered collections of captured messages and sessions.
///
/// Consistency rules:
/// - the message collection never exceeds `max_messages` (0 = unbounded);
///   the oldest messages are evicted first, repeatedly, so a bound lowered at
///   runtime self-corrects on the next insert;
/// - a session with no remaining associated messages is pruned;
/// - deleting a session removes every message it owned;
/// - `clear` empties both collections before a single notification, so no
///   observer sees messages empty while sessions are not.
///
/// The store performs no internal locking. Engine callbacks arrive on the
/// engine's execution context; a consumer owning this store must marshal all
/// mutation onto its own single-writer context.
pub struct CaptureStore {
    messages: Vec<Arc<CapturedMessage>>,
    sessions: Vec<Arc<Session>>,
    max_messages: usize,
    changed: Event<StoreChange>,
}

impl CaptureStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            sessions: Vec::new(),
            max_messages,
            changed: Event::new(),
        }
    }

    pub fn changed(&self) -> &Event<StoreChange> {
        &self.changed
    }

    /// Retained messages, oldest first.
    pub fn messages(&self) -> &[Arc<CapturedMessage>] {
        &self.messages
    }

    pub fn sessions(&self) -> &[Arc<Session>] {
        &self.sessions
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Applies on the next insert; nothing is evicted eagerly.
    pub fn set_max_messages(&mut self, max_messages: usize) {
        self.max_messages = max_messages;
    }

    /// Appends a newly received message and enforces the retention bound.
    pub fn push_message(&mut self, message: Message) -> Arc<CapturedMessage> {
        let record = Arc::new(CapturedMessage::new(message));
        self.messages.push(Arc::clone(&record));
        self.changed
            .emit(&StoreChange::MessageAdded(record.message().id()));

        let mut evicted = Vec::new();
        while self.max_messages > 0 && self.messages.len() > self.max_messages {
            evicted.push(self.messages.remove(0).message().id());
        }
        if !evicted.is_empty() {
            debug!("evicted {} message(s) over retention bound", evicted.len());
            self.changed.emit(&StoreChange::MessagesRemoved(evicted));
            self.prune_empty_sessions();
        }

        record
    }

    pub fn push_session(&mut self, session: Session) -> Arc<Session> {
        let record = Arc::new(session);
        self.sessions.push(Arc::clone(&record));
        self.changed.emit(&StoreChange::SessionAdded(record.id));
        record
    }

    /// Removes the given messages, then prunes sessions left without any
    /// associated message.
    pub fn delete_messages(&mut self, ids: &[Uuid]) {
        let removed: Vec<Uuid> = self
            .messages
            .iter()
            .filter(|record| ids.contains(&record.message().id()))
            .map(|record| record.message().id())
            .collect();
        if removed.is_empty() {
            return;
        }

        self.messages
            .retain(|record| !ids.contains(&record.message().id()));
        self.changed.emit(&StoreChange::MessagesRemoved(removed));
        self.prune_empty_sessions();
    }

    /// Removes the given sessions and cascades to every message they owned.
    pub fn delete_sessions(&mut self, ids: &[Uuid]) {
        let removed: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|session| ids.contains(&session.id))
            .map(|session| session.id)
            .collect();
        if removed.is_empty() {
            return;
        }

        self.sessions.retain(|session| !ids.contains(&session.id));
        self.changed
            .emit(&StoreChange::SessionsRemoved(removed.clone()));

        let orphaned: Vec<Uuid> = self
            .messages
            .iter()
            .filter(|record| removed.contains(&record.message().session_id()))
            .map(|record| record.message().id())
            .collect();
        if !orphaned.is_empty() {
            self.messages
                .retain(|record| !removed.contains(&record.message().session_id()));
            self.changed.emit(&StoreChange::MessagesRemoved(orphaned));
        }
    }

    /// Empties both collections atomically with respect to observers: one
    /// notification, after both are empty.
    pub fn clear(&mut self) {
        if self.messages.is_empty() && self.sessions.is_empty() {
            return;
        }
        self.messages.clear();
        self.sessions.clear();
        self.changed.emit(&StoreChange::Cleared);
    }

    fn prune_empty_sessions(&mut self) {
        let pruned: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|session| {
                !self
                    .messages
                    .iter()
                    .any(|record| record.message().session_id() == session.id)
            })
            .map(|session| session.id)
            .collect();
        if !pruned.is_empty() {
            self.sessions.retain(|session| !pruned.contains(&session.id));
            self.changed.emit(&StoreChange::SessionsRemoved(pruned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    fn message(session_id: Uuid, tag: &str) -> Message {
        Message::new(
            session_id,
            format!("{}@example.com", tag),
            vec!["rcpt@example.com".to_string()],
            format!("Subject: {}\r\n\r\nbody\r\n", tag).into_bytes(),
        )
    }

    fn session(id: Uuid, message_ids: Vec<Uuid>) -> Session {
        Session {
            id,
            client_addr: None,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            message_ids,
            log: "220 hello\r\nQUIT\r\n".to_string(),
        }
    }

    fn senders(store: &CaptureStore) -> Vec<String> {
        store
            .messages()
            .iter()
            .map(|record| record.message().from().to_string())
            .collect()
    }

    fn recording(store: &CaptureStore) -> Arc<Mutex<Vec<StoreChange>>> {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        store
            .changed()
            .subscribe(move |change| sink.lock().unwrap().push(change.clone()));
        changes
    }

    #[test]
    fn retention_bound_keeps_the_most_recent_messages_in_order() {
        let mut store = CaptureStore::new(2);
        let sid = Uuid::new_v4();

        store.push_message(message(sid, "a"));
        store.push_message(message(sid, "b"));
        store.push_message(message(sid, "c"));

        assert_eq!(senders(&store), vec!["b@example.com", "c@example.com"]);
    }

    #[test]
    fn zero_bound_means_unbounded() {
        let mut store = CaptureStore::new(0);
        let sid = Uuid::new_v4();
        for n in 0..500 {
            store.push_message(message(sid, &format!("m{}", n)));
        }
        assert_eq!(store.messages().len(), 500);
    }

    #[test]
    fn lowering_the_bound_corrects_on_the_next_insert() {
        let mut store = CaptureStore::new(0);
        let sid = Uuid::new_v4();
        for n in 0..5 {
            store.push_message(message(sid, &format!("m{}", n)));
        }

        store.set_max_messages(2);
        // Nothing is evicted until the next insert.
        assert_eq!(store.messages().len(), 5);

        store.push_message(message(sid, "new"));

        assert_eq!(senders(&store), vec!["m4@example.com", "new@example.com"]);
    }

    #[test]
    fn deleting_all_messages_of_a_session_prunes_the_session() {
        let mut store = CaptureStore::new(0);
        let keep_sid = Uuid::new_v4();
        let drop_sid = Uuid::new_v4();

        let kept = store.push_message(message(keep_sid, "kept"));
        let doomed_a = store.push_message(message(drop_sid, "doomed-a"));
        let doomed_b = store.push_message(message(drop_sid, "doomed-b"));
        store.push_session(session(
            keep_sid,
            vec![kept.message().id()],
        ));
        store.push_session(session(
            drop_sid,
            vec![doomed_a.message().id(), doomed_b.message().id()],
        ));

        // Removing only one of the two leaves the session alone.
        store.delete_messages(&[doomed_a.message().id()]);
        assert_eq!(store.sessions().len(), 2);

        store.delete_messages(&[doomed_b.message().id()]);
        let remaining: Vec<Uuid> = store.sessions().iter().map(|s| s.id).collect();
        assert_eq!(remaining, vec![keep_sid]);
        assert_eq!(store.messages().len(), 1);
    }

    #[test]
    fn deleting_a_session_cascades_to_its_messages() {
        let mut store = CaptureStore::new(0);
        let doomed_sid = Uuid::new_v4();
        let other_sid = Uuid::new_v4();

        let doomed = store.push_message(message(doomed_sid, "doomed"));
        store.push_message(message(other_sid, "other"));
        store.push_session(session(doomed_sid, vec![doomed.message().id()]));
        store.push_session(session(other_sid, vec![]));

        store.delete_sessions(&[doomed_sid]);

        assert_eq!(senders(&store), vec!["other@example.com"]);
        let remaining: Vec<Uuid> = store.sessions().iter().map(|s| s.id).collect();
        assert_eq!(remaining, vec![other_sid]);
    }

    #[test]
    fn eviction_prunes_sessions_whose_messages_are_gone() {
        let mut store = CaptureStore::new(1);
        let old_sid = Uuid::new_v4();
        let new_sid = Uuid::new_v4();

        let old = store.push_message(message(old_sid, "old"));
        store.push_session(session(old_sid, vec![old.message().id()]));

        store.push_message(message(new_sid, "new"));

        assert_eq!(senders(&store), vec!["new@example.com"]);
        assert!(store.sessions().is_empty());
    }

    #[test]
    fn clear_notifies_once_after_both_collections_are_empty() {
        let mut store = CaptureStore::new(0);
        let sid = Uuid::new_v4();
        let msg = store.push_message(message(sid, "a"));
        store.push_session(session(sid, vec![msg.message().id()]));

        let changes = recording(&store);

        store.clear();

        assert!(store.messages().is_empty());
        assert!(store.sessions().is_empty());
        // One notification, after both collections are empty: no observer can
        // see messages gone while sessions remain.
        assert_eq!(*changes.lock().unwrap(), vec![StoreChange::Cleared]);

        // Clearing an empty store notifies nobody.
        store.clear();
        assert_eq!(changes.lock().unwrap().len(), 1);
    }

    #[test]
    fn mutations_notify_after_being_applied() {
        let mut store = CaptureStore::new(2);
        let changes = recording(&store);
        let sid = Uuid::new_v4();

        let a = store.push_message(message(sid, "a"));
        let b = store.push_message(message(sid, "b"));
        store.push_message(message(sid, "c"));

        let log = changes.lock().unwrap().clone();
        assert_eq!(log[0], StoreChange::MessageAdded(a.message().id()));
        assert_eq!(log[1], StoreChange::MessageAdded(b.message().id()));
        // Third insert: added, then the oldest evicted.
        assert!(matches!(log[2], StoreChange::MessageAdded(_)));
        assert_eq!(
            log[3],
            StoreChange::MessagesRemoved(vec![a.message().id()])
        );
    }

    #[test]
    fn deleting_unknown_ids_is_silent() {
        let mut store = CaptureStore::new(0);
        let changes = recording(&store);

        store.delete_messages(&[Uuid::new_v4()]);
        store.delete_sessions(&[Uuid::new_v4()]);

        assert!(changes.lock().unwrap().is_empty());
    }
}
