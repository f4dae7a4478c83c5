//! Snapshot persistence and change notification
//!
//! Every mutation ends with a full-document write to its storage slot and a
//! `SyncEvent` to in-process subscribers. Other contexts sharing the same
//! storage learn about the write by polling: the bus remembers a SHA-256
//! digest of every slot it wrote or read, and any slot whose stored bytes
//! no longer match was rewritten elsewhere. There are no deltas and no
//! merging; the most recent full write wins.

use crate::snapshot::{self, ArchiveDoc, PipelineDoc, SettingsDoc, SnapshotMeta};
use crate::storage::{Slot, StorageBackend};
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::rc::Rc;

/// Where a change came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A mutation in this context
    Local,
    /// A storage rewrite by another context
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Advisory,
    Warning,
}

/// Non-blocking message meant for a toast or banner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn advisory(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Advisory,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }
}

/// Full replacement of one slot's state, or a notice
#[derive(Debug, Clone)]
pub enum Change {
    PipelineReplaced(Rc<PipelineDoc>),
    ArchiveReplaced(Rc<ArchiveDoc>),
    SettingsReplaced(Rc<SettingsDoc>),
    Notice(Notice),
}

#[derive(Debug, Clone)]
pub struct SyncEvent {
    pub origin: Origin,
    pub change: Change,
}

pub type SubscriptionId = u64;

type Listener = Box<dyn FnMut(&SyncEvent)>;

/// A document that owns one storage slot
pub trait SlotDocument: Serialize {
    const SLOT: Slot;

    fn stamp(&mut self, meta: SnapshotMeta);

    fn into_change(self) -> Change;
}

impl SlotDocument for PipelineDoc {
    const SLOT: Slot = Slot::Pipeline;

    fn stamp(&mut self, meta: SnapshotMeta) {
        self.meta = Some(meta);
    }

    fn into_change(self) -> Change {
        Change::PipelineReplaced(Rc::new(self))
    }
}

impl SlotDocument for ArchiveDoc {
    const SLOT: Slot = Slot::Archive;

    fn stamp(&mut self, meta: SnapshotMeta) {
        self.meta = Some(meta);
    }

    fn into_change(self) -> Change {
        Change::ArchiveReplaced(Rc::new(self))
    }
}

impl SlotDocument for SettingsDoc {
    const SLOT: Slot = Slot::Settings;

    fn stamp(&mut self, meta: SnapshotMeta) {
        self.meta = Some(meta);
    }

    fn into_change(self) -> Change {
        Change::SettingsReplaced(Rc::new(self))
    }
}

/// Per-context persistence and notification hub
pub struct SyncBus<B: StorageBackend> {
    backend: B,
    context_id: String,
    revision: u64,
    known: HashMap<Slot, [u8; 32]>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: SubscriptionId,
    persistent: bool,
}

impl<B: StorageBackend> SyncBus<B> {
    pub fn new(backend: B, context_id: String) -> Self {
        let persistent = backend.is_available();
        Self {
            backend,
            context_id,
            revision: 0,
            known: HashMap::new(),
            listeners: Vec::new(),
            next_subscription: 1,
            persistent,
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Number of snapshots this context has written
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// False once a write has failed, until the next write succeeds
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub(crate) fn set_persistent(&mut self, persistent: bool) {
        self.persistent = persistent;
    }

    /// Register a listener; events are delivered synchronously in
    /// registration order
    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&SyncEvent) + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if the subscription was already gone
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    pub fn dispatch(&mut self, event: SyncEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }

    pub fn notify(&mut self, notice: Notice) {
        self.dispatch(SyncEvent {
            origin: Origin::Local,
            change: Change::Notice(notice),
        });
    }

    /// Read a slot and remember its digest so it is not reported as an
    /// external change later
    pub fn read(&mut self, slot: Slot) -> Result<Option<String>> {
        let contents = self.backend.read(slot)?;
        if let Some(text) = &contents {
            self.known.insert(slot, digest(text));
        }
        Ok(contents)
    }

    /// Stamp, persist and broadcast a full slot document
    pub fn publish<D: SlotDocument>(&mut self, mut doc: D) {
        self.revision += 1;
        doc.stamp(SnapshotMeta {
            writer: self.context_id.clone(),
            revision: self.revision,
            written_at: Utc::now(),
        });

        let slot = D::SLOT;
        match snapshot::to_json(&doc) {
            Ok(text) => self.persist(slot, &text),
            Err(e) => tracing::error!(slot = %slot, error = %e, "failed to serialize snapshot"),
        }

        self.dispatch(SyncEvent {
            origin: Origin::Local,
            change: doc.into_change(),
        });
    }

    fn persist(&mut self, slot: Slot, text: &str) {
        match self.backend.write(slot, text) {
            Ok(()) => {
                self.known.insert(slot, digest(text));
                tracing::debug!(slot = %slot, revision = self.revision, "snapshot written");
                if !self.persistent {
                    tracing::info!("storage is writable again");
                    self.persistent = true;
                }
            }
            Err(e) => {
                tracing::error!(slot = %slot, error = %e, "failed to write snapshot");
                if self.persistent {
                    self.persistent = false;
                    self.notify(Notice::warning(
                        "Storage is unavailable. Changes are kept in this window but will not persist.",
                    ));
                }
            }
        }
    }

    /// Slots rewritten by someone else since we last wrote or read them,
    /// with their full new contents
    pub fn poll_changed(&mut self) -> Vec<(Slot, String)> {
        let mut changed = Vec::new();
        for slot in Slot::ALL {
            let text = match self.backend.read(slot) {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(slot = %slot, error = %e, "failed to poll slot");
                    continue;
                }
            };
            let current = digest(&text);
            if self.known.get(&slot) != Some(&current) {
                self.known.insert(slot, current);
                changed.push((slot, text));
            }
        }
        changed
    }
}

fn digest(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::CardStore;
    use crate::card::{NewCard, StageId};
    use crate::storage::MemBackend;
    use std::cell::RefCell;

    fn recorder<B: StorageBackend>(bus: &mut SyncBus<B>) -> Rc<RefCell<Vec<SyncEvent>>> {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        bus.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        events
    }

    #[test]
    fn test_publish_writes_and_notifies() {
        let backend = Rc::new(MemBackend::new());
        let mut bus = SyncBus::new(Rc::clone(&backend), "ctx-a".to_string());
        let events = recorder(&mut bus);

        let mut store = CardStore::new("card");
        store.add_card(StageId::Ideate, NewCard::titled("A"));
        bus.publish(PipelineDoc::capture(&store));

        let stored = backend.read(Slot::Pipeline).unwrap().unwrap();
        let doc = snapshot::parse_pipeline(&stored).unwrap();
        assert_eq!(doc.meta.as_ref().unwrap().writer, "ctx-a");
        assert_eq!(doc.meta.as_ref().unwrap().revision, 1);
        assert_eq!(bus.revision(), 1);

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        match &events[0].change {
            Change::PipelineReplaced(doc) => assert_eq!(doc.cards.len(), 1),
            other => panic!("unexpected change {:?}", other),
        }
    }

    #[test]
    fn test_own_writes_are_not_external() {
        let backend = Rc::new(MemBackend::new());
        let mut bus = SyncBus::new(Rc::clone(&backend), "ctx-a".to_string());
        bus.publish(SettingsDoc::capture(&crate::checklist::Checklist::default()));
        assert!(bus.poll_changed().is_empty());

        backend.seed(Slot::Settings, r#"{"version":2,"editing_checklist":[]}"#);
        let changed = bus.poll_changed();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].0, Slot::Settings);
        assert!(bus.poll_changed().is_empty());
    }

    #[test]
    fn test_write_failure_warns_once() {
        let backend = Rc::new(MemBackend::new());
        let mut bus = SyncBus::new(Rc::clone(&backend), "ctx-a".to_string());
        let events = recorder(&mut bus);
        backend.set_simulate_write_error(true);

        let store = CardStore::new("card");
        bus.publish(PipelineDoc::capture(&store));
        bus.publish(PipelineDoc::capture(&store));
        assert!(!bus.is_persistent());

        let notices = events
            .borrow()
            .iter()
            .filter(|e| matches!(e.change, Change::Notice(_)))
            .count();
        assert_eq!(notices, 1);

        backend.set_simulate_write_error(false);
        bus.publish(PipelineDoc::capture(&store));
        assert!(bus.is_persistent());
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = SyncBus::new(MemBackend::new(), "ctx-a".to_string());
        let events = recorder(&mut bus);
        let id = bus.subscribe(|_| {});
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.notify(Notice::advisory("hello"));
        assert_eq!(events.borrow().len(), 1);
    }
}
