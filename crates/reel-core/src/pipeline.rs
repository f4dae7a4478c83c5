//! The per-context pipeline service
//!
//! One `Pipeline` exists per window or process. `init` performs the cold
//! read from storage; after that every operation mutates the in-memory
//! stores and ends with a full snapshot write plus a `SyncEvent`.
//!
//! Operations that name a card which no longer exists (typically deleted
//! from another window) are absorbed: they log a warning, emit an advisory
//! notice and return `false` instead of failing.

use crate::archive::{self, ArchiveStore};
use crate::board::CardStore;
use crate::card::{Card, CardPatch, NewCard, StageId, parse_date};
use crate::checklist::Checklist;
use crate::config::{CONFIG_FILE, Config};
use crate::schedule::{self, ScheduleEntry};
use crate::snapshot::{self, ArchiveDoc, PipelineDoc, SettingsDoc};
use crate::storage::{FsBackend, Slot, StorageBackend};
use crate::sync::{Change, Notice, Origin, SubscriptionId, SyncBus, SyncEvent};
use crate::Result;
use chrono::NaiveDate;
use std::path::Path;
use std::rc::Rc;

/// Which slots a mutation rewrote
#[derive(Debug, Clone, Copy)]
enum Touched {
    Pipeline,
    Archive,
    Both,
    Settings,
    SettingsAndPipeline,
}

pub struct Pipeline<B: StorageBackend> {
    config: Config,
    board: CardStore,
    archive: ArchiveStore,
    checklist: Checklist,
    bus: SyncBus<B>,
    startup_notices: Vec<Notice>,
}

impl Pipeline<FsBackend> {
    /// Open the pipeline stored in `dir`, reading `config.toml` from there
    pub fn open(dir: &Path) -> Result<Self> {
        let config = Config::load(&dir.join(CONFIG_FILE))?;
        Ok(Self::init(FsBackend::new(dir), config))
    }

    /// Open the pipeline in the platform data directory
    pub fn open_default() -> Result<Self> {
        Self::open(&Config::default_data_dir()?)
    }
}

impl<B: StorageBackend> Pipeline<B> {
    /// Cold read of every slot. Never fails: unreadable or malformed slots
    /// fall back to their defaults and are reported in `startup_notices`.
    pub fn init(backend: B, config: Config) -> Self {
        let context_id = crate::id::generate_id("ctx");
        let mut bus = SyncBus::new(backend, context_id);
        let mut notices = Vec::new();
        let prefix = config.id_prefix.clone();

        if !bus.is_persistent() {
            tracing::error!("storage is unavailable, running in memory only");
            notices.push(Notice::warning(
                "Storage is unavailable. Changes will not persist.",
            ));
        }

        let mut board = match cold_read(&mut bus, Slot::Pipeline, snapshot::parse_pipeline, &mut notices) {
            Some(doc) => {
                let (store, repairs) = doc.into_store(&prefix);
                if repairs > 0 {
                    tracing::warn!(repairs, "repaired pipeline layout on load");
                }
                store
            }
            None => CardStore::new(&prefix),
        };

        let archive = match cold_read(&mut bus, Slot::Archive, snapshot::parse_archive, &mut notices) {
            Some(doc) => {
                let (archive, repairs) = doc.into_archive();
                if repairs > 0 {
                    tracing::warn!(repairs, "stamped archived cards missing archived_at");
                }
                archive
            }
            None => ArchiveStore::new(),
        };

        let checklist = cold_read(&mut bus, Slot::Settings, snapshot::parse_settings, &mut notices)
            .map(SettingsDoc::into_checklist)
            .unwrap_or_default();

        let duplicates = archive.claim_duplicates(&mut board);
        if !duplicates.is_empty() {
            tracing::warn!(count = duplicates.len(), "cards found in both pipeline and archive, kept archived");
        }

        tracing::info!(
            context = bus.context_id(),
            cards = board.len(),
            archived = archive.len(),
            "pipeline loaded"
        );

        Self {
            config,
            board,
            archive,
            checklist,
            bus,
            startup_notices: notices,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read access to the card store
    pub fn cards(&self) -> &CardStore {
        &self.board
    }

    pub fn archive(&self) -> &ArchiveStore {
        &self.archive
    }

    pub fn checklist(&self) -> &Checklist {
        &self.checklist
    }

    pub fn context_id(&self) -> &str {
        self.bus.context_id()
    }

    /// False while storage writes are failing
    pub fn is_persistent(&self) -> bool {
        self.bus.is_persistent()
    }

    /// Problems found during `init`, for display once a view is up
    pub fn startup_notices(&self) -> &[Notice] {
        &self.startup_notices
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&SyncEvent) + 'static,
    {
        self.bus.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    // --- Card store ---

    /// Create a card at the end of `stage`. The id is unique across the
    /// pipeline and the archive.
    pub fn add_card(&mut self, stage: StageId, data: NewCard) -> Card {
        let archive = &self.archive;
        let card = self
            .board
            .add_card_avoiding(stage, data, |candidate| archive.contains(candidate))
            .clone();
        tracing::debug!(card = %card.id, stage = %stage, "card added");
        self.publish(Touched::Pipeline);
        card
    }

    pub fn move_card(&mut self, card_id: &str, target: StageId, target_index: usize) -> bool {
        let result = self.board.move_card(card_id, target, target_index);
        self.settle("move", card_id, result, Touched::Pipeline).is_some()
    }

    pub fn reorder_within_stage(&mut self, stage: StageId, card_id: &str, target_index: usize) -> bool {
        let result = self.board.reorder_within_stage(stage, card_id, target_index);
        self.settle("reorder", card_id, result, Touched::Pipeline).is_some()
    }

    pub fn update_card(&mut self, card_id: &str, patch: CardPatch) -> bool {
        let result = self.board.update_card(card_id, patch).map(|_| ());
        self.settle("update", card_id, result, Touched::Pipeline).is_some()
    }

    pub fn remove_card(&mut self, card_id: &str) -> bool {
        let result = self.board.remove_card(card_id).map(|_| ());
        self.settle("remove", card_id, result, Touched::Pipeline).is_some()
    }

    pub fn set_pinned(&mut self, card_id: &str, pinned: bool) -> bool {
        let result = self.board.set_pinned(card_id, pinned);
        self.settle("pin", card_id, result, Touched::Pipeline).is_some()
    }

    pub fn set_completed(&mut self, card_id: &str, completed: bool) -> bool {
        let result = self.board.set_completed(card_id, completed);
        self.settle("complete", card_id, result, Touched::Pipeline).is_some()
    }

    // --- Schedule ---

    pub fn schedule(&mut self, card_id: &str, date: NaiveDate) -> bool {
        let result = schedule::schedule(&mut self.board, card_id, date);
        self.settle("schedule", card_id, result, Touched::Pipeline).is_some()
    }

    /// Schedule from a `YYYY-MM-DD` string; a malformed date is rejected
    pub fn schedule_on(&mut self, card_id: &str, date: &str) -> Result<bool> {
        let date = parse_date(date)?;
        Ok(self.schedule(card_id, date))
    }

    /// Clear a card's date, falling back to the configured status
    pub fn unschedule(&mut self, card_id: &str) -> bool {
        let result = schedule::unschedule(&mut self.board, card_id, self.config.unschedule_to);
        self.settle("unschedule", card_id, result, Touched::Pipeline).is_some()
    }

    pub fn mark_to_schedule(&mut self, card_id: &str) -> bool {
        let result = schedule::mark_to_schedule(&mut self.board, card_id);
        self.settle("queue for scheduling", card_id, result, Touched::Pipeline)
            .is_some()
    }

    pub fn cards_on_date(&self, date: NaiveDate) -> Vec<&Card> {
        schedule::cards_on_date(&self.board, date)
    }

    pub fn entries_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<ScheduleEntry> {
        schedule::entries_between(&self.board, start, end)
    }

    pub fn month_entries(&self, year: i32, month: u32) -> Result<Vec<ScheduleEntry>> {
        schedule::month_entries(&self.board, year, month)
    }

    pub fn awaiting_schedule(&self) -> Vec<&Card> {
        schedule::awaiting_schedule(&self.board)
    }

    // --- Archive ---

    pub fn archive_card(&mut self, card_id: &str) -> bool {
        let result = archive::archive(&mut self.board, &mut self.archive, card_id).map(|_| ());
        self.settle("archive", card_id, result, Touched::Both).is_some()
    }

    /// Archive every completed card in `stage`
    pub fn archive_completed(&mut self, stage: StageId) -> Vec<String> {
        let ids = archive::archive_completed(&mut self.board, &mut self.archive, stage);
        if !ids.is_empty() {
            tracing::debug!(count = ids.len(), stage = %stage, "archived completed cards");
            self.publish(Touched::Both);
        }
        ids
    }

    /// Archive search, capped by `search.max_results`
    pub fn search(&self, query: &str) -> Vec<&Card> {
        let mut results = self.archive.search(query);
        if let Some(max) = self.config.search.max_results {
            results.truncate(max);
        }
        results
    }

    /// Clone an archived card into the pipeline (default stage from config).
    /// A missing archive entry is returned as `Error::NotFound`.
    pub fn repurpose(&mut self, card_id: &str, target: Option<StageId>) -> Result<Card> {
        let target = target.unwrap_or(self.config.repurpose_stage);
        match archive::repurpose(&self.archive, &mut self.board, card_id, target) {
            Ok(card) => {
                let card = card.clone();
                tracing::debug!(from = card_id, card = %card.id, stage = %target, "card repurposed");
                self.publish(Touched::Pipeline);
                Ok(card)
            }
            Err(e) => {
                tracing::warn!(card = card_id, error = %e, "repurpose failed");
                self.bus.notify(Notice::advisory(
                    "That archived item is no longer available to repurpose.",
                ));
                Err(e)
            }
        }
    }

    /// Permanently delete an archived card
    pub fn delete_archived(&mut self, card_id: &str) -> bool {
        let result = self.archive.remove(card_id).map(|_| ());
        self.settle("delete archived", card_id, result, Touched::Archive)
            .is_some()
    }

    // --- Shared editing checklist ---

    pub fn add_checklist_item(&mut self, label: &str) -> Result<String> {
        let id = self.checklist.add(label)?;
        self.publish(Touched::Settings);
        Ok(id)
    }

    pub fn rename_checklist_item(&mut self, item_id: &str, label: &str) -> bool {
        let result = self.checklist.rename(item_id, label);
        self.settle("rename checklist item", item_id, result, Touched::Settings)
            .is_some()
    }

    pub fn remove_checklist_item(&mut self, item_id: &str) -> bool {
        let result = self.checklist.remove(item_id, &mut self.board);
        self.settle(
            "remove checklist item",
            item_id,
            result,
            Touched::SettingsAndPipeline,
        )
        .is_some()
    }

    /// Flip a checklist item on a card; `None` if card or item is gone
    pub fn toggle_checklist_item(&mut self, card_id: &str, item_id: &str) -> Option<bool> {
        let result = self.checklist.toggle(&mut self.board, card_id, item_id);
        self.settle("toggle checklist item", card_id, result, Touched::Pipeline)
    }

    // --- Cross-context sync ---

    /// Pick up snapshots written by other contexts.
    ///
    /// Each rewritten slot replaces local state wholesale and is re-sent to
    /// local subscribers as an external change. Returns how many slots were
    /// replaced. Malformed external writes are skipped and local state kept.
    ///
    /// Events go out only after every slot is applied and cards present in
    /// both pipeline and archive are resolved, so each payload matches the
    /// engine state.
    pub fn poll_external(&mut self) -> usize {
        let mut changes = Vec::new();
        let mut pipeline_meta = None;
        for (slot, text) in self.bus.poll_changed() {
            let applied = match slot {
                Slot::Pipeline => snapshot::parse_pipeline(&text).map(|doc| {
                    pipeline_meta = doc.meta.clone();
                    let (store, _) = doc.into_store(&self.config.id_prefix);
                    self.board = store;
                    None
                }),
                Slot::Archive => snapshot::parse_archive(&text).map(|doc| {
                    let meta = doc.meta.clone();
                    let (archive, _) = doc.into_archive();
                    self.archive = archive;
                    let mut current = ArchiveDoc::capture(&self.archive);
                    current.meta = meta;
                    Some(Change::ArchiveReplaced(Rc::new(current)))
                }),
                Slot::Settings => snapshot::parse_settings(&text).map(|doc| {
                    self.checklist = doc.clone().into_checklist();
                    Some(Change::SettingsReplaced(Rc::new(doc)))
                }),
            };

            match applied {
                Ok(change) => {
                    tracing::debug!(slot = %slot, "applied external snapshot");
                    changes.push((slot, change));
                }
                Err(e) => {
                    tracing::warn!(slot = %slot, error = %e, "ignoring unreadable external snapshot");
                    self.bus.notify(Notice::advisory(
                        "Another window saved data this one could not read; keeping the current view.",
                    ));
                }
            }
        }

        if changes.is_empty() {
            return 0;
        }
        let replaced = changes.len();

        let duplicates = self.archive.claim_duplicates(&mut self.board);
        if !duplicates.is_empty() {
            tracing::warn!(count = duplicates.len(), "dropped pipeline copies of archived cards");
        }

        let board_changed = changes.iter().any(|(slot, _)| *slot == Slot::Pipeline);
        if board_changed || !duplicates.is_empty() {
            let mut current = PipelineDoc::capture(&self.board);
            current.meta = pipeline_meta;
            if let Some(entry) = changes.iter_mut().find(|(slot, _)| *slot == Slot::Pipeline) {
                entry.1 = Some(Change::PipelineReplaced(Rc::new(current)));
            } else {
                changes.push((Slot::Pipeline, Some(Change::PipelineReplaced(Rc::new(current)))));
            }
        }

        for change in changes.into_iter().filter_map(|(_, change)| change) {
            self.bus.dispatch(SyncEvent {
                origin: Origin::External,
                change,
            });
        }
        replaced
    }

    /// Write every slot, e.g. to seed fresh storage
    pub fn flush(&mut self) {
        self.publish(Touched::Both);
        self.publish(Touched::Settings);
    }

    /// Persist and announce the outcome of a fallible mutation.
    /// Stale references become a logged no-op with an advisory notice.
    fn settle<T>(&mut self, op: &str, target: &str, result: Result<T>, touched: Touched) -> Option<T> {
        match result {
            Ok(value) => {
                tracing::debug!(op, target, "applied");
                self.publish(touched);
                Some(value)
            }
            Err(e) => {
                if e.is_stale_reference() {
                    tracing::warn!(op, target, error = %e, "ignored stale operation");
                } else {
                    tracing::error!(op, target, error = %e, "operation failed");
                }
                self.bus.notify(Notice::advisory(format!("Could not {}: {}", op, e)));
                None
            }
        }
    }

    /// Archive goes out before pipeline so an interrupted pair of writes
    /// leaves a card duplicated rather than lost.
    fn publish(&mut self, touched: Touched) {
        match touched {
            Touched::Pipeline => self.bus.publish(PipelineDoc::capture(&self.board)),
            Touched::Archive => self.bus.publish(ArchiveDoc::capture(&self.archive)),
            Touched::Both => {
                self.bus.publish(ArchiveDoc::capture(&self.archive));
                self.bus.publish(PipelineDoc::capture(&self.board));
            }
            Touched::Settings => self.bus.publish(SettingsDoc::capture(&self.checklist)),
            Touched::SettingsAndPipeline => {
                self.bus.publish(SettingsDoc::capture(&self.checklist));
                self.bus.publish(PipelineDoc::capture(&self.board));
            }
        }
    }
}

/// Read and parse one slot at startup, falling back to `None` on any error
fn cold_read<B, D>(
    bus: &mut SyncBus<B>,
    slot: Slot,
    parse: impl Fn(&str) -> Result<D>,
    notices: &mut Vec<Notice>,
) -> Option<D>
where
    B: StorageBackend,
{
    let text = match bus.read(slot) {
        Ok(Some(text)) => text,
        Ok(None) => return None,
        Err(e) => {
            tracing::error!(slot = %slot, error = %e, "failed to read slot");
            if bus.is_persistent() {
                bus.set_persistent(false);
                notices.push(Notice::warning(
                    "Storage could not be read. Changes will not persist.",
                ));
            }
            return None;
        }
    };

    match parse(&text) {
        Ok(doc) => Some(doc),
        Err(e) => {
            tracing::warn!(slot = %slot, error = %e, "unreadable snapshot, starting from defaults");
            notices.push(Notice::advisory(format!(
                "Saved {} data could not be read and was reset.",
                slot
            )));
            None
        }
    }
}
