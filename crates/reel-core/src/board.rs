//! In-memory card store: stage membership and per-stage ordering
//!
//! Stages hold ordered id lists; cards live in one map keyed by id. After
//! every mutation the `order` field of each card in a touched stage equals
//! its position in that stage's list.

use crate::card::{Card, CardPatch, NewCard, StageId};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};

/// One pipeline column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub id: StageId,
    pub card_ids: Vec<String>,
}

impl Stage {
    fn empty(id: StageId) -> Self {
        Self {
            id,
            card_ids: Vec::new(),
        }
    }

    pub fn title(&self) -> &'static str {
        self.id.title()
    }

    pub fn len(&self) -> usize {
        self.card_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.card_ids.is_empty()
    }

    fn position(&self, card_id: &str) -> Option<usize> {
        self.card_ids.iter().position(|id| id == card_id)
    }
}

/// Canonical pipeline state
#[derive(Debug, Clone)]
pub struct CardStore {
    prefix: String,
    stages: Vec<Stage>,
    cards: HashMap<String, Card>,
}

impl CardStore {
    /// Empty pipeline with the six fixed stages
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            stages: StageId::ALL.into_iter().map(Stage::empty).collect(),
            cards: HashMap::new(),
        }
    }

    /// Rebuild a store from persisted parts, repairing drift.
    ///
    /// Stage lists decide membership. Ids without a card and repeated ids
    /// are dropped, cards missing from every list are appended to the stage
    /// they claim, and all orders are renumbered. Returns the number of
    /// repairs made.
    pub fn restore(
        prefix: &str,
        layout: Vec<(StageId, Vec<String>)>,
        cards: impl IntoIterator<Item = Card>,
    ) -> (Self, usize) {
        let mut store = Self::new(prefix);
        store.cards = cards.into_iter().map(|c| (c.id.clone(), c)).collect();

        let mut repairs = 0;
        let mut placed = HashSet::new();
        for (stage_id, ids) in layout {
            for id in ids {
                let Some(card) = store.cards.get_mut(&id) else {
                    repairs += 1;
                    continue;
                };
                if !placed.insert(id.clone()) {
                    repairs += 1;
                    continue;
                }
                if card.stage != stage_id {
                    card.stage = stage_id;
                    repairs += 1;
                }
                store.stages[stage_id.index()].card_ids.push(id);
            }
        }

        let mut orphans: Vec<&Card> = store
            .cards
            .values()
            .filter(|c| !placed.contains(&c.id))
            .collect();
        orphans.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        let orphans: Vec<(StageId, String)> =
            orphans.into_iter().map(|c| (c.stage, c.id.clone())).collect();
        for (stage_id, id) in orphans {
            store.stages[stage_id.index()].card_ids.push(id);
            repairs += 1;
        }

        for stage_id in StageId::ALL {
            for (index, id) in store.stages[stage_id.index()].card_ids.iter().enumerate() {
                if let Some(card) = store.cards.get_mut(id)
                    && card.order != index
                {
                    card.order = index;
                    repairs += 1;
                }
            }
        }

        (store, repairs)
    }

    /// ID prefix used for new cards
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// All stages in pipeline order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, id: StageId) -> &Stage {
        &self.stages[id.index()]
    }

    /// Get a card by ID
    pub fn get(&self, id: &str) -> Option<&Card> {
        self.cards.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cards.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// All cards, unordered
    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.cards.values()
    }

    /// Cards of one stage in display order
    pub fn stage_cards(&self, stage: StageId) -> Vec<&Card> {
        self.stage(stage)
            .card_ids
            .iter()
            .filter_map(|id| self.cards.get(id))
            .collect()
    }

    /// Pinned cards in pipeline order
    pub fn pinned_cards(&self) -> Vec<&Card> {
        StageId::ALL
            .into_iter()
            .flat_map(|stage| self.stage_cards(stage))
            .filter(|c| c.pinned)
            .collect()
    }

    /// Number of cards per stage, in pipeline order
    pub fn stage_counts(&self) -> Vec<(StageId, usize)> {
        self.stages.iter().map(|s| (s.id, s.len())).collect()
    }

    /// Create a card at the end of `stage`
    pub fn add_card(&mut self, stage: StageId, data: NewCard) -> &Card {
        self.add_card_avoiding(stage, data, |_| false)
    }

    /// Like `add_card`, but the new id also avoids every id `also_taken`
    /// reports, e.g. ids held by the archive
    pub(crate) fn add_card_avoiding(
        &mut self,
        stage: StageId,
        data: NewCard,
        also_taken: impl Fn(&str) -> bool,
    ) -> &Card {
        let id = self.fresh_id(also_taken);
        let mut card = Card::new(id, data.title, stage);
        card.hook = data.hook.filter(|h| !h.is_empty());
        card.script = data.script.filter(|s| !s.is_empty());
        card.formats = data.formats;
        card.platforms = data.platforms;
        self.insert_card(card)
    }

    /// Generate an id that is unused by this store and `also_taken`
    pub(crate) fn fresh_id(&self, also_taken: impl Fn(&str) -> bool) -> String {
        crate::id::generate_unique_id(&self.prefix, |candidate| {
            self.cards.contains_key(candidate) || also_taken(candidate)
        })
    }

    /// Append an already-built card to the end of its stage
    pub(crate) fn insert_card(&mut self, mut card: Card) -> &Card {
        let stage = &mut self.stages[card.stage.index()];
        card.order = stage.len();
        card.archived_at = None;
        stage.card_ids.push(card.id.clone());
        let id = card.id.clone();
        self.cards.entry(id).or_insert(card)
    }

    /// Move a card to `target` at `target_index` (clamped to the stage end)
    pub fn move_card(&mut self, card_id: &str, target: StageId, target_index: usize) -> Result<()> {
        let source = self
            .cards
            .get(card_id)
            .map(|c| c.stage)
            .ok_or_else(|| Error::NotFound(card_id.to_string()))?;

        let source_stage = &mut self.stages[source.index()];
        let position = source_stage.position(card_id).ok_or_else(|| {
            Error::InvalidState(format!("{} is missing from stage {}", card_id, source))
        })?;
        source_stage.card_ids.remove(position);

        let target_stage = &mut self.stages[target.index()];
        let index = target_index.min(target_stage.len());
        target_stage.card_ids.insert(index, card_id.to_string());

        if let Some(card) = self.cards.get_mut(card_id) {
            card.stage = target;
            card.touch();
        }
        self.renumber(source);
        if target != source {
            self.renumber(target);
        }
        Ok(())
    }

    /// Move a card to a new position inside the stage it already occupies
    pub fn reorder_within_stage(
        &mut self,
        stage: StageId,
        card_id: &str,
        target_index: usize,
    ) -> Result<()> {
        let current = self
            .cards
            .get(card_id)
            .map(|c| c.stage)
            .ok_or_else(|| Error::NotFound(card_id.to_string()))?;
        if current != stage {
            return Err(Error::InvalidState(format!(
                "{} is in stage {}, not {}",
                card_id, current, stage
            )));
        }
        self.move_card(card_id, stage, target_index)
    }

    /// Merge creative fields into a card
    pub fn update_card(&mut self, card_id: &str, patch: CardPatch) -> Result<&Card> {
        let card = self
            .cards
            .get_mut(card_id)
            .ok_or_else(|| Error::NotFound(card_id.to_string()))?;
        card.apply(patch);
        Ok(card)
    }

    pub fn set_pinned(&mut self, card_id: &str, pinned: bool) -> Result<()> {
        self.modify(card_id, |card| card.pinned = pinned)
    }

    pub fn set_completed(&mut self, card_id: &str, completed: bool) -> Result<()> {
        self.modify(card_id, |card| card.completed = completed)
    }

    /// Apply `f` to a card and bump its timestamp
    pub(crate) fn modify(&mut self, card_id: &str, f: impl FnOnce(&mut Card)) -> Result<()> {
        let card = self
            .cards
            .get_mut(card_id)
            .ok_or_else(|| Error::NotFound(card_id.to_string()))?;
        f(card);
        card.touch();
        Ok(())
    }

    /// Take a card out of the pipeline, renumbering its former stage
    pub fn remove_card(&mut self, card_id: &str) -> Result<Card> {
        let card = self
            .cards
            .remove(card_id)
            .ok_or_else(|| Error::NotFound(card_id.to_string()))?;
        self.stages[card.stage.index()]
            .card_ids
            .retain(|id| id != card_id);
        self.renumber(card.stage);
        Ok(card)
    }

    /// Reassign dense 0..n-1 orders within a stage
    fn renumber(&mut self, stage: StageId) {
        let Self { stages, cards, .. } = self;
        for (index, id) in stages[stage.index()].card_ids.iter().enumerate() {
            if let Some(card) = cards.get_mut(id) {
                card.order = index;
            }
        }
    }

    /// Verify membership and ordering invariants
    pub fn check_invariants(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            for (index, id) in stage.card_ids.iter().enumerate() {
                let card = self
                    .cards
                    .get(id)
                    .ok_or_else(|| Error::InvalidState(format!("{} listed but missing", id)))?;
                if !seen.insert(id.as_str()) {
                    return Err(Error::InvalidState(format!("{} listed twice", id)));
                }
                if card.stage != stage.id || card.order != index {
                    return Err(Error::InvalidState(format!(
                        "{} at {}#{} claims {}#{}",
                        id, stage.id, index, card.stage, card.order
                    )));
                }
            }
        }
        if seen.len() != self.cards.len() {
            return Err(Error::InvalidState(format!(
                "{} cards are not in any stage",
                self.cards.len() - seen.len()
            )));
        }
        Ok(())
    }
}
