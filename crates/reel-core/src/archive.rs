//! Archive of finished cards and repurposing back into the pipeline

use crate::board::CardStore;
use crate::card::{Card, StageId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Retired cards, keyed by their original id
#[derive(Debug, Clone, Default)]
pub struct ArchiveStore {
    cards: HashMap<String, Card>,
}

impl ArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from persisted cards. Cards missing `archived_at` get their
    /// last update time; the count of such repairs is returned.
    pub fn restore(cards: impl IntoIterator<Item = Card>) -> (Self, usize) {
        let mut repairs = 0;
        let cards = cards
            .into_iter()
            .map(|mut card| {
                if card.archived_at.is_none() {
                    card.archived_at = Some(card.updated_at);
                    repairs += 1;
                }
                (card.id.clone(), card)
            })
            .collect();
        (Self { cards }, repairs)
    }

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

    /// Archived cards, most recently archived first
    pub fn recent(&self) -> Vec<&Card> {
        let mut cards: Vec<&Card> = self.cards.values().collect();
        cards.sort_by(|a, b| b.archived_at.cmp(&a.archived_at).then_with(|| a.id.cmp(&b.id)));
        cards
    }

    /// Case-insensitive substring search over title, hook and script.
    /// A blank query returns the whole archive.
    pub fn search(&self, query: &str) -> Vec<&Card> {
        let needle = query.trim().to_lowercase();
        let mut cards = self.recent();
        if !needle.is_empty() {
            cards.retain(|c| c.matches(&needle));
        }
        cards
    }

    fn insert(&mut self, card: Card) -> &Card {
        let id = card.id.clone();
        self.cards.insert(id.clone(), card);
        &self.cards[&id]
    }

    /// Permanently drop an archived card
    pub fn remove(&mut self, id: &str) -> Result<Card> {
        self.cards
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    /// Drop archived ids that also appear in `store` from the pipeline side.
    /// Used on load: the archive slot is written first, so a card found in
    /// both places was mid-archive when the write stopped.
    pub(crate) fn claim_duplicates(&self, store: &mut CardStore) -> Vec<String> {
        let duplicates: Vec<String> = self
            .cards
            .keys()
            .filter(|id| store.contains(id))
            .cloned()
            .collect();
        for id in &duplicates {
            let _ = store.remove_card(id);
        }
        duplicates
    }
}

/// Move a card by identity from the pipeline into the archive
pub fn archive<'a>(
    store: &mut CardStore,
    archive: &'a mut ArchiveStore,
    card_id: &str,
) -> Result<&'a Card> {
    archive_at(store, archive, card_id, Utc::now())
}

pub(crate) fn archive_at<'a>(
    store: &mut CardStore,
    archive: &'a mut ArchiveStore,
    card_id: &str,
    now: DateTime<Utc>,
) -> Result<&'a Card> {
    let mut card = store.remove_card(card_id)?;
    card.archived_at = Some(now);
    card.updated_at = now;
    Ok(archive.insert(card))
}

/// Archive every completed card of a stage, returning their ids
pub fn archive_completed(
    store: &mut CardStore,
    archive: &mut ArchiveStore,
    stage: StageId,
) -> Vec<String> {
    let ids: Vec<String> = store
        .stage_cards(stage)
        .into_iter()
        .filter(|c| c.completed)
        .map(|c| c.id.clone())
        .collect();
    let now = Utc::now();
    for id in &ids {
        // Ids come from the store itself
        let _ = archive_at(store, archive, id, now);
    }
    ids
}

/// Clone an archived card's creative content into a new pipeline card.
///
/// The archived original is left as it is and can be repurposed again.
pub fn repurpose<'a>(
    archive: &ArchiveStore,
    store: &'a mut CardStore,
    card_id: &str,
    target: StageId,
) -> Result<&'a Card> {
    let original = archive
        .get(card_id)
        .ok_or_else(|| Error::NotFound(format!("archived card {}", card_id)))?;
    let id = store.fresh_id(|candidate| archive.contains(candidate));
    let card = original.repurposed(id, target);
    Ok(store.insert_card(card))
}
