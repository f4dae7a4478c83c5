//! Shared editing checklist
//!
//! One template of items is reused by every card; cards only record which
//! item ids they have checked.

use crate::board::CardStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ITEMS: [&str; 5] = [
    "Trim dead air",
    "Add captions",
    "Color grade",
    "Add music",
    "Export & review",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub label: String,
}

/// Ordered checklist template shared by all cards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    items: Vec<ChecklistItem>,
}

impl Default for Checklist {
    fn default() -> Self {
        let items = DEFAULT_ITEMS
            .iter()
            .enumerate()
            .map(|(index, label)| ChecklistItem {
                id: format!("edit-{}", index + 1),
                label: label.to_string(),
            })
            .collect();
        Self { items }
    }
}

impl Checklist {
    pub fn from_items(items: Vec<ChecklistItem>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[ChecklistItem] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&ChecklistItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Append an item, returning its id
    pub fn add(&mut self, label: &str) -> Result<String> {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::InvalidState("checklist label is empty".to_string()));
        }
        let id = crate::id::generate_unique_id("edit", |candidate| self.get(candidate).is_some());
        self.items.push(ChecklistItem {
            id: id.clone(),
            label: label.to_string(),
        });
        Ok(id)
    }

    pub fn rename(&mut self, id: &str, label: &str) -> Result<()> {
        let label = label.trim();
        if label.is_empty() {
            return Err(Error::InvalidState("checklist label is empty".to_string()));
        }
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| Error::NotFound(format!("checklist item {}", id)))?;
        item.label = label.to_string();
        Ok(())
    }

    /// Remove an item from the template and from every card's checked set
    pub fn remove(&mut self, id: &str, store: &mut CardStore) -> Result<()> {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        if self.items.len() == before {
            return Err(Error::NotFound(format!("checklist item {}", id)));
        }

        let holders: Vec<String> = store
            .cards()
            .filter(|c| c.editing.checked.contains(id))
            .map(|c| c.id.clone())
            .collect();
        for card_id in holders {
            store.modify(&card_id, |card| {
                card.editing.checked.remove(id);
            })?;
        }
        Ok(())
    }

    /// Flip one item on a card, returning the new checked state
    pub fn toggle(&self, store: &mut CardStore, card_id: &str, item_id: &str) -> Result<bool> {
        if self.get(item_id).is_none() {
            return Err(Error::NotFound(format!("checklist item {}", item_id)));
        }
        let mut checked = false;
        store.modify(card_id, |card| {
            checked = if card.editing.checked.remove(item_id) {
                false
            } else {
                card.editing.checked.insert(item_id.to_string())
            };
        })?;
        Ok(checked)
    }

    /// Fraction of template items checked on a card (0.0 for an empty template)
    pub fn progress(&self, store: &CardStore, card_id: &str) -> Result<f32> {
        let card = store
            .get(card_id)
            .ok_or_else(|| Error::NotFound(card_id.to_string()))?;
        if self.items.is_empty() {
            return Ok(0.0);
        }
        let done = self
            .items
            .iter()
            .filter(|item| card.editing.checked.contains(&item.id))
            .count();
        Ok(done as f32 / self.items.len() as f32)
    }
}
