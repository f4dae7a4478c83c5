//! Persisted snapshot documents
//!
//! Each storage slot holds one versioned JSON document with the complete
//! state of that slot. Version 1 documents kept hook, storyboard, filming
//! and editing notes inside an embedded JSON string (`extra`); they are
//! normalized into the typed schema once, when read.

use crate::archive::ArchiveStore;
use crate::board::CardStore;
use crate::card::{Card, FilmingDetails, Scene, StageId};
use crate::checklist::{Checklist, ChecklistItem};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Current document version
pub const SNAPSHOT_VERSION: u32 = 2;

/// Who wrote a snapshot, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Id of the writing context
    pub writer: String,
    /// Per-writer counter, increases with every write
    pub revision: u64,
    pub written_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub id: StageId,
    pub title: String,
    pub card_ids: Vec<String>,
}

/// Pipeline slot: ordered stages and the cards they reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDoc {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<SnapshotMeta>,
    pub stages: Vec<StageRecord>,
    pub cards: BTreeMap<String, Card>,
}

impl PipelineDoc {
    pub fn capture(store: &CardStore) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            meta: None,
            stages: store
                .stages()
                .iter()
                .map(|stage| StageRecord {
                    id: stage.id,
                    title: stage.title().to_string(),
                    card_ids: stage.card_ids.clone(),
                })
                .collect(),
            cards: store
                .cards()
                .map(|card| (card.id.clone(), card.clone()))
                .collect(),
        }
    }

    /// Rebuild the store, returning it with the number of repairs made
    pub fn into_store(self, prefix: &str) -> (CardStore, usize) {
        let layout = self
            .stages
            .into_iter()
            .map(|stage| (stage.id, stage.card_ids))
            .collect();
        CardStore::restore(prefix, layout, self.cards.into_values())
    }
}

/// Archive slot: an unordered bag of archived cards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveDoc {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<SnapshotMeta>,
    pub cards: Vec<Card>,
}

impl ArchiveDoc {
    pub fn capture(archive: &ArchiveStore) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            meta: None,
            cards: archive.recent().into_iter().cloned().collect(),
        }
    }

    pub fn into_archive(self) -> (ArchiveStore, usize) {
        ArchiveStore::restore(self.cards)
    }
}

/// Settings slot: cross-cutting configuration shared by all cards
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsDoc {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<SnapshotMeta>,
    pub editing_checklist: Vec<ChecklistItem>,
}

impl SettingsDoc {
    pub fn capture(checklist: &Checklist) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            meta: None,
            editing_checklist: checklist.items().to_vec(),
        }
    }

    pub fn into_checklist(self) -> Checklist {
        Checklist::from_items(self.editing_checklist)
    }
}

/// Serialize a document for storage
pub fn to_json<T: Serialize>(doc: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(doc)?)
}

pub fn parse_pipeline(text: &str) -> Result<PipelineDoc> {
    let mut value = parse_versioned(text)?;
    if document_version(&value) < SNAPSHOT_VERSION {
        migrate_cards(value.get_mut("cards"), |cards| match cards {
            Value::Object(map) => map.values_mut().collect(),
            _ => Vec::new(),
        })?;
    }
    finish(value)
}

pub fn parse_archive(text: &str) -> Result<ArchiveDoc> {
    let mut value = parse_versioned(text)?;
    if document_version(&value) < SNAPSHOT_VERSION {
        migrate_cards(value.get_mut("cards"), |cards| match cards {
            Value::Array(list) => list.iter_mut().collect(),
            _ => Vec::new(),
        })?;
    }
    finish(value)
}

pub fn parse_settings(text: &str) -> Result<SettingsDoc> {
    let value = parse_versioned(text)?;
    finish(value)
}

/// Parse JSON and reject documents from a newer format
fn parse_versioned(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(Error::Serialization("snapshot is not a JSON object".to_string()));
    }
    let version = document_version(&value);
    if version > SNAPSHOT_VERSION {
        return Err(Error::Serialization(format!(
            "snapshot version {} is newer than supported version {}",
            version, SNAPSHOT_VERSION
        )));
    }
    Ok(value)
}

/// Documents without a version field predate versioning
fn document_version(value: &Value) -> u32 {
    value
        .get("version")
        .and_then(Value::as_u64)
        .map_or(1, |v| u32::try_from(v).unwrap_or(u32::MAX))
}

fn finish<T: DeserializeOwned>(mut value: Value) -> Result<T> {
    if let Some(map) = value.as_object_mut() {
        map.insert("version".to_string(), Value::from(SNAPSHOT_VERSION));
    }
    Ok(serde_json::from_value(value)?)
}

/// Metadata that version 1 smuggled through the `extra` string
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LegacyExtra {
    hook: Option<String>,
    storyboard: Option<Vec<Scene>>,
    filming: Option<FilmingDetails>,
    editing_notes: Option<String>,
}

fn migrate_cards(
    cards: Option<&mut Value>,
    entries: impl FnOnce(&mut Value) -> Vec<&mut Value>,
) -> Result<()> {
    let Some(cards) = cards else {
        return Ok(());
    };
    for entry in entries(cards) {
        let Some(card) = entry.as_object_mut() else {
            return Err(Error::Serialization("card entry is not an object".to_string()));
        };
        migrate_card(card)?;
    }
    Ok(())
}

fn migrate_card(card: &mut Map<String, Value>) -> Result<()> {
    let now = Value::from(Utc::now().to_rfc3339());
    card.entry("created_at").or_insert_with(|| now.clone());
    card.entry("updated_at").or_insert(now);

    let Some(extra) = card.remove("extra") else {
        return Ok(());
    };
    let id = card.get("id").and_then(Value::as_str).unwrap_or("?").to_string();
    let extra: LegacyExtra = match extra {
        Value::String(text) if text.trim().is_empty() => return Ok(()),
        Value::String(text) => match serde_json::from_str(&text) {
            Ok(extra) => extra,
            Err(e) => {
                tracing::warn!(card = %id, error = %e, "dropping malformed legacy metadata");
                return Ok(());
            }
        },
        Value::Null => return Ok(()),
        other => {
            tracing::warn!(card = %id, kind = ?other, "dropping non-string legacy metadata");
            return Ok(());
        }
    };

    if let Some(hook) = extra.hook.filter(|h| !h.is_empty()) {
        card.entry("hook").or_insert(Value::from(hook));
    }
    if let Some(storyboard) = extra.storyboard {
        card.entry("storyboard")
            .or_insert(serde_json::to_value(storyboard)?);
    }
    if let Some(filming) = extra.filming {
        card.entry("filming")
            .or_insert(serde_json::to_value(filming)?);
    }
    if let Some(notes) = extra.editing_notes.filter(|n| !n.is_empty()) {
        let editing = card
            .entry("editing")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(editing) = editing.as_object_mut() {
            editing.entry("notes").or_insert(Value::from(notes));
        }
    }
    Ok(())
}
