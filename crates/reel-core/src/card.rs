//! Card data model for reel
//!
//! A card is one piece of content moving through the six fixed pipeline
//! stages. Cards are looked up by id; stages only hold ordered id lists.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Pipeline stage. The set is fixed; stages are never created at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    Ideate,
    ShapeIdeas,
    ToFilm,
    ToEdit,
    ToSchedule,
    Posted,
}

impl StageId {
    /// All stages in pipeline order
    pub const ALL: [StageId; 6] = [
        StageId::Ideate,
        StageId::ShapeIdeas,
        StageId::ToFilm,
        StageId::ToEdit,
        StageId::ToSchedule,
        StageId::Posted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Ideate => "ideate",
            StageId::ShapeIdeas => "shape-ideas",
            StageId::ToFilm => "to-film",
            StageId::ToEdit => "to-edit",
            StageId::ToSchedule => "to-schedule",
            StageId::Posted => "posted",
        }
    }

    /// Human-readable column title
    pub fn title(&self) -> &'static str {
        match self {
            StageId::Ideate => "Ideate",
            StageId::ShapeIdeas => "Shape Ideas",
            StageId::ToFilm => "To Film",
            StageId::ToEdit => "To Edit",
            StageId::ToSchedule => "To Schedule",
            StageId::Posted => "Posted",
        }
    }

    /// Position of the stage in the pipeline
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl std::str::FromStr for StageId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "ideate" | "idea" => Ok(StageId::Ideate),
            "shape-ideas" | "script" => Ok(StageId::ShapeIdeas),
            "to-film" | "film" => Ok(StageId::ToFilm),
            "to-edit" | "edit" => Ok(StageId::ToEdit),
            "to-schedule" | "schedule" => Ok(StageId::ToSchedule),
            "posted" => Ok(StageId::Posted),
            _ => Err(crate::Error::InvalidStage(s.to_string())),
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling status as stored and as accepted in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulingStatus {
    #[default]
    None,
    ToSchedule,
    Scheduled,
}

impl std::str::FromStr for SchedulingStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "none" => Ok(SchedulingStatus::None),
            "to-schedule" => Ok(SchedulingStatus::ToSchedule),
            "scheduled" => Ok(SchedulingStatus::Scheduled),
            _ => Err(crate::Error::InvalidSchedulingStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for SchedulingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingStatus::None => write!(f, "none"),
            SchedulingStatus::ToSchedule => write!(f, "to-schedule"),
            SchedulingStatus::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Where a card stands on the calendar.
///
/// Only `Scheduled` carries a date, so a date without the status (or the
/// status without a date) cannot be represented. On disk this is the flat
/// `scheduling_status` / `scheduled_date` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawScheduling", into = "RawScheduling")]
pub enum Scheduling {
    #[default]
    None,
    ToSchedule,
    Scheduled(NaiveDate),
}

impl Scheduling {
    pub fn status(&self) -> SchedulingStatus {
        match self {
            Scheduling::None => SchedulingStatus::None,
            Scheduling::ToSchedule => SchedulingStatus::ToSchedule,
            Scheduling::Scheduled(_) => SchedulingStatus::Scheduled,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Scheduling::Scheduled(date) => Some(*date),
            _ => None,
        }
    }

    /// Unscheduled state for a fallback status (`Scheduled` maps to `ToSchedule`)
    pub fn unscheduled(status: SchedulingStatus) -> Self {
        match status {
            SchedulingStatus::None => Scheduling::None,
            SchedulingStatus::ToSchedule | SchedulingStatus::Scheduled => Scheduling::ToSchedule,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawScheduling {
    #[serde(default)]
    scheduling_status: SchedulingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scheduled_date: Option<NaiveDate>,
}

impl TryFrom<RawScheduling> for Scheduling {
    type Error = String;

    fn try_from(raw: RawScheduling) -> Result<Self, Self::Error> {
        match (raw.scheduling_status, raw.scheduled_date) {
            (SchedulingStatus::Scheduled, Some(date)) => Ok(Scheduling::Scheduled(date)),
            (SchedulingStatus::Scheduled, None) => {
                Err("scheduling_status is 'scheduled' but scheduled_date is missing".to_string())
            }
            // A leftover date on an unscheduled card carries no meaning
            (SchedulingStatus::ToSchedule, _) => Ok(Scheduling::ToSchedule),
            (SchedulingStatus::None, _) => Ok(Scheduling::None),
        }
    }
}

impl From<Scheduling> for RawScheduling {
    fn from(scheduling: Scheduling) -> Self {
        Self {
            scheduling_status: scheduling.status(),
            scheduled_date: scheduling.date(),
        }
    }
}

/// One storyboard scene
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}

impl Scene {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: crate::id::generate_id("scene"),
            title: title.into(),
            visual: None,
            audio: None,
        }
    }
}

/// Filming preparation: what to bring and whether it is ready
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilmingDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outfit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<String>,
    pub location_ready: bool,
    pub outfit_ready: bool,
    pub props_ready: bool,
}

impl FilmingDetails {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Editing status of a single card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EditStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
}

/// Per-card progress against the shared editing checklist
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditingProgress {
    /// Ids of checked items from the shared checklist template
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub checked: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: EditStatus,
}

impl EditingProgress {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A piece of content tracked through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Stable identifier (card-xxxxxx)
    pub id: String,

    pub title: String,

    /// Alternative headline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// Stage the card lives in (maintained by `CardStore`)
    pub stage: StageId,

    /// Dense zero-based position within the stage (maintained by `CardStore`)
    pub order: usize,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,

    #[serde(flatten)]
    pub scheduling: Scheduling,

    #[serde(default)]
    pub pinned: bool,

    #[serde(default)]
    pub completed: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub storyboard: Vec<Scene>,

    #[serde(default, skip_serializing_if = "FilmingDetails::is_empty")]
    pub filming: FilmingDetails,

    #[serde(default, skip_serializing_if = "EditingProgress::is_empty")]
    pub editing: EditingProgress,

    /// Set iff the card lives in the archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Card {
    /// Create a new card with minimal required fields
    pub fn new(id: String, title: String, stage: StageId) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            hook: None,
            script: None,
            stage,
            order: 0,
            formats: Vec::new(),
            platforms: Vec::new(),
            scheduling: Scheduling::None,
            pinned: false,
            completed: false,
            storyboard: Vec::new(),
            filming: FilmingDetails::default(),
            editing: EditingProgress::default(),
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn scheduled_date(&self) -> Option<NaiveDate> {
        self.scheduling.date()
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// Merge a patch of creative fields
    pub fn apply(&mut self, patch: CardPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(hook) = patch.hook {
            self.hook = non_empty(hook);
        }
        if let Some(script) = patch.script {
            self.script = non_empty(script);
        }
        if let Some(formats) = patch.formats {
            self.formats = formats;
        }
        if let Some(platforms) = patch.platforms {
            self.platforms = platforms;
        }
        if let Some(storyboard) = patch.storyboard {
            self.storyboard = storyboard;
        }
        if let Some(filming) = patch.filming {
            self.filming = filming;
        }
        if let Some(notes) = patch.editing_notes {
            self.editing.notes = non_empty(notes);
        }
        if let Some(status) = patch.editing_status {
            self.editing.status = status;
        }
        self.touch();
    }

    /// Case-insensitive match over title, hook and script.
    /// `needle` must already be lowercase.
    pub fn matches(&self, needle: &str) -> bool {
        let hit = |text: &str| text.to_lowercase().contains(needle);
        hit(&self.title)
            || self.hook.as_deref().is_some_and(hit)
            || self.script.as_deref().is_some_and(hit)
    }

    /// Fresh card carrying this card's creative content
    pub fn repurposed(&self, id: String, stage: StageId) -> Card {
        let mut card = Card::new(id, self.title.clone(), stage);
        card.hook = self.hook.clone();
        card.script = self.script.clone();
        card.formats = self.formats.clone();
        card.platforms = self.platforms.clone();
        card.storyboard = self.storyboard.clone();
        card.filming = self.filming.clone();
        card
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl std::fmt::Display for Card {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}#{}]", self.id, self.stage, self.order)?;
        if let Some(date) = self.scheduled_date() {
            write!(f, " @{}", date)?;
        }
        write!(f, " - {}", self.title)
    }
}

/// Data for a new card
#[derive(Debug, Clone, Default)]
pub struct NewCard {
    pub title: String,
    pub hook: Option<String>,
    pub script: Option<String>,
    pub formats: Vec<String>,
    pub platforms: Vec<String>,
}

impl NewCard {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update of a card's creative fields.
///
/// Stage, order and scheduling are deliberately absent; they change only
/// through moves and the schedule operations. An empty string clears
/// `hook`, `script` and `editing_notes`.
#[derive(Debug, Clone, Default)]
pub struct CardPatch {
    pub title: Option<String>,
    pub hook: Option<String>,
    pub script: Option<String>,
    pub formats: Option<Vec<String>>,
    pub platforms: Option<Vec<String>>,
    pub storyboard: Option<Vec<Scene>>,
    pub filming: Option<FilmingDetails>,
    pub editing_notes: Option<String>,
    pub editing_status: Option<EditStatus>,
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_date(text: &str) -> crate::Result<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .map_err(|_| crate::Error::InvalidDate(text.to_string()))
}
