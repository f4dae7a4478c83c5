//! reel-core: Pipeline state engine for the reel content tracker
//!
//! Moves content cards through six fixed stages (ideate to posted), keeps a
//! calendar index and an archive, and persists every change as a full
//! snapshot so several open views stay in sync without a server.

pub mod archive;
pub mod board;
pub mod card;
pub mod checklist;
pub mod config;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod schedule;
pub mod snapshot;
pub mod storage;
pub mod sync;

pub use archive::ArchiveStore;
pub use board::{CardStore, Stage};
pub use card::{
    Card, CardPatch, EditStatus, EditingProgress, FilmingDetails, NewCard, Scene, Scheduling,
    SchedulingStatus, StageId, parse_date,
};
pub use checklist::{Checklist, ChecklistItem};
pub use config::Config;
pub use error::Error;
pub use id::generate_id;
pub use pipeline::Pipeline;
pub use schedule::ScheduleEntry;
pub use storage::{FsBackend, MemBackend, Slot, StorageBackend};
pub use sync::{Change, Notice, NoticeLevel, Origin, SubscriptionId, SyncEvent};

/// Result type for reel operations
pub type Result<T> = std::result::Result<T, Error>;
