//! Durable storage slots
//!
//! State is kept in three independently written slots. Every write
//! replaces a slot's full contents.

mod fs_backend;
mod mem_backend;

pub use fs_backend::FsBackend;
pub use mem_backend::MemBackend;

use crate::Result;
use std::rc::Rc;

/// A named durable-storage record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    Pipeline,
    Archive,
    Settings,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::Pipeline, Slot::Archive, Slot::Settings];

    /// Storage key, also used as the file stem by `FsBackend`
    pub fn key(&self) -> &'static str {
        match self {
            Slot::Pipeline => "pipeline",
            Slot::Archive => "archive",
            Slot::Settings => "settings",
        }
    }
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Raw slot I/O. Backends know nothing about the documents they hold.
pub trait StorageBackend {
    /// Read a slot. `Ok(None)` means the slot was never written.
    fn read(&self, slot: Slot) -> Result<Option<String>>;

    /// Replace a slot's contents.
    /// MUST be atomic: readers see either the old or the new text, never a mix.
    fn write(&self, slot: Slot, contents: &str) -> Result<()>;

    /// Whether the backend can currently be written at all
    fn is_available(&self) -> bool;
}

/// Several contexts in one process can share a backend through `Rc`
impl<B: StorageBackend + ?Sized> StorageBackend for Rc<B> {
    fn read(&self, slot: Slot) -> Result<Option<String>> {
        (**self).read(slot)
    }

    fn write(&self, slot: Slot, contents: &str) -> Result<()> {
        (**self).write(slot, contents)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}
