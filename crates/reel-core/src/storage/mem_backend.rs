use super::{Slot, StorageBackend};
use crate::{Error, Result};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

/// In-memory storage backend.
///
/// Uses `RefCell` for interior mutability since a pipeline context is
/// single-threaded. Share one instance between contexts with `Rc`.
#[derive(Debug, Default)]
pub struct MemBackend {
    slots: RefCell<HashMap<Slot, String>>,
    simulate_write_error: Cell<bool>,
    writes: Cell<usize>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable write error simulation for testing error handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.set(simulate);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    /// Put raw text in a slot, bypassing everything (for seeding tests)
    pub fn seed(&self, slot: Slot, contents: &str) {
        self.slots.borrow_mut().insert(slot, contents.to_string());
    }
}

impl StorageBackend for MemBackend {
    fn read(&self, slot: Slot) -> Result<Option<String>> {
        Ok(self.slots.borrow().get(&slot).cloned())
    }

    fn write(&self, slot: Slot, contents: &str) -> Result<()> {
        if self.simulate_write_error.get() {
            return Err(Error::StorageUnavailable("Simulated write error".to_string()));
        }
        self.slots.borrow_mut().insert(slot, contents.to_string());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn is_available(&self) -> bool {
        !self.simulate_write_error.get()
    }
}
