//! Save/load port the negotiation calls after each committed mutation.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::NegotiationError;
use crate::negotiation::NegotiationState;
use crate::NegotiationResult;

pub trait NegotiationStore {
    fn save(&mut self, state: &NegotiationState) -> NegotiationResult<()>;
    fn load(&self) -> NegotiationResult<Option<NegotiationState>>;
}

/// Discards every save.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl NegotiationStore for NullStore {
    fn save(&mut self, _state: &NegotiationState) -> NegotiationResult<()> {
        Ok(())
    }

    fn load(&self) -> NegotiationResult<Option<NegotiationState>> {
        Ok(None)
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    state: Option<NegotiationState>,
    saves: usize,
    failing: Option<String>,
}

/// Keeps the last saved state in memory. Clones share the same slot, so a
/// caller can hand one to a negotiation and inspect it through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> Option<NegotiationState> {
        self.inner.borrow().state.clone()
    }

    pub fn save_count(&self) -> usize {
        self.inner.borrow().saves
    }

    /// Make subsequent saves fail with `reason` (`None` to recover).
    pub fn set_failing(&self, reason: Option<&str>) {
        self.inner.borrow_mut().failing = reason.map(str::to_string);
    }
}

impl NegotiationStore for MemoryStore {
    fn save(&mut self, state: &NegotiationState) -> NegotiationResult<()> {
        let mut inner = self.inner.borrow_mut();
        if let Some(reason) = &inner.failing {
            return Err(NegotiationError::Persistence(reason.clone()));
        }
        inner.state = Some(state.clone());
        inner.saves += 1;
        Ok(())
    }

    fn load(&self) -> NegotiationResult<Option<NegotiationState>> {
        Ok(self.inner.borrow().state.clone())
    }
}

/// Stores the negotiation as pretty-printed JSON at `path`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NegotiationStore for JsonFileStore {
    fn save(&mut self, state: &NegotiationState) -> NegotiationResult<()> {
        let contents = serde_json::to_string_pretty(state)?;
        // Write beside the target and rename so a crash never leaves half a file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents).map_err(|e| {
            NegotiationError::Persistence(format!("Failed to write '{}': {}", tmp.display(), e))
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let target = self.path.display();
            NegotiationError::Persistence(format!("Failed to replace '{target}': {e}"))
        })?;
        Ok(())
    }

    fn load(&self) -> NegotiationResult<Option<NegotiationState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| {
            let source = self.path.display();
            NegotiationError::Persistence(format!("Failed to read '{source}': {e}"))
        })?;
        Ok(Some(serde_json::from_str(&contents)?))
    }
}
