//! In-memory registry of stress test definitions.
//!
//! The registry is the single authoritative collection of definitions for
//! the lifetime of the process.
//!
//! # Features
//!
//! - Thread-safe with one `RwLock` over the entries and the id counter
//! - Insertion order preserved across removals
//! - Identifiers strictly increasing, never reused

use parking_lot::RwLock;
use thiserror::Error;

use crate::domain::{RunTimestamp, StressTest, StressTestDraft, StressTestId, default_drafts};

// =============================================================================
// Registry Error
// =============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No definition has the requested id.
    #[error("Could not find stress test {0}")]
    NotFound(StressTestId),
}

// =============================================================================
// Registry State
// =============================================================================

#[derive(Debug)]
struct RegistryState {
    entries: Vec<StressTest>,
    /// Last id handed out; 0 before the first `add`.
    last_id: u64,
}

impl RegistryState {
    const fn new() -> Self {
        Self {
            entries: Vec::new(),
            last_id: 0,
        }
    }

    fn position(&self, id: StressTestId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    fn next_id(&mut self) -> StressTestId {
        self.last_id += 1;
        StressTestId::new(self.last_id)
    }
}

// =============================================================================
// Stress Test Registry
// =============================================================================

/// Registry of stress test definitions keyed by id.
///
/// Every operation takes the lock once, so read-modify-write sequences such
/// as `add` (assign id, then append) are never observed half done.
///
/// # Example
///
/// ```
/// use db_stress_test::domain::StressTestDraft;
/// use db_stress_test::infrastructure::StressTestRegistry;
///
/// let registry = StressTestRegistry::new();
/// let stored = registry.add(StressTestDraft::new("Load Test", 3));
/// assert_eq!(stored.id.value(), 1);
/// assert_eq!(registry.get(stored.id).unwrap().name, "Load Test");
/// ```
#[derive(Debug)]
pub struct StressTestRegistry {
    state: RwLock<RegistryState>,
}

impl StressTestRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::new()),
        }
    }

    /// Creates a registry holding the default bootstrap definitions.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.seed_defaults();
        registry
    }

    /// Registers the default bootstrap definitions, returning them as stored.
    pub fn seed_defaults(&self) -> Vec<StressTest> {
        default_drafts()
            .into_iter()
            .map(|draft| self.add(draft))
            .collect()
    }

    /// Returns every definition in insertion order.
    pub fn list(&self) -> Vec<StressTest> {
        self.state.read().entries.clone()
    }

    /// Returns the definition with the given id.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if no definition has that id.
    pub fn get(&self, id: StressTestId) -> Result<StressTest, RegistryError> {
        self.state
            .read()
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))
    }

    /// Stores a new definition under the next unused id.
    ///
    /// The stored definition has no run result, whatever the caller had.
    pub fn add(&self, draft: StressTestDraft) -> StressTest {
        let mut state = self.state.write();
        let id = state.next_id();
        let stress_test = draft.into_stress_test(id);
        state.entries.push(stress_test.clone());
        stress_test
    }

    /// Replaces the definition whose id matches `stress_test.id`.
    ///
    /// This is a whole-record overwrite: every field, run fields included,
    /// comes from the argument.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if no definition has that id.
    pub fn update(&self, stress_test: StressTest) -> Result<StressTest, RegistryError> {
        let mut state = self.state.write();
        let index = state
            .position(stress_test.id)
            .ok_or(RegistryError::NotFound(stress_test.id))?;
        state.entries[index] = stress_test.clone();
        Ok(stress_test)
    }

    /// Writes a run result onto the current version of a definition.
    ///
    /// Only the run fields change, so edits made while the run was in
    /// flight are kept.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the definition no longer exists.
    pub fn record_run(
        &self,
        id: StressTestId,
        started_at: RunTimestamp,
        duration_seconds: f64,
    ) -> Result<StressTest, RegistryError> {
        let mut state = self.state.write();
        let index = state.position(id).ok_or(RegistryError::NotFound(id))?;
        let updated = state.entries[index]
            .clone()
            .with_run(started_at, duration_seconds);
        state.entries[index] = updated.clone();
        Ok(updated)
    }

    /// Deletes the definition with the given id, returning it.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if no definition has that id.
    pub fn remove(&self, id: StressTestId) -> Result<StressTest, RegistryError> {
        let mut state = self.state.write();
        let index = state.position(id).ok_or(RegistryError::NotFound(id))?;
        Ok(state.entries.remove(index))
    }

    /// Returns the number of stored definitions.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns true if no definitions are stored.
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }
}

impl Default for StressTestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
