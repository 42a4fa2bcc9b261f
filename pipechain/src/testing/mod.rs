//! Testing utilities for creation chains.
//!
//! This module provides:
//! - In-memory adapters for the repository, permission and store ports
//! - A `CommandFixture` wiring commands to recording ports
//! - Recording steps for sequence tests

mod fixtures;
mod memory;
mod mocks;

pub use fixtures::{CommandFixture, DEFAULT_SHA};
pub use memory::{InMemoryRepository, InMemoryStore, StaticPermissions};
pub use mocks::{RecordingStep, StepLog, WarningStep};
pub use crate::queue::RecordingTaskQueue;
