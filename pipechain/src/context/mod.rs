//! The request context of a chain run.
//!
//! This module provides:
//! - `Command`, holding request inputs and memoized derived values
//! - Ref resolution (`RefLookup`) and the CI skip directive matcher
//! - The caller seed callback types

mod command;

pub use command::{
    message_skips_ci, Command, RefLookup, SeedCallback, SeedTarget, BLANK_SHA, SKIP_CI_PUSH_OPTION,
};
