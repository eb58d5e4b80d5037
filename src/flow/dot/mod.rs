// SPDX-License-Identifier: MIT

//! Dot-notation data access
//!
//! This module provides:
//! - `DotPath` - parsed `namespace@a.b.c` references
//! - `DotAccessor` - read/write view over profile, session, payload, event, flow and memory
//! - `EntityCell` - the swappable "current" profile/session pointer of a walk

mod accessor;
pub mod entity;
mod path;
mod reshape;

pub use accessor::{coerce, DotAccessor, Resolved};
pub use entity::{entity, Entity, EntityCell};
pub use path::{DotPath, Namespace};
pub use reshape::ReshapeOptions;
