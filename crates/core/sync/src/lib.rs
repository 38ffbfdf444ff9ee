//! Live feed synchronization for Wayfarer clients.
//!
//! Keeps an ordered, duplicate-free view of a conversation's messages (or
//! of a user's conversation list) consistent across three sources: a push
//! subscription redelivering the most recent window on every change,
//! cursor-based backfill of older pages, and locally issued writes that
//! re-enter through the next window delivery.

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate async_trait;

#[macro_use]
extern crate wayfarer_result;

mod backfill;
mod content;
mod mutations;
mod session;
mod subscription;
mod timeline;
mod typing;

pub use backfill::*;
pub use content::*;
pub use mutations::*;
pub use session::*;
pub use subscription::*;
pub use timeline::*;
pub use typing::*;
