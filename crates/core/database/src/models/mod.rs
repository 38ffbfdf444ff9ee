use iso8601_timestamp::Timestamp;

mod conversations;
mod messages;
mod presence;

pub use conversations::*;
pub use messages::*;
pub use presence::*;

use crate::{Database, ReferenceDb};

auto_derived!(
    /// Position immediately after the oldest item known to a feed client.
    ///
    /// Backfill pages are fetched strictly older than this point; the item
    /// the cursor was taken from is never returned again.
    pub struct PageCursor {
        pub created_at: Timestamp,
        pub id: String,
    }
);

impl PageCursor {
    /// Whether an item lies strictly before this cursor
    pub fn admits(&self, created_at: Timestamp, id: &str) -> bool {
        match created_at.cmp(&self.created_at) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => id < self.id.as_str(),
            std::cmp::Ordering::Greater => false,
        }
    }
}

pub trait AbstractDatabase:
    Sync
    + Send
    + conversations::AbstractConversations
    + messages::AbstractMessages
    + presence::AbstractPresence
{
}

impl AbstractDatabase for ReferenceDb {}

impl std::ops::Deref for Database {
    type Target = dyn AbstractDatabase;

    fn deref(&self) -> &Self::Target {
        match &self {
            Database::Reference(dummy) => dummy,
        }
    }
}
