//! # Domain Models
//!
//! Canonical types shared by the cache, the upstream provider, and the client.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`EventRecord`] | One historical event (year, title, description, category) |
//! | [`EventCategory`] | Display category with icon and colour |
//! | [`EventLink`] | Related article for an event |
//! | [`EventSource`] | Live or fallback origin of a result |
//! | [`EventList`] | Events handed to the UI for one date key |
//! | [`UtcDateTime`] | UTC timestamp |

mod event;
mod timestamp;

pub use event::{EventCategory, EventLink, EventList, EventRecord, EventSource};
pub use timestamp::UtcDateTime;
