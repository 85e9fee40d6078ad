//! Blob store: one versioned JSON snapshot kept as a channel attachment.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ BlobStore<C>                                 │
//! │  load() -> Snapshot (+ Version)              │
//! │  save(snapshot, expected) -> Version         │
//! └──────────────────────────────────────────────┘
//!                      │  list / fetch / upload / delete
//!                      ▼
//! ┌──────────────────────────────────────────────┐
//! │ Channel trait                                │
//! └──────────────────────────────────────────────┘
//!          │                          │
//!          ▼                          ▼
//! ┌─────────────────┐      ┌──────────────────────┐
//! │ InMemoryChannel │      │ DiscordChannel       │
//! │   (included)    │      │ (`remote` feature)   │
//! └─────────────────┘      └──────────────────────┘
//! ```

mod channel;
#[cfg(feature = "remote")]
mod discord;
mod in_memory;
mod lineage;
mod store;

pub use channel::{Attachment, BackendError, Channel, ChannelMessage};
#[cfg(feature = "remote")]
pub use discord::{DiscordChannel, DISCORD_API};
pub use in_memory::InMemoryChannel;
pub use store::{BlobStore, DEFAULT_FILENAME, DEFAULT_SCAN_WINDOW, MAX_SCAN_WINDOW};
