// crates/core/src/lib.rs
//! Broadcast/subscription engine and update log contract for the agent status
//! service.
//!
//! - `UpdateLog` - durable append-only store contract (+ `MemoryUpdateLog`)
//! - `Broadcaster` - per-job fan-out to bounded subscriber channels
//! - `StreamSession` - history-then-live stream for one subscriber
//! - `StatusHub` - the process-wide handle producers and consumers share

pub mod broadcaster;
pub mod error;
pub mod hub;
pub mod log;
pub mod session;
pub mod types;

pub use broadcaster::{
    BroadcastConfig, Broadcaster, PublishReport, SubscriberId, Subscription,
    DEFAULT_SUBSCRIBER_CAPACITY,
};
pub use error::*;
pub use hub::{HubConfig, StatusHub};
pub use log::{MemoryUpdateLog, UpdateLog};
pub use session::{resolve_cursor, SessionState, StreamSession, DEFAULT_HISTORY_PAGE_SIZE};
pub use types::*;
