//! Live feed: pushes ledger entries to connected viewers.
//!
//! A subscriber first receives the full ledger as a snapshot, then every
//! entry appended afterwards, in ledger order. The feed tails the ledger
//! by polling so that appends made by other processes sharing the file
//! are picked up too; appends made in this process additionally wake the
//! poll loop straight away.

pub mod error;
pub mod feed;
pub mod protocol;

pub use error::FeedError;
pub use feed::{FeedConfig, LiveFeed, PollReport, SubscriberId, Subscription};
pub use protocol::FeedMessage;
