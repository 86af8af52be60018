pub mod channel;
pub mod error;

pub use channel::{Channel, ChannelRegistry, SnapshotLayout, UserId, NO_STATEMENT};
pub use error::{QueryError, StorageError};
