pub mod conflict;
pub mod delta;
pub mod index;
mod persist;
pub mod pipeline;
pub mod reconciler;
pub mod remote;
pub mod tombstone;
pub mod vault;

pub use index::SyncIndex;
pub use pipeline::{ChangePipeline, FileEvent, FileEventKind};
pub use reconciler::{Reconciler, SyncResult};
pub use remote::RemoteStore;
pub use tombstone::TombstoneStore;
pub use vault::VaultAdapter;
