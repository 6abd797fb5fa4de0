//! Snapshot storage for the Stratum layer engine.
//!
//! Stores are key-value backends behind the [`SnapshotStore`] trait. Like
//! the engine's image decoder, they return boxed futures
//! (`Pin<Box<dyn Future + Send>>`) so a host can run them on whatever
//! runtime it has; blocking stores complete on the first poll and can be
//! driven synchronously with [`poll_now`].
//!
//! [`SnapshotPersistence`] turns a store into the save/load contract of the
//! engine: failures become a [`SaveStatus`], malformed or wrong-version data
//! loads as absent. [`Autosave`] debounces saves off the engine's event
//! stream.
//!
//! # Stores
//!
//! - [`MemoryStore`]: in-memory, with an optional quota (read-write)
//! - [`FileSystemStore`]: one JSON file per key, atomic writes (read-write, native only)

mod autosave;
mod error;
#[cfg(all(feature = "filesystem", not(target_arch = "wasm32")))]
mod filesystem;
mod memory;
mod persistence;
mod poll;
mod provider;

pub use autosave::Autosave;
pub use error::{StoreError, validate_key};
#[cfg(all(feature = "filesystem", not(target_arch = "wasm32")))]
pub use filesystem::FileSystemStore;
pub use memory::MemoryStore;
pub use persistence::{SaveStatus, SnapshotPersistence};
pub use poll::poll_now;
pub use provider::{SnapshotStore, StoreFuture};
