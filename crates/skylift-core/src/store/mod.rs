//! Durable storage: binary blobs and the SQLite catalog.

pub mod actor;
pub mod blob;
pub mod db;

pub use actor::DbHandle;
pub use blob::{BinaryStore, FsStore, StoreError};
