//! Storage backend implementations for TaskFlow: a local JSON-file store and
//! a remote object-store adapter, both behind `taskflow_core::StorageBackend`.

mod local_fs;
mod object_store;

pub use local_fs::LocalFsStorage;
pub use object_store::RemoteObjectStorage;
