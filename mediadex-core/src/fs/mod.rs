//! Storage backend client capability. Protocol client implementations live
//! outside the core; the engine sees them only through [`FileSystemClient`].

pub mod client;

pub use client::{FileSystemClient, LocalFileSystemClient, RemoteMetadata};

#[cfg(test)]
pub use client::MockFileSystemClient;
