//! Multipart upload engine.
//!
//! Drives one file through the storage service's pre-signed multipart
//! protocol. The app provides a `StorageTransport` implementation (HTTP in
//! practice) and an `OutputBinding` that receives the result.
//!
//! # Pipeline
//!
//! 1. **Plan**: ask the service for a chunk size and one URL per part
//! 2. **Transfer**: send every byte range to its part URL, collecting ETags
//! 3. **Complete**: submit the part list, polling if the service finishes
//!    in the background
//! 4. **Abort**: on failure or request, discard the multipart upload and
//!    reset the output slot

mod completion;
pub mod config;
pub mod error;
mod parts;
pub mod transport;
pub mod types;
pub mod uploader;

#[cfg(test)]
mod mock;

pub use config::UploadSettings;
pub use error::{TransportError, UploadError};
pub use transport::{
    ChunkReceipt, OutputBinding, PlanRequest, StorageTransport, TransportFuture,
};
pub use types::{UploadEvent, UploadReport};
pub use uploader::Uploader;
