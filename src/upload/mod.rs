//! Resumable upload relay
//!
//! Drives the provider's two-phase upload protocol: an init call that returns a
//! session URL, then one or more data calls that advance the byte offset, the
//! last of which finalizes the file.

pub mod coordinator;
pub mod session;

pub use coordinator::{UploadCoordinator, UploadOutcome};
pub use session::{ChunkPosition, UploadCommand, UploadSession};

/// Upload protocol header (`resumable`, `multipart`, ...)
pub const UPLOAD_PROTOCOL: &str = "x-goog-upload-protocol";
/// Upload command header (`start`, `upload`, `upload, finalize`, ...)
pub const UPLOAD_COMMAND: &str = "x-goog-upload-command";
/// Byte offset of the chunk being sent
pub const UPLOAD_OFFSET: &str = "x-goog-upload-offset";
/// Declared total size of the file, sent at init
pub const UPLOAD_HEADER_CONTENT_LENGTH: &str = "x-goog-upload-header-content-length";
/// Declared content type of the file, sent at init
pub const UPLOAD_HEADER_CONTENT_TYPE: &str = "x-goog-upload-header-content-type";
/// Session URL returned by init
pub const UPLOAD_URL: &str = "x-goog-upload-url";
/// Bytes persisted so far, reported by the provider
pub const UPLOAD_SIZE_RECEIVED: &str = "x-goog-upload-size-received";

/// Query parameters that address chunks at the gateway and are never forwarded
pub const CHUNK_INDEX_PARAM: &str = "chunk_index";
pub const TOTAL_CHUNKS_PARAM: &str = "total_chunks";
