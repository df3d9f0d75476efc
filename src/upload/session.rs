//! Per-call view of a resumable upload
//!
//! Nothing here outlives one HTTP request: the caller re-presents the session
//! URL and chunk position on every call.

use axum::http::{HeaderMap, StatusCode};

use super::UPLOAD_SIZE_RECEIVED;
use crate::error::{AppError, AppResult};

/// Upload command sent with a data call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadCommand {
    /// More chunks follow
    Upload,
    /// Last chunk; complete the upload
    UploadFinalize,
}

impl UploadCommand {
    pub fn for_position(position: ChunkPosition) -> Self {
        if position.is_last() {
            UploadCommand::UploadFinalize
        } else {
            UploadCommand::Upload
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadCommand::Upload => "upload",
            UploadCommand::UploadFinalize => "upload, finalize",
        }
    }

    pub fn is_finalize(&self) -> bool {
        *self == UploadCommand::UploadFinalize
    }
}

/// Where a chunk sits in its upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPosition {
    pub index: u32,
    pub total: u32,
}

impl ChunkPosition {
    pub fn new(index: u32, total: u32) -> AppResult<Self> {
        if total == 0 {
            return Err(AppError::BadRequest(
                "total_chunks must be at least 1".to_string(),
            ));
        }
        if index >= total {
            return Err(AppError::BadRequest(format!(
                "chunk_index {} is out of range for total_chunks {}",
                index, total
            )));
        }
        Ok(Self { index, total })
    }

    /// The whole file in one call
    pub fn single() -> Self {
        Self { index: 0, total: 1 }
    }

    pub fn is_last(&self) -> bool {
        self.index + 1 == self.total
    }
}

/// State of one upload as seen by a single data call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_url: String,
    pub total_chunks: u32,
    pub current_chunk_index: u32,
    pub byte_offset: u64,
    pub finalized: bool,
}

impl UploadSession {
    /// Session as presented by the caller before the chunk is sent
    pub fn begin(upload_url: impl Into<String>, position: ChunkPosition, declared_offset: &str) -> Self {
        Self {
            upload_url: upload_url.into(),
            total_chunks: position.total,
            current_chunk_index: position.index,
            byte_offset: declared_offset.trim().parse().unwrap_or(0),
            finalized: false,
        }
    }

    /// Apply the provider's answer to a chunk call
    pub fn record(
        &mut self,
        command: UploadCommand,
        status: StatusCode,
        headers: &HeaderMap,
        chunk_len: usize,
    ) {
        let reported = headers
            .get(UPLOAD_SIZE_RECEIVED)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        self.byte_offset = reported.unwrap_or(self.byte_offset + chunk_len as u64);

        // 308 always means the provider expects more bytes
        self.finalized = command.is_finalize()
            && matches!(status, StatusCode::OK | StatusCode::CREATED);
    }
}
