// Narrow interface to the remote storage service. The engine only ever talks to
// a `dyn Transport`; `HttpTransport` is the production implementation and tests
// plug in an in-memory one.
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::TransferError;
use crate::cancel::CancelToken;

/// Project and region the remote calls are scoped to. Opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub project_id: String,
    pub region: String,
}

impl Scope {
    pub fn new(project_id: impl Into<String>, region: impl Into<String>) -> Self {
        Self { project_id: project_id.into(), region: region.into() }
    }
}

/// Pre-signed URL for one part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartUrl {
    pub part_number: u32,
    pub url: String,
}

/// Server-side multipart session. Lives for one file of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    pub upload_id: String,
    pub parts: Vec<PartUrl>,
}

/// Confirmation for one uploaded part, required to finalize the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartResult {
    pub part_number: u32,
    pub etag: String,
}

/// One row of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub last_modified: String,
}

impl RemoteEntry {
    /// Listing names for folders sometimes carry a trailing slash.
    pub fn base_name(&self) -> &str {
        self.name.trim_end_matches('/')
    }

    pub fn modified(&self) -> Option<chrono::DateTime<chrono::FixedOffset>> {
        chrono::DateTime::parse_from_rfc3339(&self.last_modified).ok()
    }
}

pub trait Transport: Send + Sync {
    fn initiate_upload(
        &self,
        cancel: &CancelToken,
        scope: &Scope,
        remote_path: &str,
        part_count: usize,
    ) -> Result<UploadSession, TransferError>;

    /// PUT one part to its pre-signed URL; returns the ETag.
    fn upload_part(
        &self,
        cancel: &CancelToken,
        url: &str,
        data: &[u8],
    ) -> Result<String, TransferError>;

    fn complete_upload(
        &self,
        cancel: &CancelToken,
        scope: &Scope,
        remote_path: &str,
        upload_id: &str,
        parts: &[PartResult],
    ) -> Result<(), TransferError>;

    /// Release a session that will never be completed. Services without an
    /// abort endpoint leave the orphaned parts to server-side expiry.
    fn abort_upload(
        &self,
        _cancel: &CancelToken,
        _scope: &Scope,
        _remote_path: &str,
        _upload_id: &str,
    ) -> Result<(), TransferError> {
        Ok(())
    }

    fn get_download_url(
        &self,
        cancel: &CancelToken,
        scope: &Scope,
        remote_path: &str,
    ) -> Result<String, TransferError>;

    /// GET a pre-signed URL and hand back the body as a byte stream.
    fn open_download(
        &self,
        cancel: &CancelToken,
        url: &str,
    ) -> Result<Box<dyn Read + Send>, TransferError>;

    fn list_directory(
        &self,
        cancel: &CancelToken,
        scope: &Scope,
        remote_path: &str,
    ) -> Result<Vec<RemoteEntry>, TransferError>;
}
