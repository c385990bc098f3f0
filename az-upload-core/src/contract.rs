//! The blob storage collaborator seam.
//!
//! Everything that talks to the wire sits behind [`BlobStorageClient`]:
//! SAS signing, pipeline construction, and chunked transfer. The façade in
//! [`service`](crate::service) only ever speaks to this trait, so it can be
//! exercised in tests with a generated mock and zero network access.
//!
//! The trait is annotated for `mockall`, gated the same way as the rest of
//! the workspace's test mocks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::File;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::credentials::{BlobReference, StorageCredentials};
use crate::error::StorageResult;
use crate::sas::{SasScope, SasToken};

/// How a pipeline authorizes its requests.
#[derive(Debug, Clone)]
pub enum PipelineAuth {
    /// Shared Key request signing with the decoded account key.
    AccountKey {
        account_name: String,
        key: Vec<u8>,
    },
    /// No request signing; authorization rides on a SAS token appended to
    /// every request URL.
    Anonymous { sas_token: SasToken },
}

/// A configured request pipeline: one HTTP client bound to an endpoint and
/// an authorization mode. Built once per upload.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub endpoint: String,
    pub auth: PipelineAuth,
    pub http: reqwest::Client,
}

/// Outcome of a chunked transfer.
///
/// `status_code` is the status of the request that finalized the blob
/// (Put Blob, or Put Block List for multi-chunk transfers); 201 means the
/// blob was created. `chunks_sent` counts the data-carrying requests.
#[derive(Debug, Clone, Copy)]
pub struct TransferResponse {
    pub status_code: u16,
    pub chunks_sent: usize,
}

impl TransferResponse {
    pub fn created(&self) -> bool {
        self.status_code == 201
    }
}

/// Capability interface over the blob storage service.
///
/// Implemented by the real REST client in [`azure`](crate::azure) and by
/// `MockBlobStorageClient` in tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait BlobStorageClient: Send + Sync {
    /// Sign an account SAS over the given scope, valid until `expiry`.
    fn sign(
        &self,
        credentials: &StorageCredentials,
        scope: &SasScope,
        expiry: DateTime<Utc>,
    ) -> StorageResult<SasToken>;

    /// Build a request pipeline for the given endpoint and authorization.
    fn build_pipeline(&self, endpoint: String, auth: PipelineAuth) -> StorageResult<Pipeline>;

    /// Upload the open file to the addressed blob in `chunk_size` chunks.
    ///
    /// `concurrency` is the number of chunks in flight at once; this crate
    /// always passes 1 (strictly sequential transfer).
    async fn upload_chunked(
        &self,
        pipeline: &Pipeline,
        blob: &BlobReference,
        file: File,
        chunk_size: usize,
        concurrency: usize,
    ) -> StorageResult<TransferResponse>;
}
