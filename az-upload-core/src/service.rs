//! The blob service façade: one instance per CLI invocation.
//!
//! Wraps credential handling, SAS issuance, signed-URL composition, and
//! upload orchestration over the [`BlobStorageClient`] seam. Every operation
//! is self-contained; nothing is cached between calls.

use chrono::{Duration, Utc};
use tokio::fs::File;
use tracing::{debug, info, warn};

use crate::contract::{BlobStorageClient, PipelineAuth};
use crate::credentials::StorageCredentials;
use crate::error::{StorageError, StorageResult};
use crate::sas::{SasScope, SasToken};

/// Fixed transfer chunk size: 8 MiB.
pub const UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Chunks in flight at once. Transfers are strictly sequential.
pub const UPLOAD_CONCURRENCY: usize = 1;

/// Every issued SAS token expires this many seconds after signing.
pub const SAS_TTL_SECS: i64 = 60;

pub struct BlobService<C: BlobStorageClient> {
    credentials: StorageCredentials,
    client: C,
}

impl<C: BlobStorageClient> BlobService<C> {
    pub fn new(credentials: StorageCredentials, client: C) -> Self {
        debug!(
            account_name = credentials.account_name(),
            container_name = credentials.container_name(),
            "Constructed blob service"
        );
        Self {
            credentials,
            client,
        }
    }

    /// Issues a fresh read/write account SAS over the blob service, valid
    /// for the next minute. Never cached: each call re-signs against the
    /// current time, so two calls yield two different tokens.
    pub fn sas_token(&self) -> StorageResult<SasToken> {
        let expiry = Utc::now() + Duration::seconds(SAS_TTL_SECS);
        let scope = SasScope::read_write_blob();
        let token = self.client.sign(&self.credentials, &scope, expiry)?;
        info!(expiry = %expiry, "Issued account SAS token");
        Ok(token)
    }

    /// Composes a signed URL for the given blob path, re-signing on every
    /// call.
    pub fn url_with_sas_token(&self, blob_path: &str) -> StorageResult<String> {
        let token = self.sas_token()?;
        let blob = self.credentials.blob_reference(blob_path);
        Ok(format!(
            "{}{}",
            blob.url(&self.credentials.endpoint()),
            token
        ))
    }

    /// Uploads a local file with account-key authentication and returns the
    /// blob URL.
    ///
    /// The file handle is opened immediately before the transfer and closed
    /// on every exit path. A transfer that completes with a status other
    /// than 201 Created is reported as [`StorageError::UploadRejected`].
    pub async fn upload_from_file(&self, local_path: &str, blob_path: &str) -> StorageResult<String> {
        debug!(local_path, blob_path, "Uploading file with account key");

        let auth = PipelineAuth::AccountKey {
            account_name: self.credentials.account_name().to_string(),
            key: self.credentials.decoded_key()?,
        };
        let url = self.upload(local_path, blob_path, auth).await?;

        info!(url = %url, "Upload complete");
        Ok(url)
    }

    /// Uploads a local file authorized purely by a caller-supplied SAS
    /// token and returns the blob URL with the token appended.
    ///
    /// The token is passed through untouched: no client-side check of its
    /// shape or expiry. A bad token surfaces as whatever the server says.
    pub async fn upload_from_file_with_sas_token(
        &self,
        local_path: &str,
        blob_path: &str,
        sas_token: &str,
    ) -> StorageResult<String> {
        debug!(local_path, blob_path, "Uploading file with SAS token");

        let token = SasToken::new(sas_token);
        let auth = PipelineAuth::Anonymous {
            sas_token: token.clone(),
        };
        let url = self.upload(local_path, blob_path, auth).await?;

        info!("Upload with SAS token complete");
        Ok(format!("{url}{token}"))
    }

    async fn upload(
        &self,
        local_path: &str,
        blob_path: &str,
        auth: PipelineAuth,
    ) -> StorageResult<String> {
        let file = File::open(local_path).await?;

        let pipeline = self
            .client
            .build_pipeline(self.credentials.endpoint(), auth)?;
        let blob = self.credentials.blob_reference(blob_path);

        let response = self
            .client
            .upload_chunked(&pipeline, &blob, file, UPLOAD_CHUNK_SIZE, UPLOAD_CONCURRENCY)
            .await?;

        if !response.created() {
            warn!(
                status_code = response.status_code,
                chunks_sent = response.chunks_sent,
                "Could not upload the file"
            );
            return Err(StorageError::UploadRejected {
                status: response.status_code,
            });
        }

        debug!(chunks_sent = response.chunks_sent, "Transfer accepted");
        Ok(blob.url(&self.credentials.endpoint()))
    }
}
