//! Real [`BlobStorageClient`] backed by the Azure Blob REST API.
//!
//! Requests go straight through `reqwest`; Shared Key pipelines sign every
//! request with the canonicalized-headers/resource scheme, anonymous
//! pipelines append the SAS token to each request URL instead.
//!
//! Transfer strategy mirrors the block blob primitives:
//! - payloads of at most one chunk go up as a single Put Blob
//!   (this covers empty files),
//! - larger payloads are staged sequentially with Put Block and finalized
//!   with Put Block List. Block IDs are base64 of a fixed-width ordinal, so
//!   they are equal length as the API requires.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::Sha256;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use async_trait::async_trait;
use chrono::DateTime;

use crate::contract::{BlobStorageClient, Pipeline, PipelineAuth, TransferResponse};
use crate::credentials::{BlobReference, StorageCredentials};
use crate::error::{StorageError, StorageResult};
use crate::sas::{sign_account_sas, SasScope, SasToken};

/// Azure REST API version sent in `x-ms-version` on every request.
const AZURE_API_VERSION: &str = "2023-11-03";

const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";
const CONTENT_TYPE_XML: &str = "application/xml";

/// Azure expects `/` unencoded in blob paths; everything else outside the
/// unreserved set gets percent-encoded.
const BLOB_PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// One contiguous chunk of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub offset: u64,
    pub len: usize,
}

/// Splits `total` bytes into sequential chunks of at most `chunk_size`.
/// An empty payload still needs one (zero-length) Put Blob request, so it
/// plans as a single empty chunk.
pub fn plan_chunks(total: u64, chunk_size: usize) -> Vec<ChunkPlan> {
    if total == 0 {
        return vec![ChunkPlan { offset: 0, len: 0 }];
    }
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut offset = 0u64;
    while offset < total {
        let len = ((total - offset) as usize).min(chunk_size);
        chunks.push(ChunkPlan { offset, len });
        offset += len as u64;
    }
    chunks
}

/// Block IDs must be base64 and the same length for every block in a blob.
/// A six-digit ordinal stays fixed-width for any index the service can
/// accept: a block blob holds at most [`MAX_BLOCKS_PER_BLOB`] blocks.
fn block_id(index: usize) -> String {
    BASE64_STANDARD.encode(format!("{index:06}"))
}

/// Service limit on committed blocks per block blob.
const MAX_BLOCKS_PER_BLOB: usize = 50_000;

/// The production blob storage client.
#[derive(Debug, Clone)]
pub struct AzureStorageClient {
    http: reqwest::Client,
}

impl AzureStorageClient {
    pub fn new() -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self { http })
    }

    fn blob_url(&self, pipeline: &Pipeline, blob: &BlobReference) -> String {
        let encoded = utf8_percent_encode(&blob.blob_path, BLOB_PATH_ENCODE_SET).to_string();
        format!("{}/{}/{}", pipeline.endpoint, blob.container_name, encoded)
    }

    /// Appends the pipeline's SAS token when authorization is anonymous.
    fn authorize_url(&self, pipeline: &Pipeline, url: &str) -> String {
        match &pipeline.auth {
            PipelineAuth::Anonymous { sas_token } => {
                if url.contains('?') {
                    format!("{}&{}", url, sas_token.query())
                } else {
                    format!("{}?{}", url, sas_token.query())
                }
            }
            PipelineAuth::AccountKey { .. } => url.to_string(),
        }
    }

    /// Current UTC instant in the RFC 1123 form Azure expects in `x-ms-date`.
    fn http_date() -> String {
        Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }

    /// Computes the `Authorization: SharedKey {account}:{signature}` value
    /// for a request, per the Shared Key scheme: newline-joined standard
    /// headers, then sorted `x-ms-*` headers, then the canonicalized
    /// resource with sorted query parameters.
    fn shared_key_authorization(
        account_name: &str,
        key: &[u8],
        method: &str,
        content_length: usize,
        content_type: &str,
        date: &str,
        extra_ms_headers: &[(&str, &str)],
        blob: &BlobReference,
        query_params: &[(&str, &str)],
    ) -> StorageResult<String> {
        let content_length_str = if content_length == 0 {
            String::new()
        } else {
            content_length.to_string()
        };

        let mut ms_headers: Vec<(String, String)> = vec![
            ("x-ms-date".to_string(), date.to_string()),
            ("x-ms-version".to_string(), AZURE_API_VERSION.to_string()),
        ];
        for (k, v) in extra_ms_headers {
            ms_headers.push((k.to_lowercase(), v.to_string()));
        }
        ms_headers.sort_by(|a, b| a.0.cmp(&b.0));
        let canonicalized_headers = ms_headers
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join("\n");

        // Shared Key uses the un-encoded blob name in the resource.
        let mut canonicalized_resource = format!(
            "/{}/{}/{}",
            account_name, blob.container_name, blob.blob_path
        );
        let mut sorted_params = query_params.to_vec();
        sorted_params.sort_by(|a, b| a.0.cmp(b.0));
        for (k, v) in &sorted_params {
            canonicalized_resource.push_str(&format!("\n{}:{}", k.to_lowercase(), v));
        }

        let string_to_sign = format!(
            "{method}\n\n\n{content_length_str}\n\n{content_type}\n\n\n\n\n\n\n{canonicalized_headers}\n{canonicalized_resource}"
        );

        let mut mac = Hmac::<Sha256>::new_from_slice(key)
            .map_err(|e| StorageError::Authentication(format!("HMAC key error: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

        Ok(format!("SharedKey {account_name}:{signature}"))
    }

    /// Issues one PUT against the blob endpoint, signing or token-appending
    /// per the pipeline's authorization, and returns the response status.
    async fn put(
        &self,
        pipeline: &Pipeline,
        blob: &BlobReference,
        query_params: &[(&str, &str)],
        extra_ms_headers: &[(&str, &str)],
        content_type: &str,
        body: Vec<u8>,
    ) -> StorageResult<u16> {
        let mut url = self.blob_url(pipeline, blob);
        if !query_params.is_empty() {
            let query = query_params
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{k}={}",
                        utf8_percent_encode(v, percent_encoding::NON_ALPHANUMERIC)
                    )
                })
                .collect::<Vec<_>>()
                .join("&");
            url = format!("{url}?{query}");
        }
        let url = self.authorize_url(pipeline, &url);

        let date = Self::http_date();
        let mut req = pipeline
            .http
            .put(&url)
            .header("x-ms-date", &date)
            .header("x-ms-version", AZURE_API_VERSION)
            .header("Content-Type", content_type);
        for (k, v) in extra_ms_headers {
            req = req.header(*k, *v);
        }

        if let PipelineAuth::AccountKey { account_name, key } = &pipeline.auth {
            let authorization = Self::shared_key_authorization(
                account_name,
                key,
                "PUT",
                body.len(),
                content_type,
                &date,
                extra_ms_headers,
                blob,
                query_params,
            )?;
            req = req.header("Authorization", authorization);
        }

        let resp = req.body(body).send().await?;
        Ok(resp.status().as_u16())
    }

    /// Put Blob: uploads the whole payload in one request.
    async fn put_blob(
        &self,
        pipeline: &Pipeline,
        blob: &BlobReference,
        body: Vec<u8>,
    ) -> StorageResult<u16> {
        debug!(blob_path = %blob.blob_path, bytes = body.len(), "Put Blob");
        self.put(
            pipeline,
            blob,
            &[],
            &[("x-ms-blob-type", "BlockBlob")],
            CONTENT_TYPE_OCTET_STREAM,
            body,
        )
        .await
    }

    /// Put Block: stages one chunk on the blob under the given block ID.
    async fn put_block(
        &self,
        pipeline: &Pipeline,
        blob: &BlobReference,
        block_id: &str,
        body: Vec<u8>,
    ) -> StorageResult<u16> {
        debug!(blob_path = %blob.blob_path, block_id, bytes = body.len(), "Put Block");
        self.put(
            pipeline,
            blob,
            &[("blockid", block_id), ("comp", "block")],
            &[],
            CONTENT_TYPE_OCTET_STREAM,
            body,
        )
        .await
    }

    /// Put Block List: commits the staged blocks in order.
    async fn put_block_list(
        &self,
        pipeline: &Pipeline,
        blob: &BlobReference,
        block_ids: &[String],
    ) -> StorageResult<u16> {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<BlockList>\n");
        for id in block_ids {
            xml.push_str(&format!("  <Latest>{id}</Latest>\n"));
        }
        xml.push_str("</BlockList>");

        debug!(blob_path = %blob.blob_path, blocks = block_ids.len(), "Put Block List");
        self.put(
            pipeline,
            blob,
            &[("comp", "blocklist")],
            &[],
            CONTENT_TYPE_XML,
            xml.into_bytes(),
        )
        .await
    }
}

#[async_trait]
impl BlobStorageClient for AzureStorageClient {
    fn sign(
        &self,
        credentials: &StorageCredentials,
        scope: &SasScope,
        expiry: DateTime<Utc>,
    ) -> StorageResult<SasToken> {
        sign_account_sas(credentials, scope, expiry)
    }

    fn build_pipeline(&self, endpoint: String, auth: PipelineAuth) -> StorageResult<Pipeline> {
        Ok(Pipeline {
            endpoint,
            auth,
            http: self.http.clone(),
        })
    }

    async fn upload_chunked(
        &self,
        pipeline: &Pipeline,
        blob: &BlobReference,
        mut file: File,
        chunk_size: usize,
        concurrency: usize,
    ) -> StorageResult<TransferResponse> {
        if concurrency != 1 {
            warn!(concurrency, "Only sequential transfer is supported; ignoring concurrency factor");
        }

        let total = file.metadata().await?.len();
        let plan = plan_chunks(total, chunk_size);
        debug!(blob_path = %blob.blob_path, total, chunks = plan.len(), "Starting transfer");

        if plan.len() > MAX_BLOCKS_PER_BLOB {
            return Err(StorageError::Configuration(format!(
                "file needs {} blocks at this chunk size; the service allows at most {} per blob",
                plan.len(),
                MAX_BLOCKS_PER_BLOB
            )));
        }

        if plan.len() <= 1 {
            let mut body = Vec::with_capacity(total as usize);
            file.read_to_end(&mut body).await?;
            let status_code = self.put_blob(pipeline, blob, body).await?;
            return Ok(TransferResponse {
                status_code,
                chunks_sent: plan.len(),
            });
        }

        let mut block_ids = Vec::with_capacity(plan.len());
        for (index, chunk) in plan.iter().enumerate() {
            let mut body = vec![0u8; chunk.len];
            file.read_exact(&mut body).await?;

            let id = block_id(index);
            let status_code = self.put_block(pipeline, blob, &id, body).await?;
            if status_code != 201 {
                warn!(status_code, block = index, "Block was not accepted; aborting transfer");
                return Ok(TransferResponse {
                    status_code,
                    chunks_sent: index + 1,
                });
            }
            block_ids.push(id);
        }

        let status_code = self.put_block_list(pipeline, blob, &block_ids).await?;
        Ok(TransferResponse {
            status_code,
            chunks_sent: plan.len(),
        })
    }
}
