#![doc = "az-upload-core: credentials, SAS signing, and chunked blob upload for az-upload."]

//! This crate contains all the storage logic behind the `az-upload` CLI:
//! validated account credentials, account SAS generation, the
//! [`BlobStorageClient`](contract::BlobStorageClient) collaborator seam with
//! its real Azure REST implementation, and the per-invocation
//! [`BlobService`](service::BlobService) façade.

pub mod azure;
pub mod contract;
pub mod credentials;
pub mod error;
pub mod sas;
pub mod service;

pub use azure::AzureStorageClient;
pub use contract::BlobStorageClient;
pub use credentials::{BlobReference, StorageCredentials};
pub use error::{StorageError, StorageResult};
pub use sas::SasToken;
pub use service::BlobService;
