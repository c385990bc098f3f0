//! Account credentials and blob addressing.
//!
//! `StorageCredentials` is an immutable value constructed once per CLI
//! invocation and handed to the [`BlobService`](crate::service::BlobService)
//! façade. Account and container names are validated eagerly so that a typo
//! surfaces as a configuration error before any network activity.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Credentials for one storage account + container.
///
/// The account key is optional: SAS-based invocations never need it.
#[derive(Debug, Clone)]
pub struct StorageCredentials {
    account_name: String,
    account_key: Option<String>,
    container_name: String,
}

impl StorageCredentials {
    /// Validates names and builds an immutable credential set.
    ///
    /// Azure rules: account names are 3-24 lowercase alphanumeric characters;
    /// container names are 3-63 lowercase alphanumeric characters with
    /// interior dashes allowed.
    pub fn new(
        account_name: impl Into<String>,
        account_key: Option<String>,
        container_name: impl Into<String>,
    ) -> StorageResult<Self> {
        let account_name = account_name.into();
        let container_name = container_name.into();

        validate_account_name(&account_name)?;
        validate_container_name(&container_name)?;

        debug!(
            account_name = %account_name,
            container_name = %container_name,
            key_present = account_key.is_some(),
            "Constructed storage credentials"
        );

        Ok(Self {
            account_name,
            account_key,
            container_name,
        })
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// The raw base64 account key, if one was supplied.
    pub fn account_key(&self) -> Option<&str> {
        self.account_key.as_deref()
    }

    /// Decodes the account key into raw HMAC key bytes.
    ///
    /// A missing key is a configuration error; key material that is not
    /// valid base64 is an authentication error.
    pub fn decoded_key(&self) -> StorageResult<Vec<u8>> {
        let key = self.account_key.as_deref().ok_or_else(|| {
            StorageError::Configuration("account key is required for this operation".to_string())
        })?;
        BASE64_STANDARD.decode(key).map_err(|e| {
            StorageError::Authentication(format!("account key is not valid base64: {e}"))
        })
    }

    /// The blob service endpoint for this account.
    pub fn endpoint(&self) -> String {
        format!("https://{}.blob.core.windows.net", self.account_name)
    }

    /// Addresses a single blob inside this credential's container.
    pub fn blob_reference(&self, blob_path: impl Into<String>) -> BlobReference {
        BlobReference {
            container_name: self.container_name.clone(),
            blob_path: blob_path.into(),
        }
    }
}

/// One remote object: container plus relative blob path.
#[derive(Debug, Clone)]
pub struct BlobReference {
    pub container_name: String,
    pub blob_path: String,
}

impl BlobReference {
    /// Full unsigned URL of the blob under the given account endpoint.
    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", endpoint, self.container_name, self.blob_path)
    }
}

fn validate_account_name(name: &str) -> StorageResult<()> {
    let ok = (3..=24).contains(&name.len())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if ok {
        Ok(())
    } else {
        Err(StorageError::Configuration(format!(
            "invalid account name {name:?}: expected 3-24 lowercase alphanumeric characters"
        )))
    }
}

fn validate_container_name(name: &str) -> StorageResult<()> {
    let chars_ok = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let ok = (3..=63).contains(&name.len())
        && chars_ok
        && !name.starts_with('-')
        && !name.ends_with('-');
    if ok {
        Ok(())
    } else {
        Err(StorageError::Configuration(format!(
            "invalid container name {name:?}: expected 3-63 lowercase alphanumeric or dash characters"
        )))
    }
}
