//! Account-level shared access signature (SAS) generation.
//!
//! Implements the account SAS scheme for service version 2018-11-09:
//! a newline-joined string-to-sign is HMAC-SHA256 signed with the decoded
//! account key, and the result is assembled into a URL-encoded query string.
//!
//! Reference: [Create an account SAS](https://learn.microsoft.com/en-us/rest/api/storageservices/create-account-sas)

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use crate::credentials::StorageCredentials;
use crate::error::{StorageError, StorageResult};

/// Service version stamped into every token (`sv`).
pub const SAS_VERSION: &str = "2018-11-09";

/// An encoded SAS query string, stored with its leading `?` so it can be
/// appended directly to a blob URL.
///
/// The token is opaque: it is either produced by [`sign_account_sas`] or
/// supplied verbatim by the caller, and is never parsed or validated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasToken(String);

impl SasToken {
    /// Wraps a raw token string, normalising it to carry a leading `?`.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.starts_with('?') {
            Self(raw)
        } else {
            Self(format!("?{raw}"))
        }
    }

    /// The token including its leading `?`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare query string, without the leading `?`.
    pub fn query(&self) -> &str {
        &self.0[1..]
    }
}

impl fmt::Display for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an account SAS grants: permissions, services, and resource types.
///
/// Rendered into the short-code strings Azure expects (`rw`, `b`, `co`).
#[derive(Debug, Clone)]
pub struct SasScope {
    pub read: bool,
    pub write: bool,
    pub blob_service: bool,
    pub container_resource: bool,
    pub object_resource: bool,
    pub protocol: SasProtocol,
}

impl SasScope {
    /// Read+write over blob containers and objects, HTTPS or HTTP.
    /// This is the only scope the CLI issues.
    pub fn read_write_blob() -> Self {
        Self {
            read: true,
            write: true,
            blob_service: true,
            container_resource: true,
            object_resource: true,
            protocol: SasProtocol::HttpsHttp,
        }
    }

    /// Permission short codes in Azure's canonical order.
    pub fn permissions(&self) -> String {
        let mut s = String::new();
        if self.read {
            s.push('r');
        }
        if self.write {
            s.push('w');
        }
        s
    }

    pub fn services(&self) -> String {
        if self.blob_service { "b" } else { "" }.to_string()
    }

    pub fn resource_types(&self) -> String {
        let mut s = String::new();
        if self.container_resource {
            s.push('c');
        }
        if self.object_resource {
            s.push('o');
        }
        s
    }
}

/// Allowed protocols (`spr`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasProtocol {
    Https,
    HttpsHttp,
}

impl SasProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SasProtocol::Https => "https",
            SasProtocol::HttpsHttp => "https,http",
        }
    }
}

/// Signs an account SAS for the given scope and expiry instant.
///
/// Fails with an authentication error when the account key is missing or is
/// not valid base64 key material.
pub fn sign_account_sas(
    credentials: &StorageCredentials,
    scope: &SasScope,
    expiry: DateTime<Utc>,
) -> StorageResult<SasToken> {
    let key = credentials.decoded_key()?;
    let expiry_str = format_sas_time(expiry);

    let string_to_sign = account_sas_string_to_sign(
        credentials.account_name(),
        &scope.permissions(),
        &scope.services(),
        &scope.resource_types(),
        &expiry_str,
        scope.protocol.as_str(),
    );

    let mut mac = Hmac::<Sha256>::new_from_slice(&key)
        .map_err(|e| StorageError::Authentication(format!("HMAC key error: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

    let query: String = form_urlencoded::Serializer::new(String::new())
        .append_pair("sv", SAS_VERSION)
        .append_pair("ss", &scope.services())
        .append_pair("srt", &scope.resource_types())
        .append_pair("sp", &scope.permissions())
        .append_pair("se", &expiry_str)
        .append_pair("spr", scope.protocol.as_str())
        .append_pair("sig", &signature)
        .finish();

    Ok(SasToken::new(query))
}

/// The 2018-11-09 account SAS string-to-sign. Start time and IP range are
/// intentionally blank; a trailing newline is part of the format.
fn account_sas_string_to_sign(
    account_name: &str,
    permissions: &str,
    services: &str,
    resource_types: &str,
    expiry: &str,
    protocol: &str,
) -> String {
    format!(
        "{account_name}\n{permissions}\n{services}\n{resource_types}\n\n{expiry}\n\n{protocol}\n{SAS_VERSION}\n"
    )
}

/// ISO 8601 UTC with seconds precision, the format Azure expects in `se`.
pub fn format_sas_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
