//! Façade behavior against a mocked storage collaborator: no network access
//! anywhere in this file.

use std::io::Write;

use chrono::{Duration, Utc};
use tempfile::NamedTempFile;

use az_upload_core::contract::{MockBlobStorageClient, Pipeline, PipelineAuth, TransferResponse};
use az_upload_core::credentials::StorageCredentials;
use az_upload_core::error::StorageError;
use az_upload_core::sas::SasToken;
use az_upload_core::service::{BlobService, SAS_TTL_SECS, UPLOAD_CHUNK_SIZE, UPLOAD_CONCURRENCY};
use az_upload_core::AzureStorageClient;

// base64 of "0123456789abcdef"
const DUMMY_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZg==";

fn credentials() -> StorageCredentials {
    StorageCredentials::new("myaccount", Some(DUMMY_KEY.to_string()), "container").unwrap()
}

fn pipeline(auth: PipelineAuth) -> Pipeline {
    Pipeline {
        endpoint: "https://myaccount.blob.core.windows.net".to_string(),
        auth,
        http: reqwest::Client::new(),
    }
}

fn temp_file_with(content: &[u8]) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("Creating temp file failed");
    f.write_all(content).expect("Writing temp file failed");
    f
}

#[test]
fn sas_token_signs_with_one_minute_expiry() {
    let mut client = MockBlobStorageClient::new();
    client
        .expect_sign()
        .withf(|creds, scope, expiry| {
            let expected = Utc::now() + Duration::seconds(SAS_TTL_SECS);
            let drift = (*expiry - expected).num_seconds().abs();
            creds.account_name() == "myaccount"
                && scope.permissions() == "rw"
                && scope.services() == "b"
                && scope.resource_types() == "co"
                && drift <= 2
        })
        .times(1)
        .returning(|_, _, _| Ok(SasToken::new("sv=2018-11-09&sig=abc")));

    let service = BlobService::new(credentials(), client);
    let token = service.sas_token().unwrap();
    assert_eq!(token.as_str(), "?sv=2018-11-09&sig=abc");
}

#[test]
fn sas_tokens_are_not_cached_across_calls() {
    // Real signer: expiry is relative to call time, so two calls straddling
    // a second boundary must differ.
    let service = BlobService::new(credentials(), AzureStorageClient::new().unwrap());
    let first = service.sas_token().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let second = service.sas_token().unwrap();
    assert_ne!(first, second);
}

#[test]
fn signed_url_has_expected_shape() {
    let mut client = MockBlobStorageClient::new();
    client
        .expect_sign()
        .times(1)
        .returning(|_, _, _| Ok(SasToken::new("sv=2018-11-09&sp=rw&sig=abc")));

    let service = BlobService::new(credentials(), client);
    let url = service.url_with_sas_token("a/b.txt").unwrap();
    assert_eq!(
        url,
        "https://myaccount.blob.core.windows.net/container/a/b.txt?sv=2018-11-09&sp=rw&sig=abc"
    );
}

#[tokio::test]
async fn upload_uses_account_key_pipeline_and_fixed_chunk_policy() {
    let file = temp_file_with(b"hello");

    let mut client = MockBlobStorageClient::new();
    client
        .expect_build_pipeline()
        .withf(|endpoint, auth| {
            endpoint == "https://myaccount.blob.core.windows.net"
                && matches!(
                    auth,
                    PipelineAuth::AccountKey { account_name, key }
                        if account_name == "myaccount" && key == b"0123456789abcdef"
                )
        })
        .times(1)
        .returning(|endpoint, auth| {
            Ok(Pipeline {
                endpoint,
                auth,
                http: reqwest::Client::new(),
            })
        });
    client
        .expect_upload_chunked()
        .withf(|_, blob, _, chunk_size, concurrency| {
            blob.blob_path == "dest.txt"
                && *chunk_size == UPLOAD_CHUNK_SIZE
                && *concurrency == UPLOAD_CONCURRENCY
        })
        .times(1)
        .returning(|_, _, _, _, _| {
            Ok(TransferResponse {
                status_code: 201,
                chunks_sent: 1,
            })
        });

    let service = BlobService::new(credentials(), client);
    let url = service
        .upload_from_file(file.path().to_str().unwrap(), "dest.txt")
        .await
        .unwrap();
    assert_eq!(
        url,
        "https://myaccount.blob.core.windows.net/container/dest.txt"
    );
}

#[tokio::test]
async fn non_created_status_is_reported_as_rejection() {
    let file = temp_file_with(b"hello");

    let mut client = MockBlobStorageClient::new();
    client
        .expect_build_pipeline()
        .times(1)
        .returning(|endpoint, auth| {
            Ok(Pipeline {
                endpoint,
                auth,
                http: reqwest::Client::new(),
            })
        });
    client
        .expect_upload_chunked()
        .times(1)
        .returning(|_, _, _, _, _| {
            Ok(TransferResponse {
                status_code: 403,
                chunks_sent: 1,
            })
        });

    let service = BlobService::new(credentials(), client);
    let err = service
        .upload_from_file(file.path().to_str().unwrap(), "dest.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UploadRejected { status: 403 }));
}

#[tokio::test]
async fn missing_local_file_fails_before_any_client_call() {
    let mut client = MockBlobStorageClient::new();
    client.expect_build_pipeline().times(0);
    client.expect_upload_chunked().times(0);

    let service = BlobService::new(credentials(), client);
    let err = service
        .upload_from_file("/definitely/not/here.txt", "dest.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Io(_)));
}

#[tokio::test]
async fn sas_upload_passes_token_through_unvalidated() {
    let file = temp_file_with(b"hello");

    // A syntactically nonsensical token must still reach the transfer.
    let mut client = MockBlobStorageClient::new();
    client
        .expect_build_pipeline()
        .withf(|_, auth| {
            matches!(
                auth,
                PipelineAuth::Anonymous { sas_token } if sas_token.query() == "not-a-real-token"
            )
        })
        .times(1)
        .returning(|endpoint, auth| {
            Ok(Pipeline {
                endpoint,
                auth,
                http: reqwest::Client::new(),
            })
        });
    client
        .expect_upload_chunked()
        .times(1)
        .returning(|_, _, _, _, _| {
            Ok(TransferResponse {
                status_code: 403,
                chunks_sent: 1,
            })
        });

    let service = BlobService::new(
        StorageCredentials::new("myaccount", None, "container").unwrap(),
        client,
    );
    let err = service
        .upload_from_file_with_sas_token(
            file.path().to_str().unwrap(),
            "dest.txt",
            "not-a-real-token",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::UploadRejected { status: 403 }));
}

#[tokio::test]
async fn sas_upload_returns_url_with_token_appended() {
    let file = temp_file_with(b"hello");

    let mut client = MockBlobStorageClient::new();
    client
        .expect_build_pipeline()
        .times(1)
        .returning(|endpoint, auth| {
            Ok(Pipeline {
                endpoint,
                auth,
                http: reqwest::Client::new(),
            })
        });
    client
        .expect_upload_chunked()
        .times(1)
        .returning(|_, _, _, _, _| {
            Ok(TransferResponse {
                status_code: 201,
                chunks_sent: 1,
            })
        });

    let service = BlobService::new(
        StorageCredentials::new("myaccount", None, "container").unwrap(),
        client,
    );
    let url = service
        .upload_from_file_with_sas_token(file.path().to_str().unwrap(), "dest.txt", "?sv=x&sig=y")
        .await
        .unwrap();
    assert_eq!(
        url,
        "https://myaccount.blob.core.windows.net/container/dest.txt?sv=x&sig=y"
    );
}

#[tokio::test]
async fn key_based_upload_without_key_fails_before_transfer() {
    let file = temp_file_with(b"hello");

    let mut client = MockBlobStorageClient::new();
    client.expect_build_pipeline().times(0);
    client.expect_upload_chunked().times(0);

    let service = BlobService::new(
        StorageCredentials::new("myaccount", None, "container").unwrap(),
        client,
    );
    let err = service
        .upload_from_file(file.path().to_str().unwrap(), "dest.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Configuration(_)));
}
