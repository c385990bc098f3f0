//! CLI surface and command dispatch for az-upload.
//!
//! This module is strictly CLI glue: clap definitions, required-option
//! validation, and routing into the [`BlobService`] façade. All storage
//! logic lives in the `az-upload-core` crate.
//!
//! Validation runs before any façade call, so a missing option never
//! triggers network activity. The async [`run`] entrypoint is generic over
//! the storage collaborator for programmatic invocation and integration
//! testing with a mock client.

use clap::{Args, Parser, Subcommand};
use std::env;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

use az_upload_core::{BlobService, BlobStorageClient, StorageCredentials, StorageError};

use crate::exitcode;

/// CLI for az-upload: SAS tokens, signed URLs, and file uploads for Azure
/// Blob Storage.
#[derive(Parser)]
#[clap(
    name = "az-upload",
    version,
    about = "Upload files to Azure Blob Storage"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a time-limited account SAS token
    #[clap(name = "generateSAS")]
    GenerateSas(StorageOpts),

    /// Generate a signed URL for a blob path
    #[clap(name = "generateURL")]
    GenerateUrl(StorageOpts),

    /// Upload a local file using account-key authentication
    #[clap(name = "upload")]
    Upload(StorageOpts),

    /// Upload a local file using a pre-issued SAS token
    #[clap(name = "uploadWithSAS")]
    UploadWithSas(StorageOpts),
}

/// The shared option set. Every option is optional at the parser level;
/// required combinations are checked per command so the user gets the
/// instructional message instead of a clap error.
#[derive(Args, Debug, Default)]
pub struct StorageOpts {
    /// Account Name of Azure Storage Service
    #[clap(short = 'n', long = "account-name")]
    pub account_name: Option<String>,

    /// Account Key of Azure Storage Service
    #[clap(short = 'k', long = "account-key")]
    pub account_key: Option<String>,

    /// Container Name
    #[clap(short = 'c', long = "container")]
    pub container: Option<String>,

    /// The file to upload to Azure Storage
    #[clap(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// Blob File Path
    #[clap(short = 'p', long = "path")]
    pub path: Option<String>,

    /// SAS Token
    #[clap(short = 't', long = "sas-token")]
    pub sas_token: Option<String>,
}

impl StorageOpts {
    /// Fills absent credential options from the conventional environment
    /// variables (`.env` is loaded in main before parsing).
    pub fn with_env_fallback(mut self) -> Self {
        self.account_name = self
            .account_name
            .or_else(|| env::var("AZURE_STORAGE_ACCOUNT").ok());
        self.account_key = self
            .account_key
            .or_else(|| env::var("AZURE_STORAGE_KEY").ok());
        self.container = self
            .container
            .or_else(|| env::var("AZURE_STORAGE_CONTAINER").ok());
        self
    }
}

/// Errors surfaced at the CLI boundary, each mapped to a distinct exit code.
#[derive(Error, Debug)]
pub enum CliError {
    /// A required option is missing; the message is the user-facing
    /// instructional line.
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CliError {
    fn usage(msg: &str) -> Self {
        CliError::Usage(msg.to_string())
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => exitcode::USAGE,
            CliError::Storage(e) => match e {
                StorageError::Configuration(_) => exitcode::CONFIG,
                StorageError::Authentication(_) => exitcode::DATAERR,
                StorageError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                    exitcode::NOINPUT
                }
                StorageError::Io(_) => exitcode::IOERR,
                StorageError::UploadRejected { .. } => exitcode::SOFTWARE,
                StorageError::Transport(_) => exitcode::UNAVAILABLE,
            },
        }
    }
}

/// Dispatches one parsed command against the given storage collaborator.
///
/// Extracted from `main` so integration tests can drive it with a mock
/// client and assert that validation failures never touch the collaborator.
pub async fn run<C: BlobStorageClient>(cli: Cli, client: C) -> Result<(), CliError> {
    match cli.command {
        Commands::GenerateSas(opts) => {
            let opts = opts.with_env_fallback();
            let service = BlobService::new(key_credentials(&opts)?, client);

            println!("Generating SAS Token");
            let token = service.sas_token()?;
            println!("Token : {token}");
        }
        Commands::GenerateUrl(opts) => {
            let opts = opts.with_env_fallback();
            let credentials = key_credentials(&opts)?;
            let blob_path = opts
                .path
                .clone()
                .ok_or_else(|| CliError::usage("Blob File Path parameter is missing"))?;
            let service = BlobService::new(credentials, client);

            println!("Generating private URL");
            let url = service.url_with_sas_token(&blob_path)?;
            println!("URL : {url}");
        }
        Commands::Upload(opts) => {
            let opts = opts.with_env_fallback();
            let credentials = key_credentials(&opts)?;
            let (local_path, blob_path) = upload_target(&opts)?;
            let service = BlobService::new(credentials, client);

            println!("Uploading file");
            let url = service.upload_from_file(&local_path, &blob_path).await?;
            println!("Uploaded. URL : {url}");
        }
        Commands::UploadWithSas(opts) => {
            let opts = opts.with_env_fallback();
            let credentials = sas_credentials(&opts)?;
            let (Some(_), Some(token)) = (&opts.file, &opts.sas_token) else {
                return Err(CliError::usage("File or SAS Token is missing"));
            };
            let token = token.clone();
            let (local_path, blob_path) = upload_target(&opts)?;
            let service = BlobService::new(credentials, client);

            println!("Uploading file with SAS Token");
            let url = service
                .upload_from_file_with_sas_token(&local_path, &blob_path, &token)
                .await?;
            println!("Uploaded. URL : {url}");
        }
    }

    info!("Command completed");
    Ok(())
}

/// Credentials for account-key-authenticated commands.
fn key_credentials(opts: &StorageOpts) -> Result<StorageCredentials, CliError> {
    let (Some(account), Some(key), Some(container)) =
        (&opts.account_name, &opts.account_key, &opts.container)
    else {
        return Err(CliError::usage(
            "You have to give AccountName, AccountKey and ContainerName as parameter",
        ));
    };
    Ok(StorageCredentials::new(
        account.clone(),
        Some(key.clone()),
        container.clone(),
    )?)
}

/// Credentials for SAS-authorized commands; no account key involved.
fn sas_credentials(opts: &StorageOpts) -> Result<StorageCredentials, CliError> {
    let (Some(account), Some(container)) = (&opts.account_name, &opts.container) else {
        return Err(CliError::usage(
            "You have to give AccountName and ContainerName as parameter",
        ));
    };
    Ok(StorageCredentials::new(
        account.clone(),
        None,
        container.clone(),
    )?)
}

/// Resolves the local file and the target blob path. The blob path defaults
/// to the local file's name; `-p/--path` overrides it.
fn upload_target(opts: &StorageOpts) -> Result<(String, String), CliError> {
    let file = opts
        .file
        .as_ref()
        .ok_or_else(|| CliError::usage("File parameter is missing"))?;
    let local_path = file.to_string_lossy().into_owned();

    let blob_path = match &opts.path {
        Some(p) => p.clone(),
        None => file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| CliError::usage("File parameter is missing"))?,
    };

    Ok((local_path, blob_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_credentials_requires_all_three() {
        let opts = StorageOpts {
            account_name: Some("myaccount".to_string()),
            container: Some("container".to_string()),
            ..Default::default()
        };
        let err = key_credentials(&opts).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
        assert_eq!(
            err.to_string(),
            "You have to give AccountName, AccountKey and ContainerName as parameter"
        );
    }

    #[test]
    fn sas_credentials_does_not_need_a_key() {
        let opts = StorageOpts {
            account_name: Some("myaccount".to_string()),
            container: Some("container".to_string()),
            ..Default::default()
        };
        let creds = sas_credentials(&opts).unwrap();
        assert!(creds.account_key().is_none());
    }

    #[test]
    fn blob_path_defaults_to_file_name() {
        let opts = StorageOpts {
            file: Some(PathBuf::from("/tmp/some/report.pdf")),
            ..Default::default()
        };
        let (local, blob) = upload_target(&opts).unwrap();
        assert_eq!(local, "/tmp/some/report.pdf");
        assert_eq!(blob, "report.pdf");
    }

    #[test]
    fn explicit_path_overrides_file_name() {
        let opts = StorageOpts {
            file: Some(PathBuf::from("/tmp/report.pdf")),
            path: Some("archive/2024/report.pdf".to_string()),
            ..Default::default()
        };
        let (_, blob) = upload_target(&opts).unwrap();
        assert_eq!(blob, "archive/2024/report.pdf");
    }

    #[test]
    fn exit_codes_distinguish_error_classes() {
        assert_eq!(CliError::usage("x").exit_code(), exitcode::USAGE);
        assert_eq!(
            CliError::Storage(StorageError::Configuration("x".to_string())).exit_code(),
            exitcode::CONFIG
        );
        assert_eq!(
            CliError::Storage(StorageError::Authentication("x".to_string())).exit_code(),
            exitcode::DATAERR
        );
        assert_eq!(
            CliError::Storage(StorageError::UploadRejected { status: 403 }).exit_code(),
            exitcode::SOFTWARE
        );
        assert_eq!(
            CliError::Storage(StorageError::Io(std::io::Error::from(
                std::io::ErrorKind::NotFound
            )))
            .exit_code(),
            exitcode::NOINPUT
        );
    }
}
