use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use opendal::layers::{LoggingLayer, RetryLayer, TimeoutLayer};
use opendal::services::{Gcs, Http, S3};
use opendal::Operator;
use std::env;
use std::fmt::Display;
use std::sync::Arc;
use url::Url;

/// Connection settings shared by every loader built for a batch.
#[derive(Clone, Debug)]
pub struct ObjectStorageOptions {
    /// Fall back to unsigned requests when no credential is configured
    pub allow_anonymous: bool,
    /// Bill requests to the caller (S3 requester-pays buckets)
    pub enable_request_payer: bool,
    /// Retries per failed request
    pub max_retries: Option<usize>,
    /// Per-request timeout in seconds
    pub timeout: Option<usize>,
}

impl Display for ObjectStorageOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ObjectStorageOptions {{ allow_anonymous: {}, enable_request_payer: {}, max_retries: {:?}, timeout: {:?} }}",
            self.allow_anonymous, self.enable_request_payer, self.max_retries, self.timeout
        )
    }
}

impl Default for ObjectStorageOptions {
    fn default() -> Self {
        ObjectStorageOptions {
            allow_anonymous: true,
            enable_request_payer: false,
            max_retries: Some(5),
            timeout: Some(300),
        }
    }
}

/// Storage backend selected from a locator scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// `gs://`
    GCS,
    /// `s3://`
    S3,
    /// `http://` and `https://`
    HTTP,
}

impl StorageType {
    /// Maps a scheme to its backend; unknown schemes are validation errors.
    pub fn from_prefix(prefix: &str) -> Result<Self> {
        match prefix.to_lowercase().as_str() {
            "gs" => Ok(StorageType::GCS),
            "s3" => Ok(StorageType::S3),
            "http" | "https" => Ok(StorageType::HTTP),
            other => Err(GatewayError::Validation(format!(
                "Unsupported source locator scheme: {other}"
            ))),
        }
    }

    /// Bucket-style stores address objects as `<scheme>://<bucket>/<object>`.
    pub fn is_bucket(&self) -> bool {
        matches!(self, StorageType::GCS | StorageType::S3)
    }
}

/// Storage backend of a locator.
pub fn get_storage_type(locator: &str) -> Result<StorageType> {
    match locator.split_once("://") {
        Some((prefix, _)) => StorageType::from_prefix(prefix),
        None => Err(GatewayError::Validation(format!(
            "Source locator has no scheme: {locator}"
        ))),
    }
}

fn get_bucket_name(locator: &str) -> Result<String> {
    let rest = locator.split("://").last().unwrap_or_default();
    match rest.split('/').next() {
        Some(bucket) if !bucket.is_empty() => Ok(bucket.to_string()),
        _ => Err(GatewayError::Validation(format!(
            "Source locator has no bucket: {locator}"
        ))),
    }
}

fn get_file_path(locator: &str) -> Result<String> {
    let path = locator
        .split("://")
        .last()
        .unwrap_or_default()
        .split('/')
        .skip(1)
        .collect::<Vec<&str>>()
        .join("/");
    if path.is_empty() {
        return Err(GatewayError::Validation(format!(
            "Source locator has no object path: {locator}"
        )));
    }
    Ok(path)
}

/// Fetches arbitrary byte ranges of one remote object.
///
/// Implementations hold no cursor, so a single loader can serve overlapping
/// reads from many queries at once.
#[async_trait]
pub trait ByteRangeLoader: Send + Sync {
    /// Reads `length` bytes starting at `start`, or everything after `start` when `length` is `None`.
    async fn load(&self, start: u64, length: Option<u64>) -> Result<Bytes>;

    /// Locator this loader reads from.
    fn locator(&self) -> &str;
}

/// Byte-range loader backed by an OpenDAL operator.
pub struct OpendalLoader {
    operator: Operator,
    path: String,
    locator: String,
}

impl OpendalLoader {
    /// Wraps an operator reading `path`.
    pub fn new(operator: Operator, path: String, locator: String) -> Self {
        OpendalLoader {
            operator,
            path,
            locator,
        }
    }
}

#[async_trait]
impl ByteRangeLoader for OpendalLoader {
    async fn load(&self, start: u64, length: Option<u64>) -> Result<Bytes> {
        debug!(
            "Loading {} bytes at offset {} from {}",
            length.map_or("all".to_string(), |l| l.to_string()),
            start,
            self.locator
        );
        let buffer = match length {
            Some(length) => {
                self.operator
                    .read_with(&self.path)
                    .range(start..start + length)
                    .await?
            }
            None => self.operator.read_with(&self.path).range(start..).await?,
        };
        Ok(buffer.to_bytes())
    }

    fn locator(&self) -> &str {
        &self.locator
    }
}

fn finish_operator<B: opendal::Builder>(
    builder: B,
    options: &ObjectStorageOptions,
) -> Result<Operator> {
    let max_retries = options.max_retries.unwrap_or(5);
    let timeout = options.timeout.unwrap_or(300);
    Ok(Operator::new(builder)?
        .layer(TimeoutLayer::new().with_io_timeout(std::time::Duration::from_secs(timeout as u64)))
        .layer(RetryLayer::new().with_max_times(max_retries))
        .layer(LoggingLayer::default())
        .finish())
}

async fn s3_operator(
    bucket_name: &str,
    credential: Option<&str>,
    options: &ObjectStorageOptions,
) -> Result<Operator> {
    let enable_request_payer = options.enable_request_payer || credential.is_some();
    info!(
        "Using S3 storage type with parameters: bucket_name: {}, allow_anonymous: {}, enable_request_payer: {}",
        bucket_name, options.allow_anonymous, enable_request_payer
    );
    let region = match env::var("AWS_REGION").or_else(|_| env::var("AWS_DEFAULT_REGION")) {
        Ok(region) => region,
        Err(_) => S3::detect_region("https://s3.amazonaws.com", bucket_name)
            .await
            .unwrap_or("us-east-1".to_string()),
    };
    let mut builder = S3::default()
        .region(&region)
        .bucket(bucket_name)
        .endpoint(&env::var("AWS_ENDPOINT_URL").unwrap_or_default());
    if options.allow_anonymous && credential.is_none() {
        builder = builder.disable_ec2_metadata().allow_anonymous();
    }
    if enable_request_payer {
        builder = builder.enable_request_payer();
    }
    finish_operator(builder, options)
}

/// How a GCS operator authenticates.
#[derive(Debug, Clone, PartialEq, Eq)]
enum GcsAuth {
    Anonymous,
    CredentialPath(String),
    Default,
}

fn gcs_auth(options: &ObjectStorageOptions, credential_path: Option<String>) -> GcsAuth {
    if options.allow_anonymous {
        GcsAuth::Anonymous
    } else if let Some(path) = credential_path {
        GcsAuth::CredentialPath(path)
    } else {
        GcsAuth::Default
    }
}

/// Builds a GCS operator.
///
/// `billing_project` names the project billed for requester-pays buckets. It is
/// never used as a credential.
fn gcs_operator(
    bucket_name: &str,
    billing_project: Option<&str>,
    options: &ObjectStorageOptions,
) -> Result<Operator> {
    info!(
        "Using GCS storage type with parameters: bucket_name: {}, allow_anonymous: {}, billing_project: {:?}",
        bucket_name, options.allow_anonymous, billing_project
    );
    if let Some(project) = billing_project {
        warn!(
            "Billing project {} is not forwarded to GCS, requester-pays reads from {} may be rejected",
            project, bucket_name
        );
    }
    let mut builder = Gcs::default().bucket(bucket_name);
    match gcs_auth(options, env::var("GOOGLE_APPLICATION_CREDENTIALS").ok()) {
        GcsAuth::Anonymous => builder = builder.disable_vm_metadata().allow_anonymous(),
        GcsAuth::CredentialPath(path) => builder = builder.credential_path(&path),
        GcsAuth::Default => warn!(
            "GOOGLE_APPLICATION_CREDENTIALS environment variable is not set. Using default credentials."
        ),
    }
    finish_operator(builder, options)
}

fn http_operator(url: &Url, options: &ObjectStorageOptions) -> Result<(Operator, String)> {
    let host = url
        .host_str()
        .ok_or_else(|| GatewayError::Validation(format!("Source locator has no host: {url}")))?;
    let endpoint = match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    };
    info!("Using HTTP storage type with endpoint: {}", endpoint);
    let operator = finish_operator(Http::default().endpoint(&endpoint), options)?;
    Ok((operator, url.path().to_string()))
}

/// Builds the byte-range loader for a locator, choosing the store by scheme.
///
/// `credential` is the caller's billing project. On S3 it turns on requester-pays.
pub async fn loader_for_locator(
    locator: &str,
    credential: Option<&str>,
    options: &ObjectStorageOptions,
) -> Result<Arc<dyn ByteRangeLoader>> {
    let storage_type = get_storage_type(locator)?;
    let (operator, path) = match storage_type {
        StorageType::S3 => (
            s3_operator(&get_bucket_name(locator)?, credential, options).await?,
            get_file_path(locator)?,
        ),
        StorageType::GCS => (
            gcs_operator(&get_bucket_name(locator)?, credential, options)?,
            get_file_path(locator)?,
        ),
        StorageType::HTTP => http_operator(&Url::parse(locator)?, options)?,
    };
    Ok(Arc::new(OpendalLoader::new(
        operator,
        path,
        locator.to_string(),
    )))
}
