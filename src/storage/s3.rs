use std::time::Duration;

use anyhow::{Context, Result};
use aws_config::{timeout::TimeoutConfig, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client;
use tracing::info;

use crate::config::Config;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const READ_TIMEOUT_SECS: u64 = 30;

/// S3 client against the MinIO-compatible internal endpoint.
/// Path-style addressing; MinIO does not serve virtual-host buckets.
pub async fn build_s3_client(config: &Config) -> Result<Client> {
    let endpoint = config.minio_internal_base();

    let credentials = Credentials::new(
        config.minio_access_key.clone(),
        config.minio_secret_key.clone(),
        None,
        None,
        "minio",
    );

    let region = Region::new(config.minio_region.clone());
    let shared_config = aws_config::defaults(BehaviorVersion::latest())
        .region(region.clone())
        .credentials_provider(credentials)
        .timeout_config(
            TimeoutConfig::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .read_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
                .build(),
        )
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&shared_config)
        .endpoint_url(endpoint)
        .force_path_style(true)
        .region(region)
        .build();

    Ok(Client::from_conf(s3_config))
}

pub async fn ensure_bucket(client: &Client, bucket: &str) -> Result<()> {
    if client.head_bucket().bucket(bucket).send().await.is_ok() {
        return Ok(());
    }

    client
        .create_bucket()
        .bucket(bucket)
        .send()
        .await
        .with_context(|| format!("failed to create bucket {bucket}"))?;
    info!(bucket, "created object-store bucket");
    Ok(())
}
