use std::time::Duration;

use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use base64::{engine::general_purpose, Engine as _};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::utils::http::get_http_client;

const PRESIGN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum StageError {
    #[error("invalid photo source: {0}")]
    Decode(String),
    #[error("failed to fetch photo: {0}")]
    Fetch(String),
    #[error("object storage error: {0}")]
    Storage(String),
}

/// Turns raw photo sources (data URLs or remote URLs) into time-limited
/// public URLs. The batch is atomic: any single failure aborts the whole
/// call.
pub struct MediaStager {
    client: Client,
    bucket: String,
    internal_host: String,
    public_host: String,
}

impl MediaStager {
    pub fn new(client: Client, config: &Config) -> Self {
        MediaStager {
            client,
            bucket: config.minio_bucket.clone(),
            internal_host: config.minio_endpoint.clone(),
            public_host: config.minio_public_endpoint.clone(),
        }
    }

    pub async fn stage(&self, sources: &[String]) -> Result<Vec<String>, StageError> {
        let mut public_urls = Vec::with_capacity(sources.len());

        for source in sources {
            let (bytes, content_type) = load_source(source).await?;
            let object_key = format!("photos/{}.jpg", Uuid::new_v4());

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&object_key)
                .body(ByteStream::from(bytes))
                .content_type(&content_type)
                .send()
                .await
                .map_err(|err| StageError::Storage(format!("upload failed: {err}")))?;

            let presigning = PresigningConfig::expires_in(PRESIGN_TTL)
                .map_err(|err| StageError::Storage(format!("invalid presign window: {err}")))?;
            let presigned = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&object_key)
                .presigned(presigning)
                .await
                .map_err(|err| StageError::Storage(format!("presign failed: {err}")))?;

            debug!(key = %object_key, "staged photo");
            public_urls.push(rewrite_internal_to_public(
                presigned.uri(),
                &self.internal_host,
                &self.public_host,
            ));
        }

        Ok(public_urls)
    }
}

/// Presigned URLs point at the internal network address; recipients need
/// the public one.
fn rewrite_internal_to_public(url: &str, internal_host: &str, public_host: &str) -> String {
    url.replace(
        &format!("http://{internal_host}"),
        &format!("http://{public_host}"),
    )
    .replace(
        &format!("https://{internal_host}"),
        &format!("https://{public_host}"),
    )
}

async fn load_source(source: &str) -> Result<(Vec<u8>, String), StageError> {
    if source.starts_with("data:") {
        return decode_data_url(source);
    }
    fetch_binary(source).await
}

/// `data:<mime>;base64,<payload>`
fn decode_data_url(data_url: &str) -> Result<(Vec<u8>, String), StageError> {
    let Some((header, payload)) = data_url.split_once(";base64,") else {
        return Err(StageError::Decode("invalid data URL".to_string()));
    };

    let mime = header.trim_start_matches("data:");
    let content_type = if mime.is_empty() {
        "application/octet-stream".to_string()
    } else {
        mime.to_string()
    };

    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|err| StageError::Decode(format!("invalid base64 payload: {err}")))?;
    Ok((bytes, content_type))
}

async fn fetch_binary(url: &str) -> Result<(Vec<u8>, String), StageError> {
    let response = get_http_client()
        .get(url)
        .send()
        .await
        .map_err(|err| StageError::Fetch(err.to_string()))?;
    if !response.status().is_success() {
        return Err(StageError::Fetch(format!(
            "{url} answered {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|err| StageError::Fetch(err.to_string()))?
        .to_vec();
    let content_type = infer::get(&bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| "image/jpeg".to_string());
    Ok((bytes, content_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::s3::build_s3_client;

    #[test]
    fn decodes_a_data_url_with_declared_mime() {
        let (bytes, content_type) =
            decode_data_url("data:image/png;base64,AAAA").expect("valid data url");
        assert_eq!(bytes, vec![0, 0, 0]);
        assert_eq!(content_type, "image/png");
    }

    #[test]
    fn missing_base64_marker_is_a_decode_error() {
        let err = decode_data_url("data:image/png,plain").expect_err("must fail");
        assert!(matches!(err, StageError::Decode(_)));
    }

    #[test]
    fn empty_mime_falls_back_to_octet_stream() {
        let (_, content_type) = decode_data_url("data:;base64,AAAA").expect("valid data url");
        assert_eq!(content_type, "application/octet-stream");
    }

    #[test]
    fn corrupt_base64_payload_is_a_decode_error() {
        let err = decode_data_url("data:image/jpeg;base64,@@@").expect_err("must fail");
        assert!(matches!(err, StageError::Decode(_)));
    }

    #[test]
    fn presigned_urls_are_rewritten_to_the_public_endpoint() {
        let rewritten = rewrite_internal_to_public(
            "http://minio:9000/photobooth/photos/a.jpg?X-Amz-Expires=86400",
            "minio:9000",
            "localhost:9000",
        );
        assert_eq!(
            rewritten,
            "http://localhost:9000/photobooth/photos/a.jpg?X-Amz-Expires=86400"
        );
    }

    #[tokio::test]
    async fn a_bad_source_aborts_the_batch_before_any_upload() {
        let config = Config::load().expect("config");
        let client = build_s3_client(&config).await.expect("client");
        let stager = MediaStager::new(client, &config);

        let sources = vec![
            "data:image/jpeg,not-base64".to_string(),
            "data:image/jpeg;base64,AAAA".to_string(),
        ];
        let err = stager.stage(&sources).await.expect_err("must fail");
        assert!(matches!(err, StageError::Decode(_)));
    }
}
