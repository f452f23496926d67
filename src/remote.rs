// restoretool/src/remote.rs
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::RemoteStorageConfig;
use crate::errors::{RestoreError, Result};

/// Named-file transfer surface of the remote dump store. `fetch` reports
/// `Ok(false)` when the remote name does not exist; transport failures are
/// errors. `store` is unused by restore but exposed symmetrically for dump
/// producers.
pub trait RemoteFileSource {
    fn fetch(
        &self,
        remote_name: &str,
        local_path: &Path,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;

    #[allow(dead_code)]
    fn store(
        &self,
        local_path: &Path,
        remote_name: &str,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}

/// Dump store backed by an S3-compatible object storage service
/// (like DigitalOcean Spaces).
pub struct S3RemoteStore {
    client: s3::Client,
    bucket_name: String,
    folder_prefix: Option<String>,
}

impl S3RemoteStore {
    pub async fn connect(remote_config: &RemoteStorageConfig) -> Self {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&remote_config.endpoint_url)
            .region(Region::new(remote_config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &remote_config.access_key_id,
                &remote_config.secret_access_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            ))
            .load()
            .await;

        S3RemoteStore {
            client: s3::Client::new(&sdk_config),
            bucket_name: remote_config.bucket_name.clone(),
            folder_prefix: remote_config.folder_prefix.clone(),
        }
    }

    fn object_key(&self, remote_name: &str) -> String {
        match &self.folder_prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), remote_name),
            None => remote_name.to_string(),
        }
    }
}

impl RemoteFileSource for S3RemoteStore {
    async fn fetch(&self, remote_name: &str, local_path: &Path) -> Result<bool> {
        let object_key = self.object_key(remote_name);
        println!(
            "Fetching s3://{}/{} to {}",
            self.bucket_name,
            object_key,
            local_path.display()
        );

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(&object_key)
            .send()
            .await;

        let mut object = match response {
            Ok(object) => object,
            Err(err) => {
                let service_error = err.into_service_error();
                if service_error.is_no_such_key() {
                    return Ok(false);
                }
                return Err(RestoreError::Transfer {
                    name: remote_name.to_string(),
                    reason: service_error.to_string(),
                });
            }
        };

        let mut output_file =
            File::create(local_path)
                .await
                .map_err(|e| RestoreError::Transfer {
                    name: remote_name.to_string(),
                    reason: format!(
                        "Failed to create destination file {}: {}",
                        local_path.display(),
                        e
                    ),
                })?;

        let mut total_bytes_downloaded = 0;
        loop {
            let chunk = object
                .body
                .try_next()
                .await
                .map_err(|e| RestoreError::Transfer {
                    name: remote_name.to_string(),
                    reason: format!("Download stream failed: {}", e),
                })?;
            let Some(bytes_chunk) = chunk else { break };
            output_file
                .write_all(&bytes_chunk)
                .await
                .map_err(|e| RestoreError::Transfer {
                    name: remote_name.to_string(),
                    reason: format!(
                        "Failed to write to destination file {}: {}",
                        local_path.display(),
                        e
                    ),
                })?;
            total_bytes_downloaded += bytes_chunk.len();
        }

        println!(
            "✓ Fetched {} bytes from s3://{}/{}",
            total_bytes_downloaded, self.bucket_name, object_key
        );
        Ok(true)
    }

    async fn store(&self, local_path: &Path, remote_name: &str) -> Result<bool> {
        let object_key = self.object_key(remote_name);
        println!(
            "Storing {} as s3://{}/{}",
            local_path.display(),
            self.bucket_name,
            object_key
        );

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| RestoreError::Transfer {
                name: remote_name.to_string(),
                reason: format!("Failed to read local file {}: {}", local_path.display(), e),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&object_key)
            .body(body)
            .send()
            .await
            .map_err(|e| RestoreError::Transfer {
                name: remote_name.to_string(),
                reason: e.to_string(),
            })?;

        println!(
            "✓ Stored {} as s3://{}/{}",
            local_path.display(),
            self.bucket_name,
            object_key
        );
        Ok(true)
    }
}
