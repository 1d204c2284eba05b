use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use sha2::{Digest, Sha256};

use super::side_effects::{ArtifactStore, StorageError};

#[derive(Clone)]
pub struct S3Service {
    client: Client,
    bucket_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum S3ServiceError {
    #[error("S3 error: {0}")]
    S3(String),
    #[error("File too large")]
    FileTooLarge,
}

impl From<S3ServiceError> for StorageError {
    fn from(err: S3ServiceError) -> Self {
        StorageError::Upstream(err.to_string())
    }
}

impl S3Service {
    pub fn new(client: Client, bucket_name: String) -> Self {
        Self {
            client,
            bucket_name,
        }
    }

    pub fn calculate_image_hash(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    pub fn generate_input_key(category: &str, image_hash: &str, file_extension: &str) -> String {
        format!("inputs/{}/{}.{}", category, image_hash, file_extension)
    }

    pub fn extract_file_extension(mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            "image/bmp" => "bmp",
            "image/tiff" => "tiff",
            "application/json" => "json",
            _ => "bin",
        }
    }

    pub fn validate_image_size(image_data: &[u8]) -> Result<(), S3ServiceError> {
        const MAX_SIZE: usize = 50 * 1024 * 1024;
        if image_data.len() > MAX_SIZE {
            return Err(S3ServiceError::FileTooLarge);
        }
        Ok(())
    }

    pub async fn upload_object(
        &self,
        data: Vec<u8>,
        s3_key: &str,
        mime_type: &str,
    ) -> Result<String, S3ServiceError> {
        S3Service::validate_image_size(&data)?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(s3_key)
            .body(ByteStream::from(data))
            .content_type(mime_type)
            .send()
            .await
            .map_err(|e| S3ServiceError::S3(e.to_string()))?;

        Ok(format!("s3://{}/{}", self.bucket_name, s3_key))
    }
}

#[async_trait]
impl ArtifactStore for S3Service {
    async fn put(&self, key: &str, data: Vec<u8>, media_type: &str) -> Result<String, StorageError> {
        Ok(self.upload_object(data, key, media_type).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_keys_are_content_addressed() {
        let hash = S3Service::calculate_image_hash(b"ABC");
        assert_eq!(
            hash,
            "b5d4045c3f466fa91fe2cc6abe79232a1a57cdf104f7a26e716e0a1e2789df78"
        );
        assert_eq!(
            S3Service::generate_input_key("alpha", &hash, "png"),
            format!("inputs/alpha/{}.png", hash)
        );
    }

    #[test]
    fn unknown_media_types_get_a_binary_extension() {
        assert_eq!(S3Service::extract_file_extension("image/jpeg"), "jpg");
        assert_eq!(S3Service::extract_file_extension("application/x-foo"), "bin");
    }

    #[test]
    fn oversized_blobs_are_rejected() {
        let blob = vec![0u8; 50 * 1024 * 1024 + 1];
        assert!(matches!(
            S3Service::validate_image_size(&blob),
            Err(S3ServiceError::FileTooLarge)
        ));
        assert!(S3Service::validate_image_size(b"small").is_ok());
    }
}
