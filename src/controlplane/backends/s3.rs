//! S3 Data API Adapter
//!
//! Bucket and bucket policy calls against the S3-compatible endpoint of
//! RadosGW, through the AWS SDK with path-style addressing.

use super::rgw_admin::RgwConfig;
use crate::domain::ports::{ObjectStorageApi, RemoteError, RemoteResult};
use crate::error::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use tracing::{debug, info};

/// Map an SDK failure onto the typed remote error
fn classify<E>(err: SdkError<E, HttpResponse>) -> RemoteError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.code().unwrap_or_default().to_string();
    let message = DisplayErrorContext(&err).to_string();
    match status {
        Some(status) => RemoteError::from_status(status, &code, message),
        None => RemoteError::Transport { message },
    }
}

/// S3 client bound to the RGW endpoint
pub struct S3DataClient {
    client: Client,
}

impl S3DataClient {
    pub async fn new(config: &RgwConfig) -> Result<Self> {
        config.validate()?;

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "rgw-reconciler",
        );
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint.trim_end_matches('/'))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        info!("S3 client initialized for {} (region {})", config.endpoint, config.region);
        Ok(Self {
            client: Client::from_conf(s3_config),
        })
    }
}

#[async_trait]
impl ObjectStorageApi for S3DataClient {
    async fn create_bucket(&self, bucket: &str) -> RemoteResult<()> {
        debug!("S3 CreateBucket {}", bucket);
        self.client
            .create_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn head_bucket(&self, bucket: &str) -> RemoteResult<()> {
        debug!("S3 HeadBucket {}", bucket);
        self.client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> RemoteResult<()> {
        debug!("S3 DeleteBucket {}", bucket);
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> RemoteResult<()> {
        debug!("S3 PutBucketPolicy {}", bucket);
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn get_bucket_policy(&self, bucket: &str) -> RemoteResult<String> {
        debug!("S3 GetBucketPolicy {}", bucket);
        let output = self
            .client
            .get_bucket_policy()
            .bucket(bucket)
            .send()
            .await
            .map_err(classify)?;
        Ok(output.policy().unwrap_or_default().to_string())
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> RemoteResult<()> {
        debug!("S3 DeleteBucketPolicy {}", bucket);
        self.client
            .delete_bucket_policy()
            .bucket(bucket)
            .send()
            .await
            .map_err(classify)?;
        Ok(())
    }
}
