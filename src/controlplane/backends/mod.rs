//! RGW Backend Adapters
//!
//! Provides adapters for the two RadosGW interfaces:
//! - Admin ops API: signed HTTP client (`rgw_admin`)
//! - S3 data API: AWS SDK client (`s3`)
//! - In-memory simulation of both for standalone runs and tests (`memory`)

pub mod memory;
pub mod rgw_admin;
pub mod s3;
pub mod sigv4;

pub use memory::InMemoryRgw;
pub use rgw_admin::{RgwAdminClient, RgwConfig};
pub use s3::S3DataClient;

use crate::domain::ports::{AdminApiRef, ObjectStorageApiRef};
use crate::error::Result;
use std::sync::Arc;
use tracing::info;

/// Which RGW the clients talk to
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// A real RadosGW endpoint
    Remote(RgwConfig),
    /// The in-process simulation
    Standalone,
}

/// Both API clients for one RGW
#[derive(Clone)]
pub struct RgwClients {
    pub admin: AdminApiRef,
    pub s3: ObjectStorageApiRef,
}

impl RgwClients {
    /// Clients backed by one shared in-memory RGW
    pub fn in_memory(rgw: Arc<InMemoryRgw>) -> Self {
        Self {
            admin: rgw.clone(),
            s3: rgw,
        }
    }
}

/// Factory for creating RGW client adapters
pub struct BackendFactory;

impl BackendFactory {
    /// Create the clients for a backend configuration
    pub async fn create(config: &BackendConfig) -> Result<RgwClients> {
        match config {
            BackendConfig::Remote(rgw) => {
                info!("Connecting to RGW at {}", rgw.endpoint);
                let admin = RgwAdminClient::new(rgw)?;
                let s3 = S3DataClient::new(rgw).await?;
                Ok(RgwClients {
                    admin: Arc::new(admin),
                    s3: Arc::new(s3),
                })
            }
            BackendConfig::Standalone => {
                info!("Using in-memory RGW");
                Ok(RgwClients::in_memory(Arc::new(InMemoryRgw::new())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remote_backend_requires_credentials() {
        let config = BackendConfig::Remote(RgwConfig::default());
        assert!(BackendFactory::create(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_standalone_backend() {
        let clients = BackendFactory::create(&BackendConfig::Standalone).await.unwrap();
        clients.s3.create_bucket("data").await.unwrap();
        clients.s3.head_bucket("data").await.unwrap();
    }
}
