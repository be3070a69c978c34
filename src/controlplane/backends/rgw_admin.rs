//! RGW Admin Ops Adapter
//!
//! HTTP client for the RadosGW admin ops API (`/admin/user`). Requests are
//! signed with SigV4 using the administrative credentials.

use super::sigv4::{amz_date, hash_payload, CanonicalRequest, SigV4Signer};
use crate::domain::ports::{
    AdminApi, KeyRequest, KeyType, RemoteError, RemoteResult, RgwUser, UserKey, UserRequest,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{header, Client, Method, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Configuration
// =============================================================================

/// Connection settings shared by the admin and S3 clients
#[derive(Debug, Clone)]
pub struct RgwConfig {
    /// RadosGW endpoint, e.g. `http://rgw.local:7480`
    pub endpoint: String,
    /// Administrative access key
    pub access_key: String,
    /// Administrative secret key
    pub secret_key: String,
    /// Signing region
    pub region: String,
    /// Path prefix of the admin ops API
    pub admin_path: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Verify TLS certificates
    pub verify_tls: bool,
}

impl Default for RgwConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:7480".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            region: "us-east-1".to_string(),
            admin_path: "/admin".to_string(),
            timeout: Duration::from_secs(30),
            verify_tls: true,
        }
    }
}

impl RgwConfig {
    /// Reject settings no request could succeed with
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::Configuration("RGW endpoint is not set".into()));
        }
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(Error::Configuration(
                "RGW access key and secret key are required".into(),
            ));
        }
        Url::parse(&self.endpoint)
            .map_err(|e| Error::Configuration(format!("invalid RGW endpoint '{}': {}", self.endpoint, e)))?;
        Ok(())
    }
}

/// Error body of the admin API
#[derive(Debug, Default, Deserialize)]
struct AdminErrorBody {
    #[serde(rename = "Code", default)]
    code: String,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}

fn transport(context: &str, err: impl std::fmt::Display) -> RemoteError {
    RemoteError::Transport {
        message: format!("{}: {}", context, err),
    }
}

fn caps_param(request: &UserRequest) -> Option<String> {
    if request.caps.is_empty() {
        return None;
    }
    Some(
        request
            .caps
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(";"),
    )
}

// =============================================================================
// Admin Client
// =============================================================================

/// Signed HTTP client for `/admin/user`
pub struct RgwAdminClient {
    http: Client,
    base: Url,
    host: String,
    user_path: String,
    signer: SigV4Signer,
}

impl RgwAdminClient {
    pub fn new(config: &RgwConfig) -> Result<Self> {
        config.validate()?;

        let base = Url::parse(config.endpoint.trim_end_matches('/'))
            .map_err(|e| Error::Configuration(format!("invalid RGW endpoint: {}", e)))?;
        let host = match (base.host_str(), base.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(Error::Configuration(format!(
                    "RGW endpoint '{}' has no host",
                    config.endpoint
                )))
            }
        };

        let mut builder = Client::builder().timeout(config.timeout);
        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| Error::Configuration(format!("could not build HTTP client: {}", e)))?;

        let user_path = format!(
            "{}/{}/user",
            base.path().trim_end_matches('/'),
            config.admin_path.trim_matches('/')
        );

        Ok(Self {
            http,
            base,
            host,
            user_path,
            signer: SigV4Signer::new(&config.access_key, &config.secret_key, &config.region, "s3"),
        })
    }

    /// Send a signed request and return the response body
    async fn send(&self, method: Method, query: Vec<(String, String)>) -> RemoteResult<String> {
        let now = chrono::Utc::now();
        let date = amz_date(&now);
        let payload_hash = hash_payload(b"");

        let canonical = CanonicalRequest {
            method: method.as_str().to_string(),
            path: self.user_path.clone(),
            query,
            headers: vec![
                ("host".to_string(), self.host.clone()),
                ("x-amz-content-sha256".to_string(), payload_hash.clone()),
                ("x-amz-date".to_string(), date.clone()),
            ],
            payload_hash: payload_hash.clone(),
        };
        let authorization = self
            .signer
            .authorization(&canonical, &now)
            .map_err(|e| transport("signing request", e))?;

        let mut url = self.base.clone();
        url.set_path(&self.user_path);
        url.set_query(Some(&canonical.canonical_query()));

        debug!("RGW admin request: {} {}", method, url.path());
        let response = self
            .http
            .request(method, url)
            .header(header::HOST, &self.host)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", date)
            .header(header::AUTHORIZATION, authorization)
            .send()
            .await
            .map_err(|e| transport("sending request", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport("reading response", e))?;

        if status.is_success() {
            return Ok(body);
        }

        let error: AdminErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let message = error.message.unwrap_or_else(|| body.clone());
        Err(RemoteError::from_status(status.as_u16(), &error.code, message))
    }

    fn decode<T: DeserializeOwned>(body: &str) -> RemoteResult<T> {
        serde_json::from_str(body).map_err(|e| transport("decoding response", e))
    }

    fn user_query(request: &UserRequest) -> Vec<(String, String)> {
        let mut query = vec![
            ("format".to_string(), "json".to_string()),
            ("uid".to_string(), request.uid.clone()),
            ("display-name".to_string(), request.display_name.clone()),
            ("op-mask".to_string(), request.op_mask.clone()),
            ("generate-key".to_string(), request.generate_key.to_string()),
        ];
        if !request.email.is_empty() {
            query.push(("email".to_string(), request.email.clone()));
        }
        if let Some(caps) = caps_param(request) {
            query.push(("user-caps".to_string(), caps));
        }
        if let Some(max_buckets) = request.max_buckets {
            query.push(("max-buckets".to_string(), max_buckets.to_string()));
        }
        if let Some(suspended) = request.suspended {
            query.push(("suspended".to_string(), u8::from(suspended).to_string()));
        }
        if let Some(key_type) = request.key_type {
            query.push(("key-type".to_string(), key_type.to_string()));
        }
        query
    }
}

#[async_trait]
impl AdminApi for RgwAdminClient {
    async fn create_user(&self, request: &UserRequest) -> RemoteResult<RgwUser> {
        let body = self.send(Method::PUT, Self::user_query(request)).await?;
        Self::decode(&body)
    }

    async fn get_user(&self, uid: &str) -> RemoteResult<RgwUser> {
        let query = vec![
            ("format".to_string(), "json".to_string()),
            ("uid".to_string(), uid.to_string()),
        ];
        let body = self.send(Method::GET, query).await?;
        Self::decode(&body)
    }

    async fn modify_user(&self, request: &UserRequest) -> RemoteResult<RgwUser> {
        let body = self.send(Method::POST, Self::user_query(request)).await?;
        Self::decode(&body)
    }

    async fn remove_user(&self, uid: &str, purge_data: bool) -> RemoteResult<()> {
        let query = vec![
            ("format".to_string(), "json".to_string()),
            ("uid".to_string(), uid.to_string()),
            ("purge-data".to_string(), u8::from(purge_data).to_string()),
        ];
        self.send(Method::DELETE, query).await?;
        Ok(())
    }

    async fn create_key(&self, request: &KeyRequest) -> RemoteResult<Vec<UserKey>> {
        let query = vec![
            ("key".to_string(), String::new()),
            ("format".to_string(), "json".to_string()),
            ("uid".to_string(), request.uid.clone()),
            ("key-type".to_string(), request.key_type.to_string()),
            ("access-key".to_string(), request.access_key.clone()),
            ("generate-key".to_string(), request.generate_key.to_string()),
        ];
        let body = self.send(Method::PUT, query).await?;
        Self::decode(&body)
    }

    async fn remove_key(&self, uid: &str, access_key: &str) -> RemoteResult<()> {
        let query = vec![
            ("key".to_string(), String::new()),
            ("format".to_string(), "json".to_string()),
            ("uid".to_string(), uid.to_string()),
            ("key-type".to_string(), KeyType::S3.to_string()),
            ("access-key".to_string(), access_key.to_string()),
        ];
        self.send(Method::DELETE, query).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::UserCap;

    fn config() -> RgwConfig {
        RgwConfig {
            endpoint: "http://rgw.local:7480/".into(),
            access_key: "admin".into(),
            secret_key: "secret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(config().validate().is_ok());

        let mut missing_keys = config();
        missing_keys.secret_key.clear();
        assert!(matches!(missing_keys.validate(), Err(Error::Configuration(_))));

        let mut bad_endpoint = config();
        bad_endpoint.endpoint = "not a url".into();
        assert!(bad_endpoint.validate().is_err());
    }

    #[test]
    fn test_client_paths() {
        let client = RgwAdminClient::new(&config()).unwrap();
        assert_eq!(client.host, "rgw.local:7480");
        assert_eq!(client.user_path, "/admin/user");
    }

    #[test]
    fn test_user_query_sends_caps_with_their_perm() {
        let request = UserRequest {
            uid: "acme$alice".into(),
            display_name: "Alice".into(),
            op_mask: "read".into(),
            caps: vec![
                UserCap {
                    cap_type: "users".into(),
                    perm: "read".into(),
                },
                UserCap {
                    cap_type: "buckets".into(),
                    perm: "*".into(),
                },
            ],
            max_buckets: Some(500),
            suspended: Some(true),
            ..Default::default()
        };

        let query = RgwAdminClient::user_query(&request);
        let get = |name: &str| {
            query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("user-caps"), Some("users=read;buckets=*"));
        assert_eq!(get("max-buckets"), Some("500"));
        assert_eq!(get("suspended"), Some("1"));
        assert_eq!(get("generate-key"), Some("false"));
        assert_eq!(get("email"), None);
        assert_eq!(get("key-type"), None);
    }
}
