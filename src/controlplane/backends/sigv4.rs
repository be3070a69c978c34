//! AWS Signature Version 4 request signing
//!
//! RadosGW authenticates admin ops requests with the same SigV4 scheme as S3.
//! The S3 data path gets this from the AWS SDK; the admin client signs its
//! own requests with this module.

use chrono::{DateTime, Utc};
use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Hex SHA-256 of a request body
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Timestamp in the `x-amz-date` format
pub fn amz_date(time: &DateTime<Utc>) -> String {
    time.format("%Y%m%dT%H%M%SZ").to_string()
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(key)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

// =============================================================================
// Canonical Request
// =============================================================================

/// Request parts covered by the signature
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    pub method: String,
    pub path: String,
    /// Unencoded query parameters
    pub query: Vec<(String, String)>,
    /// Headers to sign
    pub headers: Vec<(String, String)>,
    pub payload_hash: String,
}

impl CanonicalRequest {
    /// Query string with each name and value percent-encoded, sorted
    pub fn canonical_query(&self) -> String {
        let mut pairs: Vec<(String, String)> = self
            .query
            .iter()
            .map(|(k, v)| (urlencoding::encode(k).into_owned(), urlencoding::encode(v).into_owned()))
            .collect();
        pairs.sort();
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn sorted_headers(&self) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
            .collect();
        headers.sort();
        headers
    }

    /// `;`-joined lowercase names of the signed headers
    pub fn signed_headers(&self) -> String {
        self.sorted_headers()
            .into_iter()
            .map(|(k, _)| k)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn render(&self) -> String {
        let headers: String = self
            .sorted_headers()
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method,
            self.path,
            self.canonical_query(),
            headers,
            self.signed_headers(),
            self.payload_hash
        )
    }
}

// =============================================================================
// Signer
// =============================================================================

/// Signs requests for one credential pair and region
#[derive(Clone)]
pub struct SigV4Signer {
    access_key: String,
    secret_key: String,
    region: String,
    service: String,
}

impl std::fmt::Debug for SigV4Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigV4Signer")
            .field("access_key", &self.access_key)
            .field("region", &self.region)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl SigV4Signer {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
            service: service.into(),
        }
    }

    fn scope(&self, time: &DateTime<Utc>) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            time.format("%Y%m%d"),
            self.region,
            self.service
        )
    }

    fn string_to_sign(&self, request: &CanonicalRequest, time: &DateTime<Utc>) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date(time),
            self.scope(time),
            hash_payload(request.render().as_bytes())
        )
    }

    fn signing_key(&self, time: &DateTime<Utc>) -> Result<Vec<u8>, InvalidLength> {
        let date = time.format("%Y%m%d").to_string();
        let k_date = hmac(format!("AWS4{}", self.secret_key).as_bytes(), date.as_bytes())?;
        let k_region = hmac(&k_date, self.region.as_bytes())?;
        let k_service = hmac(&k_region, self.service.as_bytes())?;
        hmac(&k_service, b"aws4_request")
    }

    /// Hex signature of a request
    pub fn signature(&self, request: &CanonicalRequest, time: &DateTime<Utc>) -> Result<String, InvalidLength> {
        let key = self.signing_key(time)?;
        let signature = hmac(&key, self.string_to_sign(request, time).as_bytes())?;
        Ok(hex::encode(signature))
    }

    /// Value of the `Authorization` header
    pub fn authorization(&self, request: &CanonicalRequest, time: &DateTime<Utc>) -> Result<String, InvalidLength> {
        Ok(format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            self.access_key,
            self.scope(time),
            request.signed_headers(),
            self.signature(request, time)?
        ))
    }
}
