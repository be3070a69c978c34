//! User identity composition
//!
//! RGW addresses a tenant user as `tenant$username` and a user without a
//! tenant by the bare username.

use serde::{Deserialize, Serialize};

/// Separator between tenant and username in an RGW user id
pub const TENANT_SEPARATOR: char = '$';

/// Decomposed RGW user id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId {
    pub tenant: Option<String>,
    pub username: String,
}

impl UserId {
    pub fn new(tenant: Option<&str>, username: &str) -> Self {
        Self {
            tenant: tenant.map(str::to_string),
            username: username.to_string(),
        }
    }

    /// Split on the first `$`
    pub fn parse(id: &str) -> Self {
        match id.split_once(TENANT_SEPARATOR) {
            Some((tenant, username)) => Self::new(Some(tenant), username),
            None => Self::new(None, id),
        }
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.tenant {
            Some(tenant) => write!(f, "{}{}{}", tenant, TENANT_SEPARATOR, self.username),
            None => write!(f, "{}", self.username),
        }
    }
}

/// Compose the remote user id
pub fn compose_user_id(tenant: Option<&str>, username: &str) -> String {
    UserId::new(tenant, username).to_string()
}

/// Split a remote user id into `(tenant, username)`
pub fn split_user_id(id: &str) -> (Option<String>, String) {
    let parsed = UserId::parse(id);
    (parsed.tenant, parsed.username)
}
