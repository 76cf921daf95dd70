//! Authentication applied to every target session

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    /// No authentication
    #[default]
    None,
    /// HTTP basic authentication
    Basic { username: String, password: String },
    /// Bearer token (also used for JWTs)
    Bearer { token: String },
    /// Raw cookie string injected into every request
    Cookie { cookies: String },
}

impl AuthConfig {
    /// Parses a `--auth-type` / `--auth` pair. Basic credentials are `user:password`.
    pub fn from_cli(auth_type: &str, credential: Option<String>) -> Result<Self, String> {
        let Some(credential) = credential else {
            return match auth_type {
                "none" => Ok(AuthConfig::None),
                other => Err(format!("--auth is required for {other} authentication")),
            };
        };

        match auth_type {
            "basic" => {
                let (username, password) = credential
                    .split_once(':')
                    .ok_or_else(|| "basic credentials must be user:password".to_string())?;
                Ok(AuthConfig::Basic {
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            "bearer" | "jwt" => Ok(AuthConfig::Bearer { token: credential }),
            "cookie" => Ok(AuthConfig::Cookie {
                cookies: credential,
            }),
            other => Err(format!(
                "unknown auth type '{other}' (none, basic, bearer, jwt, cookie)"
            )),
        }
    }

    /// Headers to inject into every request
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        match self {
            AuthConfig::None => {}
            AuthConfig::Basic { username, password } => {
                info!("Using basic authentication");
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                headers.insert("Authorization".to_string(), format!("Basic {credentials}"));
            }
            AuthConfig::Bearer { token } => {
                info!("Using bearer token authentication");
                headers.insert("Authorization".to_string(), format!("Bearer {token}"));
            }
            AuthConfig::Cookie { cookies } => {
                info!("Using cookie-based authentication");
                headers.insert("Cookie".to_string(), cookies.clone());
            }
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header() {
        let auth = AuthConfig::from_cli("basic", Some("admin:secret".to_string())).expect("auth");
        let headers = auth.headers();
        assert_eq!(
            headers.get("Authorization").map(String::as_str),
            Some("Basic YWRtaW46c2VjcmV0")
        );
    }

    #[test]
    fn test_missing_credential() {
        assert!(AuthConfig::from_cli("bearer", None).is_err());
        assert_eq!(AuthConfig::from_cli("none", None), Ok(AuthConfig::None));
        assert!(AuthConfig::from_cli("basic", Some("nocolon".to_string())).is_err());
    }
}
