//! OAuth2 client: discovery, token acquisition, refresh and PKCE

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use url::Url;

use super::traits::{OAuthToken, TokenStore};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::Logger;

const WELL_KNOWN_PATH: &str = "/.well-known/oauth-authorization-server";

/// OAuth settings of one remote server
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthParams {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// RFC 8414 metadata document; discovered from the server url when empty
    #[serde(default, alias = "authServerMetadataURL")]
    pub auth_server_metadata_url: String,
    #[serde(default, alias = "redirectURL")]
    pub redirect_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub pkce_enabled: bool,
}

impl OAuthParams {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(BridgeError::configuration(
                "OAuth clientId is required for oauth-sse transport",
            ));
        }
        if !self.auth_server_metadata_url.is_empty() {
            Url::parse(&self.auth_server_metadata_url).map_err(|e| {
                BridgeError::configuration(format!(
                    "invalid authServerMetadataUrl '{}': {}",
                    self.auth_server_metadata_url, e
                ))
            })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for OAuthParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthParams")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("auth_server_metadata_url", &self.auth_server_metadata_url)
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .field("pkce_enabled", &self.pkce_enabled)
            .finish()
    }
}

/// Authorization server metadata (RFC 8414), the fields this client uses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthServerMetadata {
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: String,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// S256 code challenge for a PKCE verifier
pub fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn pkce_verifier() -> String {
    // 64 unreserved characters, within the 43..=128 range
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// OAuth2 client bound to one remote server
///
/// Tokens are cached in the shared [`TokenStore`] under the server id, so a
/// reconnect reuses a still-valid token.
pub struct OAuthClient {
    server_id: String,
    server_url: Url,
    params: OAuthParams,
    http: reqwest::Client,
    store: Arc<dyn TokenStore>,
    metadata: OnceCell<AuthServerMetadata>,
    pkce_verifier: Mutex<Option<String>>,
    logger: Arc<dyn Logger>,
}

impl OAuthClient {
    pub fn new(
        server_id: impl Into<String>,
        server_url: Url,
        params: OAuthParams,
        http: reqwest::Client,
        store: Arc<dyn TokenStore>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            server_url,
            params,
            http,
            store,
            metadata: OnceCell::new(),
            pkce_verifier: Mutex::new(None),
            logger,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    fn error(&self, message: impl std::fmt::Display) -> BridgeError {
        BridgeError::transport(&self.server_id, format!("OAuth: {}", message))
    }

    fn metadata_url(&self) -> BridgeResult<Url> {
        if self.params.auth_server_metadata_url.is_empty() {
            self.server_url
                .join(WELL_KNOWN_PATH)
                .map_err(|e| BridgeError::configuration(format!("cannot derive metadata url: {}", e)))
        } else {
            Url::parse(&self.params.auth_server_metadata_url)
                .map_err(|e| BridgeError::configuration(format!("invalid metadata url: {}", e)))
        }
    }

    /// Fetch (once) the authorization server metadata
    pub async fn metadata(&self) -> BridgeResult<&AuthServerMetadata> {
        self.metadata
            .get_or_try_init(|| async {
                let url = self.metadata_url()?;
                self.logger.debug(&format!(
                    "[OAuth] {}: fetching metadata from {}",
                    self.server_id, url
                ));

                let response = self
                    .http
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(|e| self.error(format!("metadata request failed: {}", e)))?;
                if !response.status().is_success() {
                    return Err(self.error(format!(
                        "metadata endpoint {} returned {}",
                        url,
                        response.status()
                    )));
                }
                response
                    .json::<AuthServerMetadata>()
                    .await
                    .map_err(|e| self.error(format!("invalid metadata document: {}", e)))
            })
            .await
    }

    /// `Authorization` header value, acquiring or refreshing a token when needed
    pub async fn authorization_header(&self) -> BridgeResult<String> {
        if let Some(token) = self.store.load(&self.server_id)? {
            if !token.is_expired() {
                return Ok(token.authorization());
            }
            if let Some(refresh_token) = token.refresh_token.clone() {
                match self.refresh(&refresh_token).await {
                    Ok(token) => return Ok(token.authorization()),
                    Err(e) => self.logger.warn(&format!(
                        "[OAuth] {}: refresh failed, requesting a new token: {}",
                        self.server_id, e
                    )),
                }
            }
        }

        let token = self.client_credentials().await?;
        Ok(token.authorization())
    }

    /// Mark the cached token unusable after the resource server rejected it
    pub fn invalidate(&self) -> BridgeResult<()> {
        match self.store.load(&self.server_id)? {
            Some(mut token) if token.refresh_token.is_some() => {
                token.expires_at = Some(Utc::now() - Duration::seconds(1));
                self.store.save(&self.server_id, token)?;
            }
            Some(_) => self.store.remove(&self.server_id)?,
            None => {}
        }
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> BridgeResult<OAuthToken> {
        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        self.push_client_auth(&mut form);
        let token = self.request_token(form).await?;
        if token.refresh_token.is_some() {
            return Ok(token);
        }
        // Keep the old refresh token when the server does not rotate it
        let token = token.with_refresh_token(Some(refresh_token.to_string()));
        self.store.save(&self.server_id, token.clone())?;
        Ok(token)
    }

    async fn client_credentials(&self) -> BridgeResult<OAuthToken> {
        let mut form = vec![("grant_type", "client_credentials".to_string())];
        self.push_client_auth(&mut form);
        if !self.params.scopes.is_empty() {
            form.push(("scope", self.params.scopes.join(" ")));
        }
        self.request_token(form).await
    }

    /// Authorization-code request url; with PKCE enabled a fresh verifier is kept
    /// for the following [`OAuthClient::exchange_code`]
    pub async fn authorization_url(&self, state: &str) -> BridgeResult<Url> {
        if self.params.redirect_url.is_empty() {
            return Err(BridgeError::configuration(
                "OAuth redirectUrl is required for the authorization code flow",
            ));
        }
        let metadata = self.metadata().await?;
        let endpoint = metadata.authorization_endpoint.as_deref().ok_or_else(|| {
            BridgeError::configuration("authorization server does not advertise an authorization_endpoint")
        })?;
        let mut url = Url::parse(endpoint)
            .map_err(|e| self.error(format!("invalid authorization_endpoint: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.params.client_id)
                .append_pair("redirect_uri", &self.params.redirect_url)
                .append_pair("state", state);
            if !self.params.scopes.is_empty() {
                query.append_pair("scope", &self.params.scopes.join(" "));
            }
            if self.params.pkce_enabled {
                let verifier = pkce_verifier();
                query
                    .append_pair("code_challenge", &pkce_challenge(&verifier))
                    .append_pair("code_challenge_method", "S256");
                *self.pkce_verifier.lock() = Some(verifier);
            }
        }
        Ok(url)
    }

    /// Exchange an authorization code for a token and store it
    pub async fn exchange_code(&self, code: &str) -> BridgeResult<OAuthToken> {
        let mut form = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", self.params.redirect_url.clone()),
        ];
        self.push_client_auth(&mut form);
        if self.params.pkce_enabled {
            let verifier = self.pkce_verifier.lock().take().ok_or_else(|| {
                BridgeError::configuration("no PKCE verifier; build the authorization url first")
            })?;
            form.push(("code_verifier", verifier));
        }
        self.request_token(form).await
    }

    fn push_client_auth(&self, form: &mut Vec<(&'static str, String)>) {
        form.push(("client_id", self.params.client_id.clone()));
        if !self.params.client_secret.is_empty() {
            form.push(("client_secret", self.params.client_secret.clone()));
        }
    }

    async fn request_token(&self, form: Vec<(&'static str, String)>) -> BridgeResult<OAuthToken> {
        let endpoint = self.metadata().await?.token_endpoint.clone();
        let response = self
            .http
            .post(&endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| self.error(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.error(format!("token endpoint returned {}: {}", status, body)));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("invalid token response: {}", e)))?;

        let mut token = OAuthToken::bearer(body.access_token)
            .with_expires_in(body.expires_in)
            .with_refresh_token(body.refresh_token);
        if let Some(token_type) = body.token_type {
            token.token_type = token_type;
        }

        self.store.save(&self.server_id, token.clone())?;
        self.logger.info(&format!("[OAuth] {}: token acquired", self.server_id));
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::NoOpLogger;
    use crate::oauth::MemoryTokenStore;

    fn client(params: OAuthParams, store: Arc<MemoryTokenStore>) -> OAuthClient {
        OAuthClient::new(
            "docs",
            Url::parse("https://mcp.example.com/sse").unwrap(),
            params,
            reqwest::Client::new(),
            store,
            Arc::new(NoOpLogger),
        )
    }

    #[test]
    fn test_pkce_challenge_rfc7636_vector() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mJ92K53K2fT3uCk4pGC2mCoP6QCG5w"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_pkce_verifier_length() {
        let verifier = pkce_verifier();
        assert_eq!(verifier.len(), 64);
        assert!(verifier.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_metadata_url_discovery() {
        let c = client(OAuthParams::new("id"), Arc::new(MemoryTokenStore::new()));
        assert_eq!(
            c.metadata_url().unwrap().as_str(),
            "https://mcp.example.com/.well-known/oauth-authorization-server"
        );

        let mut params = OAuthParams::new("id");
        params.auth_server_metadata_url = "https://auth.example.com/meta".to_string();
        let c = client(params, Arc::new(MemoryTokenStore::new()));
        assert_eq!(c.metadata_url().unwrap().as_str(), "https://auth.example.com/meta");
    }

    #[test]
    fn test_params_validation() {
        assert!(OAuthParams::default().validate().is_err());
        assert!(OAuthParams::new("client").validate().is_ok());

        let mut params = OAuthParams::new("client");
        params.auth_server_metadata_url = "not a url".to_string();
        assert!(matches!(params.validate(), Err(BridgeError::Configuration(_))));
    }

    #[test]
    fn test_params_deserialize_original_spelling() {
        let params: OAuthParams = serde_json::from_value(serde_json::json!({
            "clientId": "abc",
            "authServerMetadataURL": "https://auth.example.com/meta",
            "redirectURL": "http://localhost/cb",
            "pkceEnabled": true
        }))
        .unwrap();
        assert_eq!(params.auth_server_metadata_url, "https://auth.example.com/meta");
        assert_eq!(params.redirect_url, "http://localhost/cb");
        assert!(params.pkce_enabled);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let mut params = OAuthParams::new("client");
        params.client_secret = "hunter2".to_string();
        assert!(!format!("{:?}", params).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_cached_token_is_used_without_io() {
        let store = Arc::new(MemoryTokenStore::new());
        store
            .save("docs", OAuthToken::bearer("cached").with_expires_in(Some(3600)))
            .unwrap();
        let c = client(OAuthParams::new("id"), store);
        assert_eq!(c.authorization_header().await.unwrap(), "Bearer cached");
    }

    #[test]
    fn test_invalidate() {
        let store = Arc::new(MemoryTokenStore::new());
        store.save("docs", OAuthToken::bearer("plain")).unwrap();
        let c = client(OAuthParams::new("id"), store.clone());
        c.invalidate().unwrap();
        assert!(store.load("docs").unwrap().is_none());

        store
            .save(
                "docs",
                OAuthToken::bearer("refreshable").with_refresh_token(Some("r".to_string())),
            )
            .unwrap();
        c.invalidate().unwrap();
        let token = store.load("docs").unwrap().unwrap();
        assert!(token.is_expired());
        assert_eq!(token.refresh_token.as_deref(), Some("r"));
    }
}
