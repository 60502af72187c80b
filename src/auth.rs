//! OAuth2 authentication management for Gmail API

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{GmailError, Result};

/// Default scope: read, label and trash, but no permanent deletion
pub const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";

/// Full mailbox access, needed only for permanent deletion
pub const FULL_ACCESS_SCOPE: &str = "https://mail.google.com/";

/// Type alias for Gmail Hub to simplify type signatures
pub type GmailHub = Gmail<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// Initialize Gmail API hub with OAuth2 authentication
///
/// This function sets up the complete Gmail API client with:
/// - OAuth2 authentication using InstalledFlow (desktop app flow)
/// - Token persistence to disk for automatic refresh
/// - HTTP/1 client with TLS support
///
/// # Arguments
/// * `credentials_path` - Path to the OAuth2 client secret JSON file
/// * `token_cache_path` - Path where access tokens will be cached
/// * `scopes` - Scopes to pre-authorize the cached token for
pub async fn initialize_gmail_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
    scopes: &[String],
) -> Result<GmailHub> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to read credentials: {}", e)))?;

    if let Some(parent) = token_cache_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    // HTTPRedirect opens a browser for user authorization
    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| GmailError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Pre-authenticate so the cached token carries every configured scope
    let _token = auth
        .token(scopes)
        .await
        .map_err(|e| GmailError::AuthError(format!("Failed to obtain token: {}", e)))?;

    #[cfg(unix)]
    if token_cache_path.exists() {
        secure_token_file(token_cache_path).await?;
    }

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| GmailError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Credential structure matching Google's OAuth2 client secret JSON format
#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub installed: InstalledApp,
}

/// Installed application credentials (desktop/CLI app)
#[derive(Debug, Serialize, Deserialize)]
pub struct InstalledApp {
    pub client_id: String,
    pub project_id: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub client_secret: String,
    pub redirect_uris: Vec<String>,
}

/// Load and sanity-check the client secret file before starting the OAuth flow
pub async fn load_credentials(path: &Path) -> Result<Credentials> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        GmailError::AuthError(format!("Cannot read client secret file {:?}: {}", path, e))
    })?;
    let creds = serde_json::from_str(&content)?;
    Ok(creds)
}

/// Restrict the token cache to its owner (0600)
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}
