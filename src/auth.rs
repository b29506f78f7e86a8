//! OAuth2 authentication and Gmail hub initialization

use google_gmail1::{hyper_rustls, hyper_util, yup_oauth2, Gmail};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use yup_oauth2::ApplicationSecret;

use crate::client::GmailConnector;
use crate::error::{Result, SweepError};

/// Scopes requested up front
///
/// - gmail.modify: search, hydration, trash, label changes
/// - gmail.labels: label listing and creation
///
/// Permanent deletion needs the full `https://mail.google.com/` scope;
/// it is requested lazily if that provider operation is ever used.
pub const REQUIRED_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.labels",
];

/// Initialize the Gmail API hub with OAuth2 authentication
///
/// Uses the desktop-app InstalledFlow: the first run opens a browser
/// for consent, after which tokens are cached on disk and refreshed
/// automatically.
pub async fn initialize_hub(
    credentials_path: &Path,
    token_cache_path: &Path,
) -> Result<Gmail<GmailConnector>> {
    let secret = yup_oauth2::read_application_secret(credentials_path)
        .await
        .map_err(|e| SweepError::AuthError(format!("Failed to read credentials: {}", e)))?;

    let auth = yup_oauth2::InstalledFlowAuthenticator::builder(
        secret,
        yup_oauth2::InstalledFlowReturnMethod::HTTPRedirect,
    )
    .persist_tokens_to_disk(token_cache_path)
    .build()
    .await
    .map_err(|e| SweepError::AuthError(format!("Failed to build authenticator: {}", e)))?;

    // Pre-authenticate so the cached token carries the scopes every
    // engine operation needs
    let _token = auth
        .token(REQUIRED_SCOPES)
        .await
        .map_err(|e| SweepError::AuthError(format!("Failed to obtain token: {}", e)))?;

    // HTTP/1 for compatibility with google-gmail1
    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(
            hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(|e| SweepError::AuthError(format!("Failed to load TLS roots: {}", e)))?
                .https_or_http()
                .enable_http1()
                .build(),
        );

    Ok(Gmail::new(client, auth))
}

/// Credential structure matching Google's OAuth2 credentials JSON
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

/// Load OAuth2 credentials from a JSON file
pub async fn load_credentials(path: &Path) -> Result<Credentials> {
    let content = tokio::fs::read_to_string(path).await?;
    let creds = serde_json::from_str(&content)?;
    Ok(creds)
}

/// Load OAuth2 credentials from environment variables
///
/// For deployments that keep secrets out of files:
/// `MAILSWEEP_CLIENT_ID`, `MAILSWEEP_CLIENT_SECRET`, and optionally
/// `MAILSWEEP_REDIRECT_URI` (defaults to http://localhost:8080).
pub fn load_credentials_from_env() -> Result<ApplicationSecret> {
    let client_id = env::var("MAILSWEEP_CLIENT_ID")
        .map_err(|_| SweepError::ConfigError("MAILSWEEP_CLIENT_ID not set".to_string()))?;
    let client_secret = env::var("MAILSWEEP_CLIENT_SECRET")
        .map_err(|_| SweepError::ConfigError("MAILSWEEP_CLIENT_SECRET not set".to_string()))?;
    let redirect_uri = env::var("MAILSWEEP_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());

    Ok(ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
        redirect_uris: vec![redirect_uri],
        ..Default::default()
    })
}

/// Restrict token file permissions to the owner on Unix systems
#[cfg(unix)]
pub async fn secure_token_file(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

/// Windows uses ACLs; no permission tightening is attempted
#[cfg(windows)]
pub async fn secure_token_file(_path: &Path) -> Result<()> {
    Ok(())
}
