//! Dropbox implementation of [`RemoteStore`].
//!
//! Objects live at `/<object>` in the app folder. Request arguments go in the
//! `arg` query parameter, not the `Dropbox-API-Arg` header: object names may
//! be non-ASCII.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use sixtyfive_core::settings::{write_private_at, Settings};

use crate::error::StoreError;
use crate::store::{RemoteObject, RemoteStore};

const API_URL: &str = "https://api.dropboxapi.com";
const CONTENT_URL: &str = "https://content.dropboxapi.com";
const AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";

/// Header carrying file metadata on download responses.
const RESULT_HEADER: &str = "Dropbox-API-Result";

#[derive(Debug, Deserialize)]
struct FileMetadata {
    server_modified: String,
}

#[derive(Debug, Deserialize)]
struct Account {
    name: AccountName,
}

#[derive(Debug, Deserialize)]
struct AccountName {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Authenticated Dropbox session.
#[derive(Debug, Clone)]
pub struct DropboxClient {
    http: Client,
    token: String,
}

impl DropboxClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            token: token.into(),
        }
    }

    /// Establish a session from the stored token, issuing a new one through
    /// the OAuth code flow when it is missing or rejected.
    pub async fn connect(settings: &Settings, home: &Path) -> Result<Self, StoreError> {
        let token_path = settings.token_path_at(home);
        match read_token(&token_path) {
            Some(token) => {
                let client = Self::new(token);
                if client.token_is_valid().await? {
                    debug!(path = %token_path.display(), "stored token accepted");
                    return Ok(client);
                }
                warn!(path = %token_path.display(), "stored token was rejected");
            }
            None => info!(path = %token_path.display(), "no stored token"),
        }

        let (Some(key), Some(secret)) = (settings.app_key.as_deref(), settings.app_secret.as_deref())
        else {
            return Err(StoreError::Authentication(format!(
                "no valid token at {} and no app_key/app_secret configured to issue one",
                token_path.display()
            )));
        };

        let token = issue_token(&Client::new(), key, secret).await?;
        write_private_at(&token_path, token.as_bytes()).map_err(|e| {
            StoreError::Authentication(format!("failed to store issued token: {e}"))
        })?;
        info!(path = %token_path.display(), "issued and stored a new token");
        Ok(Self::new(token))
    }

    async fn token_is_valid(&self) -> Result<bool, StoreError> {
        let resp = self.current_account_response().await?;
        match resp.status() {
            status if status.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST => Ok(false),
            status => Err(failure(status, resp.text().await.unwrap_or_default(), "account")),
        }
    }

    async fn current_account_response(&self) -> Result<Response, StoreError> {
        Ok(self
            .http
            .post(format!("{API_URL}/2/users/get_current_account"))
            .bearer_auth(&self.token)
            .send()
            .await?)
    }

    /// Display name of the signed-in account, for the startup log line.
    pub async fn current_user_display_name(&self) -> Result<String, StoreError> {
        let resp = self.current_account_response().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(failure(status, resp.text().await.unwrap_or_default(), "account"));
        }
        let account: Account = resp.json().await?;
        Ok(account.name.display_name)
    }
}

#[async_trait]
impl RemoteStore for DropboxClient {
    async fn download(&self, object: &str) -> Result<RemoteObject, StoreError> {
        let resp = self
            .http
            .post(format!("{CONTENT_URL}/2/files/download"))
            .bearer_auth(&self.token)
            .query(&[("arg", api_arg(object, false))])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(failure(status, resp.text().await.unwrap_or_default(), object));
        }

        let metadata = resp
            .headers()
            .get(RESULT_HEADER)
            .ok_or_else(|| StoreError::Metadata(format!("{RESULT_HEADER} header missing")))?
            .to_str()
            .map_err(|e| StoreError::Metadata(e.to_string()))?;
        let metadata: FileMetadata = serde_json::from_str(metadata)?;
        let modified_ms = parse_server_modified(&metadata.server_modified)?;

        let data = resp.bytes().await?.to_vec();
        debug!(object, bytes = data.len(), modified_ms, "downloaded");
        Ok(RemoteObject { data, modified_ms })
    }

    async fn upload(&self, data: Vec<u8>, object: &str) -> Result<i64, StoreError> {
        let size = data.len();
        let resp = self
            .http
            .post(format!("{CONTENT_URL}/2/files/upload"))
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/octet-stream")
            .query(&[("arg", api_arg(object, true))])
            .body(data)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(failure(status, resp.text().await.unwrap_or_default(), object));
        }
        let metadata: FileMetadata = resp.json().await?;
        let modified_ms = parse_server_modified(&metadata.server_modified)?;
        debug!(object, bytes = size, modified_ms, "uploaded");
        Ok(modified_ms)
    }
}

/// Run the authorization-code flow interactively on the terminal.
async fn issue_token(http: &Client, key: &str, secret: &str) -> Result<String, StoreError> {
    let url = format!("{AUTHORIZE_URL}?client_id={key}&response_type=code");
    eprintln!("Open the following URL, allow access, and paste the code here:\n  {url}");

    let code = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await
    .map_err(|e| StoreError::Authentication(format!("reading access code failed: {e}")))?
    .map_err(|e| StoreError::Authentication(format!("reading access code failed: {e}")))?;
    let code = code.trim();
    if code.is_empty() {
        return Err(StoreError::Authentication("no access code entered".into()));
    }

    let resp = http
        .post(format!("{API_URL}/oauth2/token"))
        .form(&[
            ("code", code),
            ("grant_type", "authorization_code"),
            ("client_id", key),
            ("client_secret", secret),
        ])
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(StoreError::Authentication(format!(
            "token exchange returned {status}: {body}"
        )));
    }
    Ok(resp.json::<TokenResponse>().await?.access_token)
}

fn read_token(path: &Path) -> Option<String> {
    let token = std::fs::read_to_string(path).ok()?;
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn api_arg(object: &str, overwrite: bool) -> String {
    let path = format!("/{}", object.trim_start_matches('/'));
    if overwrite {
        json!({ "path": path, "mode": "overwrite" }).to_string()
    } else {
        json!({ "path": path }).to_string()
    }
}

fn failure(status: StatusCode, body: String, object: &str) -> StoreError {
    if status == StatusCode::CONFLICT && body.contains("not_found") {
        return StoreError::NotFound {
            object: object.to_string(),
        };
    }
    if status == StatusCode::UNAUTHORIZED {
        return StoreError::Authentication(body);
    }
    StoreError::Status {
        status: status.as_u16(),
        message: body,
    }
}

/// `server_modified` (RFC 3339, e.g. `2024-03-01T12:00:05Z`) as epoch ms.
fn parse_server_modified(raw: &str) -> Result<i64, StoreError> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|time| time.timestamp_millis())
        .map_err(|e| StoreError::Metadata(format!("bad server_modified '{raw}': {e}")))
}
