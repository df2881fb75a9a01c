use log::debug;
use reqwest::StatusCode;
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;

pub mod input;
pub mod logger;
pub mod runner;

/// The action keyword sent to the identity provider. Keycloak emails the user
/// a link to perform each action in the array.
const REQUIRED_ACTIONS: [&str; 1] = ["UPDATE_PASSWORD"];

#[derive(Debug, Error)]
pub enum Error {
    #[error("users file {0:?} does not exist")]
    MissingInput(PathBuf),
    #[error("no user ids found in {0:?}")]
    EmptyInput(PathBuf),
    #[error("user {user_id}: HTTP {status}: {body}")]
    ActionRequest {
        user_id: String,
        status: StatusCode,
        body: String,
    },
    #[error("user {user_id}: request failed: {source}")]
    Transport {
        user_id: String,
        source: reqwest::Error,
    },
    #[error("invalid url: {0}")]
    Url(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outcome of one successful action invocation. The response body is kept as
/// opaque text for logging; it is never parsed.
#[derive(Debug, Clone)]
pub struct ActionResult {
    pub user_id: String,
    pub status: StatusCode,
    pub body: String,
}

/// Client object for making Keycloak admin API calls. Uses `Arc` internally
/// to be cheaply cloneable.
#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    data: Arc<ClientData>,
}

struct ClientData {
    base_url: reqwest::Url,
    realm: String,
    token: String,
}

impl Client {
    /// Construct a new client for the given server, realm, and bearer token.
    pub fn new(
        base_url: impl AsRef<str>,
        realm: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, Error> {
        // Normalize the trailing slash so Url::join keeps the full base path
        let base_url = format!("{}/", base_url.as_ref().trim_end_matches('/'))
            .parse::<reqwest::Url>()
            .map_err(|error| Error::Url(error.to_string()))?;
        Ok(Self {
            client: reqwest::Client::new(),
            data: Arc::new(ClientData {
                base_url,
                realm: realm.into(),
                token: token.into(),
            }),
        })
    }

    /// Ask the identity provider to send the user an UPDATE_PASSWORD action
    /// email. One attempt, no retry; any non-2xx status or transport failure
    /// is an error.
    pub async fn execute_actions_email(&self, user_id: &str) -> Result<ActionResult, Error> {
        // Construct the url for the request
        let url = self
            .data
            .base_url
            .join(&format!(
                "admin/realms/{}/users/{}/execute-actions-email",
                self.data.realm, user_id
            ))
            .map_err(|error| Error::Url(error.to_string()))?;
        debug!("PUT {}", url);
        // Send the request
        let response = self
            .client
            .put(url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.data.token),
            )
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(json::stringify(REQUIRED_ACTIONS.to_vec()))
            .send()
            .await
            .map_err(|source| Error::Transport {
                user_id: user_id.to_owned(),
                source,
            })?;
        // Keep the body as text whether we succeeded or not
        let status = response.status();
        let body = response.text().await.map_err(|source| Error::Transport {
            user_id: user_id.to_owned(),
            source,
        })?;
        if status.is_success() {
            Ok(ActionResult {
                user_id: user_id.to_owned(),
                status,
                body,
            })
        } else {
            Err(Error::ActionRequest {
                user_id: user_id.to_owned(),
                status,
                body,
            })
        }
    }
}
