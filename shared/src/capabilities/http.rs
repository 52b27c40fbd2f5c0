use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crux_http::Http;

use crate::config::SessionConfig;
use crate::event::{Event, RawReply};
use crate::navigation::{NavigationState, QueryData};
use crate::restore::{Channel, RequestTicket};
use crate::{AppError, ErrorKind};

pub type HttpCapability = Http<Event>;

pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_REQUEST_BODY_SIZE: usize = 5 * 1024 * 1024;
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request body too large: {size} bytes exceeds maximum of {max} bytes")]
    BodyTooLarge { size: usize, max: usize },

    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

impl From<HttpError> for AppError {
    fn from(e: HttpError) -> Self {
        let kind = match e {
            HttpError::InvalidUrl { .. } => ErrorKind::Configuration,
            HttpError::BodyTooLarge { .. } => ErrorKind::Validation,
            HttpError::SerializationError { .. } => ErrorKind::Serialization,
        };
        AppError::new(kind, "Could not send the request").with_internal(e.to_string())
    }
}

/// Formplayer base URL, checked once at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedUrl {
    url: String,
    host: String,
}

impl ValidatedUrl {
    pub fn new(url: impl Into<String>) -> Result<Self, HttpError> {
        let url = url.into();
        Self::validate(&url)?;

        let parsed = Url::parse(url.trim()).map_err(|e| HttpError::InvalidUrl {
            url: Self::truncate_url(&url),
            reason: e.to_string(),
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| HttpError::InvalidUrl {
                url: Self::truncate_url(&url),
                reason: "URL must have a host".to_string(),
            })?
            .to_lowercase();

        Ok(Self {
            url: parsed.as_str().trim_end_matches('/').to_string(),
            host,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn join(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }

    fn validate(url: &str) -> Result<(), HttpError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(HttpError::InvalidUrl {
                url: url.to_string(),
                reason: "URL cannot be empty".to_string(),
            });
        }

        if url.len() > MAX_URL_LENGTH {
            return Err(HttpError::InvalidUrl {
                url: Self::truncate_url(url),
                reason: format!("URL exceeds maximum length of {MAX_URL_LENGTH} bytes"),
            });
        }

        let parsed = Url::parse(trimmed).map_err(|e| HttpError::InvalidUrl {
            url: Self::truncate_url(url),
            reason: e.to_string(),
        })?;

        let scheme = parsed.scheme().to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(HttpError::InvalidUrl {
                url: Self::truncate_url(url),
                reason: format!("invalid scheme '{scheme}', only 'http' and 'https' are allowed"),
            });
        }

        if parsed.host_str().is_none() {
            return Err(HttpError::InvalidUrl {
                url: Self::truncate_url(url),
                reason: "URL must have a host".to_string(),
            });
        }

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(HttpError::InvalidUrl {
                url: Self::truncate_url(url),
                reason: "credentials in URL are not allowed".to_string(),
            });
        }

        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(HttpError::InvalidUrl {
                url: Self::truncate_url(url),
                reason: "base URL cannot carry a query or fragment".to_string(),
            });
        }

        Ok(())
    }

    fn truncate_url(url: &str) -> String {
        if url.len() <= 100 {
            url.to_string()
        } else {
            let cut = (0..=100).rev().find(|i| url.is_char_boundary(*i)).unwrap_or(0);
            format!("{}...", &url[..cut])
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndpoint {
    NavigateMenu,
    GetDetails,
    SyncDb,
    IncompleteForm,
}

impl SessionEndpoint {
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::NavigateMenu => "navigate_menu",
            Self::GetDetails => "get_details",
            Self::SyncDb => "sync-db",
            Self::IncompleteForm => "incomplete-form",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireQueryData {
    pub inputs: std::collections::BTreeMap<String, String>,
    pub execute: bool,
    pub force_manual_search: bool,
}

impl From<&QueryData> for WireQueryData {
    fn from(query: &QueryData) -> Self {
        Self {
            inputs: query.inputs.clone(),
            execute: query.execute,
            force_manual_search: query.force_manual_search,
        }
    }
}

/// JSON body shared by every session endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequestBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    pub selections: Vec<String>,
    pub offset: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_data: Option<WireQueryData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_index: Option<i32>,
    pub cases_per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_values: Option<Vec<String>>,
    pub username: String,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_as: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub preserve_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub endpoint: SessionEndpoint,
    pub body: SessionRequestBody,
}

impl SessionRequest {
    fn identity(config: &SessionConfig) -> SessionRequestBody {
        SessionRequestBody {
            username: config.username.clone(),
            domain: config.domain.clone(),
            restore_as: config.restore_as.clone(),
            cases_per_page: config.default_cases_per_page,
            ..SessionRequestBody::default()
        }
    }

    #[must_use]
    pub fn navigate(state: &NavigationState, config: &SessionConfig) -> Self {
        let cases_per_page = state
            .cases_per_page
            .unwrap_or(config.default_cases_per_page);
        Self {
            endpoint: SessionEndpoint::NavigateMenu,
            body: SessionRequestBody {
                app_id: state.app_id.clone(),
                selections: state.selections(),
                offset: state.offset(config.default_cases_per_page),
                search_text: state.search.clone(),
                query_data: state.query.as_ref().map(WireQueryData::from),
                sort_index: state.sort_index,
                cases_per_page,
                install_reference: state.install_reference.clone(),
                session_id: state.session_id.clone(),
                selected_values: state.selected_values.clone(),
                ..Self::identity(config)
            },
        }
    }

    #[must_use]
    pub fn details(state: &NavigationState, case_id: &str, config: &SessionConfig) -> Self {
        let mut request = Self::navigate(state, config);
        request.endpoint = SessionEndpoint::GetDetails;
        request.body.selections.push(case_id.to_string());
        request
    }

    #[must_use]
    pub fn sync(app_id: Option<&str>, config: &SessionConfig) -> Self {
        Self {
            endpoint: SessionEndpoint::SyncDb,
            body: SessionRequestBody {
                app_id: app_id.map(str::to_string),
                ..Self::identity(config)
            },
        }
    }

    #[must_use]
    pub fn incomplete_form(session_id: &str, config: &SessionConfig) -> Self {
        Self {
            endpoint: SessionEndpoint::IncompleteForm,
            body: SessionRequestBody {
                session_id: Some(session_id.to_string()),
                ..Self::identity(config)
            },
        }
    }

    /// Body for a retry after `status: "retry"`. Sync retries must not wipe
    /// the restore the server is busy building.
    #[must_use]
    pub fn for_retry(&self) -> Self {
        let mut retry = self.clone();
        if self.endpoint == SessionEndpoint::SyncDb {
            retry.body.preserve_cache = true;
        }
        retry
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, HttpError> {
        let body = serde_json::to_vec(&self.body).map_err(|e| HttpError::SerializationError {
            message: e.to_string(),
        })?;
        if body.len() > MAX_REQUEST_BODY_SIZE {
            return Err(HttpError::BodyTooLarge {
                size: body.len(),
                max: MAX_REQUEST_BODY_SIZE,
            });
        }
        Ok(body)
    }
}

/// Posts `request` and routes the reply back as [`Event::SessionReplied`].
pub fn send_session_request(
    http: &HttpCapability,
    base: &ValidatedUrl,
    request: &SessionRequest,
    channel: Channel,
    ticket: RequestTicket,
) -> Result<(), HttpError> {
    let body = request.to_bytes()?;
    let url = base.join(request.endpoint.path());
    let request_id = Uuid::new_v4().to_string();

    debug!(
        %request_id,
        %ticket,
        ?channel,
        endpoint = request.endpoint.path(),
        selections = request.body.selections.len(),
        "sending session request"
    );

    http.post(&url)
        .header("Content-Type", "application/json")
        .header(REQUEST_ID_HEADER, request_id.as_str())
        .body(body)
        .send(move |result| Event::SessionReplied {
            channel,
            ticket,
            reply: RawReply::from_http(result),
        });

    Ok(())
}
