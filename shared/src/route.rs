use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;

use crate::navigation::NavigationState;
use crate::{AppError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route '{route}' is missing its {segment} segment")]
    MissingSegment {
        route: &'static str,
        segment: &'static str,
    },
}

impl From<RouteError> for AppError {
    fn from(e: RouteError) -> Self {
        AppError::new(ErrorKind::NotFound, e.to_string())
    }
}

/// Browser routes understood by the web-apps shell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Route {
    #[default]
    Apps,
    SingleApp { app_id: String },
    Sessions,
    Session { session_id: String },
    Local { path: String },
    Navigation { fragment: String },
}

impl Route {
    /// Lenient parse used on every hash change. Unknown shapes fall through to
    /// the navigation catch-all, which itself tolerates garbage.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        Self::try_parse(path).unwrap_or(Self::Apps)
    }

    pub fn try_parse(path: &str) -> Result<Self, RouteError> {
        let path = path.trim().trim_start_matches('#').trim_start_matches('/');
        let path = path.trim_end_matches('/');

        if path.is_empty() || path == "apps" {
            return Ok(Self::Apps);
        }
        if path == "sessions" {
            return Ok(Self::Sessions);
        }
        if path == "single_app" {
            return Err(RouteError::MissingSegment {
                route: "single_app",
                segment: "app id",
            });
        }
        if path == "local" {
            return Err(RouteError::MissingSegment {
                route: "local",
                segment: "path",
            });
        }

        if let Some(app_id) = path.strip_prefix("single_app/") {
            return Ok(Self::SingleApp {
                app_id: decode_segment(app_id),
            });
        }
        if let Some(session_id) = path.strip_prefix("sessions/") {
            return Ok(Self::Session {
                session_id: decode_segment(session_id),
            });
        }
        if let Some(local) = path.strip_prefix("local/") {
            return Ok(Self::Local {
                path: decode_segment(local),
            });
        }

        Ok(Self::Navigation {
            fragment: path.to_string(),
        })
    }

    #[must_use]
    pub fn from_state(state: &NavigationState) -> Self {
        Self::Navigation {
            fragment: state.to_fragment(),
        }
    }

    #[must_use]
    pub fn to_path(&self) -> String {
        match self {
            Self::Apps => "apps".to_string(),
            Self::Sessions => "sessions".to_string(),
            Self::SingleApp { app_id } => format!("single_app/{}", encode_segment(app_id)),
            Self::Session { session_id } => format!("sessions/{}", encode_segment(session_id)),
            Self::Local { path } => format!("local/{}", encode_segment(path)),
            Self::Navigation { fragment } => fragment.clone(),
        }
    }
}

fn encode_segment(segment: &str) -> String {
    form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

fn decode_segment(segment: &str) -> String {
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .map(|(key, value)| {
            if value.is_empty() {
                key.into_owned()
            } else {
                format!("{key}={value}")
            }
        })
        .unwrap_or_default()
}
