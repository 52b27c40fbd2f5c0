//! Decoding of Formplayer replies.
//!
//! Every reply is classified once, at the boundary, into a [`SessionReply`].
//! The rest of the core only ever sees typed payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{AppError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("HTTP {status}")]
    HttpStatus { status: u16, body: Vec<u8> },
    #[error("server reported an error: {message}")]
    Server { message: String },
    #[error("unreadable reply: {0}")]
    Decode(String),
    #[error("unknown response type '{0}'")]
    UnknownType(String),
}

impl From<ReplyError> for AppError {
    fn from(e: ReplyError) -> Self {
        match e {
            ReplyError::Transport(message) => {
                AppError::new(ErrorKind::Network, "Request failed").with_internal(message)
            }
            ReplyError::HttpStatus { status, body } => {
                let body = if body.is_empty() { None } else { Some(body.as_slice()) };
                AppError::from_http_status(status, body)
            }
            ReplyError::Server { message } => AppError::new(ErrorKind::Server, message),
            ReplyError::Decode(reason) => {
                AppError::new(ErrorKind::Deserialization, "Unreadable server reply")
                    .with_internal(reason)
            }
            ReplyError::UnknownType(kind) => {
                AppError::new(ErrorKind::Deserialization, "Unsupported server reply")
                    .with_context("type", kind)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub kind: NotificationKind,
}

impl Notification {
    #[must_use]
    pub fn new(message: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    #[must_use]
    pub fn from_error(error: &AppError) -> Self {
        Self::new(error.user_facing_message(), NotificationKind::Error)
    }
}

/// `notification` block as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct WireNotification {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: bool,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl WireNotification {
    fn into_notification(self) -> Option<Notification> {
        let message = self.message.filter(|m| !m.trim().is_empty())?;
        let kind = match self.kind.as_deref() {
            Some("success") => NotificationKind::Success,
            Some("warning") => NotificationKind::Warning,
            Some("error" | "danger") => NotificationKind::Error,
            _ if self.error => NotificationKind::Error,
            _ => NotificationKind::Success,
        };
        Some(Notification { message, kind })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub index: u32,
    pub display_text: String,
    #[serde(default)]
    pub image_uri: Option<String>,
    #[serde(default)]
    pub audio_uri: Option<String>,
    #[serde(default)]
    pub badge_text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutStyle {
    #[default]
    List,
    Grid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandsResponse {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub breadcrumbs: Vec<String>,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub layout_style: LayoutStyle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Text,
    Date,
    Daterange,
    Select,
    Checkbox,
    Address,
    Barcode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDisplay {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub input: Option<InputKind>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, alias = "required_msg")]
    pub required_msg: Option<String>,
    #[serde(default)]
    pub itemset_choices: Vec<String>,
    #[serde(default)]
    pub group_key: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub allow_blank_value: bool,
}

impl QueryDisplay {
    #[must_use]
    pub fn kind(&self) -> InputKind {
        self.input.unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupHeader {
    pub key: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub breadcrumbs: Vec<String>,
    #[serde(default)]
    pub displays: Vec<QueryDisplay>,
    #[serde(default)]
    pub group_headers: Vec<GroupHeader>,
    #[serde(default)]
    pub query_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileCell {
    #[serde(default)]
    pub grid_x: u32,
    #[serde(default)]
    pub grid_y: u32,
    #[serde(default)]
    pub grid_width: u32,
    #[serde(default)]
    pub grid_height: u32,
    #[serde(default)]
    pub font_size: Option<u32>,
    #[serde(default)]
    pub show_border: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailTabPayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub details: Vec<Value>,
    #[serde(default)]
    pub styles: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub details: Option<Vec<DetailTabPayload>>,
    #[serde(default)]
    pub group_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseListAction {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitiesResponse {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub breadcrumbs: Vec<String>,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub styles: Vec<Value>,
    #[serde(default)]
    pub tiles: Option<Vec<Option<TileCell>>>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub current_page: u32,
    #[serde(default)]
    pub multi_select: bool,
    #[serde(default)]
    pub max_select_value: Option<u32>,
    #[serde(default = "no_group_header_rows")]
    pub group_header_rows: i32,
    #[serde(default)]
    pub actions: Vec<CaseListAction>,
    #[serde(default)]
    pub sort_indices: Vec<i32>,
    #[serde(default)]
    pub num_entities_per_row: Option<u32>,
    #[serde(default)]
    pub no_items_text: Option<String>,
}

const fn no_group_header_rows() -> i32 {
    -1
}

impl EntitiesResponse {
    #[must_use]
    pub fn has_tiles(&self) -> bool {
        self.tiles.as_ref().is_some_and(|t| t.iter().any(Option::is_some))
    }

    #[must_use]
    pub fn entity(&self, case_id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == case_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormResponse {
    #[serde(alias = "session_id")]
    pub session_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub breadcrumbs: Vec<String>,
    #[serde(default)]
    pub tree: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsResponse {
    #[serde(default)]
    pub details: Vec<DetailTabPayload>,
    #[serde(default)]
    pub is_persistent_detail: bool,
}

/// Everything the menu region can show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MenuResponse {
    Commands(CommandsResponse),
    Query(QueryResponse),
    Entities(EntitiesResponse),
    Form(FormResponse),
    Details(DetailsResponse),
}

impl MenuResponse {
    #[must_use]
    pub fn breadcrumbs(&self) -> &[String] {
        match self {
            Self::Commands(r) => &r.breadcrumbs,
            Self::Query(r) => &r.breadcrumbs,
            Self::Entities(r) => &r.breadcrumbs,
            Self::Form(r) => &r.breadcrumbs,
            Self::Details(_) => &[],
        }
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        match self {
            Self::Commands(r) => r.title.as_deref(),
            Self::Query(r) => r.title.as_deref(),
            Self::Entities(r) => r.title.as_deref(),
            Self::Form(r) => r.title.as_deref(),
            Self::Details(_) => None,
        }
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Commands(_) => "commands",
            Self::Query(_) => "query",
            Self::Entities(_) => "entities",
            Self::Form(_) => "form",
            Self::Details(_) => "details",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryNotice {
    pub retry_after_secs: Option<f64>,
    pub done: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionReply {
    Retry(RetryNotice),
    Menu {
        response: Box<MenuResponse>,
        notification: Option<Notification>,
    },
    /// Terminal reply with no screen attached, as sent by `sync-db`.
    Completed { notification: Option<Notification> },
}

/// Classifies a raw reply. Non-2xx statuses and JSON error markers are
/// failures; `status: "retry"` is the async-restore signal.
pub fn interpret_reply(status: u16, body: &[u8]) -> Result<SessionReply, ReplyError> {
    if !(200..300).contains(&status) {
        return Err(ReplyError::HttpStatus {
            status,
            body: body.to_vec(),
        });
    }

    let value: Value = serde_json::from_slice(body).map_err(|e| ReplyError::Decode(e.to_string()))?;
    let Value::Object(ref object) = value else {
        return Err(ReplyError::Decode("reply is not a JSON object".into()));
    };

    let reply_status = object.get("status").and_then(Value::as_str);
    if reply_status == Some("retry") || status == 202 {
        return Ok(SessionReply::Retry(RetryNotice {
            retry_after_secs: object.get("retryAfter").and_then(Value::as_f64),
            done: object.get("done").and_then(Value::as_u64).unwrap_or(0),
            total: object.get("total").and_then(Value::as_u64).unwrap_or(0),
        }));
    }

    if let Some(message) = server_error(object, reply_status) {
        return Err(ReplyError::Server { message });
    }

    let notification = object
        .get("notification")
        .cloned()
        .and_then(|n| serde_json::from_value::<WireNotification>(n).ok())
        .and_then(WireNotification::into_notification);

    let type_name = object.get("type").and_then(Value::as_str).map(str::to_string);
    let is_form = object.contains_key("session_id") || object.contains_key("sessionId");
    let is_details = object.contains_key("details");

    let response = match type_name.as_deref() {
        Some("commands" | "query" | "entities") => decode::<MenuResponse>(value)?,
        Some(other) => return Err(ReplyError::UnknownType(other.to_string())),
        None if is_form => MenuResponse::Form(decode(value)?),
        None if is_details => MenuResponse::Details(decode(value)?),
        None => return Ok(SessionReply::Completed { notification }),
    };

    Ok(SessionReply::Menu {
        response: Box::new(response),
        notification,
    })
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ReplyError> {
    serde_json::from_value(value).map_err(|e| ReplyError::Decode(e.to_string()))
}

fn server_error(object: &serde_json::Map<String, Value>, reply_status: Option<&str>) -> Option<String> {
    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let message = text("human_readable_message")
        .or_else(|| text("exception"))
        .or_else(|| text("error"));

    match (message, reply_status) {
        (Some(message), _) => Some(message),
        (None, Some("error")) => Some("The server could not complete the request.".into()),
        (None, _) => None,
    }
}
