//! Case-search input encoding, required-field checks and sticky values.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::response::{InputKind, QueryDisplay};
use crate::{AppError, ErrorKind};

pub const SELECT_DELIMITER: &str = "#,#";
pub const RANGE_PREFIX: &str = "__range__";
pub const RANGE_SEPARATOR: &str = "__";
pub const UI_RANGE_SEPARATOR: &str = " to ";
pub const UI_DATE_FORMAT: &str = "%m/%d/%Y";
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_REQUIRED_MESSAGE: &str = "Sorry, this response is required!";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("'{value}' is not a valid date")]
    InvalidDate { value: String },
    #[error("'{value}' is not a valid date range")]
    InvalidRange { value: String },
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        AppError::new(ErrorKind::Validation, e.to_string())
    }
}

/// What the user has entered into one search field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInput {
    pub values: Vec<String>,
    pub search_for_blank: bool,
}

impl FieldInput {
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            values: vec![value.into()],
            search_for_blank: false,
        }
    }

    #[must_use]
    pub fn has_value(&self) -> bool {
        self.values.iter().any(|v| !v.trim().is_empty())
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, UI_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(value, ISO_DATE_FORMAT))
        .ok()
}

fn to_iso_date(value: &str) -> Result<String, QueryError> {
    parse_date(value)
        .map(|d| d.format(ISO_DATE_FORMAT).to_string())
        .ok_or_else(|| QueryError::InvalidDate {
            value: value.to_string(),
        })
}

fn to_ui_date(value: &str) -> String {
    parse_date(value).map_or_else(|| value.to_string(), |d| d.format(UI_DATE_FORMAT).to_string())
}

fn encode_range(value: &str) -> Result<String, QueryError> {
    let parts: Vec<&str> = value.split(UI_RANGE_SEPARATOR).collect();
    let [start, end] = parts.as_slice() else {
        return Err(QueryError::InvalidRange {
            value: value.to_string(),
        });
    };
    Ok(format!(
        "{RANGE_PREFIX}{}{RANGE_SEPARATOR}{}",
        to_iso_date(start)?,
        to_iso_date(end)?
    ))
}

/// Wire encoding of one field. `None` leaves the field out of the request.
pub fn encode_value(kind: InputKind, input: &FieldInput) -> Result<Option<String>, QueryError> {
    let values: Vec<&str> = input
        .values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();

    let encoded: Vec<String> = match kind {
        InputKind::Date => values.iter().map(|v| to_iso_date(v)).collect::<Result<_, _>>()?,
        InputKind::Daterange => values.iter().map(|v| encode_range(v)).collect::<Result<_, _>>()?,
        _ => values.iter().map(|v| (*v).to_string()).collect(),
    };

    let joined = encoded.join(SELECT_DELIMITER);
    Ok(match (input.search_for_blank, joined.is_empty()) {
        (true, false) => Some(format!("{SELECT_DELIMITER}{joined}")),
        (false, false) => Some(joined),
        (true, true) => Some(String::new()),
        (false, true) => None,
    })
}

/// Inverse of [`encode_value`], used for server defaults and sticky values.
#[must_use]
pub fn decode_value(kind: InputKind, raw: &str) -> FieldInput {
    let all: Vec<&str> = raw.split(SELECT_DELIMITER).collect();
    let search_for_blank = all.contains(&"");
    let values: Vec<&str> = all.into_iter().filter(|v| !v.is_empty()).collect();

    let values = match kind {
        InputKind::Select | InputKind::Checkbox => values.into_iter().map(str::to_string).collect(),
        InputKind::Date => values.into_iter().map(to_ui_date).collect(),
        InputKind::Daterange => values
            .into_iter()
            .map(|v| {
                v.trim_start_matches(RANGE_PREFIX)
                    .split(RANGE_SEPARATOR)
                    .map(to_ui_date)
                    .collect::<Vec<_>>()
                    .join(UI_RANGE_SEPARATOR)
            })
            .collect(),
        _ => values.into_iter().map(str::to_string).collect(),
    };

    FieldInput {
        values,
        search_for_blank,
    }
}

/// Field state for a freshly shown search screen: sticky values win over the
/// server's defaults.
#[must_use]
pub fn initial_inputs(
    displays: &[QueryDisplay],
    sticky: Option<&BTreeMap<String, String>>,
) -> BTreeMap<String, FieldInput> {
    displays
        .iter()
        .map(|display| {
            let raw = sticky
                .and_then(|s| s.get(&display.id))
                .or(display.value.as_ref());
            let input = raw
                .map(|raw| decode_value(display.kind(), raw))
                .unwrap_or_default();
            (display.id.clone(), input)
        })
        .collect()
}

/// Required fields left empty, keyed by field id, with the message to show.
#[must_use]
pub fn missing_required(
    displays: &[QueryDisplay],
    inputs: &BTreeMap<String, FieldInput>,
) -> BTreeMap<String, String> {
    displays
        .iter()
        .filter(|d| d.required)
        .filter(|d| {
            inputs
                .get(&d.id)
                .map_or(true, |input| !input.has_value() && !input.search_for_blank)
        })
        .map(|d| {
            let message = d
                .required_msg
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REQUIRED_MESSAGE.to_string());
            (d.id.clone(), message)
        })
        .collect()
}

/// Encodes every displayed field, skipping the ones with nothing to send.
pub fn encode_inputs(
    displays: &[QueryDisplay],
    inputs: &BTreeMap<String, FieldInput>,
) -> Result<BTreeMap<String, String>, QueryError> {
    let mut encoded = BTreeMap::new();
    for display in displays {
        let Some(input) = inputs.get(&display.id) else {
            continue;
        };
        if let Some(value) = encode_value(display.kind(), input)? {
            encoded.insert(display.id.clone(), value);
        }
    }
    Ok(encoded)
}
