//! Navigation state carried in the browser URL fragment.
//!
//! The whole position of a user inside an application (which app, which menu
//! entries were picked, paging, search, case-search inputs) fits into one
//! opaque token. Every user action mutates a [`NavigationState`], pushes the
//! new token to the browser history and asks the server for the matching
//! screen.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;
use url::form_urlencoded;

use crate::{AppError, ErrorKind};

/// Selection value Formplayer understands as "use the multi-select payload".
pub const USE_SELECTED_VALUES: &str = "use_selected_values";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("navigation fragment is empty")]
    Empty,
    #[error("navigation fragment is not a single token")]
    Malformed,
    #[error("navigation fragment is not valid JSON: {0}")]
    Json(String),
}

impl From<FragmentError> for AppError {
    fn from(e: FragmentError) -> Self {
        AppError::new(ErrorKind::Deserialization, "Invalid navigation link")
            .with_internal(e.to_string())
    }
}

/// One entry of the selection path.
///
/// Menu entries are picked by index. Cases, case-list actions and the
/// multi-select marker are opaque strings the server hands back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Index(u32),
    Value(String),
}

impl Step {
    #[must_use]
    pub fn action(index: u32) -> Self {
        Self::Value(format!("action {index}"))
    }

    #[must_use]
    pub fn as_selection(&self) -> String {
        match self {
            Self::Index(i) => i.to_string(),
            Self::Value(v) => v.clone(),
        }
    }
}

impl From<u32> for Step {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Step {
    fn from(value: &str) -> Self {
        Self::Value(value.to_string())
    }
}

impl From<String> for Step {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Value(v) => f.write_str(v),
        }
    }
}

/// Case-search inputs keyed by field id, already in wire encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryData {
    #[serde(rename = "i", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, String>,
    #[serde(rename = "x", default, skip_serializing_if = "is_false")]
    pub execute: bool,
    #[serde(rename = "f", default, skip_serializing_if = "is_false")]
    pub force_manual_search: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

impl QueryData {
    #[must_use]
    pub fn execute(inputs: BTreeMap<String, String>) -> Self {
        Self {
            inputs,
            execute: true,
            force_manual_search: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationState {
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(rename = "s", default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,
    #[serde(rename = "p", default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(rename = "q", default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryData>,
    #[serde(rename = "i", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub install_reference: Option<String>,
    #[serde(rename = "o", default, skip_serializing_if = "Option::is_none")]
    pub sort_index: Option<i32>,
    #[serde(rename = "n", default, skip_serializing_if = "Option::is_none")]
    pub cases_per_page: Option<u32>,
    #[serde(rename = "v", default, skip_serializing_if = "Option::is_none")]
    pub selected_values: Option<Vec<String>>,
}

impl NavigationState {
    #[must_use]
    pub fn for_app(app_id: impl Into<String>) -> Self {
        Self {
            app_id: Some(app_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_install_reference(reference: impl Into<String>) -> Self {
        Self {
            install_reference: Some(reference.into()),
            ..Self::default()
        }
    }

    /// Best-effort decode. Anything unreadable becomes the empty state.
    #[must_use]
    pub fn from_fragment(fragment: &str) -> Self {
        match Self::try_from_fragment(fragment) {
            Ok(state) => state,
            Err(FragmentError::Empty) => Self::default(),
            Err(e) => {
                debug!(error = %e, "ignoring unreadable navigation fragment");
                Self::default()
            }
        }
    }

    pub fn try_from_fragment(fragment: &str) -> Result<Self, FragmentError> {
        let token = fragment.trim().trim_start_matches('#').trim_start_matches('/');
        if token.is_empty() {
            return Err(FragmentError::Empty);
        }

        let mut pairs = form_urlencoded::parse(token.as_bytes());
        let json = match (pairs.next(), pairs.next()) {
            (Some((key, value)), None) if value.is_empty() => key,
            _ => return Err(FragmentError::Malformed),
        };

        serde_json::from_str(&json).map_err(|e| FragmentError::Json(e.to_string()))
    }

    #[must_use]
    pub fn to_fragment(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => form_urlencoded::byte_serialize(json.as_bytes()).collect(),
            Err(e) => {
                debug!(error = %e, "navigation state did not serialize");
                String::new()
            }
        }
    }

    #[must_use]
    pub fn has_entry_point(&self) -> bool {
        self.app_id.is_some() || self.install_reference.is_some()
    }

    /// Descends one level. Paging, search and sort belong to the list being
    /// left behind, so they reset.
    pub fn add_step(&mut self, step: impl Into<Step>) {
        self.steps.push(step.into());
        self.clear_list_position();
    }

    /// Finishes a multi-select list by handing the picked case ids over.
    pub fn add_selections(&mut self, case_ids: Vec<String>) {
        self.selected_values = Some(case_ids);
        self.add_step(USE_SELECTED_VALUES);
    }

    pub fn set_page(&mut self, page: u32) {
        self.page = Some(page);
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.search = if text.trim().is_empty() {
            None
        } else {
            Some(text)
        };
    }

    pub fn set_query(&mut self, query: QueryData) {
        self.query = Some(query);
    }

    pub fn set_sort_index(&mut self, sort_index: i32) {
        self.sort_index = Some(sort_index);
    }

    pub fn set_cases_per_page(&mut self, cases_per_page: u32) {
        self.cases_per_page = Some(cases_per_page);
        self.page = None;
    }

    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.session_id = Some(session_id.into());
    }

    /// Keeps exactly the first `keep` steps.
    pub fn splice_steps(&mut self, keep: usize) {
        self.steps.truncate(keep);
        self.clear_list_position();
        self.query = None;
        self.session_id = None;
        self.selected_values = None;
    }

    /// Back to the application root. The install reference is an entry
    /// point in its own right and survives alongside the app id.
    pub fn clear_except_app(&mut self) {
        let app_id = self.app_id.take();
        let install_reference = self.install_reference.take();
        *self = Self {
            app_id,
            install_reference,
            ..Self::default()
        };
    }

    pub fn clear_app(&mut self) {
        *self = Self::default();
    }

    #[must_use]
    pub fn selections(&self) -> Vec<String> {
        self.steps.iter().map(Step::as_selection).collect()
    }

    /// Zero-based offset of the first row on the current page.
    #[must_use]
    pub fn offset(&self, default_cases_per_page: u32) -> u32 {
        let per_page = self.cases_per_page.unwrap_or(default_cases_per_page);
        self.page.unwrap_or(0).saturating_mul(per_page)
    }

    fn clear_list_position(&mut self) {
        self.page = None;
        self.search = None;
        self.sort_index = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_steps() -> NavigationState {
        let mut state = NavigationState::for_app("app-1");
        for i in [10, 20, 30, 40] {
            state.add_step(i);
        }
        state
    }

    #[test]
    fn test_empty_state_encodes_to_empty_object() {
        let fragment = NavigationState::default().to_fragment();
        assert_eq!(fragment, "%7B%7D");
        assert_eq!(NavigationState::from_fragment(&fragment), NavigationState::default());
    }

    #[test]
    fn test_fragment_round_trip() {
        let mut state = four_steps();
        state.add_step("case-abc");
        state.set_page(3);
        state.set_search("maria");
        state.set_sort_index(-2);
        state.set_query(QueryData::execute(BTreeMap::from([(
            "name".to_string(),
            "#,#ann".to_string(),
        )])));
        state.set_session_id("sess/42&x");

        let fragment = state.to_fragment();
        assert_eq!(NavigationState::try_from_fragment(&fragment), Ok(state));
    }

    #[test]
    fn test_install_reference_round_trip() {
        let mut state = NavigationState::for_install_reference("ref 9/ä");
        state.add_step(1);
        assert!(state.has_entry_point());

        let fragment = state.to_fragment();
        let decoded = NavigationState::try_from_fragment(&fragment);
        assert_eq!(decoded.as_ref().map(|s| s.app_id.clone()), Ok(None));
        assert_eq!(decoded, Ok(state));
    }

    #[test]
    fn test_fragment_accepts_hash_prefix_and_percent_escapes() {
        let state = NavigationState::from_fragment("#%7B%22a%22%3A%22x%22%2C%22s%22%3A%5B1%2C%22c%22%5D%7D");
        assert_eq!(state.app_id.as_deref(), Some("x"));
        assert_eq!(state.steps, vec![Step::Index(1), Step::Value("c".into())]);
    }

    #[test]
    fn test_string_step_that_looks_numeric_stays_a_string() {
        let mut state = NavigationState::for_app("a");
        state.add_step("10");
        let decoded = NavigationState::from_fragment(&state.to_fragment());
        assert_eq!(decoded.steps, vec![Step::Value("10".into())]);
    }

    #[test]
    fn test_malformed_fragment_yields_empty_state() {
        assert_eq!(NavigationState::from_fragment("not-json"), NavigationState::default());
        assert_eq!(NavigationState::from_fragment("a=b&c=d"), NavigationState::default());
        assert_eq!(NavigationState::from_fragment(""), NavigationState::default());
    }

    #[test]
    fn test_strict_decode_reports_reason() {
        assert_eq!(NavigationState::try_from_fragment("  "), Err(FragmentError::Empty));
        assert_eq!(
            NavigationState::try_from_fragment("a=b"),
            Err(FragmentError::Malformed)
        );
        assert!(matches!(
            NavigationState::try_from_fragment("%7Bnope"),
            Err(FragmentError::Json(_))
        ));
    }

    #[test]
    fn test_splice_steps_keeps_prefix() {
        let mut state = four_steps();
        state.set_page(2);
        state.set_search("x");
        state.set_session_id("sess");

        state.splice_steps(2);

        assert_eq!(state.steps, vec![Step::Index(10), Step::Index(20)]);
        assert_eq!(state.page, None);
        assert_eq!(state.search, None);
        assert_eq!(state.session_id, None);
        assert_eq!(state.app_id.as_deref(), Some("app-1"));
    }

    #[test]
    fn test_splice_beyond_length_is_noop_for_steps() {
        let mut state = four_steps();
        state.splice_steps(10);
        assert_eq!(state.steps.len(), 4);
    }

    #[test]
    fn test_clear_except_app() {
        let mut state = four_steps();
        state.set_page(1);
        state.set_search("x");
        state.set_query(QueryData::default());
        state.set_cases_per_page(25);
        state.set_session_id("s-1");

        state.clear_except_app();

        assert_eq!(state, NavigationState::for_app("app-1"));
    }

    #[test]
    fn test_clear_keeps_install_reference() {
        let mut state = NavigationState::for_install_reference("ref-9");
        state.add_step(2);
        state.clear_except_app();
        assert_eq!(state, NavigationState::for_install_reference("ref-9"));
        assert!(state.has_entry_point());
    }

    #[test]
    fn test_clear_app_clears_everything() {
        let mut state = four_steps();
        state.set_search("x");
        state.clear_app();
        assert_eq!(state, NavigationState::default());
    }

    #[test]
    fn test_add_step_resets_list_position_but_keeps_query() {
        let mut state = four_steps();
        state.set_query(QueryData::execute(BTreeMap::new()));
        state.set_page(4);
        state.set_search("abc");
        state.set_sort_index(3);

        state.add_step("case-1");

        assert_eq!(state.page, None);
        assert_eq!(state.search, None);
        assert_eq!(state.sort_index, None);
        assert!(state.query.is_some());
    }

    #[test]
    fn test_blank_search_clears() {
        let mut state = NavigationState::for_app("a");
        state.set_search("abc");
        state.set_search("   ");
        assert_eq!(state.search, None);
    }

    #[test]
    fn test_add_selections_appends_marker() {
        let mut state = NavigationState::for_app("a");
        state.add_step(0);
        state.add_selections(vec!["c1".into(), "c2".into()]);
        assert_eq!(state.selections(), vec!["0", USE_SELECTED_VALUES]);
        assert_eq!(state.selected_values, Some(vec!["c1".into(), "c2".into()]));
    }

    #[test]
    fn test_offset_uses_page_size() {
        let mut state = NavigationState::for_app("a");
        assert_eq!(state.offset(10), 0);
        state.set_page(3);
        assert_eq!(state.offset(10), 30);
        state.set_cases_per_page(25);
        state.set_page(2);
        assert_eq!(state.offset(10), 50);
    }

    #[test]
    fn test_action_step_label() {
        assert_eq!(Step::action(2).as_selection(), "action 2");
    }
}
