use serde::{Deserialize, Serialize};

use crate::capabilities::kv::KvError;
use crate::config::SessionConfig;
use crate::query::FieldInput;
use crate::restore::{Channel, RequestTicket};

/// Status and body of a finished HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawReply {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn from_http(result: crux_http::Result<crux_http::Response<Vec<u8>>>) -> Result<Self, String> {
        match result {
            Ok(mut response) => Ok(Self {
                status: response.status().into(),
                body: response.take_body().unwrap_or_default(),
            }),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Noop,

    Configure(SessionConfig),
    RouteChanged {
        path: String,
    },

    AppSelected {
        app_id: String,
    },
    CommandSelected {
        index: u32,
    },
    EntitySelected {
        case_id: String,
    },
    CaseListActionSelected {
        index: u32,
    },
    BreadcrumbSelected {
        index: usize,
    },
    HomeSelected,

    PageSelected {
        page: u32,
    },
    GoToPageEntered {
        text: String,
    },
    CasesPerPageChanged {
        cases_per_page: u32,
    },
    SortColumnSelected {
        column: u32,
    },
    SearchSubmitted {
        text: String,
    },

    QueryFieldChanged {
        field_id: String,
        input: FieldInput,
    },
    QuerySubmitted,
    QueryCleared,

    EntityDetailRequested {
        case_id: String,
    },
    DetailTabSelected {
        index: usize,
    },
    DetailClosed,

    CasesSelected {
        case_ids: Vec<String>,
    },
    CasesDeselected {
        case_ids: Vec<String>,
    },
    PageSelectionToggled {
        selected: bool,
    },
    MultiSelectContinued,

    FormCompleted {
        message: Option<String>,
    },
    SyncRequested,
    NotificationDismissed,

    SessionReplied {
        channel: Channel,
        ticket: RequestTicket,
        reply: Result<RawReply, String>,
    },
    RetryTimerFired {
        channel: Channel,
        ticket: RequestTicket,
    },
    StickyValuesLoaded {
        key: String,
        result: Result<Option<Vec<u8>>, KvError>,
    },
    CasesPerPageLoaded {
        result: Result<Option<Vec<u8>>, KvError>,
    },
}

impl Event {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Configure(_) => "configure",
            Self::RouteChanged { .. } => "route_changed",
            Self::AppSelected { .. } => "app_selected",
            Self::CommandSelected { .. } => "command_selected",
            Self::EntitySelected { .. } => "entity_selected",
            Self::CaseListActionSelected { .. } => "case_list_action_selected",
            Self::BreadcrumbSelected { .. } => "breadcrumb_selected",
            Self::HomeSelected => "home_selected",
            Self::PageSelected { .. } => "page_selected",
            Self::GoToPageEntered { .. } => "go_to_page_entered",
            Self::CasesPerPageChanged { .. } => "cases_per_page_changed",
            Self::SortColumnSelected { .. } => "sort_column_selected",
            Self::SearchSubmitted { .. } => "search_submitted",
            Self::QueryFieldChanged { .. } => "query_field_changed",
            Self::QuerySubmitted => "query_submitted",
            Self::QueryCleared => "query_cleared",
            Self::EntityDetailRequested { .. } => "entity_detail_requested",
            Self::DetailTabSelected { .. } => "detail_tab_selected",
            Self::DetailClosed => "detail_closed",
            Self::CasesSelected { .. } => "cases_selected",
            Self::CasesDeselected { .. } => "cases_deselected",
            Self::PageSelectionToggled { .. } => "page_selection_toggled",
            Self::MultiSelectContinued => "multi_select_continued",
            Self::FormCompleted { .. } => "form_completed",
            Self::SyncRequested => "sync_requested",
            Self::NotificationDismissed => "notification_dismissed",
            Self::SessionReplied { .. } => "session_replied",
            Self::RetryTimerFired { .. } => "retry_timer_fired",
            Self::StickyValuesLoaded { .. } => "sticky_values_loaded",
            Self::CasesPerPageLoaded { .. } => "cases_per_page_loaded",
        }
    }

    #[must_use]
    pub const fn is_user_initiated(&self) -> bool {
        !matches!(
            self,
            Self::Noop
                | Self::Configure(_)
                | Self::RouteChanged { .. }
                | Self::SessionReplied { .. }
                | Self::RetryTimerFired { .. }
                | Self::StickyValuesLoaded { .. }
                | Self::CasesPerPageLoaded { .. }
        )
    }

    /// Events that move the user somewhere new and therefore need a
    /// configured core.
    #[must_use]
    pub const fn navigates(&self) -> bool {
        matches!(
            self,
            Self::RouteChanged { .. }
                | Self::AppSelected { .. }
                | Self::CommandSelected { .. }
                | Self::EntitySelected { .. }
                | Self::CaseListActionSelected { .. }
                | Self::BreadcrumbSelected { .. }
                | Self::HomeSelected
                | Self::PageSelected { .. }
                | Self::GoToPageEntered { .. }
                | Self::CasesPerPageChanged { .. }
                | Self::SortColumnSelected { .. }
                | Self::SearchSubmitted { .. }
                | Self::QuerySubmitted
                | Self::EntityDetailRequested { .. }
                | Self::MultiSelectContinued
                | Self::FormCompleted { .. }
                | Self::SyncRequested
        )
    }
}
