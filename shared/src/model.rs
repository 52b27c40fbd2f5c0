use std::collections::BTreeMap;

use crate::capabilities::http::{SessionRequest, ValidatedUrl};
use crate::config::SessionConfig;
use crate::navigation::NavigationState;
use crate::query::FieldInput;
use crate::response::{MenuResponse, Notification, QueryResponse};
use crate::restore::{Channel, RequestTicket, RestoreStatus, TicketIssuer};
use crate::route::Route;
use crate::view::{CaseDetail, MultiSelection};

/// What currently occupies the main region.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Screen {
    #[default]
    Blank,
    AppList,
    IncompleteSessions,
    LocalForm {
        path: String,
    },
    Loading,
    /// `depth` is the number of steps the response was fetched with.
    Menu {
        response: Box<MenuResponse>,
        depth: usize,
    },
}

impl Screen {
    #[must_use]
    pub fn menu(&self) -> Option<&MenuResponse> {
        match self {
            Self::Menu { response, .. } => Some(response),
            _ => None,
        }
    }

    #[must_use]
    pub fn query(&self) -> Option<&QueryResponse> {
        match self.menu() {
            Some(MenuResponse::Query(query)) => Some(query),
            _ => None,
        }
    }
}

/// One request lane: its lifecycle plus the request to repeat on retry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSlot {
    pub status: RestoreStatus,
    pub request: Option<SessionRequest>,
}

impl RequestSlot {
    pub fn start(&mut self, ticket: RequestTicket, request: SessionRequest) {
        self.status = RestoreStatus::start(ticket);
        self.request = Some(request);
    }

    pub fn cancel(&mut self) {
        self.status.cancel();
        self.request = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryForm {
    pub inputs: BTreeMap<String, FieldInput>,
    pub errors: BTreeMap<String, String>,
    /// Storage key of the sticky values for the screen on display.
    pub sticky_key: Option<String>,
}

#[derive(Debug, Default)]
pub struct Model {
    pub config: Option<SessionConfig>,
    pub base_url: Option<ValidatedUrl>,
    pub route: Route,
    pub navigation: NavigationState,
    pub tickets: TicketIssuer,
    pub menu: RequestSlot,
    pub detail_request: RequestSlot,
    pub sync: RequestSlot,
    pub screen: Screen,
    pub detail: Option<CaseDetail>,
    pub query_form: QueryForm,
    pub selection: MultiSelection,
    pub notification: Option<Notification>,
    pub preferred_cases_per_page: Option<u32>,
}

impl Model {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.config.is_some() && self.base_url.is_some()
    }

    #[must_use]
    pub fn slot(&self, channel: Channel) -> &RequestSlot {
        match channel {
            Channel::Menu => &self.menu,
            Channel::Detail => &self.detail_request,
            Channel::Sync => &self.sync,
        }
    }

    pub fn slot_mut(&mut self, channel: Channel) -> &mut RequestSlot {
        match channel {
            Channel::Menu => &mut self.menu,
            Channel::Detail => &mut self.detail_request,
            Channel::Sync => &mut self.sync,
        }
    }

    #[must_use]
    pub fn cases_per_page(&self) -> u32 {
        self.navigation
            .cases_per_page
            .or(self.preferred_cases_per_page)
            .or_else(|| self.config.as_ref().map(|c| c.default_cases_per_page))
            .unwrap_or(crate::DEFAULT_CASES_PER_PAGE)
    }

    /// Drops everything tied to the screen being left.
    pub fn leave_screen(&mut self) {
        self.notification = None;
        self.detail = None;
        self.detail_request.cancel();
        self.query_form = QueryForm::default();
    }
}
