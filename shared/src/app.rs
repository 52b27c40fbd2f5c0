use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::capabilities::http::{send_session_request, SessionRequest};
use crate::capabilities::kv::{read_result, KeyNamespace, KvKey, TypedKvStore, CASES_PER_PAGE_KEY};
use crate::capabilities::Capabilities;
use crate::config::validate_cases_per_page;
use crate::event::{Event, RawReply};
use crate::model::{Model, QueryForm, Screen};
use crate::navigation::{NavigationState, QueryData, Step};
use crate::query::{encode_inputs, initial_inputs, missing_required, FieldInput};
use crate::response::{
    interpret_reply, EntitiesResponse, MenuResponse, Notification, NotificationKind, ReplyError,
    RetryNotice, SessionReply,
};
use crate::restore::{Channel, RequestTicket, RestoreProgress};
use crate::route::Route;
use crate::view::{go_to_page_number, project, CaseDetail, ViewModel};
use crate::{AppError, ErrorKind};

const FORM_SAVED_MESSAGE: &str = "Form successfully saved!";
const SYNC_DONE_MESSAGE: &str = "User data successfully synced.";
const NOTHING_SELECTED_MESSAGE: &str = "Please select at least one case.";

type StickyValues = BTreeMap<String, String>;

#[derive(Default)]
pub struct App;

impl App {
    fn show_error(model: &mut Model, error: &AppError) {
        model.notification = Some(Notification::from_error(error));
    }

    fn current_entities(model: &Model) -> Option<&EntitiesResponse> {
        match model.screen.menu() {
            Some(MenuResponse::Entities(entities)) => Some(entities),
            _ => None,
        }
    }

    fn sticky_store() -> TypedKvStore<StickyValues> {
        TypedKvStore::new(KeyNamespace::Sticky)
    }

    fn settings_store() -> TypedKvStore<u32> {
        TypedKvStore::new(KeyNamespace::Settings)
    }

    /// Fires `request` on `channel` under a fresh ticket. Whatever that
    /// channel had in flight is superseded.
    fn start_request(model: &mut Model, caps: &Capabilities, channel: Channel, request: SessionRequest) {
        let ticket = model.tickets.next_ticket();
        info!(
            %ticket,
            ?channel,
            endpoint = request.endpoint.path(),
            "starting session request"
        );
        model.slot_mut(channel).start(ticket, request.clone());
        Self::send(model, caps, channel, ticket, &request);
    }

    fn send(
        model: &mut Model,
        caps: &Capabilities,
        channel: Channel,
        ticket: RequestTicket,
        request: &SessionRequest,
    ) {
        let Some(base) = model.base_url.as_ref() else {
            warn!(%ticket, "no Formplayer URL; dropping request");
            return;
        };

        if let Err(e) = send_session_request(&caps.http, base, request, channel, ticket) {
            let error = AppError::from(e);
            warn!(%ticket, error = %error, "session request not sent");
            if model.slot_mut(channel).status.on_failure(ticket, error.clone()).is_ok() {
                Self::show_error(model, &error);
            }
        }
    }

    fn navigate_request(model: &Model) -> Option<SessionRequest> {
        let config = model
            .config
            .clone()?
            .with_cases_per_page(model.cases_per_page());
        Some(SessionRequest::navigate(&model.navigation, &config))
    }

    /// Loads the menu for the current navigation state.
    fn select_menu(model: &mut Model, caps: &Capabilities) {
        if !model.navigation.has_entry_point() {
            Self::show_app_list(model);
            return;
        }

        model.leave_screen();
        if model.screen.menu().is_none() {
            model.screen = Screen::Loading;
        }

        if let Some(request) = Self::navigate_request(model) {
            Self::start_request(model, caps, Channel::Menu, request);
        }
    }

    /// Records the new navigation state in browser history and loads it.
    fn commit(model: &mut Model, caps: &Capabilities) {
        let route = Route::from_state(&model.navigation);
        caps.history.push(route.to_path());
        model.route = route;
        Self::select_menu(model, caps);
    }

    /// Moves one level deeper. Any multi-select picks belong to the list
    /// being left.
    fn descend(model: &mut Model, caps: &Capabilities, step: Step) {
        debug!(step = %step, depth = model.navigation.steps.len(), "descending");
        model.selection.clear();
        model.navigation.add_step(step);
        Self::commit(model, caps);
    }

    fn show_app_list(model: &mut Model) {
        model.menu.cancel();
        model.leave_screen();
        model.selection.clear();
        model.navigation.clear_app();
        model.screen = Screen::AppList;
    }

    fn go_to_apps(model: &mut Model, caps: &Capabilities) {
        Self::show_app_list(model);
        model.route = Route::Apps;
        caps.history.push(model.route.to_path());
    }

    fn on_route_changed(model: &mut Model, caps: &Capabilities, path: &str) {
        let route = Route::parse(path);
        debug!(?route, "route changed");

        match &route {
            Route::Apps => Self::show_app_list(model),
            Route::Sessions => {
                Self::show_app_list(model);
                model.screen = Screen::IncompleteSessions;
            }
            Route::Local { path } => {
                Self::show_app_list(model);
                model.screen = Screen::LocalForm { path: path.clone() };
            }
            Route::SingleApp { app_id } => {
                model.selection.clear();
                model.navigation = NavigationState::for_app(app_id.clone());
                Self::select_menu(model, caps);
            }
            Route::Session { session_id } => {
                let Some(config) = model.config.as_ref() else {
                    return;
                };
                let request = SessionRequest::incomplete_form(session_id, config);
                model.navigation.clear_app();
                model.selection.clear();
                model.leave_screen();
                model.screen = Screen::Loading;
                Self::start_request(model, caps, Channel::Menu, request);
            }
            Route::Navigation { fragment } => {
                let state = NavigationState::from_fragment(fragment);
                let unchanged = state == model.navigation
                    && (model.menu.status.is_in_flight() || model.screen.menu().is_some());
                if unchanged {
                    debug!("route matches the state on display");
                } else if state.has_entry_point() {
                    if state.steps != model.navigation.steps {
                        model.selection.clear();
                    }
                    model.navigation = state;
                    Self::select_menu(model, caps);
                } else {
                    Self::show_app_list(model);
                }
            }
        }

        model.route = route;
    }

    fn on_session_replied(
        model: &mut Model,
        caps: &Capabilities,
        channel: Channel,
        ticket: RequestTicket,
        reply: Result<RawReply, String>,
    ) -> bool {
        if !model.slot(channel).status.is_current(ticket) {
            debug!(
                %ticket,
                ?channel,
                current = ?model.slot(channel).status.ticket(),
                "discarding reply to a superseded request"
            );
            return false;
        }

        let outcome = reply
            .map_err(ReplyError::Transport)
            .and_then(|raw| interpret_reply(raw.status, &raw.body));

        match outcome {
            Ok(SessionReply::Retry(notice)) => Self::schedule_retry(model, caps, channel, ticket, &notice),
            Ok(SessionReply::Menu {
                response,
                notification,
            }) => {
                if let Err(e) = model.slot_mut(channel).status.on_success(ticket) {
                    warn!(%ticket, error = %e, "reply arrived in an unexpected state");
                    return true;
                }
                match channel {
                    Channel::Menu => Self::show_menu(model, caps, *response, notification),
                    Channel::Detail => Self::show_detail(model, *response),
                    Channel::Sync => Self::show_sync_done(model, notification),
                }
            }
            Ok(SessionReply::Completed { notification }) => {
                if let Err(e) = model.slot_mut(channel).status.on_success(ticket) {
                    warn!(%ticket, error = %e, "reply arrived in an unexpected state");
                    return true;
                }
                match channel {
                    Channel::Sync => Self::show_sync_done(model, notification),
                    Channel::Menu | Channel::Detail => {
                        if notification.is_some() {
                            model.notification = notification;
                        }
                    }
                }
            }
            Err(e) => {
                let error = AppError::from(e);
                warn!(%ticket, ?channel, error = %error, "session request failed");
                if model.slot_mut(channel).status.on_failure(ticket, error.clone()).is_ok() {
                    Self::show_error(model, &error);
                }
            }
        }
        true
    }

    fn schedule_retry(
        model: &mut Model,
        caps: &Capabilities,
        channel: Channel,
        ticket: RequestTicket,
        notice: &RetryNotice,
    ) {
        let policy = model.config.as_ref().map(|c| c.retry).unwrap_or_default();
        let progress = RestoreProgress {
            done: notice.done,
            total: notice.total,
        };

        match model
            .slot_mut(channel)
            .status
            .on_retry(ticket, notice.retry_after_secs, progress, &policy)
        {
            Ok(delay) => {
                info!(
                    %ticket,
                    ?channel,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    done = progress.done,
                    total = progress.total,
                    "restore in progress, retrying later"
                );
                caps.timer
                    .notify_after(delay, Event::RetryTimerFired { channel, ticket });
            }
            Err(e) => {
                warn!(%ticket, ?channel, error = %e, "not retrying");
                Self::show_error(model, &AppError::from(e));
            }
        }
    }

    fn on_retry_timer(model: &mut Model, caps: &Capabilities, channel: Channel, ticket: RequestTicket) -> bool {
        let slot = model.slot_mut(channel);
        match slot.status.on_timer_fired(ticket) {
            Ok(attempt) => {
                let Some(request) = slot.request.as_ref().map(SessionRequest::for_retry) else {
                    warn!(%ticket, "retry fired without a request to repeat");
                    return true;
                };
                info!(%ticket, ?channel, attempt, "retrying session request");
                Self::send(model, caps, channel, ticket, &request);
                true
            }
            Err(e) if e.is_stale() => {
                debug!(%ticket, ?channel, "ignoring retry timer of a superseded request");
                false
            }
            Err(e) => {
                warn!(%ticket, ?channel, error = %e, "unexpected retry timer");
                false
            }
        }
    }

    fn show_menu(
        model: &mut Model,
        caps: &Capabilities,
        response: MenuResponse,
        notification: Option<Notification>,
    ) {
        info!(response = response.type_name(), "menu loaded");

        match &response {
            MenuResponse::Form(form) => {
                model.navigation.set_session_id(form.session_id.clone());
                let route = Route::from_state(&model.navigation);
                caps.history.replace(route.to_path());
                model.route = route;
            }
            MenuResponse::Query(query) => {
                let current = model.navigation.query.as_ref().map(|q| &q.inputs);
                model.query_form = QueryForm {
                    inputs: initial_inputs(&query.displays, current),
                    ..QueryForm::default()
                };
                if let (Some(app_id), Some(query_key)) =
                    (model.navigation.app_id.as_deref(), query.query_key.as_deref())
                {
                    match KvKey::sticky(app_id, query_key) {
                        Ok(key) => {
                            let raw = key.raw();
                            model.query_form.sticky_key = Some(raw.clone());
                            if current.is_none() {
                                caps.key_value.get(raw.clone(), move |result| {
                                    Event::StickyValuesLoaded {
                                        key: raw,
                                        result: read_result(result),
                                    }
                                });
                            }
                        }
                        Err(e) => debug!(error = %e, "no sticky values for this search"),
                    }
                }
            }
            MenuResponse::Details(details) => {
                let case_id = model.navigation.selections().pop().unwrap_or_default();
                let detail = CaseDetail::new(case_id, details.details.clone());
                if model.screen.menu().is_none() {
                    debug!("case details with no list behind them, loading the parent list");
                    let parent = model.navigation.steps.len().saturating_sub(1);
                    model.navigation.splice_steps(parent);
                    let route = Route::from_state(&model.navigation);
                    caps.history.replace(route.to_path());
                    model.route = route;
                    Self::select_menu(model, caps);
                }
                model.detail = Some(detail);
                model.notification = notification;
                return;
            }
            MenuResponse::Commands(_) | MenuResponse::Entities(_) => {}
        }

        model.screen = Screen::Menu {
            response: Box::new(response),
            depth: model.navigation.steps.len(),
        };
        model.notification = notification;
    }

    fn show_detail(model: &mut Model, response: MenuResponse) {
        let MenuResponse::Details(details) = response else {
            warn!(response = response.type_name(), "expected case details");
            let error = AppError::new(ErrorKind::Deserialization, "Could not load case details");
            Self::show_error(model, &error);
            return;
        };
        let case_id = model
            .detail_request
            .request
            .as_ref()
            .and_then(|r| r.body.selections.last().cloned())
            .unwrap_or_default();
        model.detail = Some(CaseDetail::new(case_id, details.details));
    }

    fn show_sync_done(model: &mut Model, notification: Option<Notification>) {
        info!("sync finished");
        model.notification = Some(
            notification.unwrap_or_else(|| Notification::new(SYNC_DONE_MESSAGE, NotificationKind::Success)),
        );
    }

    fn on_sort_column(model: &mut Model, caps: &Capabilities, column: u32) {
        let index = i32::try_from(column).unwrap_or(i32::MAX - 1).saturating_add(1);
        let next = if model.navigation.sort_index == Some(index) {
            -index
        } else {
            index
        };
        model.navigation.set_sort_index(next);
        model.navigation.page = None;
        Self::commit(model, caps);
    }

    fn on_cases_per_page(model: &mut Model, caps: &Capabilities, cases_per_page: u32) {
        let cases_per_page = match validate_cases_per_page(cases_per_page) {
            Ok(n) => n,
            Err(e) => {
                Self::show_error(model, &AppError::from(e));
                return;
            }
        };
        model.navigation.set_cases_per_page(cases_per_page);
        model.preferred_cases_per_page = Some(cases_per_page);

        let store = Self::settings_store();
        match store
            .key(CASES_PER_PAGE_KEY)
            .and_then(|key| Ok((key, store.encode(&cases_per_page)?)))
        {
            Ok((key, bytes)) => caps.key_value.set(key.raw(), bytes, |_| Event::Noop),
            Err(e) => warn!(error = %e, "cases per page not saved"),
        }

        Self::commit(model, caps);
    }

    fn on_query_submitted(model: &mut Model, caps: &Capabilities) {
        let Some(query) = model.screen.query() else {
            debug!("no search form on display");
            return;
        };

        let errors = missing_required(&query.displays, &model.query_form.inputs);
        if !errors.is_empty() {
            debug!(missing = errors.len(), "search form incomplete");
            model.query_form.errors = errors;
            return;
        }

        let inputs = match encode_inputs(&query.displays, &model.query_form.inputs) {
            Ok(inputs) => inputs,
            Err(e) => {
                Self::show_error(model, &AppError::from(e));
                return;
            }
        };

        if let Some(key) = model.query_form.sticky_key.clone() {
            match Self::sticky_store().encode(&inputs) {
                Ok(bytes) => caps.key_value.set(key, bytes, |_| Event::Noop),
                Err(e) => warn!(error = %e, "sticky values not saved"),
            }
        }

        model.navigation.set_query(QueryData::execute(inputs));
        model.navigation.page = None;
        Self::commit(model, caps);
    }

    fn on_query_cleared(model: &mut Model) {
        let Some(query) = model.screen.query() else {
            return;
        };
        model.query_form.inputs = query
            .displays
            .iter()
            .map(|d| (d.id.clone(), FieldInput::default()))
            .collect();
        model.query_form.errors.clear();
    }

    fn on_sticky_values(model: &mut Model, key: &str, data: Option<&[u8]>) {
        if model.query_form.sticky_key.as_deref() != Some(key) {
            debug!(key, "sticky values arrived for a search no longer shown");
            return;
        }
        let values = match Self::sticky_store().decode(data) {
            Ok(Some(values)) => values,
            Ok(None) => return,
            Err(e) => {
                warn!(key, error = %e, "ignoring unreadable sticky values");
                return;
            }
        };
        if let Some(query) = model.screen.query() {
            model.query_form.inputs = initial_inputs(&query.displays, Some(&values));
        }
    }

    fn on_detail_requested(model: &mut Model, caps: &Capabilities, case_id: String) {
        let inline = Self::current_entities(model)
            .and_then(|entities| entities.entity(&case_id))
            .and_then(|entity| entity.details.clone());

        if let Some(tabs) = inline {
            model.detail_request.cancel();
            model.detail = Some(CaseDetail::new(case_id, tabs));
            return;
        }

        let Some(config) = model.config.as_ref() else {
            return;
        };
        let request = SessionRequest::details(&model.navigation, &case_id, config);
        model.detail = None;
        Self::start_request(model, caps, Channel::Detail, request);
    }

    fn on_multi_select_continued(model: &mut Model, caps: &Capabilities) {
        let max_select_value = Self::current_entities(model).and_then(|e| e.max_select_value);

        if model.selection.is_empty() {
            let error = AppError::new(ErrorKind::Validation, NOTHING_SELECTED_MESSAGE);
            Self::show_error(model, &error);
            return;
        }
        if model.selection.over_limit(max_select_value) {
            let max = max_select_value.unwrap_or_default();
            let error = AppError::new(
                ErrorKind::Validation,
                format!("Too many cases selected. Please select at most {max}."),
            );
            Self::show_error(model, &error);
            return;
        }

        let case_ids = model.selection.ids().to_vec();
        info!(selected = case_ids.len(), "continuing with selected cases");
        model.selection.clear();
        model.navigation.add_selections(case_ids);
        Self::commit(model, caps);
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Event, model: &mut Model, caps: &Capabilities) {
        let event_name = event.name();
        if event.is_user_initiated() {
            debug!(event = event_name, "user action");
        }

        if event.navigates() && !model.is_configured() {
            warn!(event = event_name, "ignoring navigation before configuration");
            let error = AppError::new(ErrorKind::InvalidState, "Formplayer is not configured")
                .with_context("event", event_name);
            Self::show_error(model, &error);
            caps.render.render();
            return;
        }

        match event {
            Event::Noop => return,

            Event::Configure(config) => match config.validate() {
                Ok(base_url) => {
                    info!(url = base_url.as_str(), domain = %config.domain, "configured");
                    model.base_url = Some(base_url);
                    model.config = Some(config);
                    if model.screen == Screen::Blank {
                        model.screen = Screen::AppList;
                    }

                    match Self::settings_store().key(CASES_PER_PAGE_KEY) {
                        Ok(key) => caps.key_value.get(key.raw(), |result| Event::CasesPerPageLoaded {
                            result: read_result(result),
                        }),
                        Err(e) => warn!(error = %e, "cannot load saved cases per page"),
                    }
                }
                Err(e) => {
                    let error = AppError::from(e);
                    warn!(error = %error, "rejected configuration");
                    model.config = None;
                    model.base_url = None;
                    Self::show_error(model, &error);
                }
            },

            Event::RouteChanged { path } => Self::on_route_changed(model, caps, &path),

            Event::AppSelected { app_id } => {
                model.selection.clear();
                model.navigation = NavigationState::for_app(app_id);
                Self::commit(model, caps);
            }

            Event::CommandSelected { index } => Self::descend(model, caps, Step::from(index)),

            Event::EntitySelected { case_id } => Self::descend(model, caps, Step::from(case_id)),

            Event::CaseListActionSelected { index } => Self::descend(model, caps, Step::action(index)),

            Event::BreadcrumbSelected { index } => {
                if index >= model.navigation.steps.len() {
                    debug!(index, "breadcrumb out of range");
                    return;
                }
                model.selection.clear();
                model.navigation.splice_steps(index + 1);
                Self::commit(model, caps);
            }

            Event::HomeSelected => {
                if model.navigation.has_entry_point() {
                    model.selection.clear();
                    model.navigation.clear_except_app();
                    Self::commit(model, caps);
                } else {
                    Self::go_to_apps(model, caps);
                }
            }

            Event::PageSelected { page } => {
                model.navigation.set_page(page);
                Self::commit(model, caps);
            }

            Event::GoToPageEntered { text } => {
                let page_count = Self::current_entities(model).map_or(1, |e| e.page_count);
                let page = go_to_page_number(&text, page_count) - 1;
                model.navigation.set_page(page);
                Self::commit(model, caps);
            }

            Event::CasesPerPageChanged { cases_per_page } => {
                Self::on_cases_per_page(model, caps, cases_per_page);
            }

            Event::SortColumnSelected { column } => Self::on_sort_column(model, caps, column),

            Event::SearchSubmitted { text } => {
                model.navigation.set_search(text);
                model.navigation.page = None;
                Self::commit(model, caps);
            }

            Event::QueryFieldChanged { field_id, input } => {
                model.query_form.errors.remove(&field_id);
                model.query_form.inputs.insert(field_id, input);
            }

            Event::QuerySubmitted => Self::on_query_submitted(model, caps),

            Event::QueryCleared => Self::on_query_cleared(model),

            Event::EntityDetailRequested { case_id } => Self::on_detail_requested(model, caps, case_id),

            Event::DetailTabSelected { index } => {
                if let Some(detail) = model.detail.as_mut() {
                    if !detail.select_tab(index) {
                        debug!(index, "no such detail tab");
                    }
                }
            }

            Event::DetailClosed => {
                model.detail = None;
                model.detail_request.cancel();
            }

            Event::CasesSelected { case_ids } => model.selection.add(case_ids),

            Event::CasesDeselected { case_ids } => model.selection.remove(&case_ids),

            Event::PageSelectionToggled { selected } => {
                let ids: Vec<String> = Self::current_entities(model)
                    .map(|e| e.entities.iter().map(|entity| entity.id.clone()).collect())
                    .unwrap_or_default();
                if selected {
                    model.selection.add(ids);
                } else {
                    model.selection.remove(&ids);
                }
            }

            Event::MultiSelectContinued => Self::on_multi_select_continued(model, caps),

            Event::FormCompleted { message } => {
                info!(session_id = ?model.navigation.session_id, "form completed");
                model.selection.clear();
                if model.navigation.has_entry_point() {
                    model.navigation.clear_except_app();
                    Self::commit(model, caps);
                } else {
                    Self::go_to_apps(model, caps);
                }
                let message = message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| FORM_SAVED_MESSAGE.to_string());
                model.notification = Some(Notification::new(message, NotificationKind::Success));
            }

            Event::SyncRequested => {
                if model.sync.status.is_in_flight() {
                    debug!("sync already running");
                    return;
                }
                let Some(config) = model.config.as_ref() else {
                    return;
                };
                let request = SessionRequest::sync(model.navigation.app_id.as_deref(), config);
                Self::start_request(model, caps, Channel::Sync, request);
            }

            Event::NotificationDismissed => model.notification = None,

            Event::SessionReplied {
                channel,
                ticket,
                reply,
            } => {
                if !Self::on_session_replied(model, caps, channel, ticket, reply) {
                    return;
                }
            }

            Event::RetryTimerFired { channel, ticket } => {
                if !Self::on_retry_timer(model, caps, channel, ticket) {
                    return;
                }
            }

            Event::StickyValuesLoaded { key, result } => match result {
                Ok(data) => Self::on_sticky_values(model, &key, data.as_deref()),
                Err(e) => warn!(key = %key, error = %e, "sticky values unavailable"),
            },

            Event::CasesPerPageLoaded { result } => {
                let loaded = result.and_then(|data| Self::settings_store().decode(data.as_deref()));
                match loaded {
                    Ok(Some(n)) => match validate_cases_per_page(n) {
                        Ok(n) => model.preferred_cases_per_page = Some(n),
                        Err(e) => warn!(error = %e, "ignoring saved cases per page"),
                    },
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "saved cases per page unavailable"),
                }
            }
        }

        caps.render.render();
    }

    fn view(&self, model: &Model) -> ViewModel {
        project(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::capabilities::{Effect, HistoryOperation, TimerOperation};
    use crate::config::SessionConfig;
    use crate::restore::RetryPolicy;
    use crate::view::ViewState;
    use crux_core::testing::AppTester;
    use crux_http::protocol::HttpRequest;

    const BASE: &str = "https://fp.example.org/formplayer";

    fn config() -> SessionConfig {
        SessionConfig::new(BASE, "demo", "nurse@demo")
    }

    fn configured() -> (AppTester<App, Effect>, Model) {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        app.update(Event::Configure(config()), &mut model);
        (app, model)
    }

    fn http_requests(effects: Vec<Effect>) -> Vec<HttpRequest> {
        effects
            .into_iter()
            .filter_map(|effect| match effect {
                Effect::Http(request) => Some(request.operation),
                _ => None,
            })
            .collect()
    }

    fn history(effects: &[Effect]) -> Vec<HistoryOperation> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::History(request) => Some(request.operation.clone()),
                _ => None,
            })
            .collect()
    }

    fn body(request: &HttpRequest) -> serde_json::Value {
        serde_json::from_slice(&request.body).unwrap()
    }

    fn reply(ticket: RequestTicket, status: u16, json: &str) -> Event {
        Event::SessionReplied {
            channel: Channel::Menu,
            ticket,
            reply: Ok(RawReply::new(status, json.as_bytes().to_vec())),
        }
    }

    fn current_ticket(model: &Model) -> RequestTicket {
        model.menu.status.ticket().unwrap()
    }

    const ENTITIES: &str = r#"{"type": "entities", "breadcrumbs": ["App", "Cases"],
        "headers": ["Name"], "pageCount": 3, "currentPage": 0, "multiSelect": true, "maxSelectValue": 2,
        "entities": [{"id": "c1", "data": ["Ann"]}, {"id": "c2", "data": ["Bo"]}, {"id": "c3", "data": ["Cy"]}]}"#;

    #[test]
    fn test_configure_rejects_bad_url() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        app.update(
            Event::Configure(SessionConfig::new("ftp://nope", "demo", "u")),
            &mut model,
        );
        assert!(!model.is_configured());
        assert_eq!(
            model.notification.as_ref().map(|n| n.kind),
            Some(NotificationKind::Error)
        );
    }

    #[test]
    fn test_app_selected_posts_navigate_menu() {
        let (app, mut model) = configured();
        let update = app.update(Event::AppSelected { app_id: "app-1".into() }, &mut model);

        let pushed = history(&update.effects);
        assert_eq!(pushed.len(), 1);

        let requests = http_requests(update.effects);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].url, format!("{BASE}/navigate_menu"));
        let body = body(&requests[0]);
        assert_eq!(body["appId"], "app-1");
        assert_eq!(body["selections"], serde_json::json!([]));
        assert_eq!(body["domain"], "demo");
        assert!(model.menu.status.is_in_flight());
    }

    #[test]
    fn test_sort_toggles_direction() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);

        app.update(Event::SortColumnSelected { column: 2 }, &mut model);
        assert_eq!(model.navigation.sort_index, Some(3));

        let update = app.update(Event::SortColumnSelected { column: 2 }, &mut model);
        assert_eq!(model.navigation.sort_index, Some(-3));
        assert_eq!(body(&http_requests(update.effects)[0])["sortIndex"], -3);

        app.update(Event::SortColumnSelected { column: 0 }, &mut model);
        assert_eq!(model.navigation.sort_index, Some(1));
    }

    #[test]
    fn test_search_resets_paging() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        app.update(Event::PageSelected { page: 2 }, &mut model);
        assert_eq!(model.navigation.page, Some(2));

        let update = app.update(Event::SearchSubmitted { text: "ann".into() }, &mut model);
        assert_eq!(model.navigation.page, None);
        let body = body(&http_requests(update.effects)[0]);
        assert_eq!(body["searchText"], "ann");
        assert_eq!(body["offset"], 0);
    }

    #[test]
    fn test_page_offset_uses_cases_per_page() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        app.update(Event::CasesPerPageChanged { cases_per_page: 25 }, &mut model);

        let update = app.update(Event::PageSelected { page: 2 }, &mut model);
        let body = body(&http_requests(update.effects)[0]);
        assert_eq!(body["casesPerPage"], 25);
        assert_eq!(body["offset"], 50);
    }

    #[test]
    fn test_invalid_cases_per_page() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        let update = app.update(Event::CasesPerPageChanged { cases_per_page: 0 }, &mut model);
        assert!(http_requests(update.effects).is_empty());
        assert_eq!(model.navigation.cases_per_page, None);
        assert!(model.notification.is_some());
    }

    #[test]
    fn test_go_to_page_is_clamped() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        let ticket = current_ticket(&model);
        app.update(reply(ticket, 200, ENTITIES), &mut model);

        app.update(Event::GoToPageEntered { text: "99".into() }, &mut model);
        assert_eq!(model.navigation.page, Some(2));
    }

    #[test]
    fn test_multi_select_respects_limit() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        let ticket = current_ticket(&model);
        app.update(reply(ticket, 200, ENTITIES), &mut model);

        let update = app.update(Event::MultiSelectContinued, &mut model);
        assert!(http_requests(update.effects).is_empty());
        assert_eq!(
            model.notification.as_ref().map(|n| n.message.as_str()),
            Some(NOTHING_SELECTED_MESSAGE)
        );

        app.update(Event::PageSelectionToggled { selected: true }, &mut model);
        assert_eq!(model.selection.len(), 3);
        let update = app.update(Event::MultiSelectContinued, &mut model);
        assert!(http_requests(update.effects).is_empty());

        app.update(Event::CasesDeselected { case_ids: vec!["c2".into()] }, &mut model);
        let update = app.update(Event::MultiSelectContinued, &mut model);
        let body = body(&http_requests(update.effects)[0]);
        assert_eq!(body["selectedValues"], serde_json::json!(["c1", "c3"]));
        assert_eq!(body["selections"], serde_json::json!(["use_selected_values"]));
        assert!(model.selection.is_empty());
    }

    #[test]
    fn test_form_reply_replaces_history_with_session() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        let ticket = current_ticket(&model);

        let update = app.update(
            reply(ticket, 200, r#"{"session_id": "s-9", "title": "Register", "tree": []}"#),
            &mut model,
        );
        assert_eq!(model.navigation.session_id.as_deref(), Some("s-9"));
        assert!(matches!(
            history(&update.effects).as_slice(),
            [HistoryOperation::Replace { .. }]
        ));
        assert!(matches!(app.view(&model).state, ViewState::FormEntry(_)));
    }

    #[test]
    fn test_form_completed_returns_to_app_root() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        app.update(Event::CommandSelected { index: 1 }, &mut model);

        let update = app.update(Event::FormCompleted { message: None }, &mut model);
        assert!(model.navigation.steps.is_empty());
        assert_eq!(model.navigation.app_id.as_deref(), Some("a"));
        assert_eq!(
            model.notification,
            Some(Notification::new(FORM_SAVED_MESSAGE, NotificationKind::Success))
        );
        assert_eq!(http_requests(update.effects).len(), 1);
    }

    #[test]
    fn test_query_submit_validates_required_fields() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        let ticket = current_ticket(&model);
        let update = app.update(
            reply(
                ticket,
                200,
                r#"{"type": "query", "queryKey": "search_m1",
                    "displays": [{"id": "name", "text": "Name", "required": true},
                                 {"id": "dob", "text": "DOB", "input": "date"}]}"#,
            ),
            &mut model,
        );
        assert!(update
            .effects
            .iter()
            .any(|e| matches!(e, Effect::KeyValue(_))));
        assert_eq!(model.query_form.sticky_key.as_deref(), Some("sticky:a:search_m1"));

        let update = app.update(Event::QuerySubmitted, &mut model);
        assert!(http_requests(update.effects).is_empty());
        assert!(model.query_form.errors.contains_key("name"));

        app.update(
            Event::QueryFieldChanged {
                field_id: "name".into(),
                input: FieldInput::text("ann"),
            },
            &mut model,
        );
        app.update(
            Event::QueryFieldChanged {
                field_id: "dob".into(),
                input: FieldInput::text("03/04/2020"),
            },
            &mut model,
        );
        let update = app.update(Event::QuerySubmitted, &mut model);
        let body = body(&http_requests(update.effects)[0]);
        assert_eq!(body["queryData"]["inputs"]["name"], "ann");
        assert_eq!(body["queryData"]["inputs"]["dob"], "2020-03-04");
        assert_eq!(body["queryData"]["execute"], true);
    }

    #[test]
    fn test_retry_timer_for_old_ticket_is_ignored() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        let old = current_ticket(&model);
        app.update(reply(old, 202, r#"{"status": "retry", "retryAfter": 1}"#), &mut model);
        app.update(Event::CommandSelected { index: 0 }, &mut model);

        let update = app.update(
            Event::RetryTimerFired {
                channel: Channel::Menu,
                ticket: old,
            },
            &mut model,
        );
        assert!(update.effects.is_empty());
    }

    #[test]
    fn test_inline_details_skip_the_server() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        let ticket = current_ticket(&model);
        app.update(
            reply(
                ticket,
                200,
                r#"{"type": "entities", "entities": [{"id": "c1", "data": ["Ann"],
                    "details": [{"title": "Info", "headers": ["Name"], "details": ["Ann"]}]}]}"#,
            ),
            &mut model,
        );

        let update = app.update(Event::EntityDetailRequested { case_id: "c1".into() }, &mut model);
        assert!(http_requests(update.effects).is_empty());
        assert_eq!(model.detail.as_ref().map(|d| d.case_id.as_str()), Some("c1"));
    }

    #[test]
    fn test_details_fetched_on_detail_channel() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        app.update(Event::CommandSelected { index: 0 }, &mut model);

        let update = app.update(Event::EntityDetailRequested { case_id: "c7".into() }, &mut model);
        let requests = http_requests(update.effects);
        assert_eq!(requests[0].url, format!("{BASE}/get_details"));
        assert_eq!(body(&requests[0])["selections"], serde_json::json!(["0", "c7"]));

        let ticket = model.detail_request.status.ticket().unwrap();
        app.update(
            Event::SessionReplied {
                channel: Channel::Detail,
                ticket,
                reply: Ok(RawReply::new(
                    200,
                    r#"{"details": [{"title": "Info", "headers": ["Name"], "details": ["Ann"]}]}"#,
                )),
            },
            &mut model,
        );
        assert_eq!(model.detail.as_ref().map(|d| d.case_id.as_str()), Some("c7"));
        assert!(model.menu.status.is_in_flight());

        app.update(Event::DetailClosed, &mut model);
        assert!(model.detail.is_none());
    }

    #[test]
    fn test_details_on_fresh_load_fetch_the_parent_list() {
        let (app, mut model) = configured();
        let mut target = NavigationState::for_app("a");
        target.add_step(0);
        target.add_step("c9");
        let path = Route::from_state(&target).to_path();
        app.update(Event::RouteChanged { path }, &mut model);
        assert_eq!(model.screen, Screen::Loading);

        let ticket = current_ticket(&model);
        let update = app.update(
            reply(
                ticket,
                200,
                r#"{"details": [{"title": "Info", "headers": ["Name"], "details": ["Ann"]}]}"#,
            ),
            &mut model,
        );
        assert_matches!(
            history(&update.effects).as_slice(),
            [HistoryOperation::Replace { .. }]
        );
        let requests = http_requests(update.effects);
        assert_eq!(requests.len(), 1);
        assert_eq!(body(&requests[0])["selections"], serde_json::json!(["0"]));
        assert_eq!(model.detail.as_ref().map(|d| d.case_id.as_str()), Some("c9"));

        let ticket = current_ticket(&model);
        app.update(reply(ticket, 200, ENTITIES), &mut model);
        let view = app.view(&model);
        assert!(matches!(view.state, ViewState::MultiSelectCaseList(_)));
        assert!(view.detail.is_some());
    }

    #[test]
    fn test_install_reference_alone_is_an_entry_point() {
        let (app, mut model) = configured();
        let path = Route::from_state(&NavigationState::for_install_reference("ref-1")).to_path();
        let update = app.update(Event::RouteChanged { path }, &mut model);

        let requests = http_requests(update.effects);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, format!("{BASE}/navigate_menu"));
        let body = body(&requests[0]);
        assert_eq!(body["installReference"], "ref-1");
        assert!(body.get("appId").is_none());
        assert_eq!(body["selections"], serde_json::json!([]));
    }

    #[test]
    fn test_retry_ceiling_from_config() {
        let app = AppTester::<App, Effect>::default();
        let mut model = Model::default();
        let config = config().with_retry(RetryPolicy::default().with_max_retries(0));
        app.update(Event::Configure(config), &mut model);
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);

        let ticket = current_ticket(&model);
        let update = app.update(reply(ticket, 202, r#"{"status": "retry", "retryAfter": 1}"#), &mut model);
        assert!(!update
            .effects
            .iter()
            .any(|effect| matches!(effect, Effect::Timer(_))));
        assert!(!model.menu.status.is_in_flight());
        assert_eq!(
            model.notification.as_ref().map(|n| n.kind),
            Some(NotificationKind::Error)
        );
    }

    #[test]
    fn test_sync_shows_success() {
        let (app, mut model) = configured();
        let update = app.update(Event::SyncRequested, &mut model);
        assert_eq!(http_requests(update.effects)[0].url, format!("{BASE}/sync-db"));

        let ticket = model.sync.status.ticket().unwrap();
        app.update(
            Event::SessionReplied {
                channel: Channel::Sync,
                ticket,
                reply: Ok(RawReply::new(200, r#"{"status": "success"}"#)),
            },
            &mut model,
        );
        assert_eq!(
            model.notification.as_ref().map(|n| n.kind),
            Some(NotificationKind::Success)
        );
        assert!(!app.view(&model).sync_in_progress);
    }

    #[test]
    fn test_transport_failure_shows_banner() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        let ticket = current_ticket(&model);
        app.update(
            Event::SessionReplied {
                channel: Channel::Menu,
                ticket,
                reply: Err("connection reset".into()),
            },
            &mut model,
        );
        assert!(!model.menu.status.is_in_flight());
        assert_eq!(
            model.notification.as_ref().map(|n| n.kind),
            Some(NotificationKind::Error)
        );
    }

    #[test]
    fn test_route_to_own_fragment_does_not_refetch() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        let path = model.route.to_path();
        let update = app.update(Event::RouteChanged { path }, &mut model);
        assert!(http_requests(update.effects).is_empty());
    }

    #[test]
    fn test_timer_effect_carries_server_delay() {
        let (app, mut model) = configured();
        app.update(Event::AppSelected { app_id: "a".into() }, &mut model);
        let ticket = current_ticket(&model);
        let update = app.update(reply(ticket, 202, r#"{"status": "retry", "retryAfter": 2.5}"#), &mut model);
        let timers: Vec<TimerOperation> = update
            .effects
            .into_iter()
            .filter_map(|e| match e {
                Effect::Timer(request) => Some(request.operation),
                _ => None,
            })
            .collect();
        assert_eq!(timers, vec![TimerOperation::NotifyAfter { millis: 2500 }]);
    }
}
