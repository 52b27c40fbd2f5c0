//! Projection of the model into what the shell draws.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatch::{select_view, MenuView};
use crate::model::{Model, QueryForm, Screen};
use crate::query::FieldInput;
use crate::response::{
    CommandsResponse, DetailTabPayload, EntitiesResponse, FormResponse, GroupHeader, InputKind,
    MenuResponse, Notification, NotificationKind, QueryResponse,
};
use crate::restore::RestoreProgress;
use crate::MAX_PAGES_SHOWN;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BreadcrumbItem {
    pub index: usize,
    pub text: String,
    pub is_current: bool,
}

/// Splits the server's labels into the app-home label and one crumb per step.
/// Formplayer sends the application name first, then a label per selection.
#[must_use]
pub fn breadcrumbs(labels: &[String], step_count: usize) -> (Option<String>, Vec<BreadcrumbItem>) {
    let offset = labels.len().saturating_sub(step_count);
    let home = offset.checked_sub(1).and_then(|i| labels.get(i)).cloned();
    let crumbs: Vec<BreadcrumbItem> = labels[offset..]
        .iter()
        .enumerate()
        .map(|(index, text)| BreadcrumbItem {
            index,
            text: text.clone(),
            is_current: false,
        })
        .collect();
    let last = crumbs.len().checked_sub(1);
    let crumbs = crumbs
        .into_iter()
        .map(|mut c| {
            c.is_current = Some(c.index) == last;
            c
        })
        .collect();
    (home, crumbs)
}

/// Page numbers (zero-based) to offer around `current_page`.
#[must_use]
pub fn paginate_options(current_page: u32, page_count: u32) -> Vec<u32> {
    if page_count == 0 {
        return Vec::new();
    }
    if page_count <= MAX_PAGES_SHOWN {
        return (0..page_count).collect();
    }

    let before = MAX_PAGES_SHOWN / 2;
    let after = MAX_PAGES_SHOWN.div_ceil(2) - 1;
    let current = current_page.min(page_count - 1) + 1;

    let (start, end) = if current <= before {
        (1, MAX_PAGES_SHOWN)
    } else if current + after >= page_count {
        (page_count - MAX_PAGES_SHOWN + 1, page_count)
    } else {
        (current - before, current + after)
    };
    (start - 1..end).collect()
}

/// One-based page the user asked for in the "go to page" box, clamped.
#[must_use]
pub fn go_to_page_number(text: &str, page_count: u32) -> u32 {
    let last = page_count.max(1);
    match text.trim().parse::<i64>() {
        Ok(n) if n < 1 => 1,
        Ok(n) => u32::try_from(n).map_or(last, |n| n.min(last)),
        Err(_) => 1,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSelection {
    ids: Vec<String>,
}

impl MultiSelection {
    pub fn add<I: IntoIterator<Item = String>>(&mut self, case_ids: I) {
        for id in case_ids {
            if !self.ids.contains(&id) {
                self.ids.push(id);
            }
        }
    }

    pub fn remove(&mut self, case_ids: &[String]) {
        self.ids.retain(|id| !case_ids.contains(id));
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    #[must_use]
    pub fn contains(&self, case_id: &str) -> bool {
        self.ids.iter().any(|id| id == case_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    #[must_use]
    pub fn over_limit(&self, max_select_value: Option<u32>) -> bool {
        max_select_value.is_some_and(|max| self.ids.len() > max as usize)
    }
}

/// Case detail opened over the current screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDetail {
    pub case_id: String,
    pub tabs: Vec<DetailTabPayload>,
    pub active_tab: usize,
}

impl CaseDetail {
    #[must_use]
    pub fn new(case_id: impl Into<String>, tabs: Vec<DetailTabPayload>) -> Self {
        Self {
            case_id: case_id.into(),
            tabs,
            active_tab: 0,
        }
    }

    pub fn select_tab(&mut self, index: usize) -> bool {
        if index < self.tabs.len() {
            self.active_tab = index;
            true
        } else {
            false
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DetailRow {
    pub label: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DetailTab {
    pub index: usize,
    pub title: String,
    pub rows: Vec<DetailRow>,
    pub active: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DetailView {
    pub case_id: String,
    pub tabs: Vec<DetailTab>,
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[must_use]
pub fn detail_view(detail: &CaseDetail) -> DetailView {
    let tabs = detail
        .tabs
        .iter()
        .enumerate()
        .map(|(index, tab)| DetailTab {
            index,
            title: tab.title.clone(),
            rows: tab
                .headers
                .iter()
                .zip(tab.details.iter())
                .map(|(label, value)| DetailRow {
                    label: label.clone(),
                    value: cell_text(value),
                })
                .collect(),
            active: index == detail.active_tab,
        })
        .collect();
    DetailView {
        case_id: detail.case_id.clone(),
        tabs,
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MenuItemView {
    pub index: u32,
    pub text: String,
    pub image_uri: Option<String>,
    pub audio_uri: Option<String>,
    pub badge: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MenuListView {
    pub title: Option<String>,
    pub items: Vec<MenuItemView>,
    pub grid: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct QueryFieldView {
    pub id: String,
    pub label: String,
    pub kind: InputKind,
    pub input: FieldInput,
    pub required: bool,
    pub error: Option<String>,
    pub hint: Option<String>,
    pub choices: Vec<String>,
    pub group_key: Option<String>,
    pub allow_blank_value: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct QueryFormView {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<QueryFieldView>,
    pub groups: Vec<GroupHeader>,
    pub can_submit: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PaginationView {
    pub current_page: u32,
    pub page_count: u32,
    pub pages: Vec<u32>,
    pub has_previous: bool,
    pub has_next: bool,
    pub cases_per_page: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CaseRowView {
    pub id: String,
    pub cells: Vec<String>,
    pub selected: bool,
    pub group_key: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CaseListView {
    pub title: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<CaseRowView>,
    pub actions: Vec<String>,
    pub search_text: Option<String>,
    pub sort_index: Option<i32>,
    pub pagination: Option<PaginationView>,
    pub multi_select: bool,
    pub selected_count: usize,
    pub max_select_value: Option<u32>,
    pub over_limit: bool,
    pub header_rows: Option<u32>,
    pub tiles_per_row: Option<u32>,
    pub no_items_text: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FormEntryView {
    pub session_id: String,
    pub title: Option<String>,
    pub tree: Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewState {
    #[default]
    Unconfigured,
    AppList,
    IncompleteSessions,
    LocalForm { path: String },
    Loading,
    MenuList(MenuListView),
    QueryForm(QueryFormView),
    CaseList(CaseListView),
    MultiSelectCaseList(CaseListView),
    TileList(CaseListView),
    GroupedTileList(CaseListView),
    FormEntry(FormEntryView),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ProgressView {
    pub done: u64,
    pub total: u64,
    pub percent: u8,
}

impl From<RestoreProgress> for ProgressView {
    fn from(progress: RestoreProgress) -> Self {
        Self {
            done: progress.done,
            total: progress.total,
            percent: progress.percent(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NotificationView {
    pub message: String,
    pub kind: NotificationKind,
    pub dismissible: bool,
}

impl From<&Notification> for NotificationView {
    fn from(n: &Notification) -> Self {
        Self {
            message: n.message.clone(),
            kind: n.kind,
            dismissible: true,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ViewModel {
    pub state: ViewState,
    pub title: Option<String>,
    pub home_label: Option<String>,
    pub breadcrumbs: Vec<BreadcrumbItem>,
    pub is_loading: bool,
    pub progress: Option<ProgressView>,
    pub notification: Option<NotificationView>,
    pub detail: Option<DetailView>,
    pub detail_loading: bool,
    pub sync_in_progress: bool,
    pub route: String,
}

fn menu_list_view(commands: &CommandsResponse) -> MenuListView {
    MenuListView {
        title: commands.title.clone(),
        items: commands
            .commands
            .iter()
            .map(|c| MenuItemView {
                index: c.index,
                text: c.display_text.clone(),
                image_uri: c.image_uri.clone(),
                audio_uri: c.audio_uri.clone(),
                badge: c.badge_text.clone(),
            })
            .collect(),
        grid: commands.layout_style == crate::response::LayoutStyle::Grid,
    }
}

fn query_form_view(query: &QueryResponse, form: &QueryForm) -> QueryFormView {
    QueryFormView {
        title: query.title.clone(),
        description: query.description.clone(),
        fields: query
            .displays
            .iter()
            .map(|d| QueryFieldView {
                id: d.id.clone(),
                label: d.text.clone(),
                kind: d.kind(),
                input: form.inputs.get(&d.id).cloned().unwrap_or_default(),
                required: d.required,
                error: form.errors.get(&d.id).cloned(),
                hint: d.hint.clone(),
                choices: d.itemset_choices.clone(),
                group_key: d.group_key.clone(),
                allow_blank_value: d.allow_blank_value,
            })
            .collect(),
        groups: query.group_headers.clone(),
        can_submit: form.errors.is_empty(),
    }
}

fn case_list_view(entities: &EntitiesResponse, model: &Model, header_rows: Option<u32>) -> CaseListView {
    let pagination = (entities.page_count > 1).then(|| PaginationView {
        current_page: entities.current_page,
        page_count: entities.page_count,
        pages: paginate_options(entities.current_page, entities.page_count),
        has_previous: entities.current_page > 0,
        has_next: entities.current_page + 1 < entities.page_count,
        cases_per_page: model.cases_per_page(),
    });

    CaseListView {
        title: entities.title.clone(),
        headers: entities.headers.clone(),
        rows: entities
            .entities
            .iter()
            .map(|e| CaseRowView {
                id: e.id.clone(),
                cells: e.data.iter().map(cell_text).collect(),
                selected: model.selection.contains(&e.id),
                group_key: e.group_key.clone(),
            })
            .collect(),
        actions: entities.actions.iter().map(|a| a.text.clone()).collect(),
        search_text: model.navigation.search.clone(),
        sort_index: model.navigation.sort_index,
        pagination,
        multi_select: entities.multi_select,
        selected_count: model.selection.len(),
        max_select_value: entities.max_select_value,
        over_limit: model.selection.over_limit(entities.max_select_value),
        header_rows,
        tiles_per_row: entities.num_entities_per_row,
        no_items_text: entities.no_items_text.clone(),
    }
}

fn form_entry_view(form: &FormResponse) -> FormEntryView {
    FormEntryView {
        session_id: form.session_id.clone(),
        title: form.title.clone(),
        tree: form.tree.clone(),
    }
}

fn menu_state(response: &MenuResponse, model: &Model) -> ViewState {
    match (select_view(response), response) {
        (MenuView::MenuList, MenuResponse::Commands(c)) => ViewState::MenuList(menu_list_view(c)),
        (MenuView::QueryForm, MenuResponse::Query(q)) => {
            ViewState::QueryForm(query_form_view(q, &model.query_form))
        }
        (MenuView::CaseList, MenuResponse::Entities(e)) => {
            ViewState::CaseList(case_list_view(e, model, None))
        }
        (MenuView::MultiSelectCaseList, MenuResponse::Entities(e)) => {
            ViewState::MultiSelectCaseList(case_list_view(e, model, None))
        }
        (MenuView::TileList { .. }, MenuResponse::Entities(e)) => {
            ViewState::TileList(case_list_view(e, model, None))
        }
        (MenuView::GroupedTileList { header_rows, .. }, MenuResponse::Entities(e)) => {
            ViewState::GroupedTileList(case_list_view(e, model, Some(header_rows)))
        }
        (MenuView::FormEntry, MenuResponse::Form(f)) => ViewState::FormEntry(form_entry_view(f)),
        _ => ViewState::Loading,
    }
}

#[must_use]
pub fn project(model: &Model) -> ViewModel {
    let state = if model.config.is_none() {
        ViewState::Unconfigured
    } else {
        match &model.screen {
            Screen::Blank | Screen::AppList => ViewState::AppList,
            Screen::IncompleteSessions => ViewState::IncompleteSessions,
            Screen::LocalForm { path } => ViewState::LocalForm { path: path.clone() },
            Screen::Loading => ViewState::Loading,
            Screen::Menu { response, .. } => menu_state(response, model),
        }
    };

    // Crumbs name the steps of the displayed response. Once a new menu
    // request is out they no longer match the navigation state, so hide them.
    let (home_label, crumbs, title) = match &model.screen {
        Screen::Menu { response, depth } => {
            let (home, crumbs) = breadcrumbs(response.breadcrumbs(), *depth);
            let crumbs = if model.menu.status.is_in_flight() {
                Vec::new()
            } else {
                crumbs
            };
            (home, crumbs, response.title().map(str::to_string))
        }
        _ => (None, Vec::new(), None),
    };

    ViewModel {
        state,
        title,
        home_label,
        breadcrumbs: crumbs,
        is_loading: model.menu.status.is_in_flight(),
        progress: model
            .menu
            .status
            .progress()
            .or_else(|| model.sync.status.progress())
            .map(ProgressView::from),
        notification: model.notification.as_ref().map(NotificationView::from),
        detail: model.detail.as_ref().map(detail_view),
        detail_loading: model.detail_request.status.is_in_flight(),
        sync_in_progress: model.sync.status.is_in_flight(),
        route: model.route.to_path(),
    }
}
