use serde::{Deserialize, Serialize};

use crate::response::{EntitiesResponse, MenuResponse};

/// Which screen renders a given reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum MenuView {
    MenuList,
    QueryForm,
    CaseList,
    MultiSelectCaseList,
    TileList { multi_select: bool },
    GroupedTileList { header_rows: u32, multi_select: bool },
    FormEntry,
    CaseDetail,
}

#[must_use]
pub fn select_view(response: &MenuResponse) -> MenuView {
    match response {
        MenuResponse::Commands(_) => MenuView::MenuList,
        MenuResponse::Query(_) => MenuView::QueryForm,
        MenuResponse::Entities(entities) => select_entities_view(entities),
        MenuResponse::Form(_) => MenuView::FormEntry,
        MenuResponse::Details(_) => MenuView::CaseDetail,
    }
}

fn select_entities_view(entities: &EntitiesResponse) -> MenuView {
    let multi_select = entities.multi_select;
    if !entities.has_tiles() {
        return if multi_select {
            MenuView::MultiSelectCaseList
        } else {
            MenuView::CaseList
        };
    }

    match u32::try_from(entities.group_header_rows) {
        Ok(header_rows) => MenuView::GroupedTileList {
            header_rows,
            multi_select,
        },
        Err(_) => MenuView::TileList { multi_select },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{CommandsResponse, FormResponse, TileCell};

    fn entities(tiles: bool, multi_select: bool, group_header_rows: i32) -> MenuResponse {
        let tile = TileCell {
            grid_x: 0,
            grid_y: 0,
            grid_width: 12,
            grid_height: 1,
            font_size: None,
            show_border: false,
        };
        MenuResponse::Entities(EntitiesResponse {
            title: None,
            breadcrumbs: vec![],
            headers: vec!["Name".into()],
            styles: vec![],
            tiles: tiles.then(|| vec![Some(tile)]),
            entities: vec![],
            page_count: 1,
            current_page: 0,
            multi_select,
            max_select_value: None,
            group_header_rows,
            actions: vec![],
            sort_indices: vec![],
            num_entities_per_row: None,
            no_items_text: None,
        })
    }

    #[test]
    fn test_plain_case_list() {
        assert_eq!(select_view(&entities(false, false, -1)), MenuView::CaseList);
    }

    #[test]
    fn test_multi_select_case_list() {
        assert_eq!(
            select_view(&entities(false, true, -1)),
            MenuView::MultiSelectCaseList
        );
    }

    #[test]
    fn test_group_header_rows_ignored_without_tiles() {
        assert_eq!(select_view(&entities(false, false, 2)), MenuView::CaseList);
    }

    #[test]
    fn test_grouped_tiles() {
        assert_eq!(
            select_view(&entities(true, false, 2)),
            MenuView::GroupedTileList {
                header_rows: 2,
                multi_select: false
            }
        );
        assert_eq!(
            select_view(&entities(true, true, 0)),
            MenuView::GroupedTileList {
                header_rows: 0,
                multi_select: true
            }
        );
    }

    #[test]
    fn test_tiles_without_grouping() {
        assert_eq!(
            select_view(&entities(true, true, -1)),
            MenuView::TileList { multi_select: true }
        );
    }

    #[test]
    fn test_non_entity_replies() {
        let commands = MenuResponse::Commands(CommandsResponse {
            title: None,
            breadcrumbs: vec![],
            commands: vec![],
            layout_style: crate::response::LayoutStyle::Grid,
        });
        assert_eq!(select_view(&commands), MenuView::MenuList);

        let form = MenuResponse::Form(FormResponse {
            session_id: "s".into(),
            title: None,
            breadcrumbs: vec![],
            tree: serde_json::Value::Null,
        });
        assert_eq!(select_view(&form), MenuView::FormEntry);
    }
}
