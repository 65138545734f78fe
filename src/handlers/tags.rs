use crate::{
    AppState,
    models::{Page, PageParams, PageRequest, Tag, all_tags},
};
use axum::{
    Json,
    extract::{Query, State},
};

/// list_tags
///
/// [Public Route] The fixed tag vocabulary, paginated like every other collection.
#[utoipa::path(
    get,
    path = "/api/tags",
    params(PageParams),
    responses((status = 200, description = "Tags", body = Page<Tag>))
)]
pub async fn list_tags(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Json<Page<Tag>> {
    let page = PageRequest::new(params.page, state.config.items_per_page);
    let tags = all_tags();
    let total = tags.len() as i64;
    Json(Page::new(page.slice(&tags), total, page))
}
