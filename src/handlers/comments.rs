use crate::{
    AppState,
    access::{Requester, VisibilityScope, authorize_edit},
    auth::AuthUser,
    errors::ApiError,
    models::{
        Comment, CreateCommentRequest, Page, PageParams, PageRequest, UpdateCommentRequest,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use validator::Validate;

// Comments are public whatever the state of their article: only the
// article's existence is checked. Edits still follow `authorize_edit`.

/// list_comments
///
/// [Public Route] Paginated comments of one article, oldest first. The article
/// may be unpublished.
#[utoipa::path(
    get,
    path = "/api/articles/{id}/comments",
    params(
        ("id" = i64, Path, description = "Parent article ID"),
        PageParams
    ),
    responses(
        (status = 200, description = "Comments", body = Page<Comment>),
        (status = 404, description = "Article missing")
    )
)]
pub async fn list_comments(
    // Rejects an invalid token with 401; the identity itself is not needed.
    _requester: Requester,
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
    Query(params): Query<PageParams>,
) -> Result<Json<Page<Comment>>, ApiError> {
    ensure_article_exists(&state, article_id).await?;

    let page = PageRequest::new(params.page, state.config.items_per_page);
    let (comments, total) = state.repo.list_comments(article_id, page).await?;
    Ok(Json(Page::new(comments, total, page)))
}

/// create_comment
///
/// [Authenticated Route] Comments on an existing article.
#[utoipa::path(
    post,
    path = "/api/articles/{id}/comments",
    params(("id" = i64, Path, description = "Parent article ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 404, description = "Article missing"),
        (status = 422, description = "Validation failed", body = crate::errors::ErrorBody)
    )
)]
pub async fn create_comment(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    ensure_article_exists(&state, article_id).await?;

    payload.validate()?;
    let content = payload.content.ok_or_else(|| {
        ApiError::violation("content", "required", "This value should not be blank.")
    })?;

    // The article can vanish between the check and the insert.
    let comment = state
        .repo
        .create_comment(article_id, content, &auth_user.clerk_user_id)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => ApiError::NotFound,
            other => ApiError::Database(other),
        })?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// get_comment
#[utoipa::path(
    get,
    path = "/api/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 200, description = "Found", body = Comment),
        (status = 404, description = "Missing")
    )
)]
pub async fn get_comment(
    _requester: Requester,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Comment>, ApiError> {
    Ok(Json(load_comment(&state, id).await?))
}

/// update_comment
///
/// [Authenticated Route] Edits the text, or moves the comment under another
/// existing article.
#[utoipa::path(
    patch,
    path = "/api/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated", body = Comment),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Missing"),
        (status = 422, description = "Validation failed", body = crate::errors::ErrorBody)
    )
)]
pub async fn update_comment(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<Json<Comment>, ApiError> {
    let comment = load_comment(&state, id).await?;
    authorize_edit(&auth_user.requester(), &comment.created_by)?;

    payload.validate()?;

    // The foreign key decides whether the target article exists, in the same
    // statement as the move.
    let comment = state
        .repo
        .update_comment(id, payload.content, payload.article)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => ApiError::violation(
                "article",
                "unknown",
                "Item not found for the given article id.",
            ),
            other => ApiError::Database(other),
        })?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(comment))
}

/// delete_comment
#[utoipa::path(
    delete,
    path = "/api/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Missing")
    )
)]
pub async fn delete_comment(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let comment = load_comment(&state, id).await?;
    authorize_edit(&auth_user.requester(), &comment.created_by)?;

    if state.repo.delete_comment(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

async fn ensure_article_exists(state: &AppState, article_id: i64) -> Result<(), ApiError> {
    match state
        .repo
        .get_article(article_id, &VisibilityScope::Everything)
        .await?
    {
        Some(_) => Ok(()),
        None => Err(ApiError::NotFound),
    }
}

async fn load_comment(state: &AppState, id: i64) -> Result<Comment, ApiError> {
    state
        .repo
        .get_comment(id)
        .await?
        .ok_or(ApiError::NotFound)
}
