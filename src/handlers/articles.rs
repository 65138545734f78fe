use crate::{
    AppState,
    access::{Requester, VisibilityScope, authorize_edit},
    auth::AuthUser,
    errors::ApiError,
    filters::ArticleFilter,
    models::{
        Article, ArticleChanges, ArticleDetail, ArticleDraft, ArticleSummary,
        CreateArticleRequest, Page, PageRequest, UpdateArticleRequest,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use validator::Validate;

use super::RequestOrigin;

/// list_articles
///
/// [Public Route] Paginated article collection.
///
/// Visibility is applied by the repository query before filters, count and
/// paging, so `totalItems` only ever counts what the requester may see.
#[utoipa::path(
    get,
    path = "/api/articles",
    params(ArticleFilter),
    responses(
        (status = 200, description = "Visible articles", body = Page<ArticleSummary>),
        (status = 401, description = "Invalid token")
    )
)]
pub async fn list_articles(
    requester: Requester,
    State(state): State<AppState>,
    Query(filter): Query<ArticleFilter>,
) -> Result<Json<Page<ArticleSummary>>, ApiError> {
    let page = PageRequest::new(filter.page, state.config.items_per_page);
    let (articles, total) = state
        .repo
        .list_articles(&requester.visibility(), &filter, page)
        .await?;

    let member = articles.iter().map(ArticleSummary::from).collect();
    Ok(Json(Page::new(member, total, page)))
}

/// get_article
///
/// [Public Route] One article with comments, image and related articles.
/// A hidden article is indistinguishable from a missing one (404).
#[utoipa::path(
    get,
    path = "/api/articles/{id}",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Found", body = ArticleDetail),
        (status = 404, description = "Missing or not visible")
    )
)]
pub async fn get_article(
    requester: Requester,
    State(state): State<AppState>,
    RequestOrigin(origin): RequestOrigin,
    Path(id): Path<i64>,
) -> Result<Json<ArticleDetail>, ApiError> {
    let scope = requester.visibility();
    let article = state
        .repo
        .get_article(id, &scope)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(article_detail(&state, article, &scope, &origin).await?))
}

/// create_article
///
/// [Authenticated Route] `createdBy` is always the requester, whatever the body says.
#[utoipa::path(
    post,
    path = "/api/articles",
    request_body = CreateArticleRequest,
    responses(
        (status = 201, description = "Created", body = ArticleDetail),
        (status = 401, description = "Not signed in"),
        (status = 422, description = "Validation failed", body = crate::errors::ErrorBody)
    )
)]
pub async fn create_article(
    auth_user: AuthUser,
    State(state): State<AppState>,
    RequestOrigin(origin): RequestOrigin,
    Json(payload): Json<CreateArticleRequest>,
) -> Result<(StatusCode, Json<ArticleDetail>), ApiError> {
    payload.validate()?;
    let draft = ArticleDraft::try_from(payload)?;
    check_references(&state, draft.image_id, &draft.related_ids, None).await?;

    let article = state
        .repo
        .create_article(draft, &auth_user.clerk_user_id)
        .await?;

    tracing::info!(
        article_id = article.id,
        created_by = %article.created_by,
        published = article.published,
        "article created"
    );

    let scope = auth_user.requester().visibility();
    let detail = article_detail(&state, article, &scope, &origin).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// update_article
///
/// [Authenticated Route] Partial update. 404 if not visible, 403 if not the
/// owner (or admin), then 422 on invalid fields.
#[utoipa::path(
    patch,
    path = "/api/articles/{id}",
    params(("id" = i64, Path, description = "Article ID")),
    request_body = UpdateArticleRequest,
    responses(
        (status = 200, description = "Updated", body = ArticleDetail),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Missing or not visible"),
        (status = 422, description = "Validation failed", body = crate::errors::ErrorBody)
    )
)]
pub async fn update_article(
    auth_user: AuthUser,
    State(state): State<AppState>,
    RequestOrigin(origin): RequestOrigin,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateArticleRequest>,
) -> Result<Json<ArticleDetail>, ApiError> {
    let requester = auth_user.requester();
    let scope = requester.visibility();
    load_editable(&state, id, &requester, &scope).await?;

    payload.validate()?;
    let changes = ArticleChanges::from(payload);
    check_references(
        &state,
        changes.image_id.flatten(),
        changes.related_ids.as_deref().unwrap_or_default(),
        Some(id),
    )
    .await?;

    let article = state
        .repo
        .update_article(id, changes)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(article_detail(&state, article, &scope, &origin).await?))
}

/// delete_article
///
/// [Authenticated Route] Deletes the article together with its comments.
#[utoipa::path(
    delete,
    path = "/api/articles/{id}",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Missing or not visible")
    )
)]
pub async fn delete_article(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let requester = auth_user.requester();
    load_editable(&state, id, &requester, &requester.visibility()).await?;

    if state.repo.delete_article(id).await? {
        tracing::info!(article_id = id, "article deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

/// publish_article
///
/// [Authenticated Route] Sets `published` to true. Idempotent; same edit
/// rule as any other mutation.
#[utoipa::path(
    put,
    path = "/api/articles/{id}/publication",
    params(("id" = i64, Path, description = "Article ID")),
    responses(
        (status = 200, description = "Published", body = ArticleDetail),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Missing or not visible")
    )
)]
pub async fn publish_article(
    auth_user: AuthUser,
    State(state): State<AppState>,
    RequestOrigin(origin): RequestOrigin,
    Path(id): Path<i64>,
) -> Result<Json<ArticleDetail>, ApiError> {
    let requester = auth_user.requester();
    let scope = requester.visibility();
    load_editable(&state, id, &requester, &scope).await?;

    let article = state
        .repo
        .publish_article(id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(article_detail(&state, article, &scope, &origin).await?))
}

// Visibility first (hidden => 404), then the edit rule (401/403).
async fn load_editable(
    state: &AppState,
    id: i64,
    requester: &Requester,
    scope: &VisibilityScope,
) -> Result<Article, ApiError> {
    let article = state
        .repo
        .get_article(id, scope)
        .await?
        .ok_or(ApiError::NotFound)?;
    authorize_edit(requester, &article.created_by)?;
    Ok(article)
}

/// check_references
///
/// Referenced media and related articles must exist. An article cannot list
/// itself as related.
async fn check_references(
    state: &AppState,
    image_id: Option<i64>,
    related_ids: &[i64],
    self_id: Option<i64>,
) -> Result<(), ApiError> {
    if let Some(image_id) = image_id {
        if state.repo.get_media_object(image_id).await?.is_none() {
            return Err(ApiError::violation(
                "image",
                "unknown",
                "Item not found for the given image id.",
            ));
        }
    }

    if self_id.is_some_and(|id| related_ids.contains(&id)) {
        return Err(ApiError::violation(
            "related_articles",
            "self",
            "An article cannot be related to itself.",
        ));
    }

    if !related_ids.is_empty() {
        let found = state.repo.existing_article_ids(related_ids).await?;
        if found.len() != related_ids.len() {
            return Err(ApiError::violation(
                "related_articles",
                "unknown",
                "Item not found for one of the given related article ids.",
            ));
        }
    }

    Ok(())
}

/// article_detail
///
/// Expands an article row into its item representation. Related articles go
/// through the same scope as the article itself.
async fn article_detail(
    state: &AppState,
    article: Article,
    scope: &VisibilityScope,
    origin: &str,
) -> Result<ArticleDetail, ApiError> {
    let comments = state.repo.comments_for_article(article.id).await?;
    let related_articles = state.repo.related_articles(article.id, scope).await?;
    let image = match article.image_id {
        Some(image_id) => state
            .repo
            .get_media_object(image_id)
            .await?
            .map(|media| media.to_response(origin)),
        None => None,
    };

    Ok(ArticleDetail {
        popular: article.is_popular(),
        id: article.id,
        title: article.title,
        content: article.content,
        published: article.published,
        tags: article.tags,
        date: article.date,
        created_by: article.created_by,
        created_at: article.created_at,
        updated_at: article.updated_at,
        comments,
        image,
        related_articles,
    })
}
