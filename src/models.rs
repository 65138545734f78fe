use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use crate::errors::{ApiError, validation_error};

/// An article with this many comments or more is reported as `popular`.
pub const POPULAR_COMMENT_THRESHOLD: i64 = 10;

/// The fixed tag allow-list. Tags are not persisted as rows; articles store
/// the labels directly and validation rejects anything outside this list.
pub const ALLOWED_TAGS: [&str; 10] = [
    "tag1", "tag2", "tag3", "tag4", "tag5", "tag6", "tag7", "tag8", "tag9", "tag10",
];

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// A local mirror of an external (Clerk) identity, created the first time a
/// verified subject is seen.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct User {
    pub id: i64,
    // The `sub` claim of the session token.
    pub clerk_user_id: String,
    pub is_admin: bool,
}

/// Article
///
/// A row of the `articles` table plus its comment count, which is computed in
/// the SELECT so `popular` never needs a second query.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: Option<String>,
    pub published: bool,
    pub tags: Vec<String>,
    pub date: NaiveDate,
    pub image_id: Option<i64>,
    // Set once from the creating requester, never updated.
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub comment_count: i64,
}

impl Article {
    pub fn is_popular(&self) -> bool {
        self.comment_count >= POPULAR_COMMENT_THRESHOLD
    }
}

/// Comment
///
/// A row of the `comments` table. Serialized with the parent id under `article`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    #[serde(rename = "article")]
    pub article_id: i64,
    pub content: String,
    pub created_by: String,
}

/// MediaObject
///
/// An uploaded image. `file_path` is the storage key; the public URL is derived
/// per request (see `MediaObjectResponse`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct MediaObject {
    pub id: i64,
    pub file_path: String,
    pub content_type: String,
}

impl MediaObject {
    /// content_url
    ///
    /// `origin` is scheme + host of the current request, e.g. `http://localhost:3000`.
    pub fn content_url(&self, origin: &str) -> String {
        format!("{}/storage/{}", origin.trim_end_matches('/'), self.file_path)
    }

    pub fn to_response(&self, origin: &str) -> MediaObjectResponse {
        MediaObjectResponse {
            id: self.id,
            content_url: self.content_url(origin),
        }
    }
}

// --- Response Schemas (Output) ---

/// ArticleSummary
///
/// Collection representation of an article (GET /api/articles).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ArticleSummary {
    pub id: i64,
    pub title: String,
    pub content: Option<String>,
    pub published: bool,
    pub tags: Vec<String>,
    #[ts(type = "string")]
    pub date: NaiveDate,
    pub popular: bool,
    pub created_by: String,
}

impl From<&Article> for ArticleSummary {
    fn from(article: &Article) -> Self {
        Self {
            id: article.id,
            title: article.title.clone(),
            content: article.content.clone(),
            published: article.published,
            tags: article.tags.clone(),
            date: article.date,
            popular: article.is_popular(),
            created_by: article.created_by.clone(),
        }
    }
}

/// RelatedArticle
///
/// One level of the self-referential `relatedArticles` relation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, PartialEq)]
#[ts(export)]
pub struct RelatedArticle {
    pub id: i64,
    pub title: String,
}

/// ArticleDetail
///
/// Item representation of an article (GET /api/articles/{id}), with comments,
/// image and related articles expanded.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDetail {
    pub id: i64,
    pub title: String,
    pub content: Option<String>,
    pub published: bool,
    pub tags: Vec<String>,
    #[ts(type = "string")]
    pub date: NaiveDate,
    pub popular: bool,
    pub created_by: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    pub comments: Vec<Comment>,
    pub image: Option<MediaObjectResponse>,
    pub related_articles: Vec<RelatedArticle>,
}

/// MediaObjectResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct MediaObjectResponse {
    pub id: i64,
    pub content_url: String,
}

/// UserProfile
///
/// Output schema for GET /api/users/me. The admin flag is deliberately not exposed.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub clerk_user_id: String,
}

/// Tag
///
/// Read-only lookup entry built from `ALLOWED_TAGS` (ids are 1-based positions).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}

pub fn all_tags() -> Vec<Tag> {
    ALLOWED_TAGS
        .iter()
        .zip(1..)
        .map(|(label, id)| Tag {
            id,
            label: label.to_string(),
        })
        .collect()
}

// --- Pagination ---

/// PageParams
///
/// Query parameters for collections that take no other filters.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageParams {
    /// 1-based page number.
    pub page: Option<i64>,
}

/// PageRequest
///
/// A resolved page: never below 1, sized by `AppConfig::items_per_page`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, per_page: i64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.max(1),
        }
    }

    /// Saturates instead of overflowing, so a huge `page` is simply past the end.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.per_page)
    }

    /// Slices an already filtered and ordered in-memory collection.
    pub fn slice<T: Clone>(&self, items: &[T]) -> Vec<T> {
        let offset = usize::try_from(self.offset()).unwrap_or(usize::MAX);
        items
            .iter()
            .skip(offset)
            .take(self.per_page as usize)
            .cloned()
            .collect()
    }
}

/// Page
///
/// Envelope for every collection response.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub member: Vec<T>,
    pub total_items: i64,
    pub page: i64,
    pub items_per_page: i64,
}

impl<T> Page<T> {
    pub fn new(member: Vec<T>, total_items: i64, request: PageRequest) -> Self {
        Self {
            member,
            total_items,
            page: request.page,
            items_per_page: request.per_page,
        }
    }
}

// --- Request Payloads (Input Schemas) ---

/// CreateArticleRequest
///
/// Input payload for POST /api/articles. `created_by` is never accepted from
/// the client; it comes from the authenticated requester.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CreateArticleRequest {
    #[validate(
        required(message = "This value should not be blank."),
        length(max = 255, message = "This value is too long. It should have 255 characters or less."),
        custom(function = "not_blank")
    )]
    pub title: Option<String>,
    pub content: Option<String>,
    pub published: Option<bool>,
    #[validate(custom(function = "allowed_tags"))]
    pub tags: Option<Vec<String>>,
    #[validate(required(message = "This value should not be blank."))]
    #[ts(type = "string | null")]
    pub date: Option<NaiveDate>,
    /// Id of a previously uploaded media object.
    pub image: Option<i64>,
    /// Ids of related articles.
    pub related_articles: Option<Vec<i64>>,
}

/// UpdateArticleRequest
///
/// Partial update payload for PATCH /api/articles/{id}. Absent fields are left
/// untouched; `image: null` clears the image.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UpdateArticleRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(max = 255, message = "This value is too long. It should have 255 characters or less."),
        custom(function = "not_blank")
    )]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "allowed_tags"))]
    pub tags: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub date: Option<NaiveDate>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_or_null"
    )]
    #[schema(value_type = Option<i64>)]
    #[ts(type = "number | null")]
    pub image: Option<Option<i64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_articles: Option<Vec<i64>>,
}

/// CreateCommentRequest
///
/// Input payload for POST /api/articles/{articleId}/comments.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    #[validate(
        required(message = "This value should not be blank."),
        custom(function = "not_blank")
    )]
    pub content: Option<String>,
}

/// UpdateCommentRequest
///
/// Partial update payload for PATCH /api/comments/{id}. `article` moves the
/// comment under another (visible) article.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateCommentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "not_blank"))]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<i64>,
}

// --- Validated inputs handed to the repository ---

/// ArticleDraft
///
/// A `CreateArticleRequest` that passed validation, with defaults applied.
#[derive(Debug, Clone)]
pub struct ArticleDraft {
    pub title: String,
    pub content: Option<String>,
    pub published: bool,
    pub tags: Vec<String>,
    pub date: NaiveDate,
    pub image_id: Option<i64>,
    pub related_ids: Vec<i64>,
}

/// ArticleChanges
///
/// A validated `UpdateArticleRequest`. `None` means "leave as is".
#[derive(Debug, Clone, Default)]
pub struct ArticleChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub published: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub date: Option<NaiveDate>,
    pub image_id: Option<Option<i64>>,
    pub related_ids: Option<Vec<i64>>,
}

impl From<UpdateArticleRequest> for ArticleChanges {
    fn from(req: UpdateArticleRequest) -> Self {
        Self {
            title: req.title,
            content: req.content,
            published: req.published,
            tags: req.tags.map(dedup_tags),
            date: req.date,
            image_id: req.image,
            related_ids: req.related_articles.map(dedup_ids),
        }
    }
}

impl TryFrom<CreateArticleRequest> for ArticleDraft {
    type Error = ApiError;

    /// Only fails if called on a request that skipped `validate()`.
    fn try_from(req: CreateArticleRequest) -> Result<Self, Self::Error> {
        let title = req.title.ok_or_else(|| {
            ApiError::violation("title", "required", "This value should not be blank.")
        })?;
        let date = req.date.ok_or_else(|| {
            ApiError::violation("date", "required", "This value should not be blank.")
        })?;
        Ok(Self {
            title,
            content: req.content,
            published: req.published.unwrap_or(false),
            tags: dedup_tags(req.tags.unwrap_or_default()),
            date,
            image_id: req.image,
            related_ids: dedup_ids(req.related_articles.unwrap_or_default()),
        })
    }
}

// Tags are a set: keep first occurrence order, drop repeats.
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

fn dedup_ids(ids: Vec<i64>) -> Vec<i64> {
    let mut out: Vec<i64> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

// --- Validators ---

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(validation_error("blank", "This value should not be blank."));
    }
    Ok(())
}

fn allowed_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.iter().all(|tag| ALLOWED_TAGS.contains(&tag.as_str())) {
        Ok(())
    } else {
        Err(validation_error(
            "tag",
            "One or more of the given values is invalid.",
        ))
    }
}

/// Distinguishes an explicit `null` (Some(None)) from an absent field (None).
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}
