use crate::{
    AppState,
    handlers::{articles, comments, media, users},
};
use axum::{
    Router,
    routing::{get, patch, post, put},
};

/// Authenticated Router Module
///
/// Every route here sits behind the `AuthUser` middleware layer, so requests
/// without valid credentials are rejected with 401 before reaching a handler.
/// Ownership (creator or admin) is checked per resource in the handlers via
/// `authorize_edit`, after the visibility lookup.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/users/me
        .route("/api/users/me", get(users::get_me))
        // POST /api/articles
        .route("/api/articles", post(articles::create_article))
        // PATCH/DELETE /api/articles/{id}
        .route(
            "/api/articles/{id}",
            patch(articles::update_article).delete(articles::delete_article),
        )
        // PUT /api/articles/{id}/publication
        .route(
            "/api/articles/{id}/publication",
            put(articles::publish_article),
        )
        // POST /api/articles/{id}/comments
        .route(
            "/api/articles/{id}/comments",
            post(comments::create_comment),
        )
        // PATCH/DELETE /api/comments/{id}
        .route(
            "/api/comments/{id}",
            patch(comments::update_comment).delete(comments::delete_comment),
        )
        // POST /api/media_objects (multipart)
        .route("/api/media_objects", post(media::upload_media_object))
}
