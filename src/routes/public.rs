use crate::{
    AppState,
    handlers::{self, articles, comments, media, tags},
};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Read-only endpoints. Anonymous callers are welcome here, but visibility is
/// still enforced: every article read goes through the requester's
/// `VisibilityScope`, and comments inherit their article's visibility.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        .route("/health", get(handlers::health))
        // GET /api/articles?title=&published=&date=&query=&id[gte|lte|gt|lt|between]=&order[date]=&page=
        .route("/api/articles", get(articles::list_articles))
        // GET /api/articles/{id}
        // Hidden articles answer 404, exactly like missing ones.
        .route("/api/articles/{id}", get(articles::get_article))
        // GET /api/articles/{id}/comments
        .route(
            "/api/articles/{id}/comments",
            get(comments::list_comments),
        )
        // GET /api/comments/{id}
        .route("/api/comments/{id}", get(comments::get_comment))
        // GET /api/media_objects/{id}
        .route("/api/media_objects/{id}", get(media::get_media_object))
        // GET /storage/{*path}
        // Serves uploaded files; `contentUrl` points here.
        .route("/storage/{*path}", get(media::serve_stored_file))
        // GET /api/tags
        .route("/api/tags", get(tags::list_tags))
}
