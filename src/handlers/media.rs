use crate::{
    AppState,
    auth::AuthUser,
    errors::ApiError,
    models::MediaObjectResponse,
    storage::media_object_key,
};
use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::RequestOrigin;

/// upload_media_object
///
/// [Authenticated Route] Multipart upload with a single `file` part, which must
/// be an image. Stored under `media/{uuid}.{ext}`.
#[utoipa::path(
    post,
    path = "/api/media_objects",
    request_body(content_type = "multipart/form-data", description = "A `file` part holding an image"),
    responses(
        (status = 201, description = "Uploaded", body = MediaObjectResponse),
        (status = 401, description = "Not signed in"),
        (status = 422, description = "Missing file or not an image", body = crate::errors::ErrorBody)
    )
)]
pub async fn upload_media_object(
    auth_user: AuthUser,
    State(state): State<AppState>,
    RequestOrigin(origin): RequestOrigin,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MediaObjectResponse>), ApiError> {
    let mut upload: Option<(Option<String>, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        upload = Some((file_name, content_type, bytes.to_vec()));
        break;
    }

    let (file_name, content_type, bytes) = upload
        .filter(|(_, _, bytes)| !bytes.is_empty())
        .ok_or_else(|| ApiError::violation("file", "required", "Please upload a file."))?;

    if !content_type.starts_with("image/") {
        return Err(ApiError::violation(
            "file",
            "mime",
            "This file is not a valid image.",
        ));
    }

    let key = media_object_key(file_name.as_deref());
    state
        .storage
        .put_object(&key, bytes, &content_type)
        .await
        .map_err(ApiError::Storage)?;

    let media = state.repo.create_media_object(&key, &content_type).await?;
    tracing::info!(
        media_id = media.id,
        key = %media.file_path,
        uploaded_by = %auth_user.clerk_user_id,
        "media object stored"
    );

    Ok((StatusCode::CREATED, Json(media.to_response(&origin))))
}

/// get_media_object
#[utoipa::path(
    get,
    path = "/api/media_objects/{id}",
    params(("id" = i64, Path, description = "Media object ID")),
    responses(
        (status = 200, description = "Found", body = MediaObjectResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_media_object(
    State(state): State<AppState>,
    RequestOrigin(origin): RequestOrigin,
    Path(id): Path<i64>,
) -> Result<Json<MediaObjectResponse>, ApiError> {
    let media = state
        .repo
        .get_media_object(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(media.to_response(&origin)))
}

/// serve_stored_file
///
/// [Public Route] Streams back an uploaded file; the target of `contentUrl`.
#[utoipa::path(
    get,
    path = "/storage/{path}",
    params(("path" = String, Path, description = "Storage key, e.g. media/<uuid>.png")),
    responses(
        (status = 200, description = "File contents"),
        (status = 404, description = "Not found")
    )
)]
pub async fn serve_stored_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let object = state
        .storage
        .get_object(&path)
        .await
        .map_err(ApiError::Storage)?
        .ok_or(ApiError::NotFound)?;

    Ok(([(header::CONTENT_TYPE, object.content_type)], object.bytes).into_response())
}
