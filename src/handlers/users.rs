use crate::{auth::AuthUser, models::UserProfile};
use axum::Json;

/// get_me
///
/// [Authenticated Route] The local user behind the session token. The row is
/// created on first sight by the `AuthUser` extractor.
#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn get_me(auth_user: AuthUser) -> Json<UserProfile> {
    Json(UserProfile {
        id: auth_user.id,
        clerk_user_id: auth_user.clerk_user_id,
    })
}
