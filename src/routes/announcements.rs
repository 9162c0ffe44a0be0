use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::{
    middleware::auth::AdminUser,
    models::{announcement::Announcement, auth::AuthenticatedUser},
    services::announcements::AnnouncementService,
    AppState,
};

/// GET /announcements/active: public, the announcement to display or 204.
pub async fn get_active(
    State(state): State<AppState>,
) -> Result<Response, (StatusCode, Json<Value>)> {
    let active = AnnouncementService::get_active(
        state.announcements.as_ref(),
        &state.files,
        chrono::Utc::now(),
    )
    .await
    .map_err(|e| e.reply(state.config.expose_errors))?;

    Ok(match active {
        Some(a) => Json(a).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// GET /announcements
pub async fn list_announcements(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<Vec<Announcement>>, (StatusCode, Json<Value>)> {
    let rows = AnnouncementService::list(state.announcements.as_ref())
        .await
        .map_err(|e| e.reply(state.config.expose_errors))?;
    Ok(Json(rows))
}

/// POST /announcements: multipart create.
pub async fn create_announcement(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Announcement>), (StatusCode, Json<Value>)> {
    let expose = state.config.expose_errors;
    let upload =
        AnnouncementService::read_upload(&state.files, state.config.max_upload_bytes, multipart)
            .await
            .map_err(|e| e.reply(expose))?;

    let created = AnnouncementService::create(state.announcements.as_ref(), upload)
        .await
        .map_err(|e| e.reply(expose))?;

    tracing::info!(id = created.id, by = %user.code, "announcement created via API");
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /announcements/{id}: multipart full replace.
pub async fn replace_announcement(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<Announcement>, (StatusCode, Json<Value>)> {
    let expose = state.config.expose_errors;
    let upload =
        AnnouncementService::read_upload(&state.files, state.config.max_upload_bytes, multipart)
            .await
            .map_err(|e| e.reply(expose))?;

    let updated =
        AnnouncementService::replace(state.announcements.as_ref(), &state.files, id, upload)
            .await
            .map_err(|e| e.reply(expose))?;
    Ok(Json(updated))
}

/// PATCH /announcements/{id}: JSON partial update.
pub async fn patch_announcement(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> Result<Json<Announcement>, (StatusCode, Json<Value>)> {
    let updated = AnnouncementService::patch(state.announcements.as_ref(), &state.files, id, &body)
        .await
        .map_err(|e| e.reply(state.config.expose_errors))?;
    Ok(Json(updated))
}

/// DELETE /announcements/{id}: admin only.
pub async fn delete_announcement(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    AnnouncementService::delete(state.announcements.as_ref(), &state.files, id)
        .await
        .map_err(|e| e.reply(state.config.expose_errors))?;

    tracing::info!(id, by = %admin.code, "announcement deleted via API");
    Ok(Json(json!({ "ok": true })))
}
