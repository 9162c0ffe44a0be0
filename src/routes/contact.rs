use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use crate::{
    models::contact::{ContactMessage, ContactResponse},
    services::contact::ContactService,
    AppState,
};

/// POST /contact: public submission, multipart with an optional file.
pub async fn submit_contact(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ContactResponse>, (StatusCode, Json<Value>)> {
    let expose = state.config.expose_errors;
    let (form, attachment, guard) =
        ContactService::read_form(&state.files, state.config.max_upload_bytes, multipart)
            .await
            .map_err(|e| e.reply(expose))?;

    let saved = ContactService::submit(state.contacts.as_ref(), form, attachment, guard)
        .await
        .map_err(|e| e.reply(expose))?;

    Ok(Json(ContactResponse {
        success: true,
        code: saved.code,
    }))
}

/// GET /contact
pub async fn list_contacts(
    State(state): State<AppState>,
) -> Result<Json<Vec<ContactMessage>>, (StatusCode, Json<Value>)> {
    let rows = ContactService::list(state.contacts.as_ref())
        .await
        .map_err(|e| e.reply(state.config.expose_errors))?;
    Ok(Json(rows))
}

/// GET /contact/{code}
pub async fn get_contact(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ContactMessage>, (StatusCode, Json<Value>)> {
    let msg = ContactService::find(state.contacts.as_ref(), &code)
        .await
        .map_err(|e| e.reply(state.config.expose_errors))?;
    Ok(Json(msg))
}
