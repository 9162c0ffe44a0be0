pub mod announcements;
pub mod contact;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::{
    services::{
        announcements::MAX_SLIDES,
        uploads::{FileCategory, PUBLIC_PREFIX},
    },
    AppState,
};

/// Allow the configured base URL, its subdomains and localhost.
fn cors_layer(base_url: &str) -> CorsLayer {
    let base = base_url.trim_end_matches('/').to_string();
    let origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let o = match origin.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };
        if o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") {
            return true;
        }
        if o == base {
            return true;
        }
        if let Some(idx) = base.find("://") {
            let after_scheme = &base[idx + 3..];
            let domain = after_scheme.split('/').next().unwrap_or(after_scheme);
            let domain_clean = domain.split(':').next().unwrap_or(domain);
            if o.ends_with(&format!(".{domain_clean}")) {
                return true;
            }
        }
        false
    });

    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(origin)
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.app_base_url);
    // one primary image plus a full carousel, with room for the text fields
    let body_limit = state.config.max_upload_bytes * (MAX_SLIDES + 1) + 1024 * 1024;

    let mut router = Router::new()
        .route("/health", get(health::health_check))
        // Announcements
        .route(
            "/announcements",
            get(announcements::list_announcements).post(announcements::create_announcement),
        )
        .route("/announcements/active", get(announcements::get_active))
        .route(
            "/announcements/{id}",
            put(announcements::replace_announcement)
                .patch(announcements::patch_announcement)
                .delete(announcements::delete_announcement),
        )
        // Contact inbox
        .route("/contact", get(contact::list_contacts).post(contact::submit_contact))
        .route("/contact/{code}", get(contact::get_contact));

    for category in FileCategory::SERVED {
        router = router.nest_service(
            &format!("{PUBLIC_PREFIX}/{}", category.dir()),
            ServeDir::new(state.files.root().join(category.dir())),
        );
    }

    router
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
