use serde::{Deserialize, Serialize};

/// Claims embedded in the JWT access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user code
    pub name: String,
    pub exp: usize,
    pub iat: usize,
}

/// Extracted from the validated JWT: available via Axum extractors
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub code: String,
    pub name: String,
    pub is_admin: bool,
}
