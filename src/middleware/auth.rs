use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::models::auth::{AuthenticatedUser, Claims};
use crate::AppState;

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "Missing Authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or((StatusCode::UNAUTHORIZED, "Invalid Authorization header format"))?;

        let claims = decode_access_token(token, &state.config.jwt_secret)
            .map_err(|_| (StatusCode::UNAUTHORIZED, "Invalid or expired token"))?;

        Ok(AuthenticatedUser {
            is_admin: state.config.is_admin(&claims.sub),
            code: claims.sub,
            name: claims.name,
        })
    }
}

/// Authenticated caller whose code is listed in `ADMIN_CODES`.
pub struct AdminUser(pub AuthenticatedUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::warn!(code = %user.code, "admin action refused");
            return Err((StatusCode::FORBIDDEN, "Admin access required"));
        }
        Ok(AdminUser(user))
    }
}

pub fn decode_access_token(token: &str, secret: &str) -> Result<Claims, anyhow::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &key, &validation)?;
    Ok(data.claims)
}

/// Mint an HS256 access token for `code`, valid for `ttl_secs`.
pub fn issue_token(
    secret: &str,
    code: &str,
    name: &str,
    ttl_secs: i64,
) -> Result<String, anyhow::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: code.to_string(),
        name: name.to_string(),
        iat: now as usize,
        exp: (now + ttl_secs) as usize,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}
