use std::env;

/// Per-file ceiling for uploaded images.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub upload_dir: String,
    pub host: String,
    pub port: u16,
    /// User codes (JWT `sub`) allowed to delete announcements.
    pub admin_codes: Vec<String>,
    pub app_base_url: String,
    /// When false, storage errors reach clients as a generic message only.
    pub expose_errors: bool,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".into());

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            upload_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            admin_codes: env::var("ADMIN_CODES")
                .map(|v| parse_list(&v))
                .unwrap_or_default(),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost".into()),
            expose_errors: !app_env.eq_ignore_ascii_case("production"),
            max_upload_bytes: match env::var("MAX_UPLOAD_BYTES") {
                Ok(v) => v.parse()?,
                Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
            },
        })
    }

    pub fn is_admin(&self, code: &str) -> bool {
        self.admin_codes.iter().any(|c| c == code)
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
