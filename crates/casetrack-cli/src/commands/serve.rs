//! Web server command

use std::path::Path;

use anyhow::Result;
use casetrack_server::{serve_with_config, ServerConfig};

use super::open_db;

/// Environment variable holding comma-separated API keys
const API_KEYS_ENV: &str = "CASETRACK_API_KEYS";

/// Environment variable holding comma-separated allowed CORS origins
const ALLOWED_ORIGINS_ENV: &str = "CASETRACK_ALLOWED_ORIGINS";

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
) -> Result<()> {
    let db = open_db(db_path, no_encrypt)?;

    let api_keys = std::env::var(API_KEYS_ENV)
        .map(|keys| {
            keys.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let allowed_origins = std::env::var(ALLOWED_ORIGINS_ENV)
        .map(|origins| {
            origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if !no_auth && api_keys.is_empty() {
        anyhow::bail!(
            "No API keys configured. Set {} or pass --no-auth for local development.",
            API_KEYS_ENV
        );
    }

    let config = ServerConfig {
        require_auth: !no_auth,
        allowed_origins,
        api_keys,
    };

    serve_with_config(db, host, port, config).await
}
