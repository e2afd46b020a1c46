use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::mount::Credentials;

/// Server configuration loaded from environment variables (with a `.env`
/// file honoured when present).
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Media settings
    pub media_dir: PathBuf,
    pub mount_point: PathBuf,
    pub smb_share_url: Option<String>,
    pub smb_credentials: Option<Credentials>,

    // Index cache settings
    pub cache_ttl: Duration,

    // Scanner settings
    pub scan_concurrency: usize,
    pub metadata_timeout: Duration,

    // Metadata provider settings
    pub omdb_api_key: Option<String>,
    pub omdb_api_url: Option<String>,

    // CORS settings
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let smb_credentials = env::var("SMB_USERNAME").ok().map(|username| Credentials {
            username,
            password: env::var("SMB_PASSWORD").unwrap_or_default(),
            domain: env::var("SMB_DOMAIN").ok(),
        });

        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),

            media_dir: env::var("MEDIA_DIR")
                .unwrap_or_else(|_| "./media".to_string())
                .into(),
            mount_point: env::var("MOUNT_POINT")
                .unwrap_or_else(|_| "./mnt".to_string())
                .into(),
            smb_share_url: env::var("SMB_SHARE_URL").ok(),
            smb_credentials,

            cache_ttl: Duration::from_secs(
                env::var("CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
            ),

            scan_concurrency: env::var("SCAN_CONCURRENCY")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .unwrap_or(8),
            metadata_timeout: Duration::from_secs(
                env::var("METADATA_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            ),

            omdb_api_key: env::var("OMDB_API_KEY").ok(),
            omdb_api_url: env::var("OMDB_API_URL").ok(),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
        })
    }
}
