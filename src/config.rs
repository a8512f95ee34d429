use mongodb::{Client, Database};
use std::env;
use std::path::PathBuf;
use dotenv::dotenv;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
const DEFAULT_SESSION_TTL_SECS: i64 = 30 * 60;

pub struct AppConfig {
    pub mongo_uri: String,
    pub database_name: String,
    pub bind_addr: String,
    pub upload_dir: PathBuf,
    pub public_upload_url: String,
    pub max_upload_bytes: usize,
    pub default_groups_path: PathBuf,
    pub session_ttl_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenv().ok();

        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let session_ttl_secs = env::var("SESSION_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs: &i64| *secs > 0)
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        AppConfig {
            mongo_uri: env::var("MONGODB_URI")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            database_name: env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "catalog_db".to_string()),
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:8080".to_string()),
            upload_dir: env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads".to_string())
                .into(),
            public_upload_url: env::var("PUBLIC_UPLOAD_URL")
                .unwrap_or_else(|_| "/uploads".to_string()),
            max_upload_bytes,
            default_groups_path: env::var("DEFAULT_GROUPS_PATH")
                .unwrap_or_else(|_| "config/default_complement_groups.json".to_string())
                .into(),
            session_ttl_secs,
        }
    }
}

pub struct MongoConfig {
    pub database: Database,
}

impl MongoConfig {
    pub async fn init(config: &AppConfig) -> Result<Self, mongodb::error::Error> {
        let client = Client::with_uri_str(&config.mongo_uri).await?;
        let database = client.database(&config.database_name);

        Ok(MongoConfig { database })
    }
}
