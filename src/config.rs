use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

pub const DEFAULT_SIGNED_URL_TTL_SECONDS: u64 = 3600;
pub const DEFAULT_TRANSCRIPTION_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;
pub const DEFAULT_MAX_ATTACHMENTS_PER_REQUEST: usize = 5;
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 20 * 1024 * 1024;

/// What an update carrying `new_project_name` does when the owner already has
/// a project with that name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProjectNamePolicy {
    #[default]
    AlwaysCreate,
    ReuseExisting,
}

impl FromStr for ProjectNamePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always_create" | "create" => Ok(Self::AlwaysCreate),
            "reuse_existing" | "reuse" => Ok(Self::ReuseExisting),
            other => Err(anyhow!(
                "unknown project name policy '{other}' (expected always_create or reuse_existing)"
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TranscriptionConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub file_field: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct CaptureLimits {
    pub max_audio_bytes: usize,
    pub max_attachments_per_request: usize,
    pub max_attachment_bytes: usize,
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self {
            max_audio_bytes: DEFAULT_MAX_AUDIO_BYTES,
            max_attachments_per_request: DEFAULT_MAX_ATTACHMENTS_PER_REQUEST,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub cors_allowed_origin: Option<String>,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub s3_bucket: String,
    pub signed_url_ttl: Duration,
    pub transcription: TranscriptionConfig,
    pub limits: CaptureLimits,
    pub project_name_policy: ProjectNamePolicy,
    /// Local filesystem storage and the canned transcriber instead of S3 and
    /// the transcription service.
    pub use_mock: bool,
    pub data_dir: PathBuf,
    /// Origin prefixed to locally signed file URLs.
    pub public_base_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "nice-catcher".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "nice-catcher-clients".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let refresh_token_expiry_days = env::var("REFRESH_TOKEN_EXPIRY_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("REFRESH_TOKEN_EXPIRY_DAYS must be an integer")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let aws_endpoint_url = env::var("AWS_ENDPOINT_URL").ok();
        let aws_access_key_id = env::var("AWS_ACCESS_KEY_ID").ok();
        let aws_secret_access_key = env::var("AWS_SECRET_ACCESS_KEY").ok();
        let aws_region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
        let s3_bucket = env::var("S3_BUCKET").unwrap_or_else(|_| "memos-audio".to_string());
        let signed_url_ttl = Duration::from_secs(parse_or(
            "SIGNED_URL_TTL_SECONDS",
            DEFAULT_SIGNED_URL_TTL_SECONDS,
        )?);

        let transcription = TranscriptionConfig {
            base_url: env::var("AI_BUILDER_BASE_URL")
                .unwrap_or_else(|_| "https://space.ai-builders.com".to_string()),
            token: env::var("AI_BUILDER_TOKEN")
                .ok()
                .filter(|token| !token.trim().is_empty()),
            file_field: env::var("AI_BUILDER_FILE_FIELD")
                .unwrap_or_else(|_| "audio_file".to_string()),
            model: env::var("AI_BUILDER_MODEL").unwrap_or_else(|_| "whisper-1".to_string()),
            timeout: Duration::from_secs(parse_or(
                "TRANSCRIPTION_TIMEOUT_SECONDS",
                DEFAULT_TRANSCRIPTION_TIMEOUT_SECONDS,
            )?),
        };

        let limits = CaptureLimits {
            max_audio_bytes: parse_or("MAX_AUDIO_BYTES", DEFAULT_MAX_AUDIO_BYTES)?,
            max_attachments_per_request: parse_or(
                "MAX_ATTACHMENTS_PER_REQUEST",
                DEFAULT_MAX_ATTACHMENTS_PER_REQUEST,
            )?,
            max_attachment_bytes: parse_or("MAX_ATTACHMENT_BYTES", DEFAULT_MAX_ATTACHMENT_BYTES)?,
        };

        let project_name_policy = match env::var("PROJECT_NAME_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => ProjectNamePolicy::default(),
        };

        let use_mock = env::var("USE_MOCK").is_ok_and(|value| parse_flag(&value));
        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://{server_host}:{server_port}"));

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            refresh_token_expiry_days,
            cors_allowed_origin,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            s3_bucket,
            signed_url_ttl,
            transcription,
            limits,
            project_name_policy,
            use_mock,
            data_dir,
            public_base_url,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(default),
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}
