use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
    pub geocoder_timeout: Duration,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Image upload and geotagged gallery API")]
pub struct Args {
    /// Host to bind to (overrides GALLERY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GALLERY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where image payloads are stored (overrides GALLERY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides GALLERY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Reverse-geocoding provider base URL (overrides GALLERY_GEOCODER_URL)
    #[arg(long)]
    pub geocoder_url: Option<String>,

    /// User-Agent sent to the geocoding provider (overrides GALLERY_GEOCODER_USER_AGENT)
    #[arg(long)]
    pub geocoder_user_agent: Option<String>,

    /// Geocoding request timeout in seconds (overrides GALLERY_GEOCODER_TIMEOUT_SECS)
    #[arg(long)]
    pub geocoder_timeout_secs: Option<u64>,

    /// Largest accepted upload body in bytes (overrides GALLERY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read a numeric variable, falling back to `default` only when it is unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    pub fn merge(args: Args) -> Result<Self> {
        let env_port = env_parse("GALLERY_PORT", 10000u16)?;
        let env_timeout = env_parse("GALLERY_GEOCODER_TIMEOUT_SECS", 10u64)?;
        let env_max_upload = env_parse("GALLERY_MAX_UPLOAD_BYTES", 20 * 1024 * 1024usize)?;

        Ok(Self {
            host: args.host.unwrap_or_else(|| env_or("GALLERY_HOST", "0.0.0.0")),
            port: args.port.unwrap_or(env_port),
            storage_dir: args
                .storage_dir
                .unwrap_or_else(|| env_or("GALLERY_STORAGE_DIR", "./data/images")),
            database_url: args.database_url.unwrap_or_else(|| {
                env_or("GALLERY_DATABASE_URL", "sqlite://./data/meta/gallery.db")
            }),
            geocoder_url: args.geocoder_url.unwrap_or_else(|| {
                env_or("GALLERY_GEOCODER_URL", "https://nominatim.openstreetmap.org")
            }),
            geocoder_user_agent: args
                .geocoder_user_agent
                .unwrap_or_else(|| env_or("GALLERY_GEOCODER_USER_AGENT", "image_upload_app")),
            geocoder_timeout: Duration::from_secs(
                args.geocoder_timeout_secs.unwrap_or(env_timeout),
            ),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
