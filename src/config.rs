use crate::{errors::ConfigError, models::dimensions::BoundingBox};
use clap::Parser;
use std::{env, str::FromStr};

const ENV_HOST: &str = "THUMBNAILER_HOST";
const ENV_PORT: &str = "THUMBNAILER_PORT";
const ENV_STORAGE_DIR: &str = "THUMBNAILER_STORAGE_DIR";
const ENV_DATABASE_URL: &str = "THUMBNAILER_DATABASE_URL";
const ENV_ORIGINALS: &str = "THUMBNAILER_ORIGINALS_FOLDER";
const ENV_THUMBNAILS: &str = "THUMBNAILER_THUMBNAILS_FOLDER";
const ENV_MAX_WIDTH: &str = "THUMBNAILER_MAX_WIDTH";
const ENV_MAX_HEIGHT: &str = "THUMBNAILER_MAX_HEIGHT";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Container holding uploaded originals; also the token replaced in URLs.
    pub originals_folder: String,
    /// Container receiving thumbnails.
    pub thumbnails_folder: String,
    pub thumbnail_bounds: BoundingBox,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Event-driven image thumbnail worker")]
pub struct Args {
    /// Host to bind to (overrides THUMBNAILER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides THUMBNAILER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blob payloads are stored (overrides THUMBNAILER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Blob metadata database URL (overrides THUMBNAILER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Container of uploaded originals (overrides THUMBNAILER_ORIGINALS_FOLDER)
    #[arg(long)]
    pub originals_folder: Option<String>,

    /// Container for generated thumbnails (overrides THUMBNAILER_THUMBNAILS_FOLDER)
    #[arg(long)]
    pub thumbnails_folder: Option<String>,

    /// Maximum thumbnail width in pixels (overrides THUMBNAILER_MAX_WIDTH)
    #[arg(long)]
    pub max_width: Option<u32>,

    /// Maximum thumbnail height in pixels (overrides THUMBNAILER_MAX_HEIGHT)
    #[arg(long)]
    pub max_height: Option<u32>,

    /// Apply the blob metadata schema and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool), ConfigError> {
        let args = Args::parse();
        let migrate = args.migrate;
        let cfg = Self::from_sources(args, |key| env::var(key).ok())?;
        Ok((cfg, migrate))
    }

    /// Merge CLI arguments over values looked up with `env`, then validate.
    pub fn from_sources(
        args: Args,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let host = args
            .host
            .or_else(|| env(ENV_HOST))
            .unwrap_or_else(|| "0.0.0.0".into());
        let port = pick(args.port, &env, ENV_PORT, 7071)?;
        let storage_dir = args
            .storage_dir
            .or_else(|| env(ENV_STORAGE_DIR))
            .unwrap_or_else(|| "./data/blobs".into());
        let database_url = args
            .database_url
            .or_else(|| env(ENV_DATABASE_URL))
            .unwrap_or_else(|| "sqlite://./data/meta/blobs.db".into());

        let originals_folder = required(args.originals_folder, &env, ENV_ORIGINALS)?;
        let thumbnails_folder = required(args.thumbnails_folder, &env, ENV_THUMBNAILS)?;
        if originals_folder == thumbnails_folder {
            return Err(ConfigError::SameFolders(originals_folder));
        }

        let max_width = pick(args.max_width, &env, ENV_MAX_WIDTH, BoundingBox::DEFAULT_EDGE)?;
        let max_height = pick(args.max_height, &env, ENV_MAX_HEIGHT, BoundingBox::DEFAULT_EDGE)?;

        Ok(Self {
            host,
            port,
            storage_dir,
            database_url,
            originals_folder,
            thumbnails_folder,
            thumbnail_bounds: BoundingBox::new(max_width, max_height)?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// CLI value, else parsed env value, else `default`.
fn pick<T>(
    arg: Option<T>,
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(value) = arg {
        return Ok(value);
    }
    match env(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|err| ConfigError::Invalid {
            name: key,
            value: raw.clone(),
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}

fn required(
    arg: Option<String>,
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    arg.or_else(|| env(key))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(key))
}
