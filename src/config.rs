use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

const MAX_PRESIGN_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Which object store the gateway talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Remote S3-compatible store via aws-sdk-s3.
    S3,
    /// Process-local store, for development.
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown backend `{other}` (expected `s3` or `memory`)"),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub region: String,
    pub default_bucket: String,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub presign_expiry: Duration,
    pub page_size: i32,
    pub max_upload_bytes: usize,
    pub spool_dir: PathBuf,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "REST gateway over an S3-compatible object store")]
pub struct Args {
    /// Host to bind to (overrides GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store backend (overrides GATEWAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Storage region (overrides GATEWAY_REGION / AWS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Bucket used when a request names none (overrides GATEWAY_DEFAULT_BUCKET / S3_BUCKET_NAME)
    #[arg(long)]
    pub default_bucket: Option<String>,

    /// Custom S3 endpoint, e.g. a MinIO URL (overrides GATEWAY_ENDPOINT_URL)
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Use path-style bucket addressing (overrides GATEWAY_FORCE_PATH_STYLE)
    #[arg(long)]
    pub force_path_style: bool,

    /// Presigned URL validity in seconds (overrides GATEWAY_PRESIGN_EXPIRY_SECS)
    #[arg(long)]
    pub presign_expiry_secs: Option<u64>,

    /// Entries per listing page (overrides GATEWAY_PAGE_SIZE)
    #[arg(long)]
    pub page_size: Option<i32>,

    /// Largest accepted upload request body in bytes (overrides GATEWAY_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Directory for upload temp files (overrides GATEWAY_SPOOL_DIR)
    #[arg(long)]
    pub spool_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Parse CLI args and the process environment into an AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |name| env::var(name).ok())
    }

    /// Merge CLI args over environment values (looked up through `env`) over defaults.
    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |name: &str| env(name).filter(|v| !v.is_empty());

        let host = match args.host {
            Some(host) => host,
            None => lookup("GATEWAY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
        };
        let port = match args.port {
            Some(port) => port,
            None => parse_env(&env, "GATEWAY_PORT")?.unwrap_or(3000),
        };
        let backend = match args.backend {
            Some(backend) => backend,
            None => parse_env(&env, "GATEWAY_BACKEND")?.unwrap_or(Backend::S3),
        };

        let region = args
            .region
            .or(lookup("GATEWAY_REGION"))
            .or(lookup("AWS_REGION"));
        let region = match (region, backend) {
            (Some(region), _) => region,
            (None, Backend::Memory) => "local".into(),
            (None, Backend::S3) => {
                bail!("storage region is required (--region, GATEWAY_REGION or AWS_REGION)")
            }
        };

        let default_bucket = args
            .default_bucket
            .or(lookup("GATEWAY_DEFAULT_BUCKET"))
            .or(lookup("S3_BUCKET_NAME"))
            .context("default bucket is required (--default-bucket or GATEWAY_DEFAULT_BUCKET)")?;

        let endpoint_url = args.endpoint_url.or(lookup("GATEWAY_ENDPOINT_URL"));
        let force_path_style = args.force_path_style
            || parse_env::<bool>(&env, "GATEWAY_FORCE_PATH_STYLE")?.unwrap_or(false);

        let presign_expiry_secs = match args.presign_expiry_secs {
            Some(secs) => secs,
            None => parse_env(&env, "GATEWAY_PRESIGN_EXPIRY_SECS")?.unwrap_or(3600),
        };
        if presign_expiry_secs == 0 || presign_expiry_secs > MAX_PRESIGN_EXPIRY_SECS {
            bail!("presign expiry must be between 1 and {MAX_PRESIGN_EXPIRY_SECS} seconds");
        }

        let page_size = match args.page_size {
            Some(size) => size,
            None => parse_env(&env, "GATEWAY_PAGE_SIZE")?.unwrap_or(100),
        };

        let max_upload_bytes = match args.max_upload_bytes {
            Some(bytes) => bytes,
            None => {
                parse_env(&env, "GATEWAY_MAX_UPLOAD_BYTES")?.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES)
            }
        };

        let spool_dir = args
            .spool_dir
            .or_else(|| lookup("GATEWAY_SPOOL_DIR").map(PathBuf::from))
            .unwrap_or_else(env::temp_dir);

        Ok(Self {
            host,
            port,
            backend,
            region,
            default_bucket,
            endpoint_url,
            force_path_style,
            presign_expiry: Duration::from_secs(presign_expiry_secs),
            page_size: page_size.clamp(1, 1000),
            max_upload_bytes,
            spool_dir,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env(name).filter(|v| !v.is_empty()) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("parsing {name} value `{value}`: {err}")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_from_environment() {
        let cfg = AppConfig::resolve(
            Args::default(),
            env_of(&[("AWS_REGION", "eu-west-1"), ("S3_BUCKET_NAME", "uploads")]),
        )
        .unwrap();

        assert_eq!(cfg.addr(), "0.0.0.0:3000");
        assert_eq!(cfg.backend, Backend::S3);
        assert_eq!(cfg.region, "eu-west-1");
        assert_eq!(cfg.default_bucket, "uploads");
        assert_eq!(cfg.presign_expiry, Duration::from_secs(3600));
        assert_eq!(cfg.page_size, 100);
        assert!(!cfg.force_path_style);
        assert_eq!(cfg.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(cfg.spool_dir, env::temp_dir());
    }

    #[test]
    fn args_override_environment() {
        let args = Args {
            port: Some(8080),
            region: Some("us-east-2".into()),
            page_size: Some(5000),
            ..Args::default()
        };
        let cfg = AppConfig::resolve(
            args,
            env_of(&[
                ("GATEWAY_PORT", "9000"),
                ("GATEWAY_REGION", "eu-west-1"),
                ("GATEWAY_DEFAULT_BUCKET", "main"),
                ("GATEWAY_FORCE_PATH_STYLE", "true"),
                ("GATEWAY_SPOOL_DIR", "/var/spool/gateway"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.region, "us-east-2");
        assert_eq!(cfg.page_size, 1000);
        assert!(cfg.force_path_style);
        assert_eq!(cfg.spool_dir, PathBuf::from("/var/spool/gateway"));
    }

    #[test]
    fn s3_backend_requires_region() {
        let err = AppConfig::resolve(Args::default(), env_of(&[("S3_BUCKET_NAME", "b")]))
            .unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn memory_backend_needs_no_region() {
        let cfg = AppConfig::resolve(
            Args::default(),
            env_of(&[("GATEWAY_BACKEND", "memory"), ("GATEWAY_DEFAULT_BUCKET", "dev")]),
        )
        .unwrap();
        assert_eq!(cfg.backend, Backend::Memory);
        assert_eq!(cfg.region, "local");
    }

    #[test]
    fn bad_numbers_are_errors() {
        let err = AppConfig::resolve(
            Args::default(),
            env_of(&[
                ("AWS_REGION", "eu-west-1"),
                ("S3_BUCKET_NAME", "b"),
                ("GATEWAY_PORT", "http"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("GATEWAY_PORT"));
    }
}
