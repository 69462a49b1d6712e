use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub output_dir: PathBuf,
    pub model: String,
    pub request_delay_secs: u64,
    pub digest_max_jobs: usize,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // .env is optional

        Ok(Config {
            output_dir: PathBuf::from(env_or("JOBWATCH_OUTPUT_DIR", "data")),
            model: env_or("JOBWATCH_MODEL", "deepseek-chat"),
            request_delay_secs: env_or("JOBWATCH_REQUEST_DELAY_SECS", "1")
                .parse()
                .context("JOBWATCH_REQUEST_DELAY_SECS must be a whole number of seconds")?,
            digest_max_jobs: env_or("JOBWATCH_DIGEST_MAX_JOBS", "5")
                .parse()
                .context("JOBWATCH_DIGEST_MAX_JOBS must be a non-negative integer")?,
            rust_log: env_or("RUST_LOG", "info"),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
