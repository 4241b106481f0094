//! Runtime configuration, sourced from the environment once at startup.
//!
//! Every knob has a default so the service starts with nothing set; a value
//! that is present but unparseable is a startup error, not a silent fallback.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::preprocessor::PreprocessOptions;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CLOUD_CONCURRENCY: usize = 16;

/// Everything the service reads from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    /// Ceiling for the raw image payload, enforced by the validator.
    pub max_upload_bytes: usize,
    pub local_timeout: Duration,
    pub cloud_timeout: Duration,
    pub local_concurrency: usize,
    pub cloud_concurrency: usize,
    pub tesseract_cmd: String,
    pub tesseract_lang: String,
    /// Explicit region for the cloud service; the ambient AWS chain (and a
    /// us-east-1 fallback) applies when unset.
    pub aws_region: Option<String>,
    /// Endpoint override for local Textract stands-ins.
    pub textract_endpoint_url: Option<String>,
    pub preprocess: PreprocessOptions,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_addr: env_parsed("BIND_ADDR", DEFAULT_BIND_ADDR.parse().expect("default addr"))?,
            max_upload_bytes: env_parsed("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            local_timeout: Duration::from_secs(env_parsed("LOCAL_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?),
            cloud_timeout: Duration::from_secs(env_parsed("CLOUD_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?),
            local_concurrency: env_parsed("LOCAL_CONCURRENCY", default_local_concurrency())?,
            cloud_concurrency: env_parsed("CLOUD_CONCURRENCY", DEFAULT_CLOUD_CONCURRENCY)?,
            tesseract_cmd: env_string("TESSERACT_CMD", "tesseract"),
            tesseract_lang: env_string("TESSERACT_LANG", "eng"),
            aws_region: env_optional("AWS_REGION_NAME"),
            textract_endpoint_url: env_optional("TEXTRACT_ENDPOINT_URL"),
            preprocess: PreprocessOptions {
                grayscale: env_bool("PREPROCESS_GRAYSCALE", true)?,
                denoise: env_bool("PREPROCESS_DENOISE", true)?,
            },
        })
    }

    /// Transport-level body cap: the validator's byte ceiling plus headroom
    /// for multipart framing, so the validator is the layer that rejects
    /// oversized images with a classified error.
    pub fn body_limit(&self) -> usize {
        self.max_upload_bytes + 1024 * 1024
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn env_bool(name: &str, default: bool) -> Result<bool> {
    match std::env::var(name) {
        Ok(raw) => parse_bool(&raw).with_context(|| format!("invalid value for {}: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("expected a boolean"),
    }
}

fn default_local_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_accepts_common_spellings() {
        for raw in ["1", "true", "TRUE", "yes", "on"] {
            assert!(parse_bool(raw).unwrap(), "{}", raw);
        }
        for raw in ["0", "false", "False", "no", "off"] {
            assert!(!parse_bool(raw).unwrap(), "{}", raw);
        }
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_default_bind_addr_parses() {
        let addr: SocketAddr = DEFAULT_BIND_ADDR.parse().unwrap();
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_body_limit_leaves_multipart_headroom() {
        let settings = Settings {
            bind_addr: DEFAULT_BIND_ADDR.parse().unwrap(),
            max_upload_bytes: 1024,
            local_timeout: Duration::from_secs(30),
            cloud_timeout: Duration::from_secs(30),
            local_concurrency: 2,
            cloud_concurrency: 2,
            tesseract_cmd: "tesseract".into(),
            tesseract_lang: "eng".into(),
            aws_region: None,
            textract_endpoint_url: None,
            preprocess: PreprocessOptions::default(),
        };
        assert!(settings.body_limit() > settings.max_upload_bytes);
    }
}
