use anyhow::Context;
use reqwest::Url;
use std::collections::HashSet;
use tracing::{info, warn};

const RESEND_API_URL: &str = "https://api.resend.com/emails";
const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Process-wide settings, read once before the first invocation and never mutated.
///
/// The delivery settings stay optional here: a missing one must not stop the function from
/// starting, it only makes every send attempt fail.
#[derive(Clone)]
pub struct Config {
    pub resend_api_key: Option<String>,
    pub contact_to_email: Option<String>,
    pub contact_from_email: Option<String>,
    pub turnstile_secret: Option<String>,
    pub allowed_origins: HashSet<String>,
    pub resend_api_url: Url,
    pub turnstile_verify_url: Url,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            resend_api_key: env_var("RESEND_API_KEY"),
            contact_to_email: env_var("CONTACT_TO_EMAIL"),
            contact_from_email: env_var("CONTACT_FROM_EMAIL"),
            turnstile_secret: env_var("TURNSTILE_SECRET_KEY"),
            allowed_origins: env_var("ALLOWED_ORIGINS")
                .map(|value| parse_allowed_origins(&value))
                .unwrap_or_default(),
            resend_api_url: endpoint_url("RESEND_API_URL", RESEND_API_URL)?,
            turnstile_verify_url: endpoint_url("TURNSTILE_VERIFY_URL", TURNSTILE_VERIFY_URL)?,
        };
        config.log_disabled_features();
        Ok(config)
    }

    fn log_disabled_features(&self) {
        if self.turnstile_secret.is_none() {
            info!("TURNSTILE_SECRET_KEY not set, captcha verification is disabled");
        }
        if self.allowed_origins.is_empty() {
            warn!("ALLOWED_ORIGINS not set, cross-origin reads are blocked for every origin");
        }
        for (key, value) in [
            ("RESEND_API_KEY", &self.resend_api_key),
            ("CONTACT_TO_EMAIL", &self.contact_to_email),
            ("CONTACT_FROM_EMAIL", &self.contact_from_email),
        ] {
            if value.is_none() {
                warn!(missing = key, "{key} not set, every send attempt will fail");
            }
        }
    }
}

/// Splits a comma-separated origin list. Browsers never send a trailing slash in `Origin`, so
/// one is dropped from each entry.
pub fn parse_allowed_origins(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(String::from)
        .collect()
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn endpoint_url(key: &'static str, default: &str) -> anyhow::Result<Url> {
    let value = env_var(key);
    let url = value.as_deref().unwrap_or(default);
    Url::parse(url).with_context(|| format!("{key} is not a valid URL: {url}"))
}
