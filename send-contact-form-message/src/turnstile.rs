use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Server-side check of Cloudflare Turnstile tokens.
pub struct CaptchaVerifier {
    client: Client,
    secret: Option<String>,
    verify_url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptchaOutcome {
    /// No secret is configured, so verification is switched off.
    Skipped,
    Accepted,
    Rejected(String),
}

impl CaptchaVerifier {
    pub fn new(client: Client, secret: Option<String>, verify_url: Url) -> Self {
        Self {
            client,
            secret,
            verify_url,
        }
    }

    /// Errors are reserved for failing to get an answer from Turnstile. They must fail the request
    /// rather than let it through.
    pub async fn verify(
        &self,
        token: &str,
        client_ip: Option<&str>,
    ) -> Result<CaptchaOutcome, CaptchaError> {
        let Some(secret) = self.secret.as_deref() else {
            info!("contact.captcha_skipped");
            return Ok(CaptchaOutcome::Skipped);
        };
        if token.is_empty() {
            return Ok(CaptchaOutcome::Rejected("missing token".into()));
        }
        let payload = TurnstileVerifyPayload {
            secret,
            response: token,
            remoteip: client_ip,
        };
        let response = self.send_token(&payload).await?;
        Self::process_response(response).await
    }

    async fn send_token(
        &self,
        payload: &TurnstileVerifyPayload<'_>,
    ) -> Result<Response, CaptchaError> {
        self.client
            .post(self.verify_url.clone())
            .form(payload)
            .send()
            .await
            .map_err(CaptchaError::Transport)
    }

    async fn process_response(response: Response) -> Result<CaptchaOutcome, CaptchaError> {
        let status = response.status();
        if !status.is_success() {
            return Err(CaptchaError::UnexpectedStatus(status));
        }
        let response_body: TurnstileResponse = response
            .json()
            .await
            .map_err(CaptchaError::InvalidResponse)?;
        if response_body.success {
            Ok(CaptchaOutcome::Accepted)
        } else if response_body.error_codes.is_empty() {
            Ok(CaptchaOutcome::Rejected("unspecified".into()))
        } else {
            Ok(CaptchaOutcome::Rejected(response_body.error_codes.join(", ")))
        }
    }
}

#[derive(Serialize)]
struct TurnstileVerifyPayload<'a> {
    secret: &'a str,
    response: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remoteip: Option<&'a str>,
}

#[derive(Deserialize)]
struct TurnstileResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

#[derive(Debug)]
pub enum CaptchaError {
    Transport(reqwest::Error),
    UnexpectedStatus(StatusCode),
    InvalidResponse(reqwest::Error),
}

impl std::fmt::Display for CaptchaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptchaError::Transport(error) => write!(f, "Could not reach Turnstile: {error}"),
            CaptchaError::UnexpectedStatus(status) => {
                write!(f, "Turnstile responded with status {status}")
            }
            CaptchaError::InvalidResponse(error) => {
                write!(f, "Could not read Turnstile response: {error}")
            }
        }
    }
}

impl std::error::Error for CaptchaError {}
