use crate::validation::{utf16_len, ContactSubmission};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const DEFAULT_SUBJECT: &str = "New contact form message";
const SUBJECT_TAG: &str = "[Contact]";

/// Relays validated submissions through the Resend transactional email API.
pub struct MailRelay {
    client: Client,
    api_key: Option<String>,
    to_address: Option<String>,
    from_address: Option<String>,
    api_url: Url,
}

/// Body of `POST /emails`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EmailPayload {
    pub from: String,
    pub to: Vec<String>,
    pub reply_to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Deserialize)]
struct SendEmailResponse {
    id: Option<String>,
}

impl EmailPayload {
    pub fn new(submission: &ContactSubmission, from_address: &str, to_address: &str) -> Self {
        let subject = if submission.subject.is_empty() {
            DEFAULT_SUBJECT
        } else {
            submission.subject.as_str()
        };
        let ContactSubmission {
            name,
            email,
            message,
            ..
        } = submission;
        let phone = submission.phone.as_deref().unwrap_or("-");
        let text = format!(
            "New contact form submission\n\
             \n\
             Name: {name}\n\
             Email: {email}\n\
             Phone: {phone}\n\
             Subject: {subject}\n\
             \n\
             Message:\n\
             {message}\n"
        );
        Self {
            from: from_address.into(),
            to: vec![to_address.into()],
            // Replies go straight to the sender rather than to our noreply address.
            reply_to: email.clone(),
            subject: format!("{SUBJECT_TAG} {subject}"),
            text,
        }
    }
}

impl MailRelay {
    pub fn new(
        client: Client,
        api_key: Option<String>,
        to_address: Option<String>,
        from_address: Option<String>,
        api_url: Url,
    ) -> Self {
        Self {
            client,
            api_key,
            to_address,
            from_address,
            api_url,
        }
    }

    /// Sends one email and returns the id Resend assigned to it, if it reported one.
    pub async fn send(&self, submission: &ContactSubmission) -> Result<Option<String>, RelayError> {
        let api_key = required(&self.api_key, "RESEND_API_KEY")?;
        let to_address = required(&self.to_address, "CONTACT_TO_EMAIL")?;
        let from_address = required(&self.from_address, "CONTACT_FROM_EMAIL")?;
        let payload = EmailPayload::new(submission, from_address, to_address);
        info!(
            to = to_address,
            from = from_address,
            reply_to = %submission.masked_email(),
            subject = %payload.subject,
            text_len = utf16_len(&payload.text),
            "contact.sending_email"
        );

        let response = self
            .client
            .post(self.api_url.clone())
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(RelayError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|error| format!("(unreadable response body: {error})"));
            return Err(RelayError::Rejected { status, message });
        }
        match response.json::<SendEmailResponse>().await {
            Ok(body) => Ok(body.id),
            Err(error) => {
                // The provider accepted the message, so the sender must not be told it failed.
                warn!(%error, "contact.resend_unreadable_response");
                Ok(None)
            }
        }
    }
}

fn required<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, RelayError> {
    value.as_deref().ok_or(RelayError::MissingConfig(key))
}

#[derive(Debug)]
pub enum RelayError {
    MissingConfig(&'static str),
    Transport(reqwest::Error),
    Rejected { status: StatusCode, message: String },
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::MissingConfig(key) => write!(f, "Missing configuration {key}"),
            RelayError::Transport(error) => write!(f, "Could not reach Resend: {error}"),
            RelayError::Rejected { status, message } => {
                write!(f, "Resend error {status}: {message}")
            }
        }
    }
}

impl std::error::Error for RelayError {}
