use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::{fmt::Display, sync::OnceLock};

/// Upper bound on the message length, counted in UTF-16 code units as the browser form counts.
pub const MAX_MESSAGE_LENGTH: usize = 5000;

/// Length in UTF-16 code units, the unit used for every length this crate checks or logs.
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

/// The fields as posted by the contact form, each read through [`lenient_text`].
#[derive(Deserialize, Debug, Default)]
pub struct ContactFormMessage {
    #[serde(default, deserialize_with = "lenient_text")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    email: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    message: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    subject: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    website: Option<String>,
    #[serde(
        rename = "captchaToken",
        alias = "cf-turnstile-response",
        default,
        deserialize_with = "lenient_text"
    )]
    captcha_token: Option<String>,
}

/// Accepts any JSON value for a form field. `null`, `false` and `0` count as absent, other
/// scalars become their text form, and arrays or objects their JSON text.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some("true".into()),
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

/// A submission which passed validation. All fields are trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactSubmission {
    pub name: String,
    pub email: String,
    pub message: String,
    /// Empty when the sender left it blank.
    pub subject: String,
    pub phone: Option<String>,
    /// Empty when the form did not include a captcha widget.
    pub captcha_token: String,
}

pub type ValidationResult = Result<ContactSubmission, ValidationFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    MissingFields,
    InvalidEmail,
    MessageTooLong,
}

impl ContactFormMessage {
    /// The hidden `website` field is invisible to people, so anything in it came from a bot.
    pub fn is_honeypot_filled(&self) -> bool {
        !trimmed(&self.website).is_empty()
    }

    pub fn validate(&self) -> ValidationResult {
        let name = trimmed(&self.name);
        let email = trimmed(&self.email);
        let message = trimmed(&self.message);
        if name.is_empty() || email.is_empty() || message.is_empty() {
            return Err(ValidationFailure::MissingFields);
        }
        if !is_valid_email(email) {
            return Err(ValidationFailure::InvalidEmail);
        }
        if utf16_len(message) > MAX_MESSAGE_LENGTH {
            return Err(ValidationFailure::MessageTooLong);
        }
        let phone = trimmed(&self.phone);
        Ok(ContactSubmission {
            name: name.into(),
            email: email.into(),
            message: message.into(),
            subject: trimmed(&self.subject).into(),
            phone: (!phone.is_empty()).then(|| phone.into()),
            captcha_token: trimmed(&self.captcha_token).into(),
        })
    }
}

impl ContactSubmission {
    /// Enough of the address to correlate log lines without recording it. Counts characters,
    /// so a prefix never splits one.
    pub fn masked_email(&self) -> String {
        mask_email(&self.email)
    }
}

impl ValidationFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationFailure::MissingFields => "missing_fields",
            ValidationFailure::InvalidEmail => "invalid_email",
            ValidationFailure::MessageTooLong => "message_too_long",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ValidationFailure::MissingFields => "Missing required fields: name, email, message",
            ValidationFailure::InvalidEmail => "Invalid email format",
            ValidationFailure::MessageTooLong => "Message too long",
        }
    }
}

impl Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl std::error::Error for ValidationFailure {}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX
        .get_or_init(|| Regex::new(EMAIL_PATTERN).unwrap())
        .is_match(email)
}

fn mask_email(email: &str) -> String {
    match email.find('@') {
        Some(at) if email[..at].chars().count() > 1 => {
            let prefix: String = email.chars().take(2).collect();
            format!("{prefix}***{}", &email[at..])
        }
        _ => "***".into(),
    }
}

fn trimmed(field: &Option<String>) -> &str {
    field.as_deref().unwrap_or_default().trim()
}
