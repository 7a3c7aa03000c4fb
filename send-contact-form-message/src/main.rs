mod config;
mod request;
mod resend;
mod response;
mod turnstile;
mod validation;

use config::Config;
use lambda_http::{
    http::{Method, StatusCode},
    run, service_fn, Body, Error, Request, Response,
};
use request::{parse_message, BodyError, RequestMetadata};
use resend::{MailRelay, RelayError};
use response::{ErrorBody, ResponseBuilder};
use serde_json::json;
use tracing::{error, info, info_span, warn, Instrument};
use turnstile::{CaptchaError, CaptchaOutcome, CaptchaVerifier};
use validation::{utf16_len, ContactSubmission, ValidationFailure};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env()?;
    let handler = ContactFormMessageHandler::new(config);
    run(service_fn(|event| handler.handle(event))).await
}

struct ContactFormMessageHandler {
    config: Config,
    captcha_verifier: CaptchaVerifier,
    mail_relay: MailRelay,
}

enum Delivery {
    Sent(Option<String>),
    /// The honeypot caught a bot. It is told the message went out.
    Discarded,
}

impl ContactFormMessageHandler {
    fn new(config: Config) -> Self {
        let client = reqwest::Client::new();
        Self {
            captcha_verifier: CaptchaVerifier::new(
                client.clone(),
                config.turnstile_secret.clone(),
                config.turnstile_verify_url.clone(),
            ),
            mail_relay: MailRelay::new(
                client,
                config.resend_api_key.clone(),
                config.contact_to_email.clone(),
                config.contact_from_email.clone(),
                config.resend_api_url.clone(),
            ),
            config,
        }
    }

    async fn handle(&self, event: Request) -> Result<Response<Body>, Error> {
        let metadata = RequestMetadata::from_request(&event);
        let span = info_span!("contact", req_id = %metadata.request_id);
        self.respond(event, metadata).instrument(span).await
    }

    async fn respond(
        &self,
        event: Request,
        metadata: RequestMetadata,
    ) -> Result<Response<Body>, Error> {
        info!(
            method = %event.method(),
            origin = metadata.origin.as_deref().unwrap_or_default(),
            ip = metadata.client_ip.as_deref().unwrap_or_default(),
            path = event.uri().path(),
            "contact.request"
        );
        let responder =
            ResponseBuilder::for_origin(metadata.origin.as_deref(), &self.config.allowed_origins);
        if event.method() == Method::OPTIONS {
            return responder.preflight();
        }
        match self.process_message(&event, &metadata).await {
            Ok(Delivery::Sent(id)) => {
                responder.json(StatusCode::OK, &json!({ "success": true, "id": id }))
            }
            Ok(Delivery::Discarded) => responder.json(StatusCode::OK, &json!({ "success": true })),
            Err(error) => {
                error.log();
                error.into_response(&responder)
            }
        }
    }

    async fn process_message(
        &self,
        event: &Request,
        metadata: &RequestMetadata,
    ) -> Result<Delivery, ContactFormError> {
        if event.method() != Method::POST {
            return Err(ClientError::MethodNotAllowed(event.method().clone()).into());
        }
        let message = parse_message(event.body()).map_err(ClientError::InvalidJson)?;
        if message.is_honeypot_filled() {
            warn!(
                ip = metadata.client_ip.as_deref().unwrap_or_default(),
                origin = metadata.origin.as_deref().unwrap_or_default(),
                "contact.honeypot_hit"
            );
            return Ok(Delivery::Discarded);
        }
        let submission = message.validate().map_err(ClientError::Validation)?;
        info!(
            name_len = utf16_len(&submission.name),
            email_masked = %submission.masked_email(),
            subject_len = utf16_len(&submission.subject),
            message_len = utf16_len(&submission.message),
            "contact.received"
        );
        self.verify_captcha(&submission, metadata).await?;
        let id = self.mail_relay.send(&submission).await?;
        info!(id = id.as_deref().unwrap_or_default(), "contact.sent");
        Ok(Delivery::Sent(id))
    }

    async fn verify_captcha(
        &self,
        submission: &ContactSubmission,
        metadata: &RequestMetadata,
    ) -> Result<(), ContactFormError> {
        match self
            .captcha_verifier
            .verify(&submission.captcha_token, metadata.client_ip.as_deref())
            .await?
        {
            CaptchaOutcome::Skipped | CaptchaOutcome::Accepted => Ok(()),
            CaptchaOutcome::Rejected(reason) => Err(ClientError::CaptchaRejected(reason).into()),
        }
    }
}

#[derive(Debug)]
enum ContactFormError {
    ClientError(ClientError),
    /// A required delivery setting is absent. Only ever reported to the caller as a failed send.
    ConfigError(&'static str),
    ProviderError(ProviderError),
}

#[derive(Debug)]
enum ClientError {
    MethodNotAllowed(Method),
    InvalidJson(BodyError),
    Validation(ValidationFailure),
    CaptchaRejected(String),
}

#[derive(Debug)]
enum ProviderError {
    Captcha(CaptchaError),
    Mail(RelayError),
}

impl ContactFormError {
    fn log(&self) {
        match self {
            ContactFormError::ClientError(ClientError::Validation(failure)) => {
                warn!(reason = failure.reason(), "contact.validation_failed");
            }
            ContactFormError::ClientError(ClientError::CaptchaRejected(reason)) => {
                warn!(%reason, "contact.captcha_rejected");
            }
            ContactFormError::ClientError(error) => {
                warn!(%error, "contact.client_error");
            }
            ContactFormError::ConfigError(missing) => {
                error!(missing, "contact.missing_config");
            }
            ContactFormError::ProviderError(ProviderError::Mail(RelayError::Rejected {
                status,
                message,
            })) => {
                error!(
                    status = status.as_u16(),
                    text_error = %message,
                    "contact.resend_error"
                );
            }
            ContactFormError::ProviderError(error) => {
                error!(%error, "contact.provider_error");
            }
        }
    }

    /// Provider and configuration details stay in the log; the caller only sees a generic error.
    fn into_response(self, responder: &ResponseBuilder) -> Result<Response<Body>, Error> {
        match self {
            ContactFormError::ClientError(ClientError::MethodNotAllowed(_)) => {
                responder.method_not_allowed()
            }
            ContactFormError::ClientError(ClientError::InvalidJson(_)) => {
                responder.json(StatusCode::BAD_REQUEST, &ErrorBody::new("Invalid JSON"))
            }
            ContactFormError::ClientError(ClientError::Validation(failure)) => responder.json(
                StatusCode::BAD_REQUEST,
                &ErrorBody::with_reason(failure.description(), failure.reason()),
            ),
            ContactFormError::ClientError(ClientError::CaptchaRejected(_)) => {
                responder.json(StatusCode::BAD_REQUEST, &ErrorBody::new("Captcha failed"))
            }
            ContactFormError::ConfigError(_)
            | ContactFormError::ProviderError(ProviderError::Mail(_)) => responder.json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorBody::new("Email send failed"),
            ),
            ContactFormError::ProviderError(ProviderError::Captcha(_)) => responder.json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &ErrorBody::new("Captcha verification failed"),
            ),
        }
    }
}

impl From<ClientError> for ContactFormError {
    fn from(error: ClientError) -> Self {
        ContactFormError::ClientError(error)
    }
}

impl From<CaptchaError> for ContactFormError {
    fn from(error: CaptchaError) -> Self {
        ContactFormError::ProviderError(ProviderError::Captcha(error))
    }
}

impl From<RelayError> for ContactFormError {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::MissingConfig(key) => ContactFormError::ConfigError(key),
            error => ContactFormError::ProviderError(ProviderError::Mail(error)),
        }
    }
}

impl std::fmt::Display for ContactFormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactFormError::ClientError(error) => write!(f, "Client error: {error}"),
            ContactFormError::ConfigError(key) => write!(f, "Missing configuration {key}"),
            ContactFormError::ProviderError(error) => write!(f, "Provider error: {error}"),
        }
    }
}

impl std::error::Error for ContactFormError {}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::MethodNotAllowed(method) => write!(f, "Method {method} not allowed"),
            ClientError::InvalidJson(error) => write!(f, "{error}"),
            ClientError::Validation(failure) => write!(f, "{failure}"),
            ClientError::CaptchaRejected(reason) => write!(f, "Captcha rejected: {reason}"),
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::Captcha(error) => write!(f, "{error}"),
            ProviderError::Mail(error) => write!(f, "{error}"),
        }
    }
}
