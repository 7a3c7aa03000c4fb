use crate::validation::ContactFormMessage;
use lambda_http::{http::HeaderMap, Body, Request, RequestExt};
use serde_json::Value;
use std::fmt::Display;
use uuid::Uuid;

/// What the handler needs to know about the caller, independent of the submitted form.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMetadata {
    pub request_id: String,
    pub origin: Option<String>,
    pub client_ip: Option<String>,
}

impl RequestMetadata {
    pub fn from_request(event: &Request) -> Self {
        let request_id = event
            .lambda_context_ref()
            .map(|context| context.request_id.clone())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            request_id,
            origin: header_str(event.headers(), "origin").map(String::from),
            client_ip: client_ip(event.headers()).map(String::from),
        }
    }
}

// Netlify's edge header first, then the proxy chain as set by API Gateway and function URLs.
fn client_ip(headers: &HeaderMap) -> Option<&str> {
    header_str(headers, "x-nf-client-connection-ip")
        .or_else(|| {
            header_str(headers, "x-forwarded-for")
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        })
        .or_else(|| header_str(headers, "client-ip"))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Reads the form from the raw request body. An empty body counts as an empty object.
pub fn parse_message(body: &Body) -> Result<ContactFormMessage, BodyError> {
    let text = match body {
        Body::Empty => "",
        Body::Text(text) => text.as_str(),
        Body::Binary(bytes) => std::str::from_utf8(bytes).map_err(BodyError::NotUtf8)?,
    };
    if text.is_empty() {
        return Ok(ContactFormMessage::default());
    }
    match serde_json::from_str(text).map_err(BodyError::Malformed)? {
        object @ Value::Object(_) => serde_json::from_value(object).map_err(BodyError::Malformed),
        _ => Err(BodyError::NotAnObject),
    }
}

#[derive(Debug)]
pub enum BodyError {
    NotUtf8(std::str::Utf8Error),
    Malformed(serde_json::Error),
    NotAnObject,
}

impl Display for BodyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BodyError::NotUtf8(error) => write!(f, "Body is not UTF-8: {error}"),
            BodyError::Malformed(error) => write!(f, "Body is not valid JSON: {error}"),
            BodyError::NotAnObject => write!(f, "Body is not a JSON object"),
        }
    }
}

impl std::error::Error for BodyError {}
