use lambda_http::{
    http::{header, response::Builder, StatusCode},
    Body, Error, Response,
};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

const ALLOWED_METHODS: &str = "POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type";
/// Sent instead of the caller's origin when it is not on the allow-list, so browsers refuse to
/// expose the response.
const DISALLOWED_ORIGIN: &str = "null";

/// Builds every response of one request with the CORS headers its `Origin` calls for.
pub struct ResponseBuilder {
    allow_origin: String,
}

#[derive(Serialize, Debug)]
pub struct ErrorBody<'a> {
    pub error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'a str>,
}

impl<'a> ErrorBody<'a> {
    pub fn new(error: &'a str) -> Self {
        Self {
            error,
            reason: None,
        }
    }

    pub fn with_reason(error: &'a str, reason: &'a str) -> Self {
        Self {
            error,
            reason: Some(reason),
        }
    }
}

impl ResponseBuilder {
    pub fn for_origin(origin: Option<&str>, allowed_origins: &HashSet<String>) -> Self {
        let allow_origin = match origin {
            Some(origin) if allowed_origins.contains(origin) => origin,
            _ => DISALLOWED_ORIGIN,
        };
        Self {
            allow_origin: allow_origin.into(),
        }
    }

    pub fn allow_origin(&self) -> &str {
        &self.allow_origin
    }

    pub fn preflight(&self) -> Result<Response<Body>, Error> {
        self.log(StatusCode::NO_CONTENT);
        Ok(self.builder(StatusCode::NO_CONTENT).body(Body::Empty)?)
    }

    pub fn json(&self, status: StatusCode, body: &impl Serialize) -> Result<Response<Body>, Error> {
        self.json_with(self.builder(status), status, body)
    }

    pub fn method_not_allowed(&self) -> Result<Response<Body>, Error> {
        let status = StatusCode::METHOD_NOT_ALLOWED;
        self.json_with(
            self.builder(status).header(header::ALLOW, ALLOWED_METHODS),
            status,
            &ErrorBody::new("Method Not Allowed"),
        )
    }

    fn json_with(
        &self,
        builder: Builder,
        status: StatusCode,
        body: &impl Serialize,
    ) -> Result<Response<Body>, Error> {
        let body = serde_json::to_string(body)?;
        self.log(status);
        Ok(builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())?)
    }

    fn builder(&self, status: StatusCode) -> Builder {
        Response::builder()
            .status(status)
            .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.as_str())
            .header(header::VARY, "Origin")
            .header(header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS)
            .header(header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS)
    }

    fn log(&self, status: StatusCode) {
        info!(
            status = status.as_u16(),
            allow_origin = self.allow_origin(),
            "contact.response"
        );
    }
}
