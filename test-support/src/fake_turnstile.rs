use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;

const VERIFY_PATH: &str = "/turnstile/v0/siteverify";

/// Stands in for the Cloudflare Turnstile siteverify endpoint.
#[derive(Clone)]
pub struct FakeTurnstile {
    required_secret: Cow<'static, str>,
    required_solution: Option<String>,
    return_invalid_response: bool,
    return_server_error: bool,
    received: Arc<Mutex<Vec<VerifyRequestPayload>>>,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct VerifyRequestPayload {
    pub secret: String,
    pub response: String,
    pub remoteip: Option<String>,
}

#[derive(Serialize)]
struct VerifyResponsePayload {
    success: bool,
    #[serde(rename = "error-codes")]
    error_codes: Vec<&'static str>,
}

impl FakeTurnstile {
    pub fn new(required_secret: impl Into<Cow<'static, str>>) -> Self {
        Self {
            required_secret: required_secret.into(),
            required_solution: None,
            return_invalid_response: false,
            return_server_error: false,
            received: Default::default(),
        }
    }

    pub fn require_solution(self, required_solution: impl AsRef<str>) -> Self {
        Self {
            required_solution: Some(required_solution.as_ref().into()),
            ..self
        }
    }

    pub fn return_invalid_response(self) -> Self {
        Self {
            return_invalid_response: true,
            ..self
        }
    }

    pub fn return_server_error(self) -> Self {
        Self {
            return_server_error: true,
            ..self
        }
    }

    /// Binds to an ephemeral local port and serves in the background.
    pub async fn serve(self) -> RunningFakeTurnstile {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let received = self.received.clone();
        let app = Router::new()
            .route(VERIFY_PATH, post(verify))
            .with_state(self);
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        RunningFakeTurnstile {
            verify_url: format!("http://{address}{VERIFY_PATH}"),
            received,
        }
    }
}

pub struct RunningFakeTurnstile {
    pub verify_url: String,
    received: Arc<Mutex<Vec<VerifyRequestPayload>>>,
}

impl RunningFakeTurnstile {
    pub fn received_requests(&self) -> Vec<VerifyRequestPayload> {
        self.received.lock().unwrap().clone()
    }
}

async fn verify(
    State(state): State<FakeTurnstile>,
    Form(payload): Form<VerifyRequestPayload>,
) -> Response {
    state.received.lock().unwrap().push(payload.clone());
    if state.return_server_error {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
    }
    if state.return_invalid_response {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            "Invalid response",
        )
            .into_response();
    }
    let error_codes = if payload.secret != state.required_secret {
        vec!["invalid-input-secret"]
    } else if payload.response.is_empty() {
        vec!["missing-input-response"]
    } else if state
        .required_solution
        .as_ref()
        .is_some_and(|solution| *solution != payload.response)
    {
        vec!["invalid-input-response"]
    } else {
        vec![]
    };
    Json(VerifyResponsePayload {
        success: error_codes.is_empty(),
        error_codes,
    })
    .into_response()
}
