use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::{
    borrow::Cow,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;

const EMAILS_PATH: &str = "/emails";

/// Stands in for the Resend `POST /emails` endpoint.
#[derive(Clone)]
pub struct FakeResend {
    required_api_key: Cow<'static, str>,
    reply: Reply,
    received: Arc<Mutex<Vec<ReceivedEmail>>>,
}

#[derive(Clone)]
enum Reply {
    Id(String),
    NoId,
    InvalidBody,
    Error(StatusCode, String),
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct ReceivedEmail {
    pub from: String,
    pub to: Vec<String>,
    pub reply_to: String,
    pub subject: String,
    pub text: String,
}

impl FakeResend {
    pub fn new(required_api_key: impl Into<Cow<'static, str>>) -> Self {
        Self {
            required_api_key: required_api_key.into(),
            reply: Reply::Id("fake-message-id".into()),
            received: Default::default(),
        }
    }

    pub fn respond_with_id(self, id: impl AsRef<str>) -> Self {
        Self {
            reply: Reply::Id(id.as_ref().into()),
            ..self
        }
    }

    pub fn respond_without_id(self) -> Self {
        Self {
            reply: Reply::NoId,
            ..self
        }
    }

    pub fn respond_with_invalid_body(self) -> Self {
        Self {
            reply: Reply::InvalidBody,
            ..self
        }
    }

    pub fn respond_with_error(self, status: u16, message: impl AsRef<str>) -> Self {
        Self {
            reply: Reply::Error(
                StatusCode::from_u16(status).unwrap(),
                message.as_ref().into(),
            ),
            ..self
        }
    }

    /// Binds to an ephemeral local port and serves in the background.
    pub async fn serve(self) -> RunningFakeResend {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let received = self.received.clone();
        let app = Router::new()
            .route(EMAILS_PATH, post(send_email))
            .with_state(self);
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        RunningFakeResend {
            api_url: format!("http://{address}{EMAILS_PATH}"),
            received,
        }
    }
}

pub struct RunningFakeResend {
    pub api_url: String,
    received: Arc<Mutex<Vec<ReceivedEmail>>>,
}

impl RunningFakeResend {
    pub fn received_emails(&self) -> Vec<ReceivedEmail> {
        self.received.lock().unwrap().clone()
    }

    pub fn last_email(&self) -> Option<ReceivedEmail> {
        self.received.lock().unwrap().last().cloned()
    }
}

async fn send_email(
    State(state): State<FakeResend>,
    headers: HeaderMap,
    Json(payload): Json<ReceivedEmail>,
) -> Response {
    state.received.lock().unwrap().push(payload);
    let expected_authorization = format!("Bearer {}", state.required_api_key);
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    if authorization != Some(expected_authorization.as_str()) {
        return error_response(StatusCode::UNAUTHORIZED, "API key is invalid");
    }
    match state.reply {
        Reply::Id(id) => Json(json!({ "id": id })).into_response(),
        Reply::NoId => Json(json!({})).into_response(),
        Reply::InvalidBody => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            "Queued",
        )
            .into_response(),
        Reply::Error(status, message) => error_response(status, &message),
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({
            "statusCode": status.as_u16(),
            "name": "validation_error",
            "message": message,
        })),
    )
        .into_response()
}
