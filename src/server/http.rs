/*
 * Copyright 2022 Jordan Matelsky
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! An HTTP transport for a [`Server`].
//!
//! Handlers only parse requests and format replies. Backend calls are blocking, so they run on
//! the blocking thread pool. The index reads the clock directly and never waits on the server
//! lock.
//!
//! [`Server`]: crate::server::Server

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use tracing::error;

use super::{
    Envelope, Reply, ReplyStatus, Server, ServerInfo, ADMIN_KEY_HEADER,
    PROJECT_CREATION_SECRET_HEADER, USER_KEY_HEADER,
};
use crate::backend::Backend;
use crate::clock::Clock;
use crate::project::Credentials;

type SharedServer<B> = Arc<Mutex<Server<B>>>;

#[derive(Debug)]
struct ApiState<B> {
    server: SharedServer<B>,
    clock: Arc<dyn Clock>,
}

impl<B> Clone for ApiState<B> {
    fn clone(&self) -> Self {
        ApiState {
            server: Arc::clone(&self.server),
            clock: Arc::clone(&self.clock),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<String>,
}

/// Return a router which serves the API of `server`.
pub fn router<B: Backend + 'static>(server: Server<B>) -> Router {
    let state = ApiState {
        clock: server.clock(),
        server: Arc::new(Mutex::new(server)),
    };
    Router::new()
        .route("/", get(index::<B>))
        .route("/api/v1/projects", post(create_project::<B>))
        .route(
            "/api/v1/projects/:project",
            post(store::<B>).get(list_data::<B>),
        )
        .with_state(state)
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

fn credentials(headers: &HeaderMap) -> Credentials {
    Credentials::new(
        header(headers, USER_KEY_HEADER),
        header(headers, ADMIN_KEY_HEADER),
    )
}

/// Parse a JSON body, treating an empty or malformed body as absent.
fn json_body(body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        None
    } else {
        serde_json::from_slice(body).ok()
    }
}

fn status_code(status: ReplyStatus) -> StatusCode {
    match status {
        ReplyStatus::Ok => StatusCode::OK,
        ReplyStatus::BadRequest => StatusCode::BAD_REQUEST,
        ReplyStatus::Forbidden => StatusCode::FORBIDDEN,
    }
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    let body = Envelope::Error {
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

fn error_response(error: crate::Error) -> Response {
    match error {
        crate::Error::NotImplemented(_) => {
            failure(StatusCode::NOT_IMPLEMENTED, error.to_string())
        }
        error => {
            error!(%error, "request failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
        }
    }
}

/// Run `call` against the server on the blocking thread pool.
async fn run<B, F>(state: SharedServer<B>, call: F) -> Response
where
    B: Backend + 'static,
    F: FnOnce(&mut Server<B>) -> crate::Result<Reply> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || match state.lock() {
        Ok(mut server) => Some(call(&mut server)),
        Err(_) => None,
    })
    .await;

    match joined {
        Ok(Some(Ok(reply))) => (status_code(reply.status), Json(reply.body)).into_response(),
        Ok(Some(Err(error))) => error_response(error),
        Ok(None) => {
            error!("server lock poisoned");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
        }
        Err(error) => {
            error!(%error, "request task failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
        }
    }
}

async fn index<B: Backend + 'static>(State(state): State<ApiState<B>>) -> Response {
    Json(ServerInfo::at(state.clock.now())).into_response()
}

async fn create_project<B: Backend + 'static>(
    State(state): State<ApiState<B>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let name = json_body(&body).and_then(|body| {
        body.get("project")
            .and_then(Value::as_str)
            .map(String::from)
    });
    let secret = header(&headers, PROJECT_CREATION_SECRET_HEADER);

    run(state.server, move |server| {
        server.create_project(name.as_deref(), secret.as_deref())
    })
    .await
}

async fn store<B: Backend + 'static>(
    State(state): State<ApiState<B>>,
    Path(project): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let credentials = credentials(&headers);
    let data = json_body(&body);

    run(state.server, move |server| server.store(&project, &credentials, data)).await
}

async fn list_data<B: Backend + 'static>(
    State(state): State<ApiState<B>>,
    Path(project): Path<String>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Response {
    let credentials = credentials(&headers);

    run(state.server, move |server| {
        server.list_data(&project, &credentials, params.limit.as_deref())
    })
    .await
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn credentials_are_read_from_separate_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-key", HeaderValue::from_static("abcd1234"));
        headers.insert("x-admin-key", HeaderValue::from_static("a-key"));

        let credentials = credentials(&headers);
        assert_eq!(credentials.user_key.as_deref(), Some("abcd1234"));
        assert_eq!(credentials.admin_key.as_deref(), Some("a-key"));
    }

    #[test]
    fn empty_or_malformed_body_is_absent() {
        assert_eq!(json_body(b""), None);
        assert_eq!(json_body(b"{not json"), None);
        assert_eq!(json_body(b"{\"x\": 1}"), Some(serde_json::json!({"x": 1})));
    }

    #[test]
    fn unimplemented_operations_are_501() {
        let response = error_response(crate::Error::NotImplemented("list_projects"));
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

        let response = error_response(crate::Error::NotConfirmed);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
