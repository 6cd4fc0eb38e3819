//! Fluent request scenarios against a router, without a running server.
//!
//! # Example
//!
//! ```rust,ignore
//! let app = harness.router(fixtures::cron_auth());
//!
//! let body: serde_json::Value = testing::post(app, "/api/cron/subscription-billing")
//!     .bearer_token(TEST_CRON_SECRET)
//!     .execute()
//!     .await
//!     .assert_ok()
//!     .json()
//!     .await;
//! ```

use axum::{
    Router,
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header},
};
use serde::{Serialize, de::DeserializeOwned};
use tower::ServiceExt;

/// Request builder for a single `oneshot` call.
pub struct Scenario {
    app: Router,
    request: Request<Body>,
}

impl Scenario {
    pub fn new(app: Router, method: Method, uri: &str) -> Self {
        let mut request = Request::new(Body::empty());
        *request.method_mut() = method;
        *request.uri_mut() = uri
            .parse()
            .unwrap_or_else(|e| panic!("invalid uri {uri}: {e}"));
        Self { app, request }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        let name = HeaderName::from_bytes(key.as_bytes())
            .unwrap_or_else(|e| panic!("invalid header name {key}: {e}"));
        let value = HeaderValue::from_str(value)
            .unwrap_or_else(|e| panic!("invalid header value for {key}: {e}"));
        self.request.headers_mut().insert(name, value);
        self
    }

    /// `Authorization: Bearer <token>`, for both the cron secret and sessions.
    pub fn bearer_token(self, token: &str) -> Self {
        self.header("authorization", &format!("Bearer {}", token))
    }

    /// Append query parameters, percent-encoded.
    pub fn with_query(mut self, params: &[(&str, &str)]) -> Self {
        let uri = self.request.uri().clone();
        let mut serializer = url::form_urlencoded::Serializer::new(
            uri.query().map(str::to_string).unwrap_or_default(),
        );
        serializer.extend_pairs(params);
        let query = serializer.finish();

        let new_uri = if query.is_empty() {
            uri.path().to_string()
        } else {
            format!("{}?{}", uri.path(), query)
        };
        *self.request.uri_mut() = new_uri
            .parse()
            .unwrap_or_else(|e| panic!("invalid uri {new_uri}: {e}"));
        self
    }

    pub fn json_body<T: Serialize>(mut self, body: &T) -> Self {
        let json = serde_json::to_vec(body).unwrap_or_else(|e| panic!("unserializable body: {e}"));
        *self.request.body_mut() = Body::from(json);
        self.request.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        self
    }

    /// Raw body without a content type.
    pub fn raw_body(mut self, body: impl Into<String>) -> Self {
        *self.request.body_mut() = Body::from(body.into());
        self
    }

    pub async fn execute(self) -> ScenarioAssert {
        let response = self
            .app
            .oneshot(self.request)
            .await
            .unwrap_or_else(|e| match e {});
        ScenarioAssert { response }
    }
}

/// Assertions over the response of a [`Scenario`].
pub struct ScenarioAssert {
    response: axum::response::Response,
}

impl ScenarioAssert {
    #[track_caller]
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.response.status(),
            expected,
            "Expected status {}, got {}",
            expected,
            self.response.status()
        );
        self
    }

    #[track_caller]
    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    #[track_caller]
    pub fn assert_created(self) -> Self {
        self.assert_status(StatusCode::CREATED)
    }

    #[track_caller]
    pub fn assert_no_content(self) -> Self {
        self.assert_status(StatusCode::NO_CONTENT)
    }

    #[track_caller]
    pub fn assert_bad_request(self) -> Self {
        self.assert_status(StatusCode::BAD_REQUEST)
    }

    #[track_caller]
    pub fn assert_unauthorized(self) -> Self {
        self.assert_status(StatusCode::UNAUTHORIZED)
    }

    #[track_caller]
    pub fn assert_forbidden(self) -> Self {
        self.assert_status(StatusCode::FORBIDDEN)
    }

    #[track_caller]
    pub fn assert_not_found(self) -> Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }

    #[track_caller]
    pub fn assert_header(self, key: &str, expected: &str) -> Self {
        let value = self
            .response
            .headers()
            .get(key)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_else(|| panic!("Header '{}' not found", key));
        assert_eq!(value, expected, "Header '{}' value mismatch", key);
        self
    }

    pub fn header(&self, key: &str) -> Option<String> {
        self.response
            .headers()
            .get(key)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub async fn body_bytes(self) -> Vec<u8> {
        axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .unwrap_or_else(|e| panic!("failed to read body: {e}"))
            .to_vec()
    }

    pub async fn body_string(self) -> String {
        String::from_utf8_lossy(&self.body_bytes().await).into_owned()
    }

    pub async fn json<T: DeserializeOwned>(self) -> T {
        let bytes = self.body_bytes().await;
        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            panic!(
                "Failed to parse JSON response: {e}; body: {}",
                String::from_utf8_lossy(&bytes)
            )
        })
    }

    /// Assert a dotted path ("checks.0.name") in the JSON body.
    pub async fn assert_json_path(self, path: &str, expected: serde_json::Value) -> Self {
        let status = self.response.status();
        let bytes = self.body_bytes().await;
        let json: serde_json::Value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|e| panic!("Body is not JSON: {e}"));

        let actual = json_path_get(&json, path)
            .unwrap_or_else(|| panic!("Path '{}' not found in {}", path, json));
        assert_eq!(actual, &expected, "JSON path '{}' value mismatch", path);

        let mut response = axum::response::Response::new(Body::from(bytes));
        *response.status_mut() = status;
        Self { response }
    }

    pub fn response(self) -> axum::response::Response {
        self.response
    }
}

fn json_path_get<'a>(json: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(json, |current, part| match part.parse::<usize>() {
        Ok(index) => current.get(index),
        Err(_) => current.get(part),
    })
}

pub fn get(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::GET, uri)
}

pub fn post(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::POST, uri)
}

pub fn put(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::PUT, uri)
}

pub fn delete(app: Router, uri: &str) -> Scenario {
    Scenario::new(app, Method::DELETE, uri)
}
