//! HTTP basic authentication for broker routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use subtle::ConstantTimeEq;
use tracing::debug;

const CHALLENGE: &str = r#"Basic realm="cosb""#;

/// Username and password the platform must present.
#[derive(Clone)]
pub struct BasicCredentials {
    username: String,
    password: String,
}

impl BasicCredentials {
    /// Creates the expected credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        bool::from(user_ok & pass_ok)
    }
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn presented_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some((username.to_owned(), password.to_owned()))
}

/// Rejects requests that do not carry the configured credentials.
pub(crate) async fn require_basic_auth(
    State(credentials): State<Arc<BasicCredentials>>,
    request: Request,
    next: Next,
) -> Response {
    let authorised = presented_credentials(request.headers())
        .is_some_and(|(username, password)| credentials.matches(&username, &password));
    if authorised {
        return next.run(request).await;
    }
    debug!(path = %request.uri().path(), "rejected unauthenticated request");
    let mut response = (StatusCode::UNAUTHORIZED, axum::Json(serde_json::json!({}))).into_response();
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, HeaderValue::from_static(CHALLENGE));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(AUTHORIZATION, HeaderValue::from_str(value).expect("header"));
        map
    }

    #[rstest]
    fn decodes_basic_credentials() {
        let encoded = STANDARD.encode("admin:pa:ss");
        let parsed = presented_credentials(&headers(&format!("Basic {encoded}")));
        assert_eq!(
            parsed,
            Some((String::from("admin"), String::from("pa:ss")))
        );
    }

    #[rstest]
    #[case("Bearer abc")]
    #[case("Basic !!!")]
    #[case("Basic")]
    fn rejects_malformed_headers(#[case] value: &str) {
        assert_eq!(presented_credentials(&headers(value)), None);
    }

    #[rstest]
    #[case("admin", "secret", true)]
    #[case("admin", "wrong", false)]
    #[case("other", "secret", false)]
    #[case("admin", "secret-longer", false)]
    fn compares_both_fields(#[case] username: &str, #[case] password: &str, #[case] expected: bool) {
        let credentials = BasicCredentials::new("admin", "secret");
        assert_eq!(credentials.matches(username, password), expected);
    }

    #[rstest]
    fn debug_output_hides_password() {
        let rendered = format!("{:?}", BasicCredentials::new("admin", "secret"));
        assert!(!rendered.contains("secret"));
    }
}
