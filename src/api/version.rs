//! `X-Broker-API-Version` header check.

use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::responses::error_body;

/// Header carrying the platform's API version.
pub const API_VERSION_HEADER: &str = "x-broker-api-version";

/// Major API version served by the broker.
pub const SUPPORTED_MAJOR_VERSION: u32 = 2;

fn requested_major(headers: &HeaderMap) -> Option<u32> {
    let value = headers.get(API_VERSION_HEADER)?.to_str().ok()?;
    let major = value.trim().split('.').next()?;
    major.parse().ok()
}

/// Rejects requests without a supported API version with 412.
pub(crate) async fn require_api_version(request: Request, next: Next) -> Response {
    if requested_major(request.headers()) == Some(SUPPORTED_MAJOR_VERSION) {
        return next.run(request).await;
    }
    let description = format!(
        "{API_VERSION_HEADER} header must name major version {SUPPORTED_MAJOR_VERSION}"
    );
    (
        StatusCode::PRECONDITION_FAILED,
        axum::Json(error_body(None, &description)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use rstest::rstest;

    #[rstest]
    #[case(Some("2.13"), Some(2))]
    #[case(Some("2"), Some(2))]
    #[case(Some(" 3.0 "), Some(3))]
    #[case(Some("two"), None)]
    #[case(None, None)]
    fn parses_major_version(#[case] header: Option<&str>, #[case] expected: Option<u32>) {
        let mut headers = HeaderMap::new();
        if let Some(value) = header {
            headers.insert(API_VERSION_HEADER, HeaderValue::from_str(value).expect("header"));
        }
        assert_eq!(requested_major(&headers), expected);
    }
}
