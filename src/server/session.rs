//! Session credential middleware.

use super::ServerState;
use crate::protocol::parse_cookie_header;
use crate::types::SessionToken;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

/// Find the session token among the request's cookies.
pub fn session_from_headers(headers: &HeaderMap) -> Option<SessionToken> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(parse_cookie_header)
}

/// Reject requests without a live session before they reach the ledger or
/// storage. Accepted requests carry their [`SessionToken`] as an extension.
pub async fn require_session(
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = session_from_headers(request.headers()) else {
        debug!(uri = %request.uri(), "Request without session cookie");
        return (StatusCode::FORBIDDEN, "Session required").into_response();
    };

    if !state.ledger.lock().touch(&token) {
        debug!(session = %token, uri = %request.uri(), "Request with unknown session");
        return (StatusCode::FORBIDDEN, "Unknown session").into_response();
    }

    request.extensions_mut().insert(token);
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(session_from_headers(&headers).is_none());

        headers.append(header::COOKIE, HeaderValue::from_static("theme=dark"));
        headers.append(header::COOKIE, HeaderValue::from_static("session-id=s1; lang=en"));
        assert_eq!(session_from_headers(&headers), Some(SessionToken::from("s1")));
    }
}
