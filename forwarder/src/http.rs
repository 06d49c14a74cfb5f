use crate::errors::ForwardError;
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use url::Url;

const MAX_LOGGED_BODY: usize = 256;

/// Shared outbound client. The timeout covers the whole request/response cycle.
pub fn build_client(timeout_secs: u64) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("traccar2forward/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Accepts absolute http(s) URLs with a host and no whitespace
pub fn validate_url(candidate: &str) -> Result<Url, ForwardError> {
    if candidate.chars().any(char::is_whitespace) {
        return Err(ForwardError::InvalidUrl(candidate.to_string()));
    }

    let url = Url::parse(candidate).map_err(|_| ForwardError::InvalidUrl(candidate.to_string()))?;

    match (url.scheme(), url.host_str()) {
        ("http" | "https", Some(host)) if !host.is_empty() => Ok(url),
        _ => Err(ForwardError::InvalidUrl(candidate.to_string())),
    }
}

/// Sends the request once. Connection failures and status codes >= 300 are errors.
pub async fn send_checked(request: RequestBuilder, target: &Url) -> Result<Response, ForwardError> {
    let identifier = target.host_str().unwrap_or(target.as_str()).to_string();

    let response = request
        .send()
        .await
        .map_err(|e| ForwardError::transport(&identifier, e))?;

    let status = response.status();
    tracing::debug!(upstream = %identifier, status = status.as_u16(), "Upstream responded");

    if status.as_u16() >= 300 {
        return Err(status_error(identifier, response).await);
    }

    Ok(response)
}

/// Consumes an unexpected response. Only the start of the body is kept.
pub async fn status_error(target: String, response: Response) -> ForwardError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ForwardError::UpstreamStatus {
        target,
        status,
        body: truncate(&body, MAX_LOGGED_BODY).to_string(),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::MockServer;
    use hyper::StatusCode;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("https://example.com:8443/path?q=1&r={x}").is_ok());
        assert!(validate_url("http://127.0.0.1:5055/?id=1").is_ok());

        for invalid in [
            "",
            "example.com/path",
            "ftp://example.com/file",
            "http://",
            "http://exa mple.com",
            "http://example.com/a b",
            "mailto:someone@example.com",
        ] {
            assert!(
                matches!(validate_url(invalid), Err(ForwardError::InvalidUrl(_))),
                "{invalid:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 2), "he");
        assert_eq!(truncate("héllo", 2), "hé");
    }

    #[tokio::test]
    async fn test_send_checked_status() {
        let server = MockServer::start(StatusCode::OK).await;
        let client = build_client(5).unwrap();

        let url = Url::parse(&server.url("/ok")).unwrap();
        assert!(send_checked(client.get(url.clone()), &url).await.is_ok());

        let server = MockServer::start(StatusCode::NOT_FOUND).await;
        let url = Url::parse(&server.url("/missing")).unwrap();
        let err = send_checked(client.get(url.clone()), &url)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ForwardError::UpstreamStatus { status: 404, .. }
        ));
    }

    #[tokio::test]
    async fn test_send_checked_connection_refused() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = build_client(5).unwrap();
        let url = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        let err = send_checked(client.get(url.clone()), &url)
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Transport { .. }));
    }
}
