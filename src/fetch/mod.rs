//! Content fetching for feeds, transcripts and chapters documents

pub mod allowlist;

pub use allowlist::{HostAllowList, DEFAULT_ALLOWED_HOSTS};

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::error::AppError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_REDIRECTS: usize = 5;
const USER_AGENT: &str = concat!("hallway-ingest/", env!("CARGO_PKG_VERSION"));

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// GET `url` and return the body as text. Non-2xx is an error.
    async fn get_text(&self, url: &Url) -> Result<String, AppError>;
}

/// HTTP fetcher. Redirects are followed only to hosts the allow-list accepts.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(allow_list: HostAllowList) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .user_agent(USER_AGENT)
                .redirect(redirect_policy(allow_list))
                .build()
                .unwrap_or_default(),
        }
    }
}

fn redirect_policy(allow_list: HostAllowList) -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error(format!("more than {} redirects", MAX_REDIRECTS));
        }
        match allow_list.validate(attempt.url().as_str()) {
            Ok(_) => attempt.follow(),
            Err(e) => {
                log::warn!("Refusing redirect to {}: {}", attempt.url(), e);
                attempt.error(e)
            }
        }
    })
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn get_text(&self, url: &Url) -> Result<String, AppError> {
        log::debug!("Fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AppError::Fetch(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch(format!("HTTP {}: {}", status, url)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::Fetch(format!("Failed to read body from {}: {}", url, e)))?;

        log::debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_text_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transcript.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[00:00:01] Fraser: hi"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/transcript.txt", server.uri())).unwrap();
        let body = HttpFetcher::new(HostAllowList::default()).get_text(&url).await.unwrap();
        assert_eq!(body, "[00:00:01] Fraser: hi");
    }

    #[tokio::test]
    async fn test_non_success_status_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing.json", server.uri())).unwrap();
        let err = HttpFetcher::new(HostAllowList::default()).get_text(&url).await.unwrap_err();
        match err {
            AppError::Fetch(msg) => assert!(msg.contains("404")),
            other => panic!("expected fetch error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_redirect_to_unlisted_host_is_refused() {
        let internal = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("internal-metadata"))
            .expect(0)
            .mount(&internal)
            .await;

        let share = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/t.txt"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/secret", internal.uri()).as_str()),
            )
            .mount(&share)
            .await;

        let url = Url::parse(&format!("{}/t.txt", share.uri())).unwrap();
        let err = HttpFetcher::new(HostAllowList::default()).get_text(&url).await.unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
    }
}
