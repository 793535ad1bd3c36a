//! Outbound URL validation

use url::Url;

use crate::error::AppError;

pub const DEFAULT_ALLOWED_HOSTS: &[&str] =
    &["transistor.fm", "share.transistor.fm", "feeds.transistor.fm"];

/// Hosts the pipeline may fetch from. A URL passes when it is `https` and its
/// host equals an entry or is a subdomain of one.
#[derive(Debug, Clone)]
pub struct HostAllowList {
    hosts: Vec<String>,
}

impl Default for HostAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()))
    }
}

impl HostAllowList {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.into().trim().trim_end_matches('.').to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    fn allows_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_lowercase();
        self.hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .map_or(false, |prefix| prefix.ends_with('.'))
        })
    }

    pub fn validate(&self, raw: &str) -> Result<Url, AppError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| AppError::Validation(format!("Invalid URL '{}': {}", raw, e)))?;

        if url.scheme() != "https" {
            return Err(AppError::Validation(format!(
                "URL must use https, got '{}': {}",
                url.scheme(),
                raw
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| AppError::Validation(format!("URL has no host: {}", raw)))?;

        if !self.allows_host(host) {
            return Err(AppError::Validation(format!(
                "Host '{}' is not in the allowed list",
                host
            )));
        }

        Ok(url)
    }
}
