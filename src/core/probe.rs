//! External smoke probe against a running serving container. It is a
//! client; the runtime image itself carries no health endpoint.

use crate::adapters::http::HttpFetcher;
use crate::utils::error::{PipelineError, Result};
use serde::Serialize;
use url::Url;

#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub url: String,
    pub status: u16,
    pub entry_matches: Option<bool>,
    pub listing: Option<ListingCheck>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingCheck {
    pub url: String,
    pub status: u16,
    pub bytes: usize,
}

fn probe_error(url: &str, reason: impl Into<String>) -> PipelineError {
    PipelineError::ProbeFailed {
        url: url.to_string(),
        reason: reason.into(),
    }
}

async fn get(fetcher: &HttpFetcher, url: &Url) -> Result<(u16, Vec<u8>)> {
    let response = fetcher
        .client()
        .get(url.clone())
        .send()
        .await
        .map_err(|e| probe_error(url.as_str(), e.to_string()))?;
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| probe_error(url.as_str(), e.to_string()))?;
    Ok((status, body.to_vec()))
}

/// `GET /` must answer 200, and with the entry markup when `expected_entry`
/// is given. `listing_dir` names a subdirectory without index file that must
/// answer 200 with a generated listing.
pub async fn probe(
    fetcher: &HttpFetcher,
    base_url: &str,
    expected_entry: Option<&[u8]>,
    listing_dir: Option<&str>,
) -> Result<ProbeReport> {
    let base = Url::parse(base_url).map_err(|e| probe_error(base_url, e.to_string()))?;
    let root = base
        .join("/")
        .map_err(|e| probe_error(base_url, e.to_string()))?;

    let (status, body) = get(fetcher, &root).await?;
    if status != 200 {
        return Err(probe_error(root.as_str(), format!("expected 200, got {}", status)));
    }

    let entry_matches = expected_entry.map(|expected| body == expected);
    if entry_matches == Some(false) {
        return Err(probe_error(root.as_str(), "response body differs from entry file"));
    }
    tracing::info!("✅ GET {} -> {}", root, status);

    let listing = match listing_dir {
        Some(dir) => {
            let path = format!("/{}/", dir.trim_matches('/'));
            let url = root
                .join(&path)
                .map_err(|e| probe_error(base_url, e.to_string()))?;
            let (status, body) = get(fetcher, &url).await?;
            if status != 200 || body.is_empty() {
                return Err(probe_error(
                    url.as_str(),
                    format!("expected a directory listing, got {} ({} bytes)", status, body.len()),
                ));
            }
            tracing::info!("✅ GET {} -> {} (listing)", url, status);
            Some(ListingCheck {
                url: url.to_string(),
                status,
                bytes: body.len(),
            })
        }
        None => None,
    };

    Ok(ProbeReport {
        url: root.to_string(),
        status,
        entry_matches,
        listing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    const ENTRY: &str = "<html><body>terminal</body></html>";

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_probe_root_matches_entry() {
        let server = MockServer::start();
        let root = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(ENTRY);
        });

        let report = probe(&fetcher(), &server.base_url(), Some(ENTRY.as_bytes()), None)
            .await
            .unwrap();
        root.assert();
        assert_eq!(report.status, 200);
        assert_eq!(report.entry_matches, Some(true));
        assert!(report.listing.is_none());
    }

    #[tokio::test]
    async fn test_probe_checks_directory_listing() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(ENTRY);
        });
        let listing = server.mock(|when, then| {
            when.method(GET).path("/assets/");
            then.status(200).body("<a href=\"style.css\">style.css</a>");
        });

        let report = probe(&fetcher(), &server.base_url(), None, Some("assets"))
            .await
            .unwrap();
        listing.assert();
        assert_eq!(report.listing.unwrap().status, 200);
    }

    #[tokio::test]
    async fn test_probe_rejects_wrong_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("<html>default page</html>");
        });

        let err = probe(&fetcher(), &server.base_url(), Some(ENTRY.as_bytes()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ProbeFailed { .. }));
    }

    #[tokio::test]
    async fn test_probe_rejects_missing_listing() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body(ENTRY);
        });
        server.mock(|when, then| {
            when.method(GET).path("/assets/");
            then.status(404);
        });

        assert!(probe(&fetcher(), &server.base_url(), None, Some("assets"))
            .await
            .is_err());
    }
}
