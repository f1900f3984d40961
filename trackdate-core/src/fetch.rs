//! Page retrieval collaborator.
//!
//! The pipeline consumes page fetching through the [`PageFetcher`] trait.
//! The bundled [`HttpFetcher`] does plain HTTP retrieval with a browser-like
//! user agent, limited redirects, and per-request timeout, and reduces HTML
//! to readable text before the extractor sees it. Fetch failures are
//! reported as errors for the engine to log; the engine never treats them
//! as fatal.

use crate::error::FetchError;
use async_trait::async_trait;
use std::time::Duration;

/// A successfully retrieved page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Readable text content (HTML already stripped).
    pub content: String,
    /// `Set-Cookie` values from the response, for the cookie store.
    pub set_cookies: Vec<String>,
}

/// External page retrieval collaborator.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Retrieve one URL, sending the given cookie header when present.
    async fn fetch(&self, url: &str, cookies: Option<&str>)
        -> Result<FetchedPage, FetchError>;

    /// Retrieve a URL again after a challenge solve, submitting the
    /// clearance token into the page context as a cookie.
    async fn fetch_with_clearance(
        &self,
        url: &str,
        cookies: Option<&str>,
        token: &str,
    ) -> Result<FetchedPage, FetchError> {
        let clearance = format!("cf_clearance={token}");
        let combined = match cookies {
            Some(existing) if !existing.is_empty() => format!("{existing}; {clearance}"),
            _ => clearance,
        };
        self.fetch(url, Some(&combined)).await
    }
}

/// Plain HTTP fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, request_timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            timeout_secs: request_timeout_secs,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, cookies: Option<&str>)
        -> Result<FetchedPage, FetchError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: "URL must start with http:// or https://".into(),
            });
        }

        let mut request = self.client.get(url);
        if let Some(cookie_header) = cookies {
            if !cookie_header.is_empty() {
                request = request.header(reqwest::header::COOKIE, cookie_header);
            }
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                    timeout_secs: self.timeout_secs,
                }
            } else {
                FetchError::Request {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let set_cookies: Vec<String> = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(String::from)
            .collect();

        let status = response.status();
        // Challenge interstitials commonly arrive as 403/503 with a body the
        // gate needs to inspect, so those bodies are kept.
        if !status.is_success() && status.as_u16() != 403 && status.as_u16() != 503 {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response.text().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            message: format!("Failed to read response body: {e}"),
        })?;

        let content = if content_type.contains("text/html")
            || content_type.contains("application/xhtml")
            || content_type.is_empty()
        {
            extract_text_from_html(&body)
        } else {
            body
        };

        Ok(FetchedPage {
            content,
            set_cookies,
        })
    }
}

/// Reduce an HTML document to readable text.
///
/// Strips tags, skips script/style bodies, inserts newlines at block
/// elements, decodes common entities, and collapses blank runs.
pub fn extract_text_from_html(html: &str) -> String {
    const BLOCK_TAGS: &[&str] = &[
        "p", "/p", "br", "div", "/div", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "/h1",
        "/h2", "/h3", "/h4", "/h5", "/h6", "table", "/table",
    ];

    let mut text = String::with_capacity(html.len() / 4);
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;
    let mut tag_name = String::new();

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag_name.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                let tag = tag_name.to_lowercase();
                let bare = tag.split_whitespace().next().unwrap_or("");
                match bare {
                    "script" => in_script = true,
                    "/script" => in_script = false,
                    "style" => in_style = true,
                    "/style" => in_style = false,
                    _ => {}
                }
                if BLOCK_TAGS.contains(&bare) {
                    text.push('\n');
                }
            }
            _ if in_tag => {
                // Only the tag name matters; attributes are dropped but kept
                // in the buffer until the first whitespace for name parsing.
                if tag_name.len() < 64 {
                    tag_name.push(ch);
                }
            }
            _ if in_script || in_style => {}
            _ => text.push(ch),
        }
    }

    let text = text
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ");

    let mut lines: Vec<&str> = text.lines().map(str::trim).collect();
    lines.dedup_by(|a, b| a.is_empty() && b.is_empty());
    lines
        .into_iter()
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
