//! HTTP transport: GET a URL, hand back bytes and content-type.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use reqwest::redirect::Policy;
use tracing::{debug, instrument, warn};
use url::Url;

use registerscout_extract::{
    Anchor, detect_kind, extract_anchors, extract_document, looks_like_html, text_outside_links,
};
use registerscout_shared::{ContentKind, FetchConfig, FetchedContent, Result, ScoutError};

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!(
    "RegisterScout/",
    env!("CARGO_PKG_VERSION"),
    " (register-of-interests research)"
);

const MAX_REDIRECTS: usize = 5;

/// A successful (2xx) response body.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// URL after redirects.
    pub final_url: Url,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// A fetched HTML page and its anchors.
#[derive(Debug, Clone)]
pub struct HtmlPage {
    pub url: Url,
    pub html: String,
    pub anchors: Vec<Anchor>,
}

/// Extracted content plus, for HTML, the page's anchors.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub content: FetchedContent,
    pub anchors: Vec<Anchor>,
    /// HTML text with link text removed; the full text for other kinds.
    pub body_text: String,
}

/// Shared HTTP client. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    delay: Duration,
    allow_private_hosts: bool,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect_policy(config.allow_private_hosts))
            .timeout(Duration::from_secs(config.timeout_secs));

        for (host, addr) in &config.host_overrides {
            builder = builder.resolve(host, *addr);
        }

        let client = builder
            .build()
            .map_err(|e| ScoutError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            delay: Duration::from_millis(config.request_delay_ms),
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    /// GET a URL; any non-2xx status is an error.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn get(&self, url: &Url) -> Result<RawResponse> {
        if !self.allow_private_hosts && is_ssrf_target(url) {
            warn!("SSRF protection: blocked");
            return Err(ScoutError::validation(format!("refusing to fetch {url}")));
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| ScoutError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoutError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes()
            .await
            .map_err(|e| ScoutError::Network(format!("{url}: body read failed: {e}")))?
            .to_vec();

        debug!(status = status.as_u16(), len = body.len(), "fetched");

        Ok(RawResponse {
            final_url,
            content_type,
            body,
        })
    }

    /// Fetch a URL that must be an HTML page, with its anchors resolved.
    pub async fn fetch_page(&self, url: &Url) -> Result<HtmlPage> {
        let raw = self.get(url).await?;
        let html = String::from_utf8_lossy(&raw.body).into_owned();

        if !looks_like_html(raw.content_type.as_deref().unwrap_or(""), &html) {
            return Err(ScoutError::parse(format!("{url}: not an HTML page")));
        }

        let anchors = extract_anchors(&html, &raw.final_url);
        Ok(HtmlPage {
            url: raw.final_url,
            html,
            anchors,
        })
    }

    /// Fetch and extract a URL. The requested URL is kept as the content URL.
    pub async fn fetch_content(&self, url: &Url) -> Result<FetchedContent> {
        Ok(self.fetch_document(url).await?.content)
    }

    /// Fetch and extract a URL, keeping anchors when it is HTML.
    pub async fn fetch_document(&self, url: &Url) -> Result<FetchedDocument> {
        let raw = self.get(url).await?;
        let (_, kind) = detect_kind(raw.content_type.as_deref(), url);

        let (anchors, body_text) = if kind == ContentKind::Html {
            let html = String::from_utf8_lossy(&raw.body);
            (
                extract_anchors(&html, &raw.final_url),
                Some(text_outside_links(&html)),
            )
        } else {
            (Vec::new(), None)
        };

        let content = extract_document(url, raw.content_type.as_deref(), raw.body);
        let body_text = body_text.unwrap_or_else(|| content.text.clone());
        Ok(FetchedDocument {
            content,
            anchors,
            body_text,
        })
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Follow at most [`MAX_REDIRECTS`] hops, re-checking each target.
fn redirect_policy(allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error(format!("more than {MAX_REDIRECTS} redirects"))
        } else if !allow_private_hosts && is_ssrf_target(attempt.url()) {
            let blocked = format!("redirect to {} blocked", attempt.url());
            attempt.error(blocked)
        } else {
            attempt.follow()
        }
    })
}

/// True for non-HTTP schemes and literal private/loopback targets.
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (carrier-grade NAT)
                || (octets[0] == 100 && (octets[1] & 0xC0) == 64)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
