//! Download link resolution.
//!
//! The link service answers with a small HTML fragment rather than XML, so
//! this is plain pattern extraction, separate from the normalizer.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::MedleyError;

/// Resolved download link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadLink {
    /// Service status code for the link request.
    pub status: u16,
    /// Reference code identifying the delivery.
    pub reference: String,
    /// The link body itself.
    pub url: String,
}

fn status_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)status\s*[:=]?\s*(\d+)").expect("status pattern"))
}

fn reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bref(?:erence)?\b\s*(?:code)?\s*[:=]?\s*([A-Za-z0-9_-]+)")
            .expect("reference pattern")
    })
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)href\s*=\s*["']([^"']+)["']"#).expect("href pattern"))
}

fn bare_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("url pattern"))
}

/// Extract status code, reference code and link body from a fragment.
///
/// The link body is taken from the first `href` attribute, falling back to
/// the first bare `http(s)://` token. Each missing piece is an error naming
/// what was absent; nothing is silently defaulted.
pub fn parse_fragment(body: &str) -> Result<DownloadLink, MedleyError> {
    let status = status_re()
        .captures(body)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| MedleyError::link("status code missing from fragment"))?
        .as_str()
        .parse::<u16>()
        .map_err(|err| MedleyError::link(format!("status code unreadable: {err}")))?;

    let reference = reference_re()
        .captures(body)
        .and_then(|captures| captures.get(1))
        .ok_or_else(|| MedleyError::link("reference code missing from fragment"))?
        .as_str()
        .to_string();

    let url = href_re()
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| bare_url_re().find(body).map(|m| m.as_str().to_string()))
        .ok_or_else(|| MedleyError::link("link body missing from fragment"))?;

    debug!(status, reference = %reference, "download link resolved");
    Ok(DownloadLink {
        status,
        reference,
        url,
    })
}
