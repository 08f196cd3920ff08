//! Diagnostic metadata attached to history entries
//!
//! Metadata is best-effort: it is never required for an entry to be
//! recorded. HTTP requests supply their own (client address, user agent,
//! screen resolution header); other callers fall back to the
//! [`EnvironmentInfo`] provider injected into the service.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{BrowserInfo, EntryMetadata, ScreenResolution};

/// Provider of metadata for entries recorded without any
pub trait EnvironmentInfo: Send + Sync {
    fn collect(&self) -> EntryMetadata;
}

/// Provider that reports nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnvironment;

impl EnvironmentInfo for NoEnvironment {
    fn collect(&self) -> EntryMetadata {
        EntryMetadata::default()
    }
}

/// Provider that always reports the same metadata
#[derive(Debug, Clone, Default)]
pub struct FixedEnvironment(pub EntryMetadata);

impl EnvironmentInfo for FixedEnvironment {
    fn collect(&self) -> EntryMetadata {
        self.0.clone()
    }
}

static BROWSER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(opera|chrome|safari|firefox|msie|trident)/?\s*(\d+)").unwrap()
});

static IE_VERSION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\brv[ :]+(\d+)").unwrap());

static CHROMIUM_FORK_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(OPR|Edge)/(\d+)").unwrap());

static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)version/(\d+)").unwrap());

/// Browser name and major version from a user agent string
pub fn parse_browser(user_agent: &str) -> Option<BrowserInfo> {
    let caps = BROWSER_REGEX.captures(user_agent)?;
    let name = caps.get(1)?.as_str();
    let mut version = caps.get(2)?.as_str().to_string();

    if name.eq_ignore_ascii_case("trident") {
        let version = IE_VERSION_REGEX
            .captures(user_agent)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        return Some(BrowserInfo {
            name: "IE".to_string(),
            version,
        });
    }

    if name == "Chrome" {
        if let Some(fork) = CHROMIUM_FORK_REGEX.captures(user_agent) {
            let fork_name = match &fork[1] {
                "OPR" => "Opera",
                other => other,
            };
            return Some(BrowserInfo {
                name: fork_name.to_string(),
                version: fork[2].to_string(),
            });
        }
    }

    if let Some(explicit) = VERSION_REGEX.captures(user_agent) {
        version = explicit[1].to_string();
    }

    Some(BrowserInfo {
        name: name.to_string(),
        version,
    })
}

/// Parse a `WIDTHxHEIGHT[xDEPTH]` screen description
pub fn parse_resolution(value: &str) -> Option<ScreenResolution> {
    let mut parts = value.trim().split(['x', 'X']).map(str::trim);
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    let depth = match parts.next() {
        Some(d) => Some(d.parse().ok()?),
        None => None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some(ScreenResolution {
        width,
        height,
        color_depth: depth,
        pixel_depth: depth,
    })
}

/// Metadata gathered from an incoming request
#[derive(Debug, Clone, Default)]
pub struct RequestEnvironment {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub resolution: Option<String>,
}

impl RequestEnvironment {
    pub fn into_metadata(self) -> EntryMetadata {
        let navigateur = self.user_agent.as_deref().and_then(parse_browser);
        let resolution = self.resolution.as_deref().and_then(parse_resolution);
        EntryMetadata {
            ip: self.ip.filter(|ip| !ip.is_empty()),
            user_agent: self.user_agent.filter(|ua| !ua.is_empty()),
            navigateur,
            resolution,
        }
    }
}
