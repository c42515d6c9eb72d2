// Negotiation profiles - network identities presented to the content host
//
// The retrier walks `NegotiationProfile::standard()` in order. Appending a
// profile to that list is all it takes to add a strategy.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_IMPERSONATE_TARGET: &str = "chrome";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NegotiationProfile {
    /// Extractor's own network identity
    Default,
    /// Simulated-browser TLS/HTTP fingerprint
    Impersonate { target: String },
    /// Explicit standard browser headers
    BrowserHeaders {
        user_agent: String,
        headers: Vec<(String, String)>,
    },
    /// Impersonation and explicit headers together
    Combined {
        target: String,
        user_agent: String,
        headers: Vec<(String, String)>,
    },
}

impl NegotiationProfile {
    /// The four profiles, in the order they are tried
    pub fn standard() -> Vec<NegotiationProfile> {
        vec![
            Self::Default,
            Self::Impersonate {
                target: DEFAULT_IMPERSONATE_TARGET.to_string(),
            },
            Self::BrowserHeaders {
                user_agent: DEFAULT_USER_AGENT.to_string(),
                headers: browser_headers(),
            },
            Self::Combined {
                target: DEFAULT_IMPERSONATE_TARGET.to_string(),
                user_agent: DEFAULT_USER_AGENT.to_string(),
                headers: browser_headers(),
            },
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Impersonate { .. } => "impersonate",
            Self::BrowserHeaders { .. } => "browser-headers",
            Self::Combined { .. } => "combined",
        }
    }

    /// yt-dlp flags for this profile
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self {
            Self::Default => {}
            Self::Impersonate { target } => {
                push_impersonate(&mut args, target);
            }
            Self::BrowserHeaders {
                user_agent,
                headers,
            } => {
                push_headers(&mut args, user_agent, headers);
            }
            Self::Combined {
                target,
                user_agent,
                headers,
            } => {
                push_impersonate(&mut args, target);
                push_headers(&mut args, user_agent, headers);
            }
        }
        args
    }
}

impl fmt::Display for NegotiationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn browser_headers() -> Vec<(String, String)> {
    [
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Sec-Fetch-Mode", "navigate"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn push_impersonate(args: &mut Vec<String>, target: &str) {
    args.push("--impersonate".to_string());
    args.push(target.to_string());
}

fn push_headers(args: &mut Vec<String>, user_agent: &str, headers: &[(String, String)]) {
    args.push("--user-agent".to_string());
    args.push(user_agent.to_string());
    for (name, value) in headers {
        args.push("--add-header".to_string());
        args.push(format!("{}:{}", name, value));
    }
}
