//! Outbound HTTP policy for tool calls (scheme/host checks, size limits, redaction).
//!
//! Tools imported from mock routes usually point back at this same process on a loopback
//! address, so there is no private-network block here; restrict destinations with
//! `allowed_hosts` instead.

use crate::runtime::HttpToolsError;
use std::collections::HashSet;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Return 3xx responses to the caller as-is.
    None,
    /// Follow up to the given number of hops, re-checking each destination.
    Follow(usize),
}

#[derive(Debug, Clone)]
pub struct OutboundHttpSafety {
    /// If set, only these hosts are allowed (case-insensitive).
    pub allowed_hosts: Option<HashSet<String>>,
    /// Maximum response body size (bytes). `None` = unlimited.
    pub max_response_bytes: Option<usize>,
    pub redirects: RedirectPolicy,
}

impl Default for OutboundHttpSafety {
    fn default() -> Self {
        Self {
            allowed_hosts: None,
            max_response_bytes: Some(1024 * 1024), // 1 MiB
            redirects: RedirectPolicy::None,
        }
    }
}

impl OutboundHttpSafety {
    /// No host restriction, no size cap.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            allowed_hosts: None,
            max_response_bytes: None,
            redirects: RedirectPolicy::Follow(10),
        }
    }

    #[must_use]
    pub fn with_allowed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hosts: HashSet<String> = hosts
            .into_iter()
            .map(|h| h.as_ref().trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        self.allowed_hosts = if hosts.is_empty() { None } else { Some(hosts) };
        self
    }

    /// Validate a URL before making an outbound request.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is not `http(s)`, the URL has no host, or the host is not
    /// in the allowlist.
    pub fn check_url(&self, url: &Url) -> Result<(), HttpToolsError> {
        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(HttpToolsError::Blocked(format!(
                "unsupported URL scheme '{scheme}'"
            )));
        }

        let Some(host) = url.host_str() else {
            return Err(HttpToolsError::Blocked("missing URL host".to_string()));
        };

        if let Some(allowed) = &self.allowed_hosts
            && !allowed.contains(&host.to_ascii_lowercase())
        {
            return Err(HttpToolsError::Blocked(format!(
                "host '{host}' not in allowlist"
            )));
        }

        Ok(())
    }

    pub(crate) fn reqwest_redirect_policy(&self) -> reqwest::redirect::Policy {
        match self.redirects {
            RedirectPolicy::None => reqwest::redirect::Policy::none(),
            RedirectPolicy::Follow(max_hops) => {
                let policy = self.clone();
                reqwest::redirect::Policy::custom(move |attempt| {
                    if attempt.previous().len() >= max_hops {
                        attempt.error("too many redirects")
                    } else if let Err(e) = policy.check_url(attempt.url()) {
                        attempt.error(e.to_string())
                    } else {
                        attempt.follow()
                    }
                })
            }
        }
    }
}

/// Strip credentials, query and fragment from a URL before it appears in a message.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_http_schemes_are_blocked() {
        let safety = OutboundHttpSafety::default();
        let url = Url::parse("file:///etc/passwd").expect("url");
        let err = safety.check_url(&url).expect_err("blocked");
        assert!(err.to_string().contains("unsupported URL scheme"));
    }

    #[test]
    fn allowlist_is_case_insensitive() {
        let safety = OutboundHttpSafety::default().with_allowed_hosts(["API.example.com"]);
        safety
            .check_url(&Url::parse("https://api.EXAMPLE.com/v1").expect("url"))
            .expect("allowed");
        let err = safety
            .check_url(&Url::parse("http://127.0.0.1:4000/").expect("url"))
            .expect_err("blocked");
        assert!(err.to_string().contains("not in allowlist"));
    }

    #[test]
    fn loopback_is_allowed_without_allowlist() {
        OutboundHttpSafety::default()
            .check_url(&Url::parse("http://127.0.0.1:4000/mock").expect("url"))
            .expect("allowed");
    }

    #[test]
    fn redact_url_drops_secrets() {
        let url = Url::parse("https://user:pw@example.com/a?api_key=secret#frag").expect("url");
        assert_eq!(redact_url(&url), "https://example.com/a");
    }
}
