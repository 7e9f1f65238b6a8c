use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use super::env::{DB_SSL, DB_SSL_ACCEPT_INVALID_CERTS, EnvSnapshot, PGSSL, PGSSLMODE};

static SSLMODE_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([?&])sslmode=([^&#]*)&?").expect("sslmode pattern is valid")
});

/// How the client-server backend secures its connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsPolicy {
    /// Plain TCP.
    Disabled,
    /// TLS with certificate verification against the bundled web-PKI roots.
    Verified,
    /// TLS that accepts self-signed or otherwise unverifiable certificates.
    ///
    /// Accepted risk: the link is encrypted but the server is not authenticated. Only chosen
    /// when `DB_SSL_ACCEPT_INVALID_CERTS` is set, for managed hosts that present certificates
    /// outside the public roots.
    AcceptInvalidCerts,
}

impl TlsPolicy {
    #[must_use]
    pub fn is_enabled(self) -> bool {
        !matches!(self, TlsPolicy::Disabled)
    }
}

fn mode_requests_ssl(mode: &str) -> bool {
    matches!(
        mode.trim().to_ascii_lowercase().as_str(),
        "require" | "verify-full" | "verify-ca"
    )
}

/// `sslmode` query parameter of a connection string, if present.
#[must_use]
pub fn url_ssl_mode(url: &str) -> Option<&str> {
    SSLMODE_PARAM
        .captures(url)
        .and_then(|caps| caps.get(2))
        .map(|m| m.as_str())
}

/// Remove the `sslmode` query parameter. The driver rejects `verify-*` values and TLS is
/// driven by [`TlsPolicy`] instead.
#[must_use]
pub fn strip_ssl_mode(url: &str) -> Cow<'_, str> {
    let Some(caps) = SSLMODE_PARAM.captures(url) else {
        return Cow::Borrowed(url);
    };
    let whole = caps.get(0).map_or(0..0, |m| m.range());
    let sep = &caps[1];
    let had_trailing_amp = url[whole.clone()].ends_with('&');

    let mut out = String::with_capacity(url.len());
    out.push_str(&url[..whole.start]);
    if had_trailing_amp {
        // more parameters follow: keep the separator for them
        out.push_str(sep);
    }
    out.push_str(&url[whole.end..]);
    Cow::Owned(out)
}

/// Resolve the TLS policy from the explicit flag, `PGSSLMODE`, and the connection string.
#[must_use]
pub fn resolve_tls_policy(env: &EnvSnapshot, url: Option<&str>) -> TlsPolicy {
    let requested = env.flag(&[DB_SSL, PGSSL])
        || env.get(PGSSLMODE).is_some_and(mode_requests_ssl)
        || url.and_then(url_ssl_mode).is_some_and(mode_requests_ssl);

    if !requested {
        TlsPolicy::Disabled
    } else if env.flag(&[DB_SSL_ACCEPT_INVALID_CERTS]) {
        TlsPolicy::AcceptInvalidCerts
    } else {
        TlsPolicy::Verified
    }
}
