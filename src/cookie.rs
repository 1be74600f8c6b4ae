//! Set-Cookie parsing, domain rewriting and serialization.
//!
//! # Responsibilities
//! - Parse one raw `Set-Cookie` value into a [`Cookie`]
//! - Split a combined multi-cookie header back into one raw string per cookie
//! - Replace the `Domain` attribute when relaying across origins
//! - Serialize a [`Cookie`] back to wire form
//!
//! # Design Decisions
//! - Unknown attributes are ignored, malformed `Max-Age`/`Expires` leave the field unset
//! - The combined-header splitter counts commas per `;` token; an `Expires`
//!   token carries one comma of its own so only a second comma ends the cookie
//! - Cookie values containing commas are not supported by the splitter
//! - A negative `Max-Age` means unset and is never emitted

use std::fmt::Write as _;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::{Captures, Regex};
use thiserror::Error;

/// `Expires` wire format (RFC 1123).
const EXPIRES_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Netscape-style date some backends still emit.
const EXPIRES_FORMAT_DASHED: &str = "%a, %d-%b-%Y %H:%M:%S GMT";

static DOMAIN_ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(Domain\s*=.*?)(;|$)").expect("static regex"));

/// Errors produced while parsing a raw `Set-Cookie` value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CookieError {
    /// The raw string had no non-empty `;` segment.
    #[error("invalid set-cookie string: no segments")]
    Empty,
}

/// A single response cookie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub same_site: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    /// `None` when the attribute is absent. Negative values are not serialized.
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    /// Create a bare `name=value` cookie.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Serialize to a single `Set-Cookie` header value.
    ///
    /// Attributes are emitted in a fixed order: `Max-Age`, `Expires`,
    /// `Domain`, `Path`, `HttpOnly`, `Secure`, `SameSite`.
    pub fn to_set_cookie(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(max_age) = self.max_age.filter(|age| *age >= 0) {
            let _ = write!(out, "; Max-Age={}", max_age);
        }
        if let Some(expires) = self.expires {
            let _ = write!(out, "; Expires={}", expires.format(EXPIRES_FORMAT));
        }
        if let Some(domain) = non_blank(&self.domain) {
            let _ = write!(out, "; Domain={}", domain);
        }
        if let Some(path) = non_blank(&self.path) {
            let _ = write!(out, "; Path={}", path);
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if let Some(same_site) = non_blank(&self.same_site) {
            let _ = write!(out, "; SameSite={}", same_site);
        }
        out
    }
}

impl std::fmt::Display for Cookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

impl std::str::FromStr for Cookie {
    type Err = CookieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_set_cookie(s)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Split `key=value` on the first `=`, trimming both sides.
fn split_pair(segment: &str) -> (&str, &str) {
    match segment.split_once('=') {
        Some((key, value)) => (key.trim(), value.trim()),
        None => (segment.trim(), ""),
    }
}

fn parse_expires(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    [EXPIRES_FORMAT, EXPIRES_FORMAT_DASHED]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Parse a single raw `Set-Cookie` value.
pub fn parse_set_cookie(raw: &str) -> Result<Cookie, CookieError> {
    let mut segments = raw.split(';').map(str::trim).filter(|s| !s.is_empty());

    let first = segments.next().ok_or(CookieError::Empty)?;
    let (name, value) = split_pair(first);
    let mut cookie = Cookie::new(name, value);

    for segment in segments {
        let (key, value) = split_pair(segment);
        match key.to_ascii_lowercase().as_str() {
            "max-age" => {
                if let Ok(max_age) = value.parse::<i64>() {
                    cookie.max_age = Some(max_age);
                }
            }
            "expires" => {
                if let Some(expires) = parse_expires(value) {
                    cookie.expires = Some(expires);
                }
            }
            "path" if !value.is_empty() => cookie.path = Some(value.to_string()),
            "domain" if !value.is_empty() => cookie.domain = Some(value.to_string()),
            "samesite" if !value.is_empty() => cookie.same_site = Some(value.to_string()),
            "httponly" => cookie.http_only = true,
            "secure" => cookie.secure = true,
            _ => {}
        }
    }

    Ok(cookie)
}

/// Split a header that merged several `Set-Cookie` values into one string per cookie.
///
/// The first `;` token always starts a cookie. For every following token a
/// comma ends the current cookie and the text after it starts the next one,
/// except inside `Expires`, whose date carries one comma of its own.
pub fn split_combined_set_cookie(raw: &str) -> Vec<String> {
    let mut cookies = Vec::new();
    let mut tokens = raw.split(';').filter(|t| !t.is_empty());

    let Some(first) = tokens.next() else {
        return cookies;
    };
    let mut current = first.to_string();

    for token in tokens {
        let commas: Vec<usize> = token.match_indices(',').map(|(i, _)| i).take(2).collect();
        let is_expires = split_pair(token).0.eq_ignore_ascii_case("expires");

        let split_at = match (commas.as_slice(), is_expires) {
            ([], _) => None,
            ([_], true) => None,
            ([_, second], true) => Some(*second),
            ([first, ..], false) => Some(*first),
            _ => None,
        };

        match split_at {
            None => {
                current.push(';');
                current.push_str(token);
            }
            Some(pos) => {
                current.push(';');
                current.push_str(&token[..pos]);
                push_cookie(&mut cookies, &current);
                current = token[pos + 1..].to_string();
            }
        }
    }
    push_cookie(&mut cookies, &current);

    cookies
}

fn push_cookie(cookies: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        cookies.push(trimmed.to_string());
    }
}

/// Replace the value of an existing `Domain` attribute.
///
/// A cookie without a `Domain` attribute is returned unchanged.
pub fn rewrite_domain(raw: &str, new_domain: &str) -> String {
    DOMAIN_ATTRIBUTE
        .replace_all(raw, |caps: &Captures<'_>| format!("Domain={}{}", new_domain, &caps[2]))
        .into_owned()
}
