//! core::types
//!
//! Strong types for identifiers and timestamps.
//!
//! # Types
//!
//! - [`Url`] - Validated absolute IRI identifying a resource, document or container
//! - Date helpers - `xsd:dateTime` formatting with millisecond precision
//!
//! # Url Derivation
//!
//! RDF-backed models are addressed by resource urls such as
//! `https://pod.example/people/alice#it`. From a resource url we derive:
//!
//! - the **document url** (`https://pod.example/people/alice`), which is the
//!   id the engine stores the serialized document under;
//! - the **container url** (`https://pod.example/people/`), which is the
//!   engine collection the document lives in.
//!
//! # Examples
//!
//! ```
//! use soukai::core::types::Url;
//!
//! let url = Url::new("https://pod.example/people/alice#it").unwrap();
//! assert_eq!(url.document_url().as_str(), "https://pod.example/people/alice");
//! assert_eq!(url.container_url().unwrap().as_str(), "https://pod.example/people/");
//! assert_eq!(url.fragment(), Some("it"));
//!
//! assert!(Url::new("not a url").is_err());
//! ```

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),
}

/// A validated absolute IRI.
///
/// Parsing goes through [`url::Url`], so stored urls are always in their
/// normalized serialization: characters that cannot appear in an IRI are
/// percent-encoded, and `\` in special schemes reads as `/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Url(url::Url);

impl Url {
    /// Create a new validated url.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidUrl` if the value is not an absolute IRI.
    pub fn new(url: impl Into<String>) -> Result<Self, TypeError> {
        let url = url.into();
        url::Url::parse(&url)
            .map(Self)
            .map_err(|e| TypeError::InvalidUrl(format!("'{}': {}", url, e)))
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The fragment (after `#`), if any.
    pub fn fragment(&self) -> Option<&str> {
        self.0.fragment()
    }

    /// The url without its fragment.
    pub fn document_url(&self) -> Url {
        let mut document = self.0.clone();
        document.set_fragment(None);
        Url(document)
    }

    /// Whether this url names a container (ends with `/`, no fragment).
    pub fn is_container(&self) -> bool {
        self.fragment().is_none() && self.as_str().ends_with('/')
    }

    /// The container holding this url's document.
    ///
    /// Returns `None` for the root container of an origin, which has
    /// no parent, and for urls without a hierarchical path (`urn:`).
    pub fn container_url(&self) -> Option<Url> {
        if self.0.cannot_be_a_base() {
            return None;
        }

        let path = self.0.path().trim_end_matches('/');
        let last_slash = path.rfind('/')?;
        let container_path = path[..=last_slash].to_string();

        let mut container = self.0.clone();
        container.set_fragment(None);
        container.set_query(None);
        container.set_path(&container_path);
        Some(Url(container))
    }

    /// Whether this url's document lives directly inside `container`.
    pub fn is_contained_by(&self, container: &Url) -> bool {
        self.container_url().as_ref() == Some(container)
    }

    /// A resource url inside this url's document (`<document>#<hash>`).
    pub fn with_fragment(&self, hash: &str) -> Url {
        let mut resource = self.0.clone();
        resource.set_fragment(Some(hash));
        Url(resource)
    }

    /// A child url of this container.
    ///
    /// A trailing `/` is added to `self` when missing.
    pub fn child(&self, slug: &str) -> Url {
        let mut child = self.document_url().0;
        let path = if child.path().ends_with('/') {
            format!("{}{}", child.path(), slug)
        } else {
            format!("{}/{}", child.path(), slug)
        };
        child.set_query(None);
        child.set_path(&path);
        Url(child)
    }

    /// Resolve a (possibly relative) reference against this url.
    pub fn join(&self, reference: &str) -> Result<Url, TypeError> {
        self.0
            .join(reference)
            .map(Url)
            .map_err(|e| TypeError::InvalidUrl(format!("'{}' against '{}': {}", reference, self, e)))
    }
}

impl TryFrom<String> for Url {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Url> for String {
    fn from(url: Url) -> Self {
        url.0.into()
    }
}

impl AsRef<str> for Url {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::fmt::Display for Url {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current time truncated to millisecond precision.
///
/// Dates round-trip through `xsd:dateTime` literals with millisecond
/// precision, so timestamps are minted at that precision to begin with.
pub fn now() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

/// Drop sub-millisecond precision.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use soukai::core::types::{format_date, truncate_to_millis};
///
/// let date = truncate_to_millis(Utc.timestamp_nanos(1_704_423_845_006_123_456));
/// assert_eq!(date.timestamp_subsec_nanos(), 6_000_000);
/// assert_eq!(format_date(&date), "2024-01-05T03:04:05.006Z");
/// ```
pub fn truncate_to_millis(date: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(date.timestamp_millis())
        .single()
        .unwrap_or(date)
}

/// Format a date as `YYYY-MM-DDTHH:mm:ss.mmmZ`.
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use soukai::core::types::format_date;
///
/// let date = Utc.with_ymd_and_hms(2024, 1, 5, 3, 4, 5).unwrap();
/// assert_eq!(format_date(&date), "2024-01-05T03:04:05.000Z");
/// ```
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 / `xsd:dateTime` value into UTC.
///
/// Values without an offset are read as UTC.
///
/// # Errors
///
/// Returns `TypeError::InvalidDate` if the value cannot be parsed.
pub fn parse_date(value: &str) -> Result<DateTime<Utc>, TypeError> {
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Ok(date.with_timezone(&Utc));
    }

    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| TypeError::InvalidDate(format!("'{}': {}", value, e)))
}

/// Build a date from epoch milliseconds.
pub fn date_from_millis(millis: i64) -> Result<DateTime<Utc>, TypeError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| TypeError::InvalidDate(format!("{} is out of range", millis)))
}

#[cfg(test)]
mod tests {
    use super::*;

    mod url {
        use super::*;

        #[test]
        fn valid_urls() {
            assert_eq!(Url::new("https://example.com").unwrap().as_str(), "https://example.com/");
            assert!(Url::new("https://example.com/path#frag").is_ok());
            assert!(Url::new("urn:uuid:1234").is_ok());
            assert!(Url::new("solid+http://example.com/").is_ok());
        }

        #[test]
        fn invalid_urls() {
            assert!(Url::new("").is_err());
            assert!(Url::new("relative/path").is_err());
            assert!(Url::new("1http://example.com").is_err());
            assert!(Url::new("https://exa mple.com/").is_err());
            assert!(Url::new("https://[bad/").is_err());
        }

        #[test]
        fn iri_invalid_characters_are_normalized() {
            let spaced = Url::new("https://example.com/with space").unwrap();
            assert_eq!(spaced.as_str(), "https://example.com/with%20space");

            let angled = Url::new("https://example.com/<bad>").unwrap();
            assert_eq!(angled.as_str(), "https://example.com/%3Cbad%3E");

            let backslashed = Url::new("https://pod.example/people/al\\ice#it").unwrap();
            assert_eq!(backslashed.as_str(), "https://pod.example/people/al/ice#it");
        }

        #[test]
        fn non_hierarchical_urls_have_no_container() {
            let urn = Url::new("urn:uuid:1234").unwrap();
            assert_eq!(urn.container_url(), None);
            assert_eq!(urn.document_url().as_str(), "urn:uuid:1234");
        }

        #[test]
        fn document_and_container() {
            let url = Url::new("https://pod.example/people/alice#it").unwrap();
            assert_eq!(url.document_url().as_str(), "https://pod.example/people/alice");
            assert_eq!(
                url.container_url().unwrap().as_str(),
                "https://pod.example/people/"
            );

            let container = Url::new("https://pod.example/people/").unwrap();
            assert!(container.is_container());
            assert_eq!(
                container.container_url().unwrap().as_str(),
                "https://pod.example/"
            );

            let root = Url::new("https://pod.example/").unwrap();
            assert_eq!(root.container_url(), None);
        }

        #[test]
        fn containment() {
            let container = Url::new("https://pod.example/people/").unwrap();
            let direct = Url::new("https://pod.example/people/alice#it").unwrap();
            let nested = Url::new("https://pod.example/people/friends/bob#it").unwrap();

            assert!(direct.is_contained_by(&container));
            assert!(!nested.is_contained_by(&container));
        }

        #[test]
        fn fragments_and_children() {
            let document = Url::new("https://pod.example/notes/1").unwrap();
            assert_eq!(document.with_fragment("it").as_str(), "https://pod.example/notes/1#it");

            let container = Url::new("https://pod.example/notes").unwrap();
            assert_eq!(container.child("2").as_str(), "https://pod.example/notes/2");
        }

        #[test]
        fn join_references() {
            let base = Url::new("https://pod.example/a/b/doc#it").unwrap();

            assert_eq!(base.join("#me").unwrap().as_str(), "https://pod.example/a/b/doc#me");
            assert_eq!(base.join("other").unwrap().as_str(), "https://pod.example/a/b/other");
            assert_eq!(base.join("../c").unwrap().as_str(), "https://pod.example/a/c");
            assert_eq!(base.join("/root").unwrap().as_str(), "https://pod.example/root");
            assert_eq!(base.join("").unwrap().as_str(), "https://pod.example/a/b/doc");
            assert_eq!(
                base.join("//other.example/x").unwrap().as_str(),
                "https://other.example/x"
            );
            assert_eq!(
                base.join("http://else.example/").unwrap().as_str(),
                "http://else.example/"
            );
        }

        #[test]
        fn serde_roundtrip() {
            let url = Url::new("https://pod.example/x#it").unwrap();
            let json = serde_json::to_string(&url).unwrap();
            assert_eq!(json, "\"https://pod.example/x#it\"");
            let parsed: Url = serde_json::from_str(&json).unwrap();
            assert_eq!(url, parsed);

            let invalid: Result<Url, _> = serde_json::from_str("\"nope\"");
            assert!(invalid.is_err());
        }
    }

    mod dates {
        use super::*;

        #[test]
        fn format_always_has_millis() {
            let date = Utc.with_ymd_and_hms(2024, 1, 5, 3, 4, 5).unwrap();
            assert_eq!(format_date(&date), "2024-01-05T03:04:05.000Z");

            let with_millis = date_from_millis(date.timestamp_millis() + 6).unwrap();
            assert_eq!(format_date(&with_millis), "2024-01-05T03:04:05.006Z");
        }

        #[test]
        fn parse_with_offset_converts_to_utc() {
            let date = parse_date("2024-01-05T05:04:05.006+02:00").unwrap();
            assert_eq!(format_date(&date), "2024-01-05T03:04:05.006Z");
        }

        #[test]
        fn parse_without_offset_is_utc() {
            let date = parse_date("2024-01-05T03:04:05").unwrap();
            assert_eq!(format_date(&date), "2024-01-05T03:04:05.000Z");
        }

        #[test]
        fn parse_rejects_garbage() {
            assert!(matches!(parse_date("yesterday"), Err(TypeError::InvalidDate(_))));
        }

        #[test]
        fn now_has_millisecond_precision() {
            let now = now();
            assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
        }
    }
}
