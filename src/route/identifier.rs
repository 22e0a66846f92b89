//! Resource identifiers of the form `content://<authority>/<path>?<query>`.

use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Scheme used when rendering identifiers built by this crate.
pub const SCHEME: &str = "content";

/// Query parameter carrying a legacy row limit.
pub const QUERY_PARAM_LIMIT: &str = "limit";

/// Query parameter that suppresses change notifications for a write.
pub const QUERY_PARAM_SUPPRESS_NOTIFICATION: &str = "suppress_notification";

/// A parsed resource identifier.
///
/// Parsing is purely syntactic. Whether an identifier names anything is the
/// route table's business.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    scheme: String,
    authority: String,
    segments: Vec<String>,
    query: Vec<(String, String)>,
}

impl Identifier {
    /// Parse an identifier string.
    ///
    /// The scheme is optional; `notes.provider/notes/4` is accepted and
    /// rendered back with the `content` scheme.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let unrecognized = || StoreError::UnrecognizedIdentifier(raw.to_string());

        let (scheme, rest) = match raw.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() => (scheme.to_string(), rest),
            Some(_) => return Err(unrecognized()),
            None => (SCHEME.to_string(), raw),
        };

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };

        let mut parts = location.split('/');
        let authority = parts.next().unwrap_or_default();
        if authority.is_empty() {
            return Err(unrecognized());
        }

        let segments: Vec<String> = parts
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        let query = query
            .map(|q| {
                q.split('&')
                    .filter(|pair| !pair.is_empty())
                    .map(|pair| match pair.split_once('=') {
                        Some((key, value)) => (key.to_string(), value.to_string()),
                        None => (pair.to_string(), String::new()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            scheme,
            authority: authority.to_string(),
            segments,
            query,
        })
    }

    /// Build an identifier from an authority and path segments.
    pub fn from_parts<I, S>(authority: &str, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scheme: SCHEME.to_string(),
            authority: authority.to_string(),
            segments: segments.into_iter().map(Into::into).collect(),
            query: Vec::new(),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The numeric id in the last path segment, if there is one.
    pub fn record_id(&self) -> Option<i64> {
        let segment = self.last_segment()?;
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        segment.parse().ok()
    }

    /// First value of query parameter `key`.
    pub fn query_parameter(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Boolean query parameter; `false` and `0` (any case) are false,
    /// anything else present is true.
    pub fn boolean_query_parameter(&self, key: &str, default: bool) -> bool {
        match self.query_parameter(key) {
            Some(value) => {
                let value = value.to_ascii_lowercase();
                value != "false" && value != "0"
            }
            None => default,
        }
    }

    /// True when the caller asked for no change notifications.
    pub fn is_suppress_notification(&self) -> bool {
        self.boolean_query_parameter(QUERY_PARAM_SUPPRESS_NOTIFICATION, false)
    }

    /// A copy without the query string.
    pub fn without_query(&self) -> Self {
        Self {
            query: Vec::new(),
            ..self.clone()
        }
    }

    /// A copy with `id` appended as a new last path segment.
    pub fn with_appended_id(&self, id: i64) -> Self {
        let mut segments = self.segments.clone();
        segments.push(id.to_string());
        Self {
            segments,
            query: Vec::new(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        for (i, (key, value)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            if value.is_empty() {
                write!(f, "{sep}{key}")?;
            } else {
                write!(f, "{sep}{key}={value}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for Identifier {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
