//! Record filter for queries
//!
//! `Filter` is a pure predicate over a parsed datagram - no I/O, no
//! allocation. All fields are optional; an absent field matches
//! everything, and set fields are AND'd.

use pond_protocol::Datagram;

/// HTTP status predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    /// Exact status code (e.g. 404)
    Exact(u16),
    /// Status class (e.g. 4 for 400..=499)
    Class(u8),
}

impl StatusFilter {
    /// Parse the wire form: `NNN` (exact) or `Nxx` (class)
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() == 3
            && let Some(rest) = s.strip_suffix("xx")
        {
            let class = rest.parse::<u8>().ok()?;
            return (1..=5).contains(&class).then_some(Self::Class(class));
        }

        let status = s.parse::<u16>().ok()?;
        (100..1000).contains(&status).then_some(Self::Exact(status))
    }

    /// Check a status code against the predicate
    #[inline]
    pub fn matches(&self, status: u16) -> bool {
        match *self {
            Self::Exact(expected) => status == expected,
            Self::Class(class) => status / 100 == class as u16,
        }
    }
}

/// Predicate over a parsed log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Exact site name
    pub site: Option<String>,
    /// Exact host name
    pub host: Option<String>,
    /// Substring of the request URI
    pub uri_substring: Option<String>,
    /// HTTP status predicate
    pub status: Option<StatusFilter>,
    /// Lower time bound, microseconds (inclusive)
    pub since: u64,
    /// Upper time bound, microseconds (inclusive)
    pub until: u64,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            site: None,
            host: None,
            uri_substring: None,
            status: None,
            since: u64::MIN,
            until: u64::MAX,
        }
    }
}

impl Filter {
    /// Create an empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a site filter
    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    /// Add a host filter
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Add a URI substring filter
    pub fn with_uri_substring(mut self, substring: impl Into<String>) -> Self {
        self.uri_substring = Some(substring.into());
        self
    }

    /// Add a status filter
    pub fn with_status(mut self, status: StatusFilter) -> Self {
        self.status = Some(status);
        self
    }

    /// Add a time range (microseconds, both inclusive)
    pub fn with_time_range(mut self, since: u64, until: u64) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    /// Check if the filter matches everything
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.site.is_none()
            && self.host.is_none()
            && self.uri_substring.is_none()
            && self.status.is_none()
            && !self.has_time_range()
    }

    /// True when either time bound is non-default
    #[inline]
    pub fn has_time_range(&self) -> bool {
        self.since != u64::MIN || self.until != u64::MAX
    }

    /// Check if a record matches this filter
    ///
    /// This is the hot path of every scan; all checks are cheap
    /// comparisons on already-parsed fields.
    #[inline]
    pub fn matches(&self, parsed: &Datagram) -> bool {
        // Fast path: empty filter matches everything
        if self.is_empty() {
            return true;
        }

        if let Some(ref site) = self.site
            && parsed.site.as_ref() != Some(site)
        {
            return false;
        }

        if let Some(ref host) = self.host
            && parsed.host.as_ref() != Some(host)
        {
            return false;
        }

        if let Some(ref substring) = self.uri_substring
            && !parsed
                .uri
                .as_ref()
                .is_some_and(|uri| uri.contains(substring.as_str()))
        {
            return false;
        }

        if let Some(status) = self.status
            && !parsed.status.is_some_and(|s| status.matches(s))
        {
            return false;
        }

        if self.has_time_range() {
            // A record without a timestamp fails any non-default bound
            match parsed.timestamp {
                Some(ts) => {
                    if ts < self.since || ts > self.until {
                        return false;
                    }
                }
                None => return false,
            }
        }

        true
    }
}

#[cfg(test)]
#[path = "filter_test.rs"]
mod tests;
