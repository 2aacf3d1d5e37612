//! The set of refused domains.
//!
//! Entries are stored fully qualified (with a trailing dot). A query name is
//! blocked when it equals an entry or when one of its parent domains does,
//! so `foo.example.com.` is covered by `example.com.` while
//! `notexample.com.` is not.

use std::collections::HashSet;

/// Operator-configured domains to refuse.
///
/// Immutable after construction and shared between query tasks without
/// locking.
#[derive(Debug, Clone, Default)]
pub struct BlockSet {
    entries: HashSet<String>,
}

impl BlockSet {
    /// Build a block set from plain or fully-qualified domain names.
    ///
    /// Whitespace is trimmed and a trailing dot appended where missing.
    /// Empty entries are skipped.
    pub fn new<I, S>(sites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = sites
            .into_iter()
            .filter_map(|site| {
                let site = site.as_ref().trim();
                let bare = site.trim_end_matches('.');
                (!bare.is_empty()).then(|| format!("{bare}."))
            })
            .collect();

        Self { entries }
    }

    /// Check whether a query name is refused.
    ///
    /// Walks the name's parent domains label by label, so the cost grows
    /// with the depth of the name rather than with the size of the set.
    pub fn is_blocked(&self, name: &str) -> bool {
        let fqdn = fully_qualified(name);
        let fqdn = fqdn.as_ref();

        if self.entries.contains(fqdn) {
            return true;
        }

        fqdn.match_indices('.')
            .map(|(idx, _)| &fqdn[idx + 1..])
            .filter(|suffix| !suffix.is_empty())
            .any(|suffix| self.entries.contains(suffix))
    }

    /// Check whether a domain is itself an entry of the set.
    ///
    /// Unlike [`is_blocked`](Self::is_blocked), subdomains of an entry are
    /// not members.
    pub fn contains(&self, domain: &str) -> bool {
        self.entries.contains(fully_qualified(domain).as_ref())
    }

    /// Returns the number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn fully_qualified(name: &str) -> std::borrow::Cow<'_, str> {
    if name.ends_with('.') {
        std::borrow::Cow::Borrowed(name)
    } else {
        std::borrow::Cow::Owned(format!("{name}."))
    }
}

/// Strip the trailing root dot for display and stats keys.
pub fn clean_domain(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_block_exact_match_domains() {
        let set = BlockSet::new(["linkedin.com", "facebook.com."]);

        assert!(set.is_blocked("linkedin.com."));
        assert!(set.is_blocked("facebook.com."));
        assert!(!set.is_blocked("twitter.com."));
    }

    #[test]
    fn should_block_subdomains_on_label_boundary() {
        let set = BlockSet::new(["blocked.com"]);

        assert!(set.is_blocked("a.b.blocked.com."));
        assert!(set.is_blocked("perf.blocked.com."));
        assert!(!set.is_blocked("xblocked.com."));
        assert!(!set.is_blocked("notblocked.com."));
        assert!(!set.is_blocked("blocked.com.evil.net."));
    }

    #[test]
    fn should_not_block_parent_of_entry() {
        let set = BlockSet::new(["ads.example.com"]);

        assert!(!set.is_blocked("example.com."));
        assert!(!set.is_blocked("com."));
    }

    #[test]
    fn should_match_case_sensitively() {
        let set = BlockSet::new(["social.example"]);

        assert!(set.is_blocked("social.example."));
        assert!(!set.is_blocked("Social.Example."));
    }

    #[test]
    fn should_accept_names_without_trailing_dot() {
        let set = BlockSet::new(["social.example."]);

        assert!(set.is_blocked("social.example"));
        assert!(set.is_blocked("sub.social.example"));
    }

    #[test]
    fn should_report_membership_without_subdomains() {
        let set = BlockSet::new(["social.example"]);

        assert!(set.contains("social.example"));
        assert!(set.contains("social.example."));
        assert!(!set.contains("sub.social.example"));
    }

    #[test]
    fn should_skip_empty_entries_and_deduplicate() {
        let set = BlockSet::new(["a.com", "a.com.", "  ", "."]);

        assert_eq!(set.len(), 1);
        assert!(!set.is_empty());
    }

    #[test]
    fn should_not_block_when_empty() {
        let set = BlockSet::default();

        assert!(set.is_empty());
        assert!(!set.is_blocked("google.com."));
    }

    #[test]
    fn should_strip_root_dot() {
        assert_eq!(clean_domain("example.com."), "example.com");
        assert_eq!(clean_domain("example.com"), "example.com");
    }
}
