use regex::Regex;

use super::package::{InstallState, PackageRecord};

/// Predicate over package records, evaluated against a frozen snapshot
#[derive(Clone, Debug)]
pub enum Filter {
    /// Matches every record
    All,

    /// Exact package name
    Name(String),

    /// Shell-style glob over the package name (`*` and `?`).
    /// `None` holds a pattern that failed to compile and matches nothing.
    NameGlob(Option<Regex>),

    /// Case-insensitive substring of the package name
    NameContains(String),

    /// Exact architecture
    Arch(String),

    /// Exact repository tag
    Repository(String),

    /// Installation state
    InstallState(InstallState),

    /// Metadata key with an exact value
    Metadata { key: String, value: String },

    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Create an exact name filter
    pub fn name(name: impl Into<String>) -> Self {
        Filter::Name(name.into())
    }

    /// Create a glob filter; an invalid pattern yields a filter that matches nothing
    pub fn name_glob(pattern: &str) -> Self {
        Filter::NameGlob(glob_to_regex(pattern))
    }

    /// Create a case-insensitive substring filter
    pub fn name_contains(needle: impl Into<String>) -> Self {
        Filter::NameContains(needle.into().to_lowercase())
    }

    /// Create an architecture filter
    pub fn arch(arch: impl Into<String>) -> Self {
        Filter::Arch(arch.into())
    }

    /// Create a repository filter
    pub fn repository(repository: impl Into<String>) -> Self {
        Filter::Repository(repository.into())
    }

    /// Create a custom metadata filter
    pub fn metadata(key: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Metadata {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut filters) => {
                filters.push(other);
                Filter::And(filters)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut filters) => {
                filters.push(other);
                Filter::Or(filters)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    /// Evaluate this filter against a record.
    ///
    /// Empty name/arch/repository arguments never match.
    pub fn matches(&self, record: &PackageRecord) -> bool {
        match self {
            Filter::All => true,
            Filter::Name(name) => !name.is_empty() && record.name() == name,
            Filter::NameGlob(regex) => regex
                .as_ref()
                .map(|re| re.is_match(record.name()))
                .unwrap_or(false),
            Filter::NameContains(needle) => {
                !needle.is_empty() && record.name().to_lowercase().contains(needle.as_str())
            }
            Filter::Arch(arch) => !arch.is_empty() && record.arch() == arch,
            Filter::Repository(repo) => !repo.is_empty() && record.repository() == repo,
            Filter::InstallState(state) => record.install_state == *state,
            Filter::Metadata { key, value } => record.metadata.get(key) == Some(value),
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
            Filter::Not(inner) => !inner.matches(record),
        }
    }
}

/// Convert a glob pattern to an anchored regex
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    if pattern.is_empty() {
        return None;
    }

    let mut regex_pattern = String::with_capacity(pattern.len() + 2);
    regex_pattern.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => regex_pattern.push_str(".*"),
            '?' => regex_pattern.push('.'),
            _ => regex_pattern.push_str(&regex::escape(ch.encode_utf8(&mut [0u8; 4]))),
        }
    }
    regex_pattern.push('$');

    Regex::new(&regex_pattern).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, arch: &str, repo: &str) -> PackageRecord {
        PackageRecord::new(name, "1.0", arch, repo)
    }

    #[test]
    fn test_filter_constructors() {
        assert!(matches!(Filter::name("bash"), Filter::Name(_)));
        assert!(matches!(Filter::name_glob("lib*"), Filter::NameGlob(Some(_))));
        assert!(matches!(Filter::arch("x86_64"), Filter::Arch(_)));
        assert!(matches!(Filter::metadata("group", "devel"), Filter::Metadata { .. }));
    }

    #[test]
    fn test_name_glob() {
        let filter = Filter::name_glob("lib?ssl*");
        assert!(filter.matches(&record("libssl3", "x86_64", "core")));
        assert!(filter.matches(&record("libossl", "x86_64", "core")));
        assert!(!filter.matches(&record("openssl", "x86_64", "core")));

        // Regex metacharacters are literal in globs
        let filter = Filter::name_glob("g++");
        assert!(filter.matches(&record("g++", "x86_64", "core")));
        assert!(!filter.matches(&record("gg", "x86_64", "core")));
    }

    #[test]
    fn test_empty_arguments_match_nothing() {
        let rec = record("bash", "x86_64", "core");
        assert!(!Filter::name("").matches(&rec));
        assert!(!Filter::name_glob("").matches(&rec));
        assert!(!Filter::name_contains("").matches(&rec));
        assert!(!Filter::arch("").matches(&rec));
    }

    #[test]
    fn test_combinators() {
        let rec = record("python3", "x86_64", "extra").with_metadata("group", "devel");

        let filter = Filter::name_contains("PYTHON").and(Filter::arch("x86_64"));
        assert!(filter.matches(&rec));

        let filter = Filter::repository("core").or(Filter::metadata("group", "devel"));
        assert!(filter.matches(&rec));

        let filter = Filter::InstallState(InstallState::Installed).negate();
        assert!(filter.matches(&rec));

        assert!(!Filter::And(vec![Filter::All, Filter::arch("aarch64")]).matches(&rec));
        assert!(Filter::And(vec![]).matches(&rec));
        assert!(!Filter::Or(vec![]).matches(&rec));
    }
}
