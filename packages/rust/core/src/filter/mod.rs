//! Page filters and the query language that selects them.
//!
//! A query may start with `:word`, terminated by a space or the end of the
//! input; the word picks a filter by alias and the rest is that filter's
//! query. Without a prefix the filter registered under the empty alias runs.
//! An unknown prefix also falls back to that default filter.

mod exact;
mod normalize;
mod not;
mod regex;
mod set;
mod url;

use std::collections::HashMap;

use tabdivider_shared::Page;

pub use exact::ExactFilter;
pub use normalize::simplify;
pub use not::NotFilter;
pub use self::regex::RegexFilter;
pub use set::SetFilter;
pub use self::url::UrlFilter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Why a filter could not run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
}

/// A named way of selecting pages from a divider.
pub trait PageFilter: Send + Sync {
    /// Canonical name, used in logs and help output.
    fn name(&self) -> &str;

    /// Every prefix word that selects this filter.
    fn aliases(&self) -> &[&str];

    fn description(&self) -> &str {
        ""
    }

    /// Indices of matching pages, ascending.
    fn matches(&self, query: &str, pages: &[Page]) -> Result<Vec<usize>, FilterError>;

    /// How a page is shown while this filter is active.
    fn to_display(&self, page: &Page) -> Page {
        page.clone()
    }
}

// ---------------------------------------------------------------------------
// Query parsing
// ---------------------------------------------------------------------------

/// A query split into its prefix word and remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedQuery<'a> {
    /// Prefix word without the colon; empty when absent.
    pub prefix: &'a str,
    pub query: &'a str,
}

impl<'a> ParsedQuery<'a> {
    pub fn parse(raw: &'a str) -> Self {
        let Some(rest) = raw.strip_prefix(':') else {
            return Self {
                prefix: "",
                query: raw,
            };
        };
        match rest.split_once(' ') {
            Some((prefix, query)) => Self { prefix, query },
            None => Self {
                prefix: rest,
                query: "",
            },
        }
    }
}

/// How a query was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Default filter (or no query at all).
    Pass,
    /// A recognized prefix selected a named filter.
    Special,
    /// The filter could not run; the visible set should not change.
    Failed,
}

/// Result of [`FilterRegistry::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    /// Name of the filter that ran.
    pub filter: String,
    pub status: QueryStatus,
    /// Visible page indices, ascending. Empty when failed.
    pub indices: Vec<usize>,
    /// Every page in display form, same order as the input.
    pub display: Vec<Page>,
    pub error: Option<FilterError>,
}

impl FilterOutcome {
    pub fn is_failed(&self) -> bool {
        self.status == QueryStatus::Failed
    }

    /// The visible pages in display form.
    pub fn visible(&self) -> Vec<&Page> {
        self.indices
            .iter()
            .filter_map(|&index| self.display.get(index))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds registered filters and resolves aliases to them.
pub struct FilterRegistry {
    filters: Vec<Box<dyn PageFilter>>,
    by_alias: HashMap<String, usize>,
}

impl FilterRegistry {
    /// A registry with no filters; every query matches everything.
    pub fn empty() -> Self {
        Self {
            filters: Vec::new(),
            by_alias: HashMap::new(),
        }
    }

    /// A registry with every built-in filter.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(ExactFilter));
        registry.register(Box::new(UrlFilter));
        registry.register(Box::new(RegexFilter));
        registry.register(Box::new(SetFilter));
        registry.register(Box::new(NotFilter));
        registry
    }

    /// Add a filter under all of its aliases. Later registrations win.
    pub fn register(&mut self, filter: Box<dyn PageFilter>) {
        let slot = self.filters.len();
        for alias in filter.aliases() {
            self.by_alias.insert((*alias).to_string(), slot);
        }
        self.filters.push(filter);
    }

    pub fn resolve(&self, alias: &str) -> Option<&dyn PageFilter> {
        self.by_alias
            .get(alias)
            .and_then(|&slot| self.filters.get(slot))
            .map(|f| f.as_ref())
    }

    /// Registered filters in registration order.
    pub fn filters(&self) -> impl Iterator<Item = &dyn PageFilter> {
        self.filters.iter().map(|f| f.as_ref() as &dyn PageFilter)
    }

    /// Run `raw` against `pages`.
    pub fn apply(&self, raw: &str, pages: &[Page]) -> FilterOutcome {
        let parsed = ParsedQuery::parse(raw);

        if parsed.prefix.is_empty() && parsed.query.is_empty() {
            return FilterOutcome {
                filter: "all".into(),
                status: QueryStatus::Pass,
                indices: (0..pages.len()).collect(),
                display: pages.to_vec(),
                error: None,
            };
        }

        let (filter, status) = match self.resolve(parsed.prefix) {
            Some(filter) if !parsed.prefix.is_empty() => (Some(filter), QueryStatus::Special),
            _ => (self.resolve(""), QueryStatus::Pass),
        };

        let Some(filter) = filter else {
            return FilterOutcome {
                filter: "all".into(),
                status,
                indices: (0..pages.len()).collect(),
                display: pages.to_vec(),
                error: None,
            };
        };

        let display = pages.iter().map(|p| filter.to_display(p)).collect();
        match filter.matches(parsed.query, pages) {
            Ok(indices) => FilterOutcome {
                filter: filter.name().to_string(),
                status,
                indices,
                display,
                error: None,
            },
            Err(error) => {
                tracing::debug!(filter = filter.name(), %error, "query failed");
                FilterOutcome {
                    filter: filter.name().to_string(),
                    status: QueryStatus::Failed,
                    indices: Vec::new(),
                    display,
                    error: Some(error),
                }
            }
        }
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
