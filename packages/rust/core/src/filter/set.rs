use tabdivider_shared::Page;

use super::normalize::simplify;
use super::{FilterError, PageFilter};

/// Every space separated term must appear in the title; a `-term` must not.
pub struct SetFilter;

impl PageFilter for SetFilter {
    fn name(&self) -> &str {
        "set"
    }

    fn aliases(&self) -> &[&str] {
        &["has", "includes", "partial", "set", "some"]
    }

    fn description(&self) -> &str {
        "Matches when all of the space separated terms are found in the title"
    }

    fn matches(&self, query: &str, pages: &[Page]) -> Result<Vec<usize>, FilterError> {
        let query = simplify(query);
        let terms: Vec<&str> = query.split(' ').collect();

        Ok(pages
            .iter()
            .enumerate()
            .filter(|(_, page)| {
                let title = simplify(&page.title);
                terms.iter().all(|term| match term.strip_prefix('-') {
                    // A lone "-" excludes nothing
                    Some(excluded) => excluded.is_empty() || !title.contains(excluded),
                    None => title.contains(term),
                })
            })
            .map(|(index, _)| index)
            .collect())
    }
}
