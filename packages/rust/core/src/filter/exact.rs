use tabdivider_shared::Page;

use super::normalize::simplify;
use super::{FilterError, PageFilter};

/// Query is a substring of the title. Registered under the empty alias.
pub struct ExactFilter;

impl PageFilter for ExactFilter {
    fn name(&self) -> &str {
        "exact"
    }

    fn aliases(&self) -> &[&str] {
        &["", "cont", "continuous", "exact", "full", "precise"]
    }

    fn description(&self) -> &str {
        "Matches when the phrase is contained in the title"
    }

    fn matches(&self, query: &str, pages: &[Page]) -> Result<Vec<usize>, FilterError> {
        let query = simplify(query);
        Ok(pages
            .iter()
            .enumerate()
            .filter(|(_, page)| simplify(&page.title).contains(&query))
            .map(|(index, _)| index)
            .collect())
    }
}
