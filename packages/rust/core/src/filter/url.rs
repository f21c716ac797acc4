use tabdivider_shared::Page;

use super::normalize::simplify;
use super::{FilterError, PageFilter};

/// Query is a substring of the url. Displays pages with url and title swapped.
pub struct UrlFilter;

impl PageFilter for UrlFilter {
    fn name(&self) -> &str {
        "url"
    }

    fn aliases(&self) -> &[&str] {
        &["address", "link", "site", "url"]
    }

    fn description(&self) -> &str {
        "Matches when the phrase is contained in the url"
    }

    fn matches(&self, query: &str, pages: &[Page]) -> Result<Vec<usize>, FilterError> {
        let query = simplify(query);
        Ok(pages
            .iter()
            .enumerate()
            .filter(|(_, page)| simplify(&page.url).contains(&query))
            .map(|(index, _)| index)
            .collect())
    }

    fn to_display(&self, page: &Page) -> Page {
        Page {
            title: page.url.clone(),
            url: page.title.clone(),
            created_at: page.created_at,
        }
    }
}
