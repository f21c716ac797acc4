use tabdivider_shared::Page;

use super::normalize::simplify;
use super::{FilterError, PageFilter};

/// Inverse of the exact filter.
pub struct NotFilter;

impl PageFilter for NotFilter {
    fn name(&self) -> &str {
        "not"
    }

    fn aliases(&self) -> &[&str] {
        &["anti", "exclude", "not", "opposite", "without"]
    }

    fn description(&self) -> &str {
        "Matches when the phrase is not contained in the title"
    }

    fn matches(&self, query: &str, pages: &[Page]) -> Result<Vec<usize>, FilterError> {
        let query = simplify(query);
        Ok(pages
            .iter()
            .enumerate()
            .filter(|(_, page)| !simplify(&page.title).contains(&query))
            .map(|(index, _)| index)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::titled;

    #[test]
    fn keeps_pages_without_phrase() {
        let pages = titled(&["News", "Newsletter", "Weather"]);
        assert_eq!(NotFilter.matches("news", &pages).unwrap(), vec![2]);
        assert_eq!(NotFilter.matches("", &pages).unwrap(), Vec::<usize>::new());
    }
}
