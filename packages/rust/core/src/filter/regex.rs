use regex::Regex;
use tabdivider_shared::Page;

use super::normalize::simplify;
use super::{FilterError, PageFilter};

/// Regular expression tested against the simplified title.
///
/// The pattern itself is used as typed, so it should be written in lower
/// case without accents to match.
pub struct RegexFilter;

impl PageFilter for RegexFilter {
    fn name(&self) -> &str {
        "regex"
    }

    fn aliases(&self) -> &[&str] {
        &["regex", "regexp", "regularexpression"]
    }

    fn description(&self) -> &str {
        "Matches when regex is applicable to the title"
    }

    fn matches(&self, query: &str, pages: &[Page]) -> Result<Vec<usize>, FilterError> {
        let regex = Regex::new(query).map_err(|e| FilterError::InvalidPattern(e.to_string()))?;
        Ok(pages
            .iter()
            .enumerate()
            .filter(|(_, page)| regex.is_match(&simplify(&page.title)))
            .map(|(index, _)| index)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::titled;

    #[test]
    fn anchored_pattern() {
        let pages = titled(&["Beta", "alphabet", "Bêta release"]);
        assert_eq!(RegexFilter.matches("^b", &pages).unwrap(), vec![0, 2]);
        assert_eq!(RegexFilter.matches("bet$", &pages).unwrap(), vec![1]);
    }

    #[test]
    fn invalid_pattern_fails() {
        let err = RegexFilter.matches("(", &titled(&["x"])).unwrap_err();
        assert!(matches!(err, FilterError::InvalidPattern(_)));
    }
}
