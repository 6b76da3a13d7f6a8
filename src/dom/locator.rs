use super::{Document, ElementHandle};
use log::debug;

/// Resolve the first candidate selector that matches.
///
/// Candidates are ordered most site-specific first. A selector the page
/// rejects, or a failed query, counts as no match.
pub async fn locate(
    doc: &dyn Document,
    candidates: &[&str],
    root: Option<&ElementHandle>,
) -> Option<ElementHandle> {
    locate_match(doc, candidates, root)
        .await
        .map(|(handle, _)| handle)
}

/// Like [`locate`], also reporting which selector won.
pub async fn locate_match<'a>(
    doc: &dyn Document,
    candidates: &[&'a str],
    root: Option<&ElementHandle>,
) -> Option<(ElementHandle, &'a str)> {
    for selector in candidates {
        match doc.query_selector(selector, root).await {
            Ok(Some(handle)) => return Some((handle, *selector)),
            Ok(None) => {}
            Err(e) => debug!("[locate] selector {} failed: {}", selector, e),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::memory::MemoryDocument;
    use crate::dom::ElementKind;

    fn doc() -> MemoryDocument {
        let doc = MemoryDocument::new("https://claude.ai/new");
        doc.add("form", None, MemoryDocument::element("form", ElementKind::Other, ""));
        doc.add("input", Some("form"), MemoryDocument::element("textarea", ElementKind::Value, ""));
        doc.add("fallback", None, MemoryDocument::element("div", ElementKind::Rich, ""));
        doc.bind("textarea", "input");
        doc.bind("[contenteditable]", "fallback");
        doc
    }

    #[tokio::test]
    async fn first_matching_candidate_wins() {
        let doc = doc();
        let found = locate_match(&doc, &["#missing", "textarea", "[contenteditable]"], None).await;
        assert_eq!(found, Some((ElementHandle::new("input"), "textarea")));
    }

    #[tokio::test]
    async fn generic_fallback_used_when_specific_missing() {
        let doc = doc();
        let found = locate(&doc, &["#missing", "[contenteditable]"], None).await;
        assert_eq!(found, Some(ElementHandle::new("fallback")));
    }

    #[tokio::test]
    async fn rejected_selector_counts_as_no_match() {
        let doc = doc();
        let found = locate(&doc, &["::invalid(", "textarea"], None).await;
        assert_eq!(found, Some(ElementHandle::new("input")));
        assert_eq!(locate(&doc, &["::invalid("], None).await, None);
    }

    #[tokio::test]
    async fn root_limits_the_search() {
        let doc = doc();
        let form = ElementHandle::new("form");
        assert_eq!(
            locate(&doc, &["[contenteditable]"], Some(&form)).await,
            None
        );
        assert_eq!(
            locate(&doc, &["textarea"], Some(&form)).await,
            Some(ElementHandle::new("input"))
        );
    }
}
