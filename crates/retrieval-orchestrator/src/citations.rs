//! Pairing formatted list items with grounding sources.
//!
//! The formatter never sees the sources, so the pairing is a guess. Label
//! matches win, then the source at the item's position, then the `#`
//! placeholder. Every item in a target list ends up with a link.

use std::collections::HashSet;

use pulse_core::{Citation, CitationMatch, CitationTarget, CITATION_PLACEHOLDER};
use serde_json::Value;

/// Characters of the label compared against source titles.
const LABEL_PREFIX_CHARS: usize = 20;
/// Leading label words considered by the word-overlap fallback.
const LABEL_WORDS: usize = 6;
const MIN_TOKEN_CHARS: usize = 3;

/// Write a link into every object of the list at `target.path`. Returns the
/// number of items linked.
pub fn reconcile(data: &mut Value, target: &CitationTarget, citations: &[Citation]) -> usize {
    let mut items = Vec::new();
    collect_items(data, &target.path, &mut items);

    let linked = items.len();
    for (index, item) in items.into_iter().enumerate() {
        let Some(object) = item.as_object_mut() else {
            continue;
        };

        let chosen = match &target.strategy {
            CitationMatch::Label { field } => object
                .get(field)
                .and_then(Value::as_str)
                .and_then(|label| best_match(label, citations))
                .or_else(|| citations.get(index)),
            CitationMatch::Positional => citations.get(index),
        };

        let link = chosen
            .map(|c| c.uri.clone())
            .unwrap_or_else(|| CITATION_PLACEHOLDER.to_string());
        object.insert(target.link_field.clone(), Value::String(link));
    }
    linked
}

/// Arrays along the path are flattened, so items are numbered in document
/// order across nested lists.
fn collect_items<'a>(node: &'a mut Value, path: &[String], out: &mut Vec<&'a mut Value>) {
    match node {
        Value::Array(elements) => {
            for element in elements.iter_mut() {
                collect_items(element, path, out);
            }
        }
        Value::Object(_) => match path.split_first() {
            None => out.push(node),
            Some((head, rest)) => {
                if let Some(child) = node.get_mut(head.as_str()) {
                    collect_items(child, rest, out);
                }
            }
        },
        _ => {}
    }
}

/// Best source for a label, or `None` when nothing overlaps enough.
///
/// A source whose title contains the label's first 20 characters wins
/// outright. Otherwise the title sharing the most of the label's leading
/// words is taken, provided it shares at least half of them (and at least
/// two when the label has two or more). Ties keep the earlier source.
pub fn best_match<'a>(label: &str, citations: &'a [Citation]) -> Option<&'a Citation> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }

    let prefix = label
        .chars()
        .take(LABEL_PREFIX_CHARS)
        .collect::<String>()
        .to_lowercase();
    if let Some(hit) = citations
        .iter()
        .find(|c| c.title.to_lowercase().contains(&prefix))
    {
        return Some(hit);
    }

    let words: Vec<String> = tokens(label).take(LABEL_WORDS).collect();
    if words.is_empty() {
        return None;
    }
    let needed = words.len().min(2);

    let mut best: Option<(usize, &Citation)> = None;
    for citation in citations {
        let title: HashSet<String> = tokens(&citation.title).collect();
        let shared = words.iter().filter(|w| title.contains(*w)).count();
        let enough = shared >= needed && shared * 2 >= words.len();
        if enough && best.map_or(true, |(score, _)| shared > score) {
            best = Some((shared, citation));
        }
    }
    best.map(|(_, citation)| citation)
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sources() -> Vec<Citation> {
        vec![
            Citation::new("Tech stocks rally on earnings", "https://a.test"),
            Citation::new("Fed raises interest rates again", "https://b.test"),
        ]
    }

    #[test]
    fn test_word_overlap_beats_position() {
        let mut data = json!({ "news": [ { "headline": "Fed raises rates" } ] });
        let target = CitationTarget::by_label("news", "headline", "url");

        reconcile(&mut data, &target, &sources());
        assert_eq!(data["news"][0]["url"], "https://b.test");
    }

    #[test]
    fn test_prefix_containment_is_case_insensitive() {
        let sources = sources();
        let found = best_match("TECH STOCKS RALLY ON EARNINGS SEASON", &sources).unwrap();
        assert_eq!(found.uri, "https://a.test");
    }

    #[test]
    fn test_weak_overlap_falls_back_to_position() {
        // One shared word of four is not enough
        assert!(best_match("Rates hold steady overseas", &sources()).is_none());

        let mut data = json!({ "news": [
            { "headline": "Gold climbs" },
            { "headline": "Rates hold steady overseas" }
        ] });
        let target = CitationTarget::by_label("news", "headline", "url");
        reconcile(&mut data, &target, &sources());
        assert_eq!(data["news"][0]["url"], "https://a.test");
        assert_eq!(data["news"][1]["url"], "https://b.test");
    }

    #[test]
    fn test_placeholder_when_sources_run_out() {
        let mut data = json!({ "articles": [
            { "title": "One" }, { "title": "Two" }, { "title": "Three" }
        ] });
        let target = CitationTarget::by_label("articles", "title", "uri");
        let linked = reconcile(&mut data, &target, &sources()[..1]);

        assert_eq!(linked, 3);
        assert_eq!(data["articles"][0]["uri"], "https://a.test");
        assert_eq!(data["articles"][1]["uri"], CITATION_PLACEHOLDER);
        assert_eq!(data["articles"][2]["uri"], CITATION_PLACEHOLDER);
    }

    #[test]
    fn test_missing_label_uses_position() {
        let mut data = json!({ "news": [ { "summary": "no headline" } ] });
        let target = CitationTarget::by_label("news", "headline", "url");
        reconcile(&mut data, &target, &sources());
        assert_eq!(data["news"][0]["url"], "https://a.test");
    }

    #[test]
    fn test_positional_numbering_spans_nested_lists() {
        let mut data = json!({ "eventCategories": [
            { "categoryTitle": "Live", "events": [ { "id": "1" }, { "id": "2" } ] },
            { "categoryTitle": "Calendar", "events": [ { "id": "3" } ] }
        ] });
        let target = CitationTarget::positional("eventCategories.events", "url");
        let linked = reconcile(&mut data, &target, &sources());
        assert_eq!(linked, 3);
        assert_eq!(data["eventCategories"][0]["events"][0]["url"], "https://a.test");
        assert_eq!(data["eventCategories"][0]["events"][1]["url"], "https://b.test");
        assert_eq!(data["eventCategories"][1]["events"][0]["url"], CITATION_PLACEHOLDER);
    }

    #[test]
    fn test_missing_path_links_nothing() {
        let mut data = json!({ "other": [] });
        let target = CitationTarget::by_label("news", "headline", "url");
        assert_eq!(reconcile(&mut data, &target, &sources()), 0);
        assert_eq!(data, json!({ "other": [] }));
    }

    #[test]
    fn test_tie_keeps_first_source() {
        let citations = vec![
            Citation::new("Nvidia earnings beat", "https://first.test"),
            Citation::new("Nvidia earnings miss", "https://second.test"),
        ];
        let found = best_match("Nvidia earnings surprise markets", &citations).unwrap();
        assert_eq!(found.uri, "https://first.test");
    }
}
