//! Strategy selection and the equation→section expansion heuristic.

use crate::model::Strategy;
use once_cell::sync::Lazy;
use regex::Regex;

static ENTITY_ID_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(section|table|equation|figure)\s+[\d.\-]+").unwrap());

static EQUATION_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)equation\s+(\d+)-(\d+)").unwrap());

/// Rule-based strategy selection, first match wins. An LLM-backed
/// refinement may override this elsewhere in the pipeline; on refinement
/// failure the rule-based choice here stands unchanged.
pub fn select_strategy(text: &str, hint: Option<&str>) -> Strategy {
    if let Some(hint) = hint {
        if ENTITY_ID_HINT.is_match(hint) {
            return Strategy::Direct;
        }
    }
    if ENTITY_ID_HINT.is_match(text) {
        return Strategy::Direct;
    }

    let has_quoted_phrase = text.matches('"').count() >= 2;
    let rare_term_count = text
        .split_whitespace()
        .filter(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).len() > 7)
        .count();
    if has_quoted_phrase || rare_term_count >= 2 {
        return Strategy::Keyword;
    }

    Strategy::Vector
}

/// If a sub-query or its retrieved text references an equation id `N-M`,
/// infer candidate parent section ids to additionally fetch: the chapter
/// `N`, and the typical sub-sections `N07`/`N07.12`. This is a heuristic,
/// not an index lookup; a mis-inferred id is a normal retrieval miss, not
/// an error, since `GraphStore::direct_lookup` simply returns `NotFound`
/// for it.
pub fn equation_sibling_sections(text: &str) -> Vec<String> {
    let Some(captures) = EQUATION_ID.captures(text) else {
        return Vec::new();
    };
    let chapter = &captures[1];
    vec![
        chapter.to_string(),
        format!("{chapter}07"),
        format!("{chapter}07.12"),
    ]
}
