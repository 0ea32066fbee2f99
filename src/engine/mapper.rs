//! Header → column auto-mapping
//!
//! Three passes per header, in priority order: an exact hit in the
//! organization's learned patterns wins outright; otherwise the header
//! is compared, normalized (case/accent/punctuation-insensitive),
//! against column labels and aliases; otherwise a fuzzy score above a
//! configurable threshold decides. Headers that survive all three
//! passes stay unmapped for the user to assign by hand.
//!
//! `auto_map` is a pure function; mapping validity is a separate check
//! so the UI can flag problems without exceptions.

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use std::collections::{HashMap, HashSet};

use super::config::ColumnSpec;

/// Header → target column id assignment
pub type Mapping = HashMap<String, String>;

/// Minimum similarity for a fuzzy header match. Exact normalized
/// equality bypasses the scorer, so this only governs genuinely fuzzy
/// hits.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.72;

/// Normalize a header or label for comparison: lowercase, strip
/// accents, drop punctuation, collapse whitespace.
pub fn normalize_label(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = true;
    for c in s.chars() {
        let c = strip_accent(c.to_lowercase().next().unwrap_or(c));
        if c.is_alphanumeric() {
            out.push(c);
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim_end().to_string()
}

fn strip_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

/// Similarity in `[0, 1]` between two normalized strings: the best
/// directional skim score, normalized by the score a perfect match of
/// the shorter string would get.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let matcher = SkimMatcherV2::default();
    let forward = matcher.fuzzy_match(a, b).unwrap_or(0);
    let backward = matcher.fuzzy_match(b, a).unwrap_or(0);
    let score = forward.max(backward) as f64;

    let self_a = matcher.fuzzy_match(a, a).unwrap_or(0);
    let self_b = matcher.fuzzy_match(b, b).unwrap_or(0);
    let denom = self_a.min(self_b) as f64;
    if denom <= 0.0 {
        0.0
    } else {
        (score / denom).min(1.0)
    }
}

/// Map headers onto target columns.
///
/// Priority per header: learned pattern → normalized exact label/alias
/// → fuzzy above `threshold`. The exact and fuzzy passes never assign a
/// column twice; learned patterns are applied verbatim and duplicate
/// assignments they introduce are caught by [`validate`].
pub fn auto_map(
    headers: &[String],
    columns: &[ColumnSpec],
    learned: &HashMap<String, String>,
    threshold: f64,
) -> Mapping {
    let mut mapping = Mapping::new();
    let mut assigned: HashSet<String> = HashSet::new();

    // Candidate labels, normalized once
    let candidates: Vec<(&ColumnSpec, Vec<String>)> = columns
        .iter()
        .map(|col| {
            let mut labels = vec![normalize_label(&col.label), normalize_label(&col.id)];
            labels.extend(col.aliases.iter().map(|a| normalize_label(a)));
            (col, labels)
        })
        .collect();

    for header in headers {
        // 1. Learned pattern, exact header hit
        if let Some(column_id) = learned.get(header) {
            if columns.iter().any(|c| &c.id == column_id) {
                log::debug!("Mapped '{}' -> '{}' from learned pattern", header, column_id);
                mapping.insert(header.clone(), column_id.clone());
                assigned.insert(column_id.clone());
                continue;
            }
        }

        let normalized = normalize_label(header);
        if normalized.is_empty() {
            continue;
        }

        // 2. Exact normalized label/alias match
        if let Some((col, _)) = candidates
            .iter()
            .find(|(col, labels)| !assigned.contains(&col.id) && labels.contains(&normalized))
        {
            mapping.insert(header.clone(), col.id.clone());
            assigned.insert(col.id.clone());
            continue;
        }

        // 3. Best fuzzy score above threshold
        let mut best: Option<(&ColumnSpec, f64)> = None;
        for (col, labels) in &candidates {
            if assigned.contains(&col.id) {
                continue;
            }
            for label in labels {
                let score = similarity(&normalized, label);
                if score >= threshold && best.map(|(_, s)| score > s).unwrap_or(true) {
                    best = Some((*col, score));
                }
            }
        }
        if let Some((col, score)) = best {
            log::debug!("Mapped '{}' -> '{}' (fuzzy, score {:.2})", header, col.id, score);
            mapping.insert(header.clone(), col.id.clone());
            assigned.insert(col.id.clone());
        }
    }

    mapping
}

/// A mapping is valid iff every required column id appears among its
/// values, and no column id is assigned to more than one header.
pub fn validate(mapping: &Mapping, columns: &[ColumnSpec]) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    for column_id in mapping.values() {
        if !seen.insert(column_id.as_str()) {
            return false;
        }
    }

    columns
        .iter()
        .filter(|c| c.required)
        .all(|c| seen.contains(c.id.as_str()))
}
