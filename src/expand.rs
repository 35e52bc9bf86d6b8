//! `${NAME}` placeholder expansion with cycle detection.
//!
//! Expansion runs once over the merged map. References form a graph (key ->
//! referenced key); a depth-first walk marks keys in progress and fails on the
//! first back edge, so expansion either reaches a fixed point or reports the
//! cycle. A placeholder naming a key that is not in the merged map is left in
//! place literally. Malformed placeholders are errors, except in values taken
//! from the process environment.

use crate::error::ExpansionError;
use crate::precedence::MergedMap;
use crate::types::SourceId;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Piece of a value: literal text or a reference to another key.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Ref(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// How to treat text that looks like a placeholder but is not a valid one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Reject it with [`ExpansionError::Malformed`].
    Strict,
    /// Keep it as literal text.
    Lenient,
}

/// Split a value into literal and reference segments.
fn parse_segments(key: &str, value: &str, scan: Scan) -> Result<Vec<Segment>, ExpansionError> {
    let mut segments = Vec::new();
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            if scan == Scan::Lenient {
                segments.push(Segment::Literal(rest[start..].to_string()));
                return Ok(segments);
            }
            return Err(ExpansionError::Malformed {
                key: key.to_string(),
                reason: "unterminated placeholder".to_string(),
            });
        };
        let name = &after[..end];
        let problem = if name.is_empty() {
            Some("empty placeholder".to_string())
        } else if name.chars().any(|c| c.is_whitespace() || c == '$' || c == '{') {
            Some(format!("invalid variable name '{}'", name))
        } else {
            None
        };
        match (problem, scan) {
            (None, _) => segments.push(Segment::Ref(name.to_string())),
            (Some(_), Scan::Lenient) => segments.push(Segment::Literal(rest[start..start + end + 3].to_string())),
            (Some(reason), Scan::Strict) => {
                return Err(ExpansionError::Malformed {
                    key: key.to_string(),
                    reason,
                });
            }
        }
        rest = &after[end + 1..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

/// Expand every value of `values` against the other values of the map.
///
/// Malformed placeholders are errors.
pub fn expand_values(values: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>, ExpansionError> {
    expand_with(values, |_| Scan::Strict)
}

fn expand_with<F>(values: &BTreeMap<String, String>, scan_for: F) -> Result<BTreeMap<String, String>, ExpansionError>
where
    F: Fn(&str) -> Scan,
{
    let mut parsed: BTreeMap<&str, Vec<Segment>> = BTreeMap::new();
    for (key, value) in values {
        parsed.insert(key.as_str(), parse_segments(key, value, scan_for(key))?);
    }

    let mut state: HashMap<&str, Visit> = HashMap::new();
    let mut order: Vec<&str> = Vec::with_capacity(parsed.len());
    for &key in parsed.keys() {
        if !state.contains_key(key) {
            let mut stack = Vec::new();
            visit(key, &parsed, &mut state, &mut stack, &mut order)?;
        }
    }

    // `order` is post-order: every referenced key precedes its referrers.
    let mut expanded: BTreeMap<String, String> = BTreeMap::new();
    let mut substituted = 0usize;
    for key in order {
        let mut out = String::new();
        for segment in &parsed[key] {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Ref(name) => match expanded.get(name.as_str()) {
                    Some(value) => {
                        out.push_str(value);
                        substituted += 1;
                    }
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                },
            }
        }
        expanded.insert(key.to_string(), out);
    }

    if substituted > 0 {
        debug!(substituted, "Expanded placeholders");
    }
    Ok(expanded)
}

fn visit<'a>(
    key: &'a str,
    graph: &BTreeMap<&'a str, Vec<Segment>>,
    state: &mut HashMap<&'a str, Visit>,
    stack: &mut Vec<&'a str>,
    order: &mut Vec<&'a str>,
) -> Result<(), ExpansionError> {
    state.insert(key, Visit::InProgress);
    stack.push(key);

    for segment in &graph[key] {
        let Segment::Ref(name) = segment else {
            continue;
        };
        // References to undefined keys stay literal and add no edge.
        let Some((&target, _)) = graph.get_key_value(name.as_str()) else {
            continue;
        };
        match state.get(target) {
            Some(Visit::InProgress) => {
                let start = stack.iter().position(|k| *k == target).unwrap_or(0);
                let mut path: Vec<String> = stack[start..].iter().map(|k| k.to_string()).collect();
                path.push(target.to_string());
                return Err(ExpansionError::Cycle {
                    key: target.to_string(),
                    path,
                });
            }
            Some(Visit::Done) => {}
            None => visit(target, graph, state, stack, order)?,
        }
    }

    stack.pop();
    state.insert(key, Visit::Done);
    order.push(key);
    Ok(())
}

/// Expand the raw values of a merged map in place.
///
/// Values won by the system tier come from the host environment, where
/// shell syntax such as `${PWD/#$HOME/~}` is common; malformed placeholders
/// in them stay literal. Every other tier rejects them.
pub fn expand_merged(merged: &mut MergedMap) -> Result<(), ExpansionError> {
    let raw: BTreeMap<String, String> = merged
        .iter()
        .map(|(k, e)| (k.clone(), e.raw.clone()))
        .collect();
    let expanded = expand_with(&raw, |key| match merged.get(key) {
        Some(entry) if entry.origin.source == SourceId::System => Scan::Lenient,
        _ => Scan::Strict,
    })?;
    for (key, value) in expanded {
        if let Some(entry) = merged.get_mut(&key) {
            entry.raw = value;
        }
    }
    Ok(())
}
