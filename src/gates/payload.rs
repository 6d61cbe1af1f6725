//! Shared payload-walking helpers for gates.
//!
//! Step payloads are schema-validated JSON with a small shared vocabulary:
//! arrays of objects carrying `title`/`topic`, `content_type`, `keywords`,
//! `pillar`, `persona`, and `objective` fields. Gates extract what they
//! score through these walkers so each gate stays a pure function of the
//! payload.

use serde_json::Value;

/// Normalize a title/topic for duplicate comparison.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// All `title`/`topic`/`theme` string values anywhere in the payload.
pub fn collect_titles(payload: &Value) -> Vec<String> {
    let mut titles = Vec::new();
    walk(payload, &mut |key, value| {
        if matches!(key, "title" | "topic" | "theme") {
            if let Some(text) = value.as_str() {
                titles.push(text.to_string());
            }
        }
    });
    titles
}

/// All keyword strings: `keywords` array items plus `primary_keyword` /
/// `secondary_keyword` values.
pub fn collect_keywords(payload: &Value) -> Vec<String> {
    let mut keywords = Vec::new();
    walk(payload, &mut |key, value| match key {
        "keywords" | "secondary_keywords" => {
            if let Some(items) = value.as_array() {
                keywords.extend(items.iter().filter_map(|v| v.as_str().map(String::from)));
            }
        }
        "primary_keyword" | "secondary_keyword" => {
            if let Some(text) = value.as_str() {
                keywords.push(text.to_string());
            }
        }
        _ => {}
    });
    keywords
}

/// Content-type occurrence counts.
///
/// Objects carrying an explicit `count` next to `content_type` (mix plans)
/// contribute that count; bare `content_type` fields (entries) count one.
pub fn collect_type_counts(payload: &Value) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut add = |name: &str, n: usize| {
        let key = normalize(name);
        match counts.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, total)) => *total += n,
            None => counts.push((key, n)),
        }
    };

    collect_typed_objects(payload, &mut |object| {
        if let Some(name) = object.get("content_type").and_then(Value::as_str) {
            let count = object
                .get("count")
                .and_then(Value::as_u64)
                .map(|c| c as usize)
                .unwrap_or(1);
            add(name, count);
        }
    });

    counts
}

/// Entity references a payload makes into shared context: pillars,
/// personas/segments, and keywords.
pub fn collect_entity_refs(payload: &Value) -> Vec<String> {
    let mut refs = Vec::new();
    walk(payload, &mut |key, value| {
        if matches!(key, "pillar" | "persona" | "audience_segment" | "primary_keyword") {
            if let Some(text) = value.as_str() {
                refs.push(text.to_string());
            }
        }
    });
    refs
}

/// All `description`/`summary`/`brief` text bodies in the payload.
pub fn collect_descriptions(payload: &Value) -> Vec<String> {
    let mut bodies = Vec::new();
    walk(payload, &mut |key, value| {
        if matches!(key, "description" | "summary" | "brief") {
            if let Some(text) = value.as_str() {
                bodies.push(text.to_string());
            }
        }
    });
    bodies
}

/// All `objective` references, single values and arrays.
pub fn collect_objective_refs(payload: &Value) -> Vec<String> {
    let mut refs = Vec::new();
    walk(payload, &mut |key, value| match key {
        "objective" => {
            if let Some(text) = value.as_str() {
                refs.push(text.to_string());
            }
        }
        "objectives" => {
            if let Some(items) = value.as_array() {
                for item in items {
                    match item {
                        Value::String(text) => refs.push(text.clone()),
                        Value::Object(map) => {
                            if let Some(name) = map.get("name").and_then(Value::as_str) {
                                refs.push(name.to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        _ => {}
    });
    refs
}

/// Depth-first walk over every key/value pair in the payload.
fn walk<'a>(value: &'a Value, visit: &mut impl FnMut(&'a str, &'a Value)) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                visit(key, child);
                walk(child, visit);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, visit);
            }
        }
        _ => {}
    }
}

/// Visit every object in the payload once.
fn collect_typed_objects<'a>(
    value: &'a Value,
    visit: &mut impl FnMut(&'a serde_json::Map<String, Value>),
) {
    match value {
        Value::Object(map) => {
            visit(map);
            for child in map.values() {
                collect_typed_objects(child, visit);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_typed_objects(item, visit);
            }
        }
        _ => {}
    }
}
