//! Decoding of persisted records, current and historical.
//!
//! The store carries no schema version tag, so every shape that was ever
//! written must still be readable. This module is the single place that
//! inspects raw values; repositories call in here and never do their own
//! shape checks. Decoding is total: input that matches no known shape
//! becomes "no data" (absent template, empty entry set, skipped roster
//! item) instead of an error, because bad historical records must not
//! block grading work.
//!
//! Accepted template shapes:
//! - criteria as `[{"text", "maxPoints"?}]` (current), as plain strings
//!   (oldest), or as an integer-keyed object (what the tree store hands
//!   back for sparse lists);
//! - field aliases `schoolSubject`, `descriptions` and `timestamp` from
//!   earlier record generations.
//!
//! Accepted grade-entry shapes: the current `{"grades", "points"}`
//! wrapper (with `points` optional — empty maps vanish on write) and the
//! oldest flat `criterion → label` map.
//!
//! Accepted roster shapes: plain name strings, `{"name", "class"}`
//! records (alias `Klasse`), or a keyed mapping of either.

use serde_json::{Map, Value};

use crate::grades::EntrySet;
use crate::grading::Grade;
use crate::roster::Student;
use crate::templates::{Criterion, Template};

/// Object values in key order, with integer keys sorted numerically so
/// `"10"` follows `"2"`. Needed wherever a stored list comes back as a
/// keyed object.
fn values_in_key_order(map: &Map<String, Value>) -> Vec<&Value> {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
    keys.into_iter().filter_map(|k| map.get(k)).collect()
}

fn criterion_item(raw: &Value) -> Option<Criterion> {
    match raw {
        Value::String(s) => {
            let text = s.trim();
            if text.is_empty() {
                return None;
            }
            Some(Criterion {
                text: text.to_string(),
                max_points: None,
            })
        }
        Value::Object(map) => {
            let text = map.get("text")?.as_str()?.trim();
            if text.is_empty() {
                return None;
            }
            let max_points = map
                .get("maxPoints")
                .and_then(|v| v.as_i64())
                .filter(|n| *n > 0);
            Some(Criterion {
                text: text.to_string(),
                max_points,
            })
        }
        _ => None,
    }
}

pub fn criteria(raw: &Value) -> Vec<Criterion> {
    match raw {
        Value::Array(items) => items.iter().filter_map(criterion_item).collect(),
        Value::Object(map) => values_in_key_order(map)
            .into_iter()
            .filter_map(criterion_item)
            .collect(),
        _ => Vec::new(),
    }
}

/// `None` means the record is not a template in any shape ever written.
pub fn template(id: &str, raw: &Value) -> Option<Template> {
    let map = raw.as_object()?;
    let name = map.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let subject = map
        .get("subject")
        .or_else(|| map.get("schoolSubject"))?
        .as_str()?
        .to_string();
    let criteria = map
        .get("criteria")
        .or_else(|| map.get("descriptions"))
        .map(criteria)
        .unwrap_or_default();
    let total_points = map.get("totalPoints").and_then(|v| v.as_i64());
    let created_at = map
        .get("createdAt")
        .or_else(|| map.get("timestamp"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(Template {
        id: id.to_string(),
        name: name.to_string(),
        subject,
        criteria,
        total_points,
        created_at,
    })
}

fn grade_map(raw: &Value) -> std::collections::BTreeMap<String, Grade> {
    let mut out = std::collections::BTreeMap::new();
    if let Value::Object(map) = raw {
        for (k, v) in map {
            if let Some(grade) = v.as_str().and_then(Grade::from_label) {
                out.insert(k.clone(), grade);
            }
        }
    }
    out
}

fn points_map(raw: &Value) -> std::collections::BTreeMap<String, i64> {
    let mut out = std::collections::BTreeMap::new();
    if let Value::Object(map) = raw {
        for (k, v) in map {
            if let Some(n) = v.as_i64() {
                out.insert(k.clone(), n);
            }
        }
    }
    out
}

/// Total: absent or unclassifiable input is an empty entry set. The
/// wrapper is detected by a `grades` sub-object, which also keeps a flat
/// legacy map with a criterion literally named "grades" on the flat path.
pub fn entry_set(raw: Option<&Value>) -> EntrySet {
    let Some(raw) = raw else {
        return EntrySet::default();
    };
    let Some(map) = raw.as_object() else {
        return EntrySet::default();
    };
    if map.get("grades").map_or(false, Value::is_object) {
        EntrySet {
            grades: grade_map(&map["grades"]),
            points: map.get("points").map(points_map).unwrap_or_default(),
        }
    } else {
        EntrySet {
            grades: grade_map(raw),
            points: std::collections::BTreeMap::new(),
        }
    }
}

fn roster_item(raw: &Value) -> Option<Student> {
    match raw {
        Value::String(s) => {
            let name = s.trim();
            if name.is_empty() {
                return None;
            }
            Some(Student {
                name: name.to_string(),
                class: String::new(),
            })
        }
        Value::Number(n) => Some(Student {
            name: n.to_string(),
            class: String::new(),
        }),
        Value::Object(map) => {
            let name = map.get("name")?.as_str()?.trim();
            if name.is_empty() {
                return None;
            }
            let class = map
                .get("class")
                .or_else(|| map.get("Klasse"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            Some(Student {
                name: name.to_string(),
                class,
            })
        }
        _ => None,
    }
}

pub fn roster(raw: &Value) -> Vec<Student> {
    match raw {
        Value::Array(items) => items.iter().filter_map(roster_item).collect(),
        Value::Object(map) => values_in_key_order(map)
            .into_iter()
            .filter_map(roster_item)
            .collect(),
        Value::String(_) => roster_item(raw).into_iter().collect(),
        _ => Vec::new(),
    }
}

pub fn subjects(raw: &Value) -> Vec<String> {
    let items: Vec<&Value> = match raw {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => values_in_key_order(map),
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
