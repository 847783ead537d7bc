use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four qualitative tiers, best to worst. The wire form is the German
/// label, which is also what the store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "sehr gut")]
    SehrGut,
    #[serde(rename = "gut")]
    Gut,
    #[serde(rename = "genügend")]
    Genuegend,
    #[serde(rename = "ungenügend")]
    Ungenuegend,
}

impl Grade {
    pub fn as_label(self) -> &'static str {
        match self {
            Grade::SehrGut => "sehr gut",
            Grade::Gut => "gut",
            Grade::Genuegend => "genügend",
            Grade::Ungenuegend => "ungenügend",
        }
    }

    pub fn from_label(label: &str) -> Option<Grade> {
        match label {
            "sehr gut" => Some(Grade::SehrGut),
            "gut" => Some(Grade::Gut),
            "genügend" => Some(Grade::Genuegend),
            "ungenügend" => Some(Grade::Ungenuegend),
            _ => None,
        }
    }
}

/// Points → label. Thresholds are evaluated top-down with inclusive lower
/// bounds; points above the maximum still land on the top tier (no
/// clamping). Negative points count as 0. A non-positive maximum can only
/// come from legacy data and yields the bottom tier rather than a fault.
pub fn derive_grade(points: i64, max_points: i64) -> Grade {
    if max_points <= 0 {
        return Grade::Ungenuegend;
    }
    let points = points.max(0);
    let percentage = 100.0 * points as f64 / max_points as f64;
    if percentage >= 90.0 {
        Grade::SehrGut
    } else if percentage >= 75.0 {
        Grade::Gut
    } else if percentage >= 60.0 {
        Grade::Genuegend
    } else {
        Grade::Ungenuegend
    }
}

/// Free-text numeric entry: a JSON number, a numeric string, or junk that
/// is transiently empty while the user types. Anything unusable counts as
/// 0 — points entry must never reject input.
pub fn coerce_points(raw: &Value) -> i64 {
    match raw {
        Value::Number(n) => n.as_i64().unwrap_or_else(|| {
            n.as_f64().map(|f| f.trunc() as i64).unwrap_or(0)
        }),
        Value::String(s) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}
