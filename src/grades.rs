use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{RepoError, StoreError};
use crate::grading::{self, Grade};
use crate::roster::Student;
use crate::shapes;
use crate::store::KvStore;
use crate::templates::Template;

pub const GRADES_PATH: &str = "grades";

/// One student's results for one template, keyed by criterion text.
/// Invariant: a points-graded criterion's label always equals
/// `derive_grade(points, max_points)`; both maps are written in the same
/// operation and never drift.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntrySet {
    pub grades: BTreeMap<String, Grade>,
    pub points: BTreeMap<String, i64>,
}

/// Address segments come straight from names; a `/` inside one would
/// split the path, the same constraint the remote store puts on keys.
pub fn entries_path(subject: &str, template_id: &str, student: &str) -> String {
    format!("{GRADES_PATH}/{subject}/{template_id}/{student}")
}

pub fn read_entries(
    store: &dyn KvStore,
    subject: &str,
    template_id: &str,
    student: &str,
) -> Result<EntrySet, StoreError> {
    let raw = store.get(&entries_path(subject, template_id, student))?;
    Ok(shapes::entry_set(raw.as_ref()))
}

/// Whole-set overwrite. The store has no partial-field update, so merging
/// a single criterion happens in memory before this call.
pub fn write_set(
    store: &dyn KvStore,
    subject: &str,
    template_id: &str,
    student: &str,
    set: &EntrySet,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(set)
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    store.set(&entries_path(subject, template_id, student), &value)
}

/// One read per roster member; the store has no batch read. Students with
/// no stored entries map to an empty set.
pub fn read_all_for_template(
    store: &dyn KvStore,
    subject: &str,
    template_id: &str,
    roster: &[Student],
) -> Result<BTreeMap<String, EntrySet>, StoreError> {
    let mut out = BTreeMap::new();
    for student in roster {
        let set = read_entries(store, subject, template_id, &student.name)?;
        out.insert(student.name.clone(), set);
    }
    Ok(out)
}

struct Selected {
    subject: String,
    template: Template,
    student: String,
    entries: EntrySet,
    dirty: bool,
}

/// In-memory cache of the currently selected `(subject, template,
/// student)` pair. The store is the sole owner of the data; this cache
/// only exists so single-criterion writes can compose the full entry set
/// without re-reading, and so an edit whose write failed survives until
/// the next flush opportunity.
#[derive(Default)]
pub struct GradeSession {
    selected: Option<Selected>,
}

impl GradeSession {
    pub fn new() -> GradeSession {
        GradeSession::default()
    }

    pub fn entries(&self) -> Option<&EntrySet> {
        self.selected.as_ref().map(|s| &s.entries)
    }

    /// Write the cached set if an edit is pending. Returns whether a
    /// write happened.
    pub fn flush(&mut self, store: &dyn KvStore) -> Result<bool, StoreError> {
        let Some(sel) = self.selected.as_mut() else {
            return Ok(false);
        };
        if !sel.dirty {
            return Ok(false);
        }
        write_set(store, &sel.subject, &sel.template.id, &sel.student, &sel.entries)?;
        sel.dirty = false;
        Ok(true)
    }

    /// Select a pair: flush any pending edit of the previous pair from
    /// the last known in-memory state, then load the new pair's
    /// authoritative copy. A failing flush is logged and the switch
    /// proceeds — navigation must not wedge on a stalled store, which is
    /// the same tradeoff the interaction layer always made.
    pub fn open(
        &mut self,
        store: &dyn KvStore,
        subject: &str,
        template: Template,
        student: &str,
    ) -> Result<(), StoreError> {
        if let Err(e) = self.flush(store) {
            tracing::warn!("dropping pending grade edit: {}", e);
        }
        let entries = read_entries(store, subject, &template.id, student)?;
        self.selected = Some(Selected {
            subject: subject.to_string(),
            template,
            student: student.to_string(),
            entries,
            dirty: false,
        });
        Ok(())
    }

    fn selected_mut(&mut self) -> Result<&mut Selected, RepoError> {
        self.selected
            .as_mut()
            .ok_or_else(|| RepoError::validation("no template/student pair selected"))
    }

    /// Points entry for a points-graded criterion. The label is derived,
    /// never chosen: both fields go into the cached set and the whole set
    /// is written in one operation. On a store failure the edit stays
    /// cached and dirty for the next flush.
    pub fn set_points(
        &mut self,
        store: &dyn KvStore,
        criterion: &str,
        raw_points: &Value,
    ) -> Result<(Grade, i64), RepoError> {
        let sel = self.selected_mut()?;
        let max = sel
            .template
            .criterion(criterion)
            .ok_or_else(|| RepoError::validation(format!("unknown criterion: {criterion}")))?
            .max_points
            .ok_or_else(|| {
                RepoError::validation(format!("criterion is label-graded: {criterion}"))
            })?;
        let points = grading::coerce_points(raw_points);
        let grade = grading::derive_grade(points, max);
        sel.entries.grades.insert(criterion.to_string(), grade);
        sel.entries.points.insert(criterion.to_string(), points);
        sel.dirty = true;
        write_set(store, &sel.subject, &sel.template.id, &sel.student, &sel.entries)?;
        sel.dirty = false;
        Ok((grade, points))
    }

    /// Manual label selection, allowed only for label-graded criteria —
    /// for points-graded ones the engine is the sole writer of the label,
    /// which is what keeps the grade/points invariant intact.
    pub fn set_label(
        &mut self,
        store: &dyn KvStore,
        criterion: &str,
        grade: Grade,
    ) -> Result<(), RepoError> {
        let sel = self.selected_mut()?;
        let def = sel
            .template
            .criterion(criterion)
            .ok_or_else(|| RepoError::validation(format!("unknown criterion: {criterion}")))?;
        if def.is_points_graded() {
            return Err(RepoError::validation(format!(
                "criterion is points-graded, label is derived: {criterion}"
            )));
        }
        sel.entries.grades.insert(criterion.to_string(), grade);
        // A label-graded criterion carries no points; clear a stale value
        // left behind by an earlier template shape.
        sel.entries.points.remove(criterion);
        sel.dirty = true;
        write_set(store, &sel.subject, &sel.template.id, &sel.student, &sel.entries)?;
        sel.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::templates::Criterion;
    use serde_json::json;

    fn template() -> Template {
        Template {
            id: "Ringen".to_string(),
            name: "Ringen".to_string(),
            subject: "Turnen".to_string(),
            criteria: vec![
                Criterion {
                    text: "Griff".to_string(),
                    max_points: Some(10),
                },
                Criterion {
                    text: "Haltung".to_string(),
                    max_points: None,
                },
            ],
            total_points: None,
            created_at: None,
        }
    }

    #[test]
    fn points_write_derives_and_stores_both_fields() {
        let store = MemoryStore::new();
        let mut session = GradeSession::new();
        session
            .open(&store, "Turnen", template(), "Anna")
            .expect("open");

        let (grade, points) = session
            .set_points(&store, "Griff", &json!(9))
            .expect("set points");
        assert_eq!(grade, Grade::SehrGut);
        assert_eq!(points, 9);

        let stored = read_entries(&store, "Turnen", "Ringen", "Anna").expect("read");
        assert_eq!(stored.grades.get("Griff"), Some(&Grade::SehrGut));
        assert_eq!(stored.points.get("Griff"), Some(&9));
    }

    #[test]
    fn merge_on_write_preserves_sibling_criteria() {
        let store = MemoryStore::new();
        store
            .set(
                "grades/Turnen/Ringen/Anna",
                &json!({ "grades": { "Haltung": "gut" } }),
            )
            .expect("seed");

        let mut session = GradeSession::new();
        session
            .open(&store, "Turnen", template(), "Anna")
            .expect("open");
        session
            .set_points(&store, "Griff", &json!(6))
            .expect("set points");

        let stored = read_entries(&store, "Turnen", "Ringen", "Anna").expect("read");
        assert_eq!(stored.grades.get("Haltung"), Some(&Grade::Gut));
        assert_eq!(stored.grades.get("Griff"), Some(&Grade::Genuegend));
    }

    #[test]
    fn label_write_rules() {
        let store = MemoryStore::new();
        let mut session = GradeSession::new();
        session
            .open(&store, "Turnen", template(), "Anna")
            .expect("open");

        session
            .set_label(&store, "Haltung", Grade::Gut)
            .expect("label write");
        let err = session
            .set_label(&store, "Griff", Grade::SehrGut)
            .expect_err("points-graded criterion");
        assert!(matches!(err, RepoError::Validation(_)));
        let err = session
            .set_points(&store, "Haltung", &json!(5))
            .expect_err("label-graded criterion");
        assert!(matches!(err, RepoError::Validation(_)));
        let err = session
            .set_points(&store, "Salto", &json!(5))
            .expect_err("unknown criterion");
        assert!(matches!(err, RepoError::Validation(_)));
    }

    #[test]
    fn label_write_clears_stale_points() {
        let store = MemoryStore::new();
        // Entry written while the criterion was still points-graded.
        store
            .set(
                "grades/Turnen/Ringen/Anna",
                &json!({ "grades": { "Haltung": "gut" }, "points": { "Haltung": 4 } }),
            )
            .expect("seed");

        let mut session = GradeSession::new();
        session
            .open(&store, "Turnen", template(), "Anna")
            .expect("open");
        session
            .set_label(&store, "Haltung", Grade::SehrGut)
            .expect("label write");

        let stored = read_entries(&store, "Turnen", "Ringen", "Anna").expect("read");
        assert_eq!(stored.grades.get("Haltung"), Some(&Grade::SehrGut));
        assert!(stored.points.get("Haltung").is_none());
    }

    #[test]
    fn switching_pairs_flushes_the_previous_pair() {
        let store = MemoryStore::new();
        let mut session = GradeSession::new();
        session
            .open(&store, "Turnen", template(), "Anna")
            .expect("open");
        session
            .set_points(&store, "Griff", &json!(7))
            .expect("set points");

        // Simulate an edit whose write never reached the store.
        session.selected.as_mut().expect("selected").dirty = true;
        session
            .selected
            .as_mut()
            .expect("selected")
            .entries
            .grades
            .insert("Haltung".to_string(), Grade::Gut);

        session
            .open(&store, "Turnen", template(), "Benjamin")
            .expect("switch");

        let anna = read_entries(&store, "Turnen", "Ringen", "Anna").expect("read");
        assert_eq!(anna.grades.get("Haltung"), Some(&Grade::Gut));
        // 7/10 = 70%, second-lowest tier.
        assert_eq!(anna.grades.get("Griff"), Some(&Grade::Genuegend));
        assert_eq!(
            session.entries().expect("selected").grades.len(),
            0,
            "new pair starts from its own stored state"
        );
    }

    #[test]
    fn legacy_flat_entries_load_into_the_session() {
        let store = MemoryStore::new();
        store
            .set("grades/Turnen/Ringen/Anna", &json!({ "Haltung": "genügend" }))
            .expect("seed flat");

        let mut session = GradeSession::new();
        session
            .open(&store, "Turnen", template(), "Anna")
            .expect("open");
        let entries = session.entries().expect("selected");
        assert_eq!(entries.grades.get("Haltung"), Some(&Grade::Genuegend));
        assert!(entries.points.is_empty());
    }

    #[test]
    fn overview_reads_one_set_per_roster_member() {
        let store = MemoryStore::new();
        store
            .set(
                "grades/Turnen/Ringen/Anna",
                &json!({ "grades": { "Griff": "sehr gut" }, "points": { "Griff": 9 } }),
            )
            .expect("seed");
        let roster = vec![
            Student {
                name: "Anna".to_string(),
                class: "1A".to_string(),
            },
            Student {
                name: "Benjamin".to_string(),
                class: "1B".to_string(),
            },
        ];

        let all = read_all_for_template(&store, "Turnen", "Ringen", &roster).expect("read all");
        assert_eq!(all.len(), 2);
        assert_eq!(all["Anna"].points.get("Griff"), Some(&9));
        assert_eq!(all["Benjamin"], EntrySet::default());
    }
}
