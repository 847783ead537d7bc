use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{RepoError, StoreError};
use crate::shapes;
use crate::store::KvStore;

pub const TEMPLATES_PATH: &str = "templates";

/// Bulk creation assigns the same maximum to every line.
pub const BULK_POINTS_PER_CRITERION: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Criterion {
    pub text: String,
    #[serde(rename = "maxPoints", skip_serializing_if = "Option::is_none")]
    pub max_points: Option<i64>,
}

impl Criterion {
    pub fn is_points_graded(&self) -> bool {
        self.max_points.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub criteria: Vec<Criterion>,
    #[serde(rename = "totalPoints", skip_serializing_if = "Option::is_none")]
    pub total_points: Option<i64>,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Template {
    /// First criterion with this text. Duplicate texts within a template
    /// alias the same grade entry; callers keep texts unique.
    pub fn criterion(&self, text: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.text == text)
    }
}

pub struct TemplateDraft {
    pub name: String,
    pub subject: String,
    pub criteria: Vec<Criterion>,
}

/// Storage key derived from the name: internal whitespace runs collapse
/// to `_`. Distinct names can collapse to the same key ("Turnen  A" and
/// "Turnen A"); the save below then overwrites, which is the source
/// system's behavior, ambiguity included.
pub fn template_key(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

pub fn template_path(id: &str) -> String {
    format!("{TEMPLATES_PATH}/{id}")
}

fn record_value(template: &Template) -> Value {
    let mut record = json!({
        "name": template.name,
        "subject": template.subject,
        "criteria": template.criteria,
    });
    if let Some(total) = template.total_points {
        record["totalPoints"] = json!(total);
    }
    if let Some(created) = &template.created_at {
        record["createdAt"] = json!(created);
    }
    record
}

fn persist(
    store: &dyn KvStore,
    known_subjects: &[String],
    name: &str,
    subject: &str,
    criteria: Vec<Criterion>,
    total_points: Option<i64>,
) -> Result<Template, RepoError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RepoError::validation("template name must not be empty"));
    }
    if !known_subjects.iter().any(|s| s == subject) {
        return Err(RepoError::validation(format!("unknown subject: {subject}")));
    }

    // Trim texts and drop empty rows; a non-positive maximum behaves as
    // label-graded, same as the entry form treats it.
    let criteria: Vec<Criterion> = criteria
        .into_iter()
        .filter_map(|c| {
            let text = c.text.trim().to_string();
            if text.is_empty() {
                return None;
            }
            Some(Criterion {
                text,
                max_points: c.max_points.filter(|n| *n > 0),
            })
        })
        .collect();
    if criteria.is_empty() {
        return Err(RepoError::validation(
            "at least one criterion with non-empty text is required",
        ));
    }

    let id = template_key(name);
    // Unconditional overwrite by derived key, last writer wins. Only the
    // creation timestamp of an existing record survives.
    let created_at = load_by_id(store, &id)?
        .and_then(|existing| existing.created_at)
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

    let template = Template {
        id: id.clone(),
        name: name.to_string(),
        subject: subject.to_string(),
        criteria,
        total_points,
        created_at: Some(created_at),
    };
    store.set(&template_path(&id), &record_value(&template))?;
    Ok(template)
}

pub fn save(
    store: &dyn KvStore,
    known_subjects: &[String],
    draft: TemplateDraft,
) -> Result<Template, RepoError> {
    persist(
        store,
        known_subjects,
        &draft.name,
        &draft.subject,
        draft.criteria,
        None,
    )
}

/// One criterion per non-empty line, each worth
/// `BULK_POINTS_PER_CRITERION`; the advisory total is stored with the
/// record and never recomputed on read.
pub fn save_bulk(
    store: &dyn KvStore,
    known_subjects: &[String],
    name: &str,
    subject: &str,
    text: &str,
) -> Result<Template, RepoError> {
    let criteria: Vec<Criterion> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| Criterion {
            text: line.to_string(),
            max_points: Some(BULK_POINTS_PER_CRITERION),
        })
        .collect();
    let total = BULK_POINTS_PER_CRITERION * criteria.len() as i64;
    persist(store, known_subjects, name, subject, criteria, Some(total))
}

/// Reads the whole collection and filters; the store has no secondary
/// index, so this is O(total templates), not O(matching templates).
pub fn list_by_subject(
    store: &dyn KvStore,
    subject: &str,
) -> Result<Vec<Template>, StoreError> {
    let mut out = Vec::new();
    if let Some(Value::Object(records)) = store.get(TEMPLATES_PATH)? {
        for (id, raw) in &records {
            if let Some(t) = shapes::template(id, raw) {
                if t.subject == subject {
                    out.push(t);
                }
            }
        }
    }
    Ok(out)
}

pub fn load_by_id(store: &dyn KvStore, id: &str) -> Result<Option<Template>, StoreError> {
    Ok(store
        .get(&template_path(id))?
        .and_then(|raw| shapes::template(id, &raw)))
}

/// Removes the record subtree. Grade entries referencing the id are not
/// cascaded; they become unreachable through navigation but stay stored.
pub fn delete(store: &dyn KvStore, id: &str) -> Result<(), StoreError> {
    store.remove(&template_path(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn subjects() -> Vec<String> {
        vec!["Deutsch".to_string(), "Turnen".to_string()]
    }

    fn draft(name: &str, subject: &str, criteria: Vec<Criterion>) -> TemplateDraft {
        TemplateDraft {
            name: name.to_string(),
            subject: subject.to_string(),
            criteria,
        }
    }

    fn crit(text: &str, max: Option<i64>) -> Criterion {
        Criterion {
            text: text.to_string(),
            max_points: max,
        }
    }

    #[test]
    fn key_collapses_internal_whitespace() {
        assert_eq!(template_key("Deutsch  -  Lesen"), "Deutsch_-_Lesen");
        assert_eq!(template_key("  Ringen "), "Ringen");
        assert_eq!(template_key("Turnen\tA"), "Turnen_A");
    }

    #[test]
    fn save_rejects_incomplete_drafts() {
        let store = MemoryStore::new();
        let err = save(&store, &subjects(), draft("  ", "Deutsch", vec![crit("Lesen", None)]))
            .expect_err("empty name");
        assert!(matches!(err, RepoError::Validation(_)));

        let err = save(&store, &subjects(), draft("X", "Chemie", vec![crit("Lesen", None)]))
            .expect_err("unknown subject");
        assert!(matches!(err, RepoError::Validation(_)));

        let err = save(&store, &subjects(), draft("X", "Deutsch", vec![crit("  ", None)]))
            .expect_err("no usable criterion");
        assert!(matches!(err, RepoError::Validation(_)));

        // Nothing was written on any aborted save.
        assert!(store.get(TEMPLATES_PATH).expect("get").is_none());
    }

    #[test]
    fn save_trims_and_drops_unusable_rows() {
        let store = MemoryStore::new();
        let t = save(
            &store,
            &subjects(),
            draft(
                "Ringen",
                "Turnen",
                vec![crit(" Griff ", Some(10)), crit("", None), crit("Wurf", Some(0))],
            ),
        )
        .expect("save");
        assert_eq!(t.id, "Ringen");
        assert_eq!(t.criteria.len(), 2);
        assert_eq!(t.criteria[0].text, "Griff");
        assert_eq!(t.criteria[0].max_points, Some(10));
        // Non-positive maximum is stored as label-graded.
        assert_eq!(t.criteria[1].max_points, None);
        assert_eq!(t.total_points, None);
        assert!(t.created_at.is_some());
    }

    #[test]
    fn resave_overwrites_but_keeps_created_at() {
        let store = MemoryStore::new();
        let first = save(
            &store,
            &subjects(),
            draft("Ringen", "Turnen", vec![crit("Griff", Some(10))]),
        )
        .expect("save");
        let second = save(
            &store,
            &subjects(),
            draft("Ringen", "Deutsch", vec![crit("Wurf", None)]),
        )
        .expect("resave");

        assert_eq!(second.created_at, first.created_at);
        let loaded = load_by_id(&store, "Ringen").expect("load").expect("present");
        assert_eq!(loaded.subject, "Deutsch");
        assert_eq!(loaded.criteria.len(), 1);
        assert_eq!(loaded.criteria[0].text, "Wurf");
    }

    #[test]
    fn bulk_lines_become_points_graded_criteria() {
        let store = MemoryStore::new();
        let t = save_bulk(
            &store,
            &subjects(),
            "Deutsch - Lesen",
            "Deutsch",
            "Betonung\n\n  Tempo  \nVerständnis\n",
        )
        .expect("bulk save");
        assert_eq!(t.id, "Deutsch_-_Lesen");
        assert_eq!(t.criteria.len(), 3);
        assert!(t.criteria.iter().all(|c| c.max_points == Some(5)));
        assert_eq!(t.total_points, Some(15));
    }

    #[test]
    fn list_filters_by_exact_subject_and_skips_junk() {
        let store = MemoryStore::new();
        save(
            &store,
            &subjects(),
            draft("Ringen", "Turnen", vec![crit("Griff", Some(10))]),
        )
        .expect("save");
        save(
            &store,
            &subjects(),
            draft("Lesen", "Deutsch", vec![crit("Betonung", None)]),
        )
        .expect("save");
        // A record that matches no known shape is skipped, not an error.
        store
            .set("templates/kaputt", &serde_json::json!({ "subject": "Turnen" }))
            .expect("seed junk");

        let turnen = list_by_subject(&store, "Turnen").expect("list");
        assert_eq!(turnen.len(), 1);
        assert_eq!(turnen[0].name, "Ringen");
        assert!(list_by_subject(&store, "Werken").expect("list").is_empty());
    }

    #[test]
    fn delete_removes_only_the_template_subtree() {
        let store = MemoryStore::new();
        save(
            &store,
            &subjects(),
            draft("Ringen", "Turnen", vec![crit("Griff", Some(10))]),
        )
        .expect("save");
        store
            .set(
                "grades/Turnen/Ringen/Anna",
                &serde_json::json!({ "grades": { "Griff": "gut" } }),
            )
            .expect("seed entry");

        delete(&store, "Ringen").expect("delete");
        assert!(load_by_id(&store, "Ringen").expect("load").is_none());
        // Orphaned entries stay; there is no cascade.
        assert!(store
            .get("grades/Turnen/Ringen/Anna")
            .expect("get")
            .is_some());
    }
}
