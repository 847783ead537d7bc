use serde::Serialize;
use serde_json::json;

use crate::error::StoreError;
use crate::shapes;
use crate::store::KvStore;

pub const SUBJECTS_PATH: &str = "subjects";
pub const STUDENTS_PATH: &str = "students";
/// Historical location of the roster; migration source, never written.
pub const LEGACY_STUDENTS_PATH: &str = "students_legacy";

/// `name` is the addressing identity for grade entries, so it must be
/// unique across the active roster; `class` is display grouping only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub name: String,
    pub class: String,
}

fn default_subjects() -> Vec<String> {
    vec!["Deutsch".to_string()]
}

fn default_students() -> Vec<Student> {
    [
        ("Anna", "1A"),
        ("Benjamin", "1B"),
        ("Clara", "1A"),
        ("Daniel", "1B"),
        ("Emma", "2A"),
        ("Felix", "2B"),
        ("Greta", "2A"),
        ("Henry", "2B"),
        ("Iris", "3A"),
        ("Jakob", "3B"),
        ("Karin", "3A"),
        ("Liam", "3B"),
        ("Maria", "4A"),
        ("Noah", "4B"),
        ("Olivia", "4A"),
    ]
    .into_iter()
    .map(|(name, class)| Student {
        name: name.to_string(),
        class: class.to_string(),
    })
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MigrationOutcome {
    /// The current collection already exists; nothing to do.
    AlreadyCurrent,
    /// No deprecated collection (or nothing usable in it); nothing to do.
    NothingToMigrate,
    Migrated(usize),
}

/// One-shot copy of the deprecated roster collection into the current
/// one. Idempotent by existence guards, so it is safe to run on every
/// process start — and it does run on every workspace open, before the
/// roster is first loaded. The deprecated source is left in place.
pub fn migrate_legacy_roster(store: &dyn KvStore) -> Result<MigrationOutcome, StoreError> {
    if store.get(STUDENTS_PATH)?.is_some() {
        return Ok(MigrationOutcome::AlreadyCurrent);
    }
    let Some(raw) = store.get(LEGACY_STUDENTS_PATH)? else {
        return Ok(MigrationOutcome::NothingToMigrate);
    };
    let students = shapes::roster(&raw);
    if students.is_empty() {
        return Ok(MigrationOutcome::NothingToMigrate);
    }
    store.set(STUDENTS_PATH, &json!(students))?;
    tracing::info!(
        "migrated {} roster entries from {} to {}",
        students.len(),
        LEGACY_STUDENTS_PATH,
        STUDENTS_PATH
    );
    Ok(MigrationOutcome::Migrated(students.len()))
}

/// The subject list and the roster, as an explicit repository object:
/// initialized once at workspace open, reloaded on demand, never ambient.
/// The store stays the authority; this is a cache for the synchronous
/// accessors the interaction layer needs.
pub struct Roster {
    pub subjects: Vec<String>,
    pub students: Vec<Student>,
}

impl Roster {
    pub fn init(store: &dyn KvStore) -> Result<Roster, StoreError> {
        migrate_legacy_roster(store)?;
        let mut roster = Roster {
            subjects: Vec::new(),
            students: Vec::new(),
        };
        roster.reload(store)?;
        Ok(roster)
    }

    /// Re-fetch both collections, seeding defaults where the store has
    /// nothing yet (first run of a fresh installation).
    pub fn reload(&mut self, store: &dyn KvStore) -> Result<(), StoreError> {
        self.subjects = match store.get(SUBJECTS_PATH)? {
            Some(raw) => shapes::subjects(&raw),
            None => {
                let defaults = default_subjects();
                store.set(SUBJECTS_PATH, &json!(defaults))?;
                defaults
            }
        };
        self.students = match store.get(STUDENTS_PATH)? {
            Some(raw) => shapes::roster(&raw),
            None => {
                let defaults = default_students();
                store.set(STUDENTS_PATH, &json!(defaults))?;
                defaults
            }
        };
        Ok(())
    }

    pub fn has_student(&self, name: &str) -> bool {
        self.students.iter().any(|s| s.name == name)
    }
}
