use std::collections::BTreeMap;
use std::path::Path;
#[cfg(test)]
use std::sync::Mutex;

use rusqlite::Connection;
use serde_json::Value;

use crate::error::StoreError;

/// The shared tree-structured key-value store, consumed only through
/// `get`/`set`/`remove` over a `/`-separated path namespace. There are no
/// transactions and no optimistic locking: every operation is an
/// independent read or overwrite, and concurrent writers to the same path
/// race with plain last-write-wins. That model is accepted for this
/// system (low contention, one editor per classroom session) but it is a
/// known weakness, not a guarantee.
pub trait KvStore {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, path: &str, value: &Value) -> Result<(), StoreError>;
    fn remove(&self, path: &str) -> Result<(), StoreError>;
}

/// Successor of `prefix + "/"` in byte order; `'0'` is the code point
/// after `'/'`. Every leaf path under `prefix` sorts inside
/// `[prefix + "/", prefix + "0")`, which gives range scans without LIKE
/// escaping of user-derived segments.
fn subtree_bounds(prefix: &str) -> (String, String) {
    (format!("{prefix}/"), format!("{prefix}0"))
}

fn ancestors(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut idx = 0;
    while let Some(pos) = path[idx..].find('/') {
        out.push(path[..idx + pos].to_string());
        idx += pos + 1;
    }
    out
}

/// Decompose a JSON tree into scalar leaves keyed by full path. Nulls,
/// empty objects and empty arrays produce no leaves, so they vanish on
/// write — the same observable behavior as the remote tree store, and the
/// reason the normalizer must default absent maps on read.
fn explode(prefix: &str, value: &Value, out: &mut BTreeMap<String, Value>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (k, v) in map {
                explode(&format!("{prefix}/{k}"), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                explode(&format!("{prefix}/{i}"), v, out);
            }
        }
        leaf => {
            out.insert(prefix.to_string(), leaf.clone());
        }
    }
}

enum Node {
    Leaf(Value),
    Branch(BTreeMap<String, Node>),
}

fn insert_leaf(root: &mut BTreeMap<String, Node>, suffix: &str, value: Value) {
    match suffix.split_once('/') {
        None => {
            root.insert(suffix.to_string(), Node::Leaf(value));
        }
        Some((head, rest)) => {
            let entry = root
                .entry(head.to_string())
                .or_insert_with(|| Node::Branch(BTreeMap::new()));
            // A scalar above a deeper leaf loses; the deeper value wins,
            // as it would after the ancestor overwrite on set.
            if let Node::Leaf(_) = entry {
                *entry = Node::Branch(BTreeMap::new());
            }
            if let Node::Branch(children) = entry {
                insert_leaf(children, rest, value);
            }
        }
    }
}

fn node_to_value(node: Node) -> Value {
    match node {
        Node::Leaf(v) => v,
        Node::Branch(children) => {
            // Dense 0..n integer keys come back as an array, the way the
            // remote store reconstitutes lists.
            let dense = !children.is_empty()
                && (0..children.len()).all(|i| children.contains_key(&i.to_string()));
            if dense {
                let mut by_index: BTreeMap<usize, Node> = BTreeMap::new();
                for (k, v) in children {
                    if let Ok(i) = k.parse::<usize>() {
                        by_index.insert(i, v);
                    }
                }
                Value::Array(by_index.into_values().map(node_to_value).collect())
            } else {
                Value::Object(
                    children
                        .into_iter()
                        .map(|(k, v)| (k, node_to_value(v)))
                        .collect(),
                )
            }
        }
    }
}

/// Reassemble the subtree rooted at `prefix` from `(path, value)` leaves.
/// Leaves not under the prefix are ignored; an exact-path leaf wins over
/// any descendants (the two cannot coexist after a well-formed set).
fn assemble(prefix: &str, leaves: Vec<(String, Value)>) -> Option<Value> {
    let (lo, _) = subtree_bounds(prefix);
    let mut root: BTreeMap<String, Node> = BTreeMap::new();
    let mut exact: Option<Value> = None;
    for (path, value) in leaves {
        if path == prefix {
            exact = Some(value);
        } else if let Some(suffix) = path.strip_prefix(&lo) {
            insert_leaf(&mut root, suffix, value);
        }
    }
    if exact.is_some() {
        return exact;
    }
    if root.is_empty() {
        return None;
    }
    Some(node_to_value(Node::Branch(root)))
}

/// Durable adapter: one `kv(path, value)` table in the workspace
/// directory. Statements run without a surrounding transaction on
/// purpose; the remote store this stands in for has none either.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> Result<SqliteStore, StoreError> {
        std::fs::create_dir_all(workspace)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let db_path = workspace.join("beurteilung.sqlite3");
        let conn = Connection::open(db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv(
                path TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(SqliteStore { conn })
    }

    fn leaves_under(&self, path: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let (lo, hi) = subtree_bounds(path);
        let mut out: Vec<(String, Value)> = Vec::new();
        let mut stmt = self
            .conn
            .prepare("SELECT path, value FROM kv WHERE path = ?1 OR (path >= ?2 AND path < ?3)")?;
        let mut rows = stmt.query((path, &lo, &hi))?;
        while let Some(row) = rows.next()? {
            let p: String = row.get(0)?;
            let raw: String = row.get(1)?;
            let v: Value = serde_json::from_str(&raw)
                .map_err(|e| StoreError::Unavailable(format!("corrupt row {p}: {e}")))?;
            out.push((p, v));
        }
        Ok(out)
    }

    fn clear_path(&self, path: &str) -> Result<(), StoreError> {
        let (lo, hi) = subtree_bounds(path);
        self.conn
            .execute("DELETE FROM kv WHERE path = ?1", [path])?;
        self.conn
            .execute("DELETE FROM kv WHERE path >= ?1 AND path < ?2", (&lo, &hi))?;
        Ok(())
    }
}

impl KvStore for SqliteStore {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let leaves = self.leaves_under(path)?;
        Ok(assemble(path, leaves))
    }

    fn set(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        tracing::debug!("kv set {}", path);
        // A write below a scalar replaces that scalar, so ancestor leaves
        // along the path are cleared first.
        for a in ancestors(path) {
            self.conn.execute("DELETE FROM kv WHERE path = ?1", [&a])?;
        }
        self.clear_path(path)?;
        let mut leaves = BTreeMap::new();
        explode(path, value, &mut leaves);
        let mut stmt = self
            .conn
            .prepare("INSERT INTO kv(path, value) VALUES (?1, ?2)")?;
        for (p, v) in &leaves {
            let raw = serde_json::to_string(v)
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            stmt.execute((p, &raw))?;
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), StoreError> {
        tracing::debug!("kv remove {}", path);
        self.clear_path(path)
    }
}

/// In-memory adapter for unit tests; same leaf semantics as the durable
/// one.
#[cfg(test)]
pub struct MemoryStore {
    leaves: Mutex<BTreeMap<String, Value>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            leaves: Mutex::new(BTreeMap::new()),
        }
    }
}

#[cfg(test)]
impl KvStore for MemoryStore {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let leaves = self.leaves.lock().expect("store lock");
        let (lo, hi) = subtree_bounds(path);
        let mut hits: Vec<(String, Value)> = Vec::new();
        if let Some(v) = leaves.get(path) {
            hits.push((path.to_string(), v.clone()));
        }
        for (p, v) in leaves.range(lo..hi) {
            hits.push((p.clone(), v.clone()));
        }
        Ok(assemble(path, hits))
    }

    fn set(&self, path: &str, value: &Value) -> Result<(), StoreError> {
        let mut leaves = self.leaves.lock().expect("store lock");
        for a in ancestors(path) {
            leaves.remove(&a);
        }
        let (lo, hi) = subtree_bounds(path);
        let doomed: Vec<String> = leaves.range(lo..hi).map(|(p, _)| p.clone()).collect();
        for p in doomed {
            leaves.remove(&p);
        }
        leaves.remove(path);
        let mut exploded = BTreeMap::new();
        explode(path, value, &mut exploded);
        leaves.extend(exploded);
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), StoreError> {
        let mut leaves = self.leaves.lock().expect("store lock");
        let (lo, hi) = subtree_bounds(path);
        let doomed: Vec<String> = leaves.range(lo..hi).map(|(p, _)| p.clone()).collect();
        for p in doomed {
            leaves.remove(&p);
        }
        leaves.remove(path);
        Ok(())
    }
}
