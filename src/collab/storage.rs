//! In-memory dotted-path storage.

use serde_json::{Map, Value};

use super::Storage;

/// A JSON tree addressed by dotted paths. Nothing is persisted.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    root: Map<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the tree from an existing JSON object.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(root) => Self { root },
            _ => Self::default(),
        }
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}

impl Storage for MemoryStorage {
    fn get(&self, path: &str) -> Option<Value> {
        let mut parts = segments(path);
        let first = parts.next()?;
        let mut node = self.root.get(first)?;
        for part in parts {
            node = node.as_object()?.get(part)?;
        }
        Some(node.clone())
    }

    fn set(&mut self, path: &str, value: Value) -> bool {
        let parts: Vec<&str> = segments(path).collect();
        let Some((last, parents)) = parts.split_last() else {
            return false;
        };

        let mut node = &mut self.root;
        for part in parents {
            let entry = node
                .entry((*part).to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(map) = entry else {
                return false;
            };
            node = map;
        }
        node.insert((*last).to_owned(), value);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_creates_intermediate_objects() {
        let mut storage = MemoryStorage::new();
        assert!(storage.set("quiz.scores.alice", json!(3)));
        assert_eq!(storage.get("quiz.scores.alice"), Some(json!(3)));
        assert_eq!(storage.get("quiz.scores"), Some(json!({"alice": 3})));
        assert_eq!(storage.get("quiz.missing"), None);
    }

    #[test]
    fn last_write_wins_and_scalars_are_replaced() {
        let mut storage = MemoryStorage::from_value(json!({"a": 1}));
        assert!(storage.set("a.b", json!("x")));
        assert_eq!(storage.get("a"), Some(json!({"b": "x"})));
        assert!(storage.set("a.b", json!("y")));
        assert_eq!(storage.get("a.b"), Some(json!("y")));
    }

    #[test]
    fn empty_path_is_rejected() {
        let mut storage = MemoryStorage::new();
        assert!(!storage.set("", json!(1)));
        assert_eq!(storage.get(""), None);
    }
}
