//! Boundary to the registries that serve versioned tables.
//!
//! A [`Connector`] turns a repository URL into a [`RegistryClient`]; the
//! client answers `tables(namespace, table, version)`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;

use crate::document::Tree;
use crate::error::{DocumentError, FetchError, FetchResult};
use crate::table::{Record, Table};

pub trait RegistryClient {
    fn tables(&self, namespace: &str, table: &str, version: &str) -> FetchResult<Table>;
}

pub trait Connector {
    fn connect(&self, url: &str) -> FetchResult<Box<dyn RegistryClient>>;
}

type TableKey = (String, String, String, String);

fn key(url: &str, namespace: &str, table: &str, version: &str) -> TableKey {
    (
        url.to_owned(),
        namespace.to_owned(),
        table.to_owned(),
        version.to_owned(),
    )
}

#[derive(Debug, Default)]
struct Shelf {
    tables: HashMap<TableKey, Table>,
    fetches: HashMap<TableKey, usize>,
    connections: Vec<String>,
}

/// Registry held in memory. Clones share the same tables and counters.
#[derive(Clone, Debug, Default)]
pub struct MemoryRegistry {
    shelf: Rc<RefCell<Shelf>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        url: &str,
        namespace: &str,
        table: &str,
        version: &str,
        records: Table,
    ) -> &Self {
        self.shelf
            .borrow_mut()
            .tables
            .insert(key(url, namespace, table, version), records);
        self
    }

    /// How many times `tables` was called for this table.
    pub fn fetch_count(&self, url: &str, namespace: &str, table: &str, version: &str) -> usize {
        self.shelf
            .borrow()
            .fetches
            .get(&key(url, namespace, table, version))
            .copied()
            .unwrap_or(0)
    }

    /// URLs passed to `connect`, in order.
    pub fn connections(&self) -> Vec<String> {
        self.shelf.borrow().connections.clone()
    }
}

impl Connector for MemoryRegistry {
    fn connect(&self, url: &str) -> FetchResult<Box<dyn RegistryClient>> {
        self.shelf.borrow_mut().connections.push(url.to_owned());
        Ok(Box::new(MemoryClient {
            url: url.to_owned(),
            shelf: Rc::clone(&self.shelf),
        }))
    }
}

struct MemoryClient {
    url: String,
    shelf: Rc<RefCell<Shelf>>,
}

impl RegistryClient for MemoryClient {
    fn tables(&self, namespace: &str, table: &str, version: &str) -> FetchResult<Table> {
        let key = key(&self.url, namespace, table, version);
        let mut shelf = self.shelf.borrow_mut();
        *shelf.fetches.entry(key.clone()).or_insert(0) += 1;
        shelf.tables.get(&key).cloned().ok_or_else(|| {
            FetchError::new(format!(
                "no table {}:{}:{} at {}",
                namespace, table, version, self.url
            ))
        })
    }
}

/// Serves `file://` URLs (or bare paths) from disk.
///
/// A table lives at `<root>/<namespace>/<table>/<version>.json` as a JSON
/// array of records. Relative paths resolve against `base`.
#[derive(Clone, Debug)]
pub struct DirectoryConnector {
    base: PathBuf,
}

impl DirectoryConnector {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl Connector for DirectoryConnector {
    fn connect(&self, url: &str) -> FetchResult<Box<dyn RegistryClient>> {
        let path = match url.split_once("://") {
            Some(("file", path)) => path,
            Some((scheme, _)) => {
                return Err(FetchError::new(format!("unsupported URL scheme: {}", scheme)))
            }
            None => url,
        };
        Ok(Box::new(DirectoryClient {
            root: self.base.join(path),
        }))
    }
}

struct DirectoryClient {
    root: PathBuf,
}

impl DirectoryClient {
    fn table_path(&self, namespace: &str, table: &str, version: &str) -> PathBuf {
        self.root
            .join(namespace)
            .join(table)
            .join(format!("{}.json", version))
    }
}

impl RegistryClient for DirectoryClient {
    fn tables(&self, namespace: &str, table: &str, version: &str) -> FetchResult<Table> {
        let path = self.table_path(namespace, table, version);
        log::debug!("reading table from {}", path.display());
        read_table(&path)
    }
}

/// Reads a JSON array of records.
pub fn read_table(path: &Path) -> FetchResult<Table> {
    let content = fs::read_to_string(path)
        .map_err(|e| FetchError::with_source(format!("cannot read {}", path.display()), e))?;
    let value: Value = serde_json::from_str(&content)
        .map_err(|e| FetchError::with_source(format!("invalid JSON in {}", path.display()), e))?;
    table_from_json(value)
        .map_err(|e| FetchError::with_source(format!("invalid table in {}", path.display()), e))
}

/// Converts a JSON array of objects into a table.
pub fn table_from_json(value: Value) -> Result<Table, DocumentError> {
    match value {
        Value::Array(records) => records.into_iter().map(Tree::try_from).collect(),
        _ => Err(DocumentError::WrongKind {
            field: "table".to_owned(),
            expected: "an array of records",
        }),
    }
}

pub fn table_to_json(table: &[Record]) -> Value {
    Value::Array(table.iter().cloned().map(Value::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_registry_counts_fetches() {
        let registry = MemoryRegistry::new();
        registry.insert("http://foo.com", "ns", "t", "1", vec![]);

        let client = registry.connect("http://foo.com").unwrap();
        assert!(client.tables("ns", "t", "1").unwrap().is_empty());
        assert!(client.tables("ns", "t", "2").is_err());

        assert_eq!(registry.fetch_count("http://foo.com", "ns", "t", "1"), 1);
        assert_eq!(registry.fetch_count("http://foo.com", "ns", "t", "2"), 1);
        assert_eq!(registry.connections(), vec!["http://foo.com"]);
    }

    #[test]
    fn test_directory_connector_reads_tables() {
        let dir = tempfile::tempdir().unwrap();
        let table_dir = dir.path().join("repo").join("foons").join("table_foo");
        fs::create_dir_all(&table_dir).unwrap();
        fs::write(
            table_dir.join("1234.json"),
            json!([{"a": "1", "b": "2"}, {"a": "11", "b": 12}]).to_string(),
        )
        .unwrap();

        let connector = DirectoryConnector::new(dir.path());
        let client = connector.connect("file://repo").unwrap();
        let table = client.tables("foons", "table_foo", "1234").unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table[1].scalar("b"), Some("12"));

        let err = client.tables("foons", "table_foo", "9999").unwrap_err();
        assert!(err.to_string().contains("9999.json"));
    }

    #[test]
    fn test_directory_connector_rejects_other_schemes() {
        let connector = DirectoryConnector::new(".");
        assert!(connector.connect("http://foo.com").is_err());
    }

    #[test]
    fn test_table_must_be_an_array() {
        assert!(table_from_json(json!({"a": "1"})).is_err());
        assert!(table_from_json(json!(["not a record"])).is_err());
    }
}
