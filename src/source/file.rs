use std::{
    cmp::Ordering,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};
use toml::{Value, map::Map};
use tracing::{debug, instrument};

use super::{ConfigSource, FileWatcher, ReloadSignal, ValueMap, WatchGuard, key};
use crate::core::{ConfigError, Result};

/// TOML file source.
///
/// Nested tables are flattened into `:`-separated keys on load (`[database]
/// host = "x"` becomes `database:host`), array elements are addressed by
/// index (`servers:0`). Saves merge the delta into the current file contents
/// and write the result atomically.
pub struct TomlFileSource {
    name: String,
    path: PathBuf,
}

impl TomlFileSource {
    /// Creates a source backed by the TOML file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("file:{}", path.display()),
            path,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_table(&self) -> Result<Option<Map<String, Value>>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConfigError::io(&e, &self.path)),
        };

        let table: Map<String, Value> =
            toml::from_str(&content).map_err(|e| ConfigError::SourceLoad {
                name: self.name.clone(),
                details: format!("failed to parse TOML: {e}"),
            })?;

        Ok(Some(table))
    }
}

#[async_trait]
impl ConfigSource for TomlFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<ValueMap> {
        let Some(table) = self.read_table().await? else {
            return Err(ConfigError::SourceMissing {
                name: self.name.clone(),
            });
        };

        let mut values = ValueMap::new();
        flatten_table("", &table, &mut values);
        debug!(keys = values.len(), "Loaded TOML file");
        Ok(values)
    }

    #[instrument(skip(self, delta), fields(path = %self.path.display(), entries = delta.len()))]
    async fn save(&self, delta: &ValueMap) -> Result<()> {
        let mut table = self.read_table().await.map_err(|e| ConfigError::Persist {
            name: self.name.clone(),
            details: e.to_string(),
        })?;
        let table = table.get_or_insert_with(Map::new);

        apply_delta(table, delta);

        let content = toml::to_string_pretty(table).map_err(|e| ConfigError::Persist {
            name: self.name.clone(),
            details: format!("failed to serialize TOML: {e}"),
        })?;

        write_atomic(&self.path, content.as_bytes())
            .await
            .map_err(|e| ConfigError::Persist {
                name: self.name.clone(),
                details: e.to_string(),
            })?;

        debug!("Saved TOML file");
        Ok(())
    }

    fn supports_reload(&self) -> bool {
        true
    }

    fn watch(&self, signal: ReloadSignal) -> Result<Option<WatchGuard>> {
        let mut watcher = FileWatcher::new(signal)?;
        watcher.watch_file(&self.path)?;
        Ok(Some(WatchGuard::new(watcher)))
    }
}

/// Flattens a TOML table into `:`-separated keys.
fn flatten_table(prefix: &str, table: &Map<String, Value>, out: &mut ValueMap) {
    for (name, value) in table {
        let path = key::join([prefix, name.as_str()]);
        flatten_value(&path, value, out);
    }
}

fn flatten_value(path: &str, value: &Value, out: &mut ValueMap) {
    match value {
        Value::Table(table) => flatten_table(path, table, out),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let index = index.to_string();
                flatten_value(&key::join([path, index.as_str()]), item, out);
            }
        }
        Value::String(s) => {
            out.insert(path.to_string(), Some(s.clone()));
        }
        other => {
            out.insert(path.to_string(), Some(other.to_string()));
        }
    }
}

/// Applies `delta` to `table`. Sets run in ascending key order and removals in
/// descending order, so array appends and removals see stable indices.
fn apply_delta(table: &mut Map<String, Value>, delta: &ValueMap) {
    let mut sets = Vec::new();
    let mut removals = Vec::new();
    for (name, value) in delta {
        let parts: Vec<&str> = key::segments(name).collect();
        match value {
            Some(v) => sets.push((parts, v.as_str())),
            None => removals.push(parts),
        }
    }

    sets.sort_by(|(a, _), (b, _)| compare_paths(a, b));
    removals.sort_by(|a, b| compare_paths(b, a));

    for (parts, raw) in sets {
        set_value_at_path(table, &parts, raw);
    }
    for parts in removals {
        remove_value_at_path(table, &parts);
    }
}

/// Segment-wise ordering; segments that are both numeric compare as numbers.
fn compare_paths(a: &[&str], b: &[&str]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ordering = match (x.parse::<usize>(), y.parse::<usize>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => x.cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

/// Inserts `raw` at the nested position named by `parts`, creating tables as
/// needed. An existing scalar of the same TOML type keeps its type.
fn set_value_at_path(table: &mut Map<String, Value>, parts: &[&str], raw: &str) {
    let Some((first, rest)) = parts.split_first() else {
        return;
    };

    if rest.is_empty() {
        let typed = typed_like(table.get(*first), raw);
        table.insert((*first).to_string(), typed);
        return;
    }

    let entry = table
        .entry((*first).to_string())
        .or_insert_with(|| Value::Table(Map::new()));
    set_value_in(entry, rest, raw);
}

/// Array elements are addressed by index; an index one past the end appends.
/// Any other non-container is replaced by a table.
fn set_value_in(value: &mut Value, parts: &[&str], raw: &str) {
    let Some((first, rest)) = parts.split_first() else {
        return;
    };

    if let Value::Array(items) = value
        && let Ok(index) = first.parse::<usize>()
        && index <= items.len()
    {
        if index == items.len() {
            items.push(if rest.is_empty() {
                Value::String(String::new())
            } else {
                Value::Table(Map::new())
            });
        }
        if rest.is_empty() {
            let typed = typed_like(items.get(index), raw);
            items[index] = typed;
        } else {
            set_value_in(&mut items[index], rest, raw);
        }
        return;
    }

    if !value.is_table() {
        *value = Value::Table(Map::new());
    }
    if let Value::Table(table) = value {
        set_value_at_path(table, parts, raw);
    }
}

/// Removes the nested entry named by `parts`, pruning tables and arrays left
/// empty. Removing an array element shifts the later elements down.
fn remove_value_at_path(table: &mut Map<String, Value>, parts: &[&str]) {
    let Some((first, rest)) = parts.split_first() else {
        return;
    };

    if rest.is_empty() {
        table.remove(*first);
        return;
    }

    if let Some(child) = table.get_mut(*first) {
        remove_value_in(child, rest);
        if is_empty_container(child) {
            table.remove(*first);
        }
    }
}

fn remove_value_in(value: &mut Value, parts: &[&str]) {
    match value {
        Value::Table(table) => remove_value_at_path(table, parts),
        Value::Array(items) => {
            let Some((first, rest)) = parts.split_first() else {
                return;
            };
            let Some(index) = first.parse::<usize>().ok().filter(|i| *i < items.len()) else {
                return;
            };
            if rest.is_empty() {
                items.remove(index);
            } else {
                remove_value_in(&mut items[index], rest);
                if is_empty_container(&items[index]) {
                    items.remove(index);
                }
            }
        }
        _ => {}
    }
}

fn is_empty_container(value: &Value) -> bool {
    match value {
        Value::Table(table) => table.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn typed_like(existing: Option<&Value>, raw: &str) -> Value {
    match existing {
        Some(Value::Integer(_)) => raw
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some(Value::Float(_)) => raw
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some(Value::Boolean(_)) => raw
            .parse::<bool>()
            .map(Value::Boolean)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        _ => Value::String(raw.to_string()),
    }
}

/// Writes `content` to a sibling temporary file and renames it over `path`.
async fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&temp_path, path).await
}
