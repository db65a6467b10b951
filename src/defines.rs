//! Build define symbols store.
//!
//! Components may declare symbols to retract when they are uninstalled.
//! The store is an external build-configuration collaborator: retraction
//! removes the symbol from every target platform group it appears in.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::Result;

/// Build-configuration collaborator consumed during uninstall.
pub trait DefineStore: Send + Sync {
    /// Removes the symbol from every platform group, persisting if changed.
    fn retract(&mut self, symbol: &str) -> Result<()>;
}

/// JSON-file define store mapping platform group name to symbol list.
pub struct DefineFile {
    path: PathBuf,
}

impl DefineFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current symbol table, empty when the file does not exist.
    pub fn groups(&self) -> Result<BTreeMap<String, Vec<String>>> {
        load(&self.path)
    }
}

impl DefineStore for DefineFile {
    fn retract(&mut self, symbol: &str) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut groups = load(&self.path)?;
        let mut changed = false;
        for (group, symbols) in groups.iter_mut() {
            let before = symbols.len();
            symbols.retain(|existing| existing != symbol);
            if symbols.len() != before {
                debug!("retracted define {symbol} from group {group}");
                changed = true;
            }
        }
        if changed {
            fs::write(&self.path, serde_json::to_string_pretty(&groups)?)?;
        }
        Ok(())
    }
}

fn load(path: &Path) -> Result<BTreeMap<String, Vec<String>>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn write_table(path: &Path, table: &BTreeMap<String, Vec<String>>) {
        fs::write(path, serde_json::to_string_pretty(table).unwrap()).unwrap();
    }

    #[test]
    fn retract_removes_symbol_from_every_group() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("defines.json");
        let mut table = BTreeMap::new();
        table.insert(
            "desktop".to_string(),
            vec!["USE_CORE".to_string(), "USE_UI".to_string()],
        );
        table.insert("mobile".to_string(), vec!["USE_CORE".to_string()]);
        write_table(&path, &table);

        let mut store = DefineFile::new(&path);
        store.retract("USE_CORE").unwrap();

        let groups = store.groups().unwrap();
        assert_eq!(groups["desktop"], vec!["USE_UI".to_string()]);
        assert!(groups["mobile"].is_empty());
    }

    #[test]
    fn retract_without_a_table_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let mut store = DefineFile::new(dir.path().join("defines.json"));
        store.retract("USE_CORE").unwrap();
        assert!(store.groups().unwrap().is_empty());
    }

    #[test]
    fn unknown_symbol_leaves_the_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("defines.json");
        let mut table = BTreeMap::new();
        table.insert("desktop".to_string(), vec!["USE_UI".to_string()]);
        write_table(&path, &table);
        let before = fs::read_to_string(&path).unwrap();

        DefineFile::new(&path).retract("USE_CORE").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }
}
