use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::catalog::{load_catalog, SchemaCatalog};
use crate::options::Options;
use crate::storage::{SqliteStore, StoreRegistry};

/// `relgraph.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelgraphConfig {
    /// Catalog TOML file
    pub catalog: Option<String>,
    /// SQLite database per store id
    #[serde(default)]
    pub stores: IndexMap<String, StoreConfig>,
    /// Defaults for find/realise/resolve and writes
    #[serde(default)]
    pub options: Options,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    pub database: String,
    /// Create missing catalog tables on open
    #[serde(default)]
    pub create_tables: bool,
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("relgraph.toml")
}

pub fn default_database_path_in(base: &Path, store_id: &str) -> PathBuf {
    base.join(".relgraph").join(format!("{}.db", store_id))
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<RelgraphConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: RelgraphConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &RelgraphConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (pass force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Load the catalog and open every configured store, resolving relative
/// paths against `base`. Without configured stores, the catalog's default
/// store gets a database under `base/.relgraph/`.
pub fn open(config: &RelgraphConfig, base: &Path) -> anyhow::Result<(SchemaCatalog, StoreRegistry)> {
    let Some(catalog_path) = config.catalog.as_deref() else {
        anyhow::bail!("no catalog configured");
    };
    let catalog = load_catalog(&base.join(catalog_path))?;

    let mut stores = config.stores.clone();
    if stores.is_empty() {
        let default_id = catalog.default_store_id().to_string();
        let database = default_database_path_in(base, &default_id);
        stores.insert(default_id, StoreConfig {
            database: database.to_string_lossy().into_owned(),
            create_tables: true,
        });
    }

    let mut registry = StoreRegistry::new();
    for (store_id, store_config) in &stores {
        let db_path = base.join(&store_config.database);
        ensure_db_dir(&db_path)?;
        let store = SqliteStore::open(&db_path)?.with_store_id(store_id.as_str());
        if store_config.create_tables {
            store.initialize_schema(&catalog)?;
        }
        tracing::info!("Opened store '{}' at {}", store_id, db_path.display());
        registry.register(store);
    }

    Ok((catalog, registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::value::Value;

    const CATALOG: &str = r#"
default_store = "main"

[tables.club.stores.main]
table = "club"
columns = { id = { type = "integer", nullable = false }, name = { type = "text" } }
sequences = { id = "" }
primary_keys = { pk_club = ["id"] }
"#;

    #[test]
    fn test_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("relgraph.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relgraph.toml");

        let mut config = RelgraphConfig {
            catalog: Some("catalog.toml".to_string()),
            ..Default::default()
        };
        config.stores.insert("main".to_string(), StoreConfig {
            database: "data/main.db".to_string(),
            create_tables: true,
        });
        config.options = Options::new().index_key(true);

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.catalog.as_deref(), Some("catalog.toml"));
        assert_eq!(loaded.stores["main"], config.stores["main"]);
        assert!(loaded.options.index_key);
        assert!(loaded.options.swizzle);
    }

    #[test]
    fn test_partial_options() {
        let config: RelgraphConfig = toml::from_str(r#"
catalog = "catalog.toml"

[options]
lock_property = "version"
lock_mode = "database"
"#).unwrap();
        assert_eq!(config.options.lock_property.as_deref(), Some("version"));
        assert_eq!(config.options.lock_mode, crate::options::LockMode::Database);
        assert!(config.options.swizzle);
        assert!(config.stores.is_empty());
    }

    #[test]
    fn test_open_default_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("catalog.toml"), CATALOG).unwrap();
        let config = RelgraphConfig {
            catalog: Some("catalog.toml".to_string()),
            ..Default::default()
        };

        let (catalog, stores) = open(&config, dir.path()).unwrap();
        assert!(stores.contains("main"));
        assert!(default_database_path_in(dir.path(), "main").exists());

        let engine = Engine::new(&catalog, &stores);
        let mut club = engine.record("club").unwrap().with([("name", "Chess")]).unwrap();
        engine.create(&mut club).unwrap();
        assert_eq!(club.get("id").unwrap(), Some(&Value::from(1)));
    }

    #[test]
    fn test_open_without_catalog() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open(&RelgraphConfig::default(), dir.path()).is_err());
    }
}
