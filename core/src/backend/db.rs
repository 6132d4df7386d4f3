//! SQLite backend.
//!
//! Keys live in a single `values` table as a parent-pointer relation scoped
//! by configuration id. Paths are resolved one token at a time starting
//! from parent id 0; a level with zero or several matches stops resolution.

use std::path::PathBuf;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, warn};

use super::{effective_filter, Backend};
use crate::error::{ConfiError, Result};
use crate::path::{self, Root};
use crate::tree::{self, ChildSource, KeyTree};
use crate::types::{ConfigInfo, ConfigKey, Settings};

pub const SCHEME: &str = "db";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS configs (
    id          INTEGER NOT NULL PRIMARY KEY,
    name        TEXT    NOT NULL UNIQUE,
    description TEXT    NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS "values" (
    id_configs  INTEGER NOT NULL,
    id          INTEGER NOT NULL,
    id_parent   INTEGER NOT NULL DEFAULT 0,
    key         TEXT    NOT NULL,
    value       TEXT    NOT NULL DEFAULT '',
    description TEXT    NOT NULL DEFAULT '',
    PRIMARY KEY (id_configs, id)
);
CREATE INDEX IF NOT EXISTS values_by_parent ON "values" (id_configs, id_parent);
"#;


/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Memory,
    File(PathBuf),
}


/// Parameters extracted from a `db://` connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbParams {
    pub config_name: Option<String>,
    pub location: Location,
}


/// Parse `[SQLite://]KEY=value;KEY=value`.
///
/// Recognized keys: `CONFI_NAME`, `DB_FILE`, `DB_DIR`, `DB_NAME`.
pub fn parse_connection(cnc: &str) -> Result<DbParams> {
    let rest = match cnc.find("://") {
        Some(pos) if !cnc[..pos].contains(|c: char| c == '=' || c == ';') => {
            let provider = &cnc[..pos];
            if !provider.eq_ignore_ascii_case("sqlite") {
                return Err(ConfiError::malformed(format!(
                    "unsupported database provider '{}'",
                    provider
                )));
            }
            &cnc[pos + 3..]
        }
        _ => cnc,
    };

    let mut config_name = None;
    let mut db_file = None;
    let mut db_dir = None;
    let mut db_name = None;

    for pair in rest.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            ConfiError::malformed(format!("expected KEY=value, got '{}'", pair))
        })?;
        let value = value.trim().to_string();
        match key.trim().to_ascii_uppercase().as_str() {
            "CONFI_NAME" => config_name = Some(value).filter(|v| !v.is_empty()),
            "DB_FILE" => db_file = Some(value),
            "DB_DIR" => db_dir = Some(value),
            "DB_NAME" => db_name = Some(value),
            other => debug!(key = other, "ignoring connection parameter"),
        }
    }

    let location = match (db_file, db_name) {
        (Some(file), _) if file == ":memory:" => Location::Memory,
        (Some(file), _) if !file.is_empty() => Location::File(PathBuf::from(file)),
        (_, Some(name)) if !name.is_empty() => {
            let file_name = if name.ends_with(".db") {
                name
            } else {
                format!("{}.db", name)
            };
            let dir = db_dir.filter(|d| !d.is_empty()).unwrap_or_else(|| ".".into());
            Location::File(PathBuf::from(dir).join(file_name))
        }
        _ => {
            return Err(ConfiError::malformed(
                "connection string names no database (DB_FILE or DB_NAME)",
            ))
        }
    };

    Ok(DbParams {
        config_name,
        location,
    })
}


pub struct DbBackend {
    conn: Option<Connection>,
    config_name: String,
    config_id: Option<i64>,
    root: Root,
}

impl DbBackend {
    pub fn new(settings: &Settings) -> Self {
        DbBackend {
            conn: None,
            config_name: settings.default_config_name.clone(),
            config_id: None,
            root: Root::new(Some(settings.default_root.as_str())),
        }
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(ConfiError::NotInitialized)
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or(ConfiError::NotInitialized)
    }

    /// Connection plus the selected configuration id.
    fn bound(&self) -> Result<(&Connection, i64)> {
        let conn = self.conn()?;
        let id = self.config_id.ok_or(ConfiError::NotInitialized)?;
        Ok((conn, id))
    }

    fn resolve_row(&self, raw: &str) -> Result<ConfigKey> {
        let (conn, cfg) = self.bound()?;
        let abs = self.root.normalize(raw)?;
        resolve_tokens(conn, cfg, &path::tokens(&abs), &abs)
    }

    /// The node `add_key` and `path_move` treat as "the current root".
    fn resolve_parent(&self, parent: Option<&str>) -> Result<ConfigKey> {
        match parent.filter(|p| !p.trim().is_empty()) {
            Some(p) => self.resolve_row(p),
            None => {
                let (conn, cfg) = self.bound()?;
                resolve_tokens(conn, cfg, &self.root.tokens(), self.root.as_str())
            }
        }
    }
}

impl Backend for DbBackend {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn initialize(&mut self, cnc_string: &str) -> Result<()> {
        let params = parse_connection(cnc_string)?;
        let conn = match &params.location {
            Location::Memory => Connection::open_in_memory()?,
            Location::File(file) => Connection::open(file)?,
        };
        conn.execute_batch(SCHEMA)?;
        debug!(location = ?params.location, "database opened");

        if let Some(name) = params.config_name {
            self.config_name = name;
        }
        self.conn = Some(conn);
        self.config_id = None;
        Ok(())
    }

    fn select_config(&mut self, create: bool) -> Result<ConfigInfo> {
        let found = find_config(self.conn()?, &self.config_name)?;
        let (id, info) = match found {
            Some(row) => row,
            None if create => {
                let name = self.config_name.clone();
                self.add_config(&name, "")?;
                find_config(self.conn()?, &name)?
                    .ok_or_else(|| ConfiError::ConfigNotFound(name.clone()))?
            }
            None => {
                warn!(config = %self.config_name, "configuration not found");
                return Err(ConfiError::ConfigNotFound(self.config_name.clone()));
            }
        };
        self.config_id = Some(id);
        Ok(info)
    }

    fn current_config(&self) -> Result<ConfigInfo> {
        let (conn, cfg) = self.bound()?;
        let info = conn.query_row(
            "SELECT name, description FROM configs WHERE id = ?1",
            params![cfg],
            |row| {
                Ok(ConfigInfo {
                    name: row.get(0)?,
                    description: row.get(1)?,
                })
            },
        )?;
        Ok(info)
    }

    fn configs_list(&self, filter: Option<&str>) -> Result<Vec<ConfigInfo>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, description FROM configs \
             WHERE ?1 IS NULL OR name LIKE ?1 ORDER BY id",
        )?;
        let configs = stmt
            .query_map(params![effective_filter(filter)], |row| {
                Ok(ConfigInfo {
                    name: row.get(0)?,
                    description: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(configs)
    }

    fn add_config(&mut self, name: &str, description: &str) -> Result<ConfigInfo> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfiError::malformed("empty configuration name"));
        }
        if find_config(self.conn()?, name)?.is_some() {
            return Err(ConfiError::malformed(format!(
                "configuration \"{}\" already exists",
                name
            )));
        }

        let tx = self
            .conn_mut()?
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id: i64 = tx.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM configs", [], |row| {
            row.get(0)
        })?;
        tx.execute(
            "INSERT INTO configs (id, name, description) VALUES (?1, ?2, ?3)",
            params![id, name, description],
        )?;
        tx.commit()?;

        info!(config = name, id, "configuration created");
        Ok(ConfigInfo::new(name, description))
    }

    fn set_config(&mut self, name: &str, description: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfiError::malformed("empty configuration name"));
        }
        let (conn, cfg) = self.bound()?;
        conn.execute(
            "UPDATE configs SET name = ?1, description = ?2 WHERE id = ?3",
            params![name, description, cfg],
        )?;
        self.config_name = name.to_string();
        Ok(())
    }

    fn path_get_value(&self, path: &str) -> Result<String> {
        Ok(self.resolve_row(path)?.value)
    }

    fn path_set_value(&mut self, path: &str, value: &str) -> Result<()> {
        let row = self.resolve_row(path)?;
        write_value(self.conn()?, row.config_id, row.id, value)
    }

    fn tree(&self) -> Result<KeyTree> {
        let (_, cfg) = self.bound()?;
        tree::materialize(self, ConfigKey::synthetic_root(cfg), "")
    }

    fn add_key(&mut self, parent: Option<&str>, key: &str, value: &str) -> Result<ConfigKey> {
        let key = path::validate_key_name(key)?.to_string();
        let parent = self.resolve_parent(parent)?;
        let cfg = parent.config_id;

        let tx = self
            .conn_mut()?
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id: i64 = tx.query_row(
            r#"SELECT COALESCE(MAX(id), 0) + 1 FROM "values" WHERE id_configs = ?1"#,
            params![cfg],
            |row| row.get(0),
        )?;
        tx.execute(
            r#"INSERT INTO "values" (id_configs, id, id_parent, key, value, description)
               VALUES (?1, ?2, ?3, ?4, '', '')"#,
            params![cfg, id, parent.id, key],
        )?;
        write_value(&tx, cfg, id, value)?;
        tx.commit()?;

        debug!(id, parent = parent.id, key = %key, "key added");
        Ok(ConfigKey {
            config_id: cfg,
            id,
            parent_id: parent.id,
            key,
            value: value.to_string(),
            description: String::new(),
            path: chain_below(&parent),
        })
    }

    fn key_set_key(&mut self, key: &ConfigKey) -> Result<()> {
        let name = path::validate_key_name(&key.key)?;
        let (conn, cfg) = self.bound()?;
        let changed = conn.execute(
            r#"UPDATE "values" SET key = ?1, value = ?2, description = ?3
               WHERE id_configs = ?4 AND id = ?5"#,
            params![name, key.value, key.description, cfg, key.id],
        )?;
        if changed == 0 {
            warn!(id = key.id, key = %key.key, "key not found");
            return Err(ConfiError::not_found(key.full_path()));
        }
        Ok(())
    }

    fn path_get_key(&self, path: &str) -> Result<ConfigKey> {
        self.resolve_row(path)
    }

    fn remove_path(&mut self, path: &str) -> Result<()> {
        let target = self.resolve_row(path)?;
        let subtree = tree::materialize(&*self, target.clone(), &target.full_path())?;
        let doomed: Vec<i64> = subtree
            .keys()
            .into_iter()
            .map(|k| k.id)
            .filter(|id| *id != 0)
            .collect();

        let tx = self.conn_mut()?.transaction()?;
        for id in &doomed {
            delete_row(&tx, target.config_id, *id)?;
        }
        delete_row(&tx, target.config_id, target.id)?;
        tx.commit()?;

        debug!(path, removed = doomed.len() + 1, "path removed");
        Ok(())
    }

    fn path_move(&mut self, path: &str, parent: &str) -> Result<()> {
        let target = self.resolve_row(path)?;
        let new_parent = self.resolve_parent(Some(parent))?;

        let subtree = tree::materialize(&*self, target.clone(), &target.full_path())?;
        if subtree.pre_order().iter().any(|(n, _)| n.key.id == new_parent.id) {
            return Err(ConfiError::malformed(format!(
                "cannot move '{}' beneath itself",
                path
            )));
        }

        self.conn()?.execute(
            r#"UPDATE "values" SET id_parent = ?1 WHERE id_configs = ?2 AND id = ?3"#,
            params![new_parent.id, target.config_id, target.id],
        )?;
        debug!(id = target.id, parent = new_parent.id, "key moved");
        Ok(())
    }

    fn remove_config(&mut self) -> Result<()> {
        let (_, cfg) = self.bound()?;
        let tx = self.conn_mut()?.transaction()?;
        tx.execute(r#"DELETE FROM "values" WHERE id_configs = ?1"#, params![cfg])?;
        tx.execute("DELETE FROM configs WHERE id = ?1", params![cfg])?;
        tx.commit()?;

        info!(config = %self.config_name, "configuration removed");
        self.config_id = None;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.config_id = None;
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| e)?;
        }
        Ok(())
    }

    fn root(&self) -> &Root {
        &self.root
    }

    fn set_root(&mut self, root: Option<&str>) {
        self.root.set(root);
    }
}

impl ChildSource for DbBackend {
    fn children(&self, parent: &ConfigKey, chain: &str) -> Result<Vec<ConfigKey>> {
        let (conn, cfg) = self.bound()?;
        query_children(conn, cfg, parent.id, None, chain)
    }
}


fn find_config(conn: &Connection, name: &str) -> Result<Option<(i64, ConfigInfo)>> {
    let row = conn
        .query_row(
            "SELECT id, name, description FROM configs WHERE name = ?1",
            params![name],
            |row| {
                Ok((
                    row.get(0)?,
                    ConfigInfo {
                        name: row.get(1)?,
                        description: row.get(2)?,
                    },
                ))
            },
        )
        .optional()?;
    Ok(row)
}


/// Direct children of `parent`, optionally restricted to one key name, in
/// insertion order.
fn query_children(
    conn: &Connection,
    cfg: i64,
    parent: i64,
    key: Option<&str>,
    chain: &str,
) -> Result<Vec<ConfigKey>> {
    let mut stmt = conn.prepare(
        r#"SELECT id, id_parent, key, value, description FROM "values"
           WHERE id_configs = ?1 AND id_parent = ?2 AND (?3 IS NULL OR key = ?3)
           ORDER BY rowid"#,
    )?;
    let rows = stmt
        .query_map(params![cfg, parent, key], |row| {
            Ok(ConfigKey {
                config_id: cfg,
                id: row.get(0)?,
                parent_id: row.get(1)?,
                key: row.get(2)?,
                value: row.get(3)?,
                description: row.get(4)?,
                path: chain.to_string(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}


fn resolve_tokens(conn: &Connection, cfg: i64, tokens: &[&str], shown: &str) -> Result<ConfigKey> {
    let mut current = ConfigKey::synthetic_root(cfg);
    let mut chain = String::new();

    for token in tokens {
        let mut matches = query_children(conn, cfg, current.id, Some(*token), &chain)?;
        if matches.len() != 1 {
            warn!(path = %shown, key = %token, matches = matches.len(), "cannot resolve key");
            return Err(match matches.len() {
                0 => ConfiError::not_found(shown),
                n => ConfiError::Ambiguous {
                    path: shown.to_string(),
                    key: token.to_string(),
                    matches: n,
                },
            });
        }
        current = matches.remove(0);
        chain = path::join(&chain, &current.key);
    }

    debug!(path = %shown, id = current.id, "resolved");
    Ok(current)
}


fn write_value(conn: &Connection, cfg: i64, id: i64, value: &str) -> Result<()> {
    conn.execute(
        r#"UPDATE "values" SET value = ?1 WHERE id_configs = ?2 AND id = ?3"#,
        params![value, cfg, id],
    )?;
    Ok(())
}


fn delete_row(conn: &Connection, cfg: i64, id: i64) -> Result<()> {
    conn.execute(
        r#"DELETE FROM "values" WHERE id_configs = ?1 AND id = ?2"#,
        params![cfg, id],
    )?;
    Ok(())
}


/// Ancestor chain for children of `key`.
fn chain_below(key: &ConfigKey) -> String {
    if key.id == 0 {
        String::new()
    } else {
        key.full_path()
    }
}
