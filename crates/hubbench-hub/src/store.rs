use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

pub const DB_FILE_NAME: &str = "hub.sqlite";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tenants (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS sessions (
    tenant_id INTEGER PRIMARY KEY REFERENCES tenants(id),
    ip TEXT NOT NULL,
    port INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS credentials (
    id INTEGER PRIMARY KEY,
    token TEXT NOT NULL UNIQUE,
    scope TEXT NOT NULL
);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open backing store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("backing store query failed: {0}")]
    Query(#[from] rusqlite::Error),
    #[error("backing store commit failed: {0}")]
    Commit(#[source] rusqlite::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEndpoint {
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRecord {
    pub name: String,
    pub session: Option<SessionEndpoint>,
}

pub fn sqlite_url(path: &Path) -> String {
    format!("sqlite:///{}", path.display())
}

/// One trial's private backing store. A fresh file is created per trial
/// and never shared.
pub struct HubStore {
    conn: Connection,
    path: PathBuf,
}

impl HubStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn url(&self) -> String {
        sqlite_url(&self.path)
    }

    /// Runs `f` inside a single transaction; any error rolls the whole
    /// batch back.
    pub fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Self) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit().map_err(StoreError::Commit)?;
        Ok(value)
    }

    pub fn insert_tenant(&self, name: &str) -> Result<i64, StoreError> {
        self.conn
            .execute("INSERT INTO tenants (name) VALUES (?1)", params![name])?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn attach_session(&self, tenant_id: i64, ip: &str, port: u16) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO sessions (tenant_id, ip, port) VALUES (?1, ?2, ?3)",
            params![tenant_id, ip, port],
        )?;
        Ok(())
    }

    pub fn insert_credential(&self, token: &str, scope: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO credentials (token, scope) VALUES (?1, ?2)",
            params![token, scope],
        )?;
        Ok(())
    }

    pub fn admin_token(&self) -> Result<Option<String>, StoreError> {
        self.conn
            .query_row(
                "SELECT token FROM credentials WHERE scope = 'admin' ORDER BY id LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn tenant_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tenants", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn session_count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn tenants_page(&self, offset: u64, limit: u64) -> Result<Vec<TenantRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT t.name, s.ip, s.port FROM tenants t \
             LEFT JOIN sessions s ON s.tenant_id = t.id \
             ORDER BY t.id LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit as i64, offset as i64], |row| {
            let name: String = row.get(0)?;
            let ip: Option<String> = row.get(1)?;
            let port: Option<u16> = row.get(2)?;
            let session = match (ip, port) {
                (Some(ip), Some(port)) => Some(SessionEndpoint { ip, port }),
                _ => None,
            };
            Ok(TenantRecord { name, session })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn tenants_with_sessions(&self) -> Result<Vec<(String, SessionEndpoint)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT t.name, s.ip, s.port FROM tenants t \
             INNER JOIN sessions s ON s.tenant_id = t.id \
             ORDER BY t.id",
        )?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(0)?;
            let ip: String = row.get(1)?;
            let port: u16 = row.get(2)?;
            Ok((name, SessionEndpoint { ip, port }))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_store() -> (tempfile::TempDir, HubStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = HubStore::open(&dir.path().join(DB_FILE_NAME)).unwrap();
        (dir, store)
    }

    #[test]
    fn seeds_and_pages_in_insertion_order() {
        let (_dir, store) = fresh_store();
        store
            .in_transaction(|s| {
                s.insert_credential("tok", "admin")?;
                for i in 0..7 {
                    let id = s.insert_tenant(&format!("tenant-{i}"))?;
                    if i % 2 == 0 {
                        s.attach_session(id, "127.0.0.1", 12345)?;
                    }
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(store.tenant_count().unwrap(), 7);
        assert_eq!(store.session_count().unwrap(), 4);
        assert_eq!(store.admin_token().unwrap().as_deref(), Some("tok"));

        let page = store.tenants_page(2, 3).unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].name, "tenant-2");
        assert!(page[0].session.is_some());
        assert!(page[1].session.is_none());

        let active = store.tenants_with_sessions().unwrap();
        assert_eq!(active.len(), 4);
        assert_eq!(active[0].0, "tenant-0");
        assert_eq!(active[0].1.port, 12345);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let (_dir, store) = fresh_store();
        let result: Result<(), StoreError> = store.in_transaction(|s| {
            s.insert_tenant("tenant-0")?;
            // duplicate name violates the unique constraint
            s.insert_tenant("tenant-0")?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(store.tenant_count().unwrap(), 0);
    }

    #[test]
    fn empty_store_has_no_credential() {
        let (_dir, store) = fresh_store();
        assert_eq!(store.tenant_count().unwrap(), 0);
        assert!(store.admin_token().unwrap().is_none());
        assert!(store.tenants_page(0, 50).unwrap().is_empty());
    }

    #[test]
    fn url_is_the_sqlite_connection_string() {
        let (dir, store) = fresh_store();
        let path = dir.path().join(DB_FILE_NAME);
        assert_eq!(store.url(), sqlite_url(&path));
        assert!(store.url().starts_with("sqlite:///"));
    }
}
