//! SQLite-backed persistence for grid identities.

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;

use crate::{error::ForecastError, model::GridIdentity};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS grid_identity (
    coords TEXT PRIMARY KEY NOT NULL,
    grid_x INTEGER NOT NULL,
    grid_y INTEGER NOT NULL,
    grid_id TEXT NOT NULL,
    city TEXT NOT NULL,
    state TEXT NOT NULL,
    time_zone TEXT NOT NULL
);";

/// A persisted place, as returned by [`GridStore::search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedPlace {
    pub city: String,
    pub state: String,
    pub coords: String,
}

/// Write-once store mapping a rounded-coordinate key to its grid identity.
///
/// Owned by the service and shared by handle; every statement runs under one
/// connection lock, never across an upstream call.
#[derive(Debug)]
pub struct GridStore {
    conn: Mutex<Connection>,
}

impl GridStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ForecastError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, ForecastError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, ForecastError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ForecastError> {
        self.conn
            .lock()
            .map_err(|_| ForecastError::Storage("grid store lock poisoned".into()))
    }

    pub fn get(&self, key: &str) -> Result<Option<GridIdentity>, ForecastError> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT coords, grid_x, grid_y, grid_id, city, state, time_zone
                 FROM grid_identity WHERE coords = ?1",
                params![key],
                identity_from_row,
            )
            .optional()?;
        Ok(found)
    }

    /// Insert unless the key already exists, then return the stored row. When two
    /// writers race on one key the first insert wins and both see its row.
    pub fn insert_if_absent(&self, identity: &GridIdentity) -> Result<GridIdentity, ForecastError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO grid_identity (coords, grid_x, grid_y, grid_id, city, state, time_zone)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(coords) DO NOTHING",
            params![
                identity.key,
                identity.grid_x,
                identity.grid_y,
                identity.grid_id,
                identity.city,
                identity.state,
                identity.time_zone,
            ],
        )?;

        let stored = conn.query_row(
            "SELECT coords, grid_x, grid_y, grid_id, city, state, time_zone
             FROM grid_identity WHERE coords = ?1",
            params![identity.key],
            identity_from_row,
        )?;
        Ok(stored)
    }

    pub fn count(&self) -> Result<usize, ForecastError> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM grid_identity", [], |r| r.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    /// Case-insensitive substring search over `"<city> <state>"`.
    ///
    /// Whitespace- or comma-separated terms must appear in order; wildcard
    /// characters in the query match literally.
    pub fn search(&self, query: &str) -> Result<Vec<CachedPlace>, ForecastError> {
        let pattern = like_pattern(query);
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT city, state, coords FROM grid_identity
             WHERE city || ' ' || state LIKE ?1 ESCAPE '\\'
             ORDER BY coords",
        )?;
        let places = stmt
            .query_map(params![pattern], |row| {
                Ok(CachedPlace {
                    city: row.get(0)?,
                    state: row.get(1)?,
                    coords: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(places)
    }
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<GridIdentity> {
    Ok(GridIdentity {
        key: row.get(0)?,
        grid_x: row.get(1)?,
        grid_y: row.get(2)?,
        grid_id: row.get(3)?,
        city: row.get(4)?,
        state: row.get(5)?,
        time_zone: row.get(6)?,
    })
}

fn like_pattern(query: &str) -> String {
    let terms: Vec<String> = query
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(escape_like)
        .collect();
    format!("%{}%", terms.join("%"))
}

fn escape_like(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(key: &str, city: &str, state: &str) -> GridIdentity {
        GridIdentity {
            key: key.into(),
            grid_x: 32,
            grid_y: 34,
            grid_id: "OKX".into(),
            city: city.into(),
            state: state.into(),
            time_zone: "America/New_York".into(),
        }
    }

    #[test]
    fn get_missing_key_is_none() {
        let store = GridStore::in_memory().unwrap();
        assert_eq!(store.get("40.71,-74.00").unwrap(), None);
    }

    #[test]
    fn insert_then_get() {
        let store = GridStore::in_memory().unwrap();
        let id = identity("40.71,-74.00", "New York", "NY");

        assert_eq!(store.insert_if_absent(&id).unwrap(), id);
        assert_eq!(store.get("40.71,-74.00").unwrap(), Some(id));
    }

    #[test]
    fn second_insert_keeps_first_row() {
        let store = GridStore::in_memory().unwrap();
        let first = identity("40.71,-74.00", "New York", "NY");
        let mut second = first.clone();
        second.grid_id = "XXX".into();

        store.insert_if_absent(&first).unwrap();
        let stored = store.insert_if_absent(&second).unwrap();

        assert_eq!(stored, first);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridcast.db");

        {
            let store = GridStore::open(&path).unwrap();
            store.insert_if_absent(&identity("40.71,-74.00", "New York", "NY")).unwrap();
        }

        let store = GridStore::open(&path).unwrap();
        assert!(store.get("40.71,-74.00").unwrap().is_some());
    }

    #[test]
    fn search_matches_city_and_state_terms() {
        let store = GridStore::in_memory().unwrap();
        store.insert_if_absent(&identity("40.71,-74.00", "New York", "NY")).unwrap();
        store.insert_if_absent(&identity("41.88,-87.63", "Chicago", "IL")).unwrap();
        store.insert_if_absent(&identity("40.73,-74.17", "Newark", "NJ")).unwrap();

        let hits = store.search("new york, ny").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].coords, "40.71,-74.00");

        let hits = store.search("new").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].city, "New York");
        assert_eq!(hits[1].city, "Newark");
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let store = GridStore::in_memory().unwrap();
        store.insert_if_absent(&identity("40.71,-74.00", "New York", "NY")).unwrap();

        assert!(store.search("%").unwrap().is_empty());
        assert!(store.search("N_w").unwrap().is_empty());
        assert!(store.search("' OR 1=1 --").unwrap().is_empty());
    }

    #[test]
    fn like_pattern_escapes_and_joins() {
        assert_eq!(like_pattern("san  jose,ca"), "%san%jose%ca%");
        assert_eq!(like_pattern("100%_x"), "%100\\%\\_x%");
    }
}
