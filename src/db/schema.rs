use super::quote_identifier;
use crate::types::{DatabaseCatalog, ForeignKeyInfo, ForeignKeys, TableColumns, TableSchema};
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeMap;

/// Names of all tables in the database
pub fn get_table_names(conn: &Connection, include_internal: bool) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let mut names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    if !include_internal {
        names.retain(|name| !name.starts_with("sqlite_"));
    }
    Ok(names)
}

/// Names of all views in the database
pub fn get_view_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'view' ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// Get row count for a table
pub fn get_table_row_count(conn: &Connection, table_name: &str) -> rusqlite::Result<u64> {
    let query = format!("SELECT COUNT(*) FROM {}", quote_identifier(table_name));
    let count: i64 = conn.query_row(&query, [], |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

/// Column names of a table or view, in declaration order
pub fn get_columns(conn: &Connection, table_name: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table_name)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

/// Declared primary key columns, ordered by their position in the key
pub fn get_primary_keys(conn: &Connection, table_name: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table_name)))?;
    let mut keyed = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let pk: i64 = row.get(5)?;
            Ok((pk, name))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    keyed.retain(|(pk, _)| *pk > 0);
    keyed.sort_by_key(|(pk, _)| *pk);
    Ok(keyed.into_iter().map(|(_, name)| name).collect())
}

/// Outgoing foreign keys for a table
pub fn get_foreign_keys(conn: &Connection, table_name: &str) -> rusqlite::Result<Vec<ForeignKeyInfo>> {
    let mut stmt = conn.prepare(&format!(
        "PRAGMA foreign_key_list({})",
        quote_identifier(table_name)
    ))?;

    let raw = stmt
        .query_map([], |row| {
            let seq: i64 = row.get(1)?;
            let to_table: String = row.get(2)?;
            let from_column: String = row.get(3)?;
            let to_column: Option<String> = row.get(4)?;
            Ok((seq, to_table, from_column, to_column))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut fks = Vec::with_capacity(raw.len());
    for (seq, to_table, from_column, to_column) in raw {
        // A missing target column means the parent's primary key
        let to_column = match to_column {
            Some(column) => column,
            None => get_primary_keys(conn, &to_table)?
                .into_iter()
                .nth(seq.max(0) as usize)
                .unwrap_or_else(|| "rowid".to_string()),
        };
        fks.push(ForeignKeyInfo {
            from_table: table_name.to_string(),
            from_column,
            to_table,
            to_column,
        });
    }
    Ok(fks)
}

/// Foreign keys for every table, recorded on both ends of each relation
pub fn get_all_foreign_keys(
    conn: &Connection,
    tables: &[String],
) -> rusqlite::Result<BTreeMap<String, ForeignKeys>> {
    let mut all: BTreeMap<String, ForeignKeys> = tables
        .iter()
        .map(|t| (t.clone(), ForeignKeys::default()))
        .collect();

    for table in tables {
        for fk in get_foreign_keys(conn, table)? {
            if let Some(target) = all.get_mut(&fk.to_table) {
                target.incoming.push(fk.clone());
            }
            if let Some(source) = all.get_mut(table) {
                source.outgoing.push(fk);
            }
        }
    }
    Ok(all)
}

/// Look up whether `name` is a table or a view, with its key columns and definition
pub fn describe(conn: &Connection, name: &str) -> rusqlite::Result<Option<TableSchema>> {
    let found: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT type, sql FROM sqlite_master WHERE name = ?1 AND type IN ('table', 'view')",
            [name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((kind, definition)) = found else {
        return Ok(None);
    };
    let is_view = kind == "view";
    let primary_keys = if is_view {
        Vec::new()
    } else {
        get_primary_keys(conn, name)?
    };

    Ok(Some(TableSchema {
        name: name.to_string(),
        is_view,
        primary_keys,
        definition,
    }))
}

/// Every table with its column names, plus the view names
pub fn get_catalog(conn: &Connection) -> rusqlite::Result<DatabaseCatalog> {
    let tables = get_table_names(conn, false)?
        .into_iter()
        .map(|name| {
            let columns = get_columns(conn, &name)?;
            Ok(TableColumns { name, columns })
        })
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(DatabaseCatalog {
        tables,
        views: get_view_names(conn)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE owners (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE pets (
                 kind TEXT, seq INTEGER, owner_id INTEGER REFERENCES owners,
                 PRIMARY KEY (seq, kind)
             );
             CREATE TABLE notes (body TEXT);
             CREATE VIEW named_pets AS SELECT kind, name FROM pets JOIN owners ON owners.id = owner_id;
             INSERT INTO owners VALUES (1, 'ann'), (2, 'bob');
             INSERT INTO pets VALUES ('cat', 1, 1), ('dog', 1, 2);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn lists_tables_and_views() {
        let conn = fixture();
        assert_eq!(get_table_names(&conn, false).unwrap(), vec!["notes", "owners", "pets"]);
        assert_eq!(get_view_names(&conn).unwrap(), vec!["named_pets"]);
        assert_eq!(get_table_row_count(&conn, "pets").unwrap(), 2);
        assert_eq!(get_columns(&conn, "named_pets").unwrap(), vec!["kind", "name"]);
    }

    #[test]
    fn catalog_lists_columns() {
        let conn = fixture();
        let catalog = get_catalog(&conn).unwrap();
        assert_eq!(catalog.tables.len(), 3);
        assert_eq!(catalog.tables[1].name, "owners");
        assert_eq!(catalog.tables[1].columns, vec!["id", "name"]);
        assert_eq!(catalog.views, vec!["named_pets"]);
    }

    #[test]
    fn primary_keys_follow_key_order() {
        let conn = fixture();
        assert_eq!(get_primary_keys(&conn, "pets").unwrap(), vec!["seq", "kind"]);
        assert_eq!(get_primary_keys(&conn, "owners").unwrap(), vec!["id"]);
        assert!(get_primary_keys(&conn, "notes").unwrap().is_empty());
    }

    #[test]
    fn foreign_keys_are_recorded_both_ways() {
        let conn = fixture();
        let tables = get_table_names(&conn, false).unwrap();
        let all = get_all_foreign_keys(&conn, &tables).unwrap();

        let outgoing = &all["pets"].outgoing;
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].to_table, "owners");
        assert_eq!(outgoing[0].from_column, "owner_id");
        assert_eq!(outgoing[0].to_column, "id");
        assert_eq!(all["owners"].incoming, outgoing.clone());
        assert!(all["notes"].incoming.is_empty());
    }

    #[test]
    fn describe_distinguishes_views() {
        let conn = fixture();
        let view = describe(&conn, "named_pets").unwrap().unwrap();
        assert!(view.is_view);
        assert!(view.primary_keys.is_empty());
        assert!(view.definition.unwrap().starts_with("CREATE VIEW"));

        let table = describe(&conn, "pets").unwrap().unwrap();
        assert!(!table.is_view);
        assert!(describe(&conn, "missing").unwrap().is_none());
    }
}
