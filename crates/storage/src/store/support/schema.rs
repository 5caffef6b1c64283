#![forbid(unsafe_code)]

use nestree_core::tree::quote_ident;
use rusqlite::{params, Connection};

use crate::store::{StoreError, TreeConfig};

pub(in crate::store) fn migrate_tree_schema(
    conn: &Connection,
    cfg: &TreeConfig,
) -> Result<(), StoreError> {
    conn.execute_batch(&full_schema_sql(cfg))?;
    conn.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params!["schema_version", "v1"],
    )?;
    Ok(())
}

fn full_schema_sql(cfg: &TreeConfig) -> String {
    let columns = &cfg.columns;
    let table = quote_ident(&cfg.table);

    let mut defs: Vec<String> = vec![
        format!("{} TEXT PRIMARY KEY", quote_ident("id")),
        format!("{} TEXT", quote_ident(&columns.parent)),
        format!("{} INTEGER NOT NULL", quote_ident(&columns.left)),
        format!("{} INTEGER NOT NULL", quote_ident(&columns.right)),
        format!("{} INTEGER NOT NULL DEFAULT 0", quote_ident(&columns.depth)),
    ];
    if let Some(order) = columns.order.as_deref() {
        defs.push(format!("{} INTEGER", quote_ident(order)));
    }
    // Scope and attribute columns carry no affinity so values compare as stored.
    for column in &columns.scope {
        defs.push(quote_ident(column));
    }
    for column in &cfg.attrs {
        defs.push(quote_ident(column));
    }
    if cfg.timestamps {
        defs.push(format!("{} INTEGER NOT NULL", quote_ident("created_at_ms")));
        defs.push(format!("{} INTEGER NOT NULL", quote_ident("updated_at_ms")));
    }
    if cfg.soft_delete {
        defs.push(format!("{} INTEGER", quote_ident("deleted_at_ms")));
    }

    let mut sql = String::from(
        "PRAGMA journal_mode=WAL;\n\
         PRAGMA synchronous=NORMAL;\n\n\
         CREATE TABLE IF NOT EXISTS meta (\n\
           key TEXT PRIMARY KEY,\n\
           value TEXT NOT NULL\n\
         );\n\n\
         CREATE TABLE IF NOT EXISTS counters (\n\
           tree TEXT NOT NULL,\n\
           name TEXT NOT NULL,\n\
           value INTEGER NOT NULL,\n\
           PRIMARY KEY (tree, name)\n\
         );\n\n",
    );
    sql.push_str(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n  {}\n);\n\n",
        defs.join(",\n  ")
    ));
    sql.push_str(&format!(
        "CREATE INDEX IF NOT EXISTS {} ON {table}({}, {});\n",
        quote_ident(&format!("idx_{}_bounds", cfg.table)),
        quote_ident(&columns.left),
        quote_ident(&columns.right),
    ));
    sql.push_str(&format!(
        "CREATE INDEX IF NOT EXISTS {} ON {table}({});\n",
        quote_ident(&format!("idx_{}_parent", cfg.table)),
        quote_ident(&columns.parent),
    ));
    if columns.is_scoped() {
        let mut scope_list: Vec<String> = columns.scope.iter().map(|c| quote_ident(c)).collect();
        scope_list.push(quote_ident(&columns.left));
        sql.push_str(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table}({});\n",
            quote_ident(&format!("idx_{}_scope", cfg.table)),
            scope_list.join(", "),
        ));
    }
    sql
}
