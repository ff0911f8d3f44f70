use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "mootimeter.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS instances(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            refreshinterval INTEGER NOT NULL,
            contentchangedat INTEGER NOT NULL DEFAULT 0,
            timecreated INTEGER NOT NULL,
            timemodified INTEGER NOT NULL
        )",
        [],
    )?;

    // AUTOINCREMENT so a deleted page id is never handed out again.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pages(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            instance TEXT NOT NULL,
            title TEXT NOT NULL,
            question TEXT NOT NULL,
            tool TEXT NOT NULL,
            sortorder INTEGER NOT NULL DEFAULT 0,
            timecreated INTEGER NOT NULL,
            timemodified INTEGER NOT NULL,
            FOREIGN KEY(instance) REFERENCES instances(id)
        )",
        [],
    )?;
    ensure_pages_contentchangedat(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pages_instance_sort ON pages(instance, sortorder)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tool_settings(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tool TEXT NOT NULL,
            pageid INTEGER NOT NULL,
            name TEXT NOT NULL,
            value TEXT NOT NULL,
            FOREIGN KEY(pageid) REFERENCES pages(id)
        )",
        [],
    )?;
    ensure_tool_settings_unique(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quiz_options(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pageid INTEGER NOT NULL,
            optiontext TEXT NOT NULL,
            timecreated INTEGER NOT NULL,
            FOREIGN KEY(pageid) REFERENCES pages(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quiz_options_page ON quiz_options(pageid)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quiz_answers(
            id TEXT PRIMARY KEY,
            pageid INTEGER NOT NULL,
            usermodified TEXT NOT NULL,
            optionid INTEGER NOT NULL,
            timecreated INTEGER NOT NULL,
            FOREIGN KEY(pageid) REFERENCES pages(id),
            FOREIGN KEY(optionid) REFERENCES quiz_options(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quiz_answers_page ON quiz_answers(pageid)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS wordcloud_answers(
            id TEXT PRIMARY KEY,
            pageid INTEGER NOT NULL,
            usermodified TEXT NOT NULL,
            answer TEXT NOT NULL,
            timecreated INTEGER NOT NULL,
            FOREIGN KEY(pageid) REFERENCES pages(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_wordcloud_answers_page ON wordcloud_answers(pageid)",
        [],
    )?;

    Ok(())
}

/// Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Next value of a strictly increasing timestamp column.
pub fn advance_ms(previous: i64) -> i64 {
    now_ms().max(previous.saturating_add(1))
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn ensure_pages_contentchangedat(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "pages", "contentchangedat")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE pages ADD COLUMN contentchangedat INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    // Seed from the last edit so clients never see the marker move backwards.
    conn.execute("UPDATE pages SET contentchangedat = timemodified", [])?;
    Ok(())
}

fn ensure_tool_settings_unique(conn: &Connection) -> anyhow::Result<()> {
    // Older workspaces could hold duplicate (tool, pageid, name) rows; keep the newest.
    conn.execute(
        "DELETE FROM tool_settings
         WHERE id NOT IN (
           SELECT MAX(id) FROM tool_settings GROUP BY tool, pageid, name
         )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_tool_settings_key
         ON tool_settings(tool, pageid, name)",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
