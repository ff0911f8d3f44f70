//! Page and instance persistence, tool settings rows and the content-changed marker.

use crate::db::{advance_ms, now_ms};
use crate::error::{MtmError, MtmResult};
use crate::tools::ToolRegistry;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const MIN_REFRESH_INTERVAL_MS: i64 = 250;
pub const MAX_REFRESH_INTERVAL_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub refreshinterval: i64,
    pub contentchangedat: i64,
    pub timecreated: i64,
    pub timemodified: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub id: i64,
    pub instance: String,
    pub title: String,
    pub question: String,
    pub tool: String,
    pub sortorder: i64,
    pub timecreated: i64,
    pub timemodified: i64,
    pub contentchangedat: i64,
}

/// Submitted page fields; `id` present means "update".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageRecord {
    pub id: Option<i64>,
    pub instance: String,
    pub title: String,
    pub question: String,
    pub tool: String,
    pub sortorder: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageState {
    pub pageid: i64,
    pub refreshinterval: i64,
    pub contentchangedat: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavEntry {
    pub title: String,
    pub pix: String,
    pub active: String,
    pub pageid: i64,
    pub sortorder: i64,
}

const PAGE_COLUMNS: &str =
    "id, instance, title, question, tool, sortorder, timecreated, timemodified, contentchangedat";

fn page_from_row(row: &Row<'_>) -> rusqlite::Result<Page> {
    Ok(Page {
        id: row.get(0)?,
        instance: row.get(1)?,
        title: row.get(2)?,
        question: row.get(3)?,
        tool: row.get(4)?,
        sortorder: row.get(5)?,
        timecreated: row.get(6)?,
        timemodified: row.get(7)?,
        contentchangedat: row.get(8)?,
    })
}

pub fn create_instance(
    conn: &Connection,
    name: &str,
    refreshinterval: i64,
) -> MtmResult<Instance> {
    let name = name.trim();
    if name.is_empty() {
        return Err(MtmError::invalid("name", "must not be empty"));
    }
    if !(MIN_REFRESH_INTERVAL_MS..=MAX_REFRESH_INTERVAL_MS).contains(&refreshinterval) {
        return Err(MtmError::invalid(
            "refreshinterval",
            format!(
                "must be in {}..={}",
                MIN_REFRESH_INTERVAL_MS, MAX_REFRESH_INTERVAL_MS
            ),
        ));
    }
    let now = now_ms();
    let instance = Instance {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        refreshinterval,
        contentchangedat: now,
        timecreated: now,
        timemodified: now,
    };
    conn.execute(
        "INSERT INTO instances(id, name, refreshinterval, contentchangedat, timecreated, timemodified)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &instance.id,
            &instance.name,
            instance.refreshinterval,
            instance.contentchangedat,
            instance.timecreated,
            instance.timemodified,
        ),
    )?;
    info!(instance = %instance.id, name = %instance.name, "instance created");
    Ok(instance)
}

pub fn get_instance(conn: &Connection, instance_id: &str) -> MtmResult<Instance> {
    conn.query_row(
        "SELECT id, name, refreshinterval, contentchangedat, timecreated, timemodified
         FROM instances WHERE id = ?",
        [instance_id],
        |r| {
            Ok(Instance {
                id: r.get(0)?,
                name: r.get(1)?,
                refreshinterval: r.get(2)?,
                contentchangedat: r.get(3)?,
                timecreated: r.get(4)?,
                timemodified: r.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| MtmError::NotFound(format!("instance {} not found", instance_id)))
}

pub fn list_instances(conn: &Connection) -> MtmResult<Vec<Instance>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, refreshinterval, contentchangedat, timecreated, timemodified
         FROM instances ORDER BY name, id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(Instance {
                id: r.get(0)?,
                name: r.get(1)?,
                refreshinterval: r.get(2)?,
                contentchangedat: r.get(3)?,
                timecreated: r.get(4)?,
                timemodified: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Deletes every page through its tool hook, then the instance row. All or nothing.
pub fn delete_instance(
    conn: &Connection,
    registry: &ToolRegistry,
    instance_id: &str,
) -> MtmResult<usize> {
    get_instance(conn, instance_id)?;
    let pages = list_pages(conn, instance_id)?;

    let tx = conn.unchecked_transaction()?;
    for page in &pages {
        delete_page_in(&tx, registry, page)?;
    }
    tx.execute("DELETE FROM instances WHERE id = ?", [instance_id])?;
    tx.commit()?;

    info!(instance = %instance_id, pages = pages.len(), "instance deleted");
    Ok(pages.len())
}

/// Inserts a new page (running the tool's creation hook) or updates an existing one.
pub fn create_or_update(
    conn: &Connection,
    registry: &ToolRegistry,
    record: &PageRecord,
) -> MtmResult<i64> {
    let handler = registry.resolve(&record.tool)?;
    get_instance(conn, &record.instance)?;

    if let Some(id) = record.id {
        let orig = get_page(conn, id, Some(&record.instance))?;
        let switching = orig.tool != record.tool;
        let tx = conn.unchecked_transaction()?;
        if switching {
            release_tool(&tx, registry, &orig)?;
        }
        tx.execute(
            "UPDATE pages
             SET title = ?, question = ?, tool = ?, sortorder = ?, timemodified = ?
             WHERE id = ?",
            (
                &record.title,
                &record.question,
                &record.tool,
                record.sortorder,
                advance_ms(orig.timemodified),
                id,
            ),
        )?;
        if switching {
            let page = get_page(&tx, id, None)?;
            handler.on_page_created(&tx, &page)?;
        }
        bump_marker(&tx, id)?;
        tx.commit()?;
        if switching {
            info!(pageid = id, from = %orig.tool, to = %record.tool, "page tool changed");
        }
        debug!(pageid = id, tool = %record.tool, "page updated");
        return Ok(id);
    }

    let now = now_ms();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO pages(instance, title, question, tool, sortorder, timecreated, timemodified, contentchangedat)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &record.instance,
            &record.title,
            &record.question,
            &record.tool,
            record.sortorder,
            now,
            now,
            now,
        ),
    )?;
    let pageid = tx.last_insert_rowid();
    let page = get_page(&tx, pageid, None)?;
    handler.on_page_created(&tx, &page)?;
    tx.commit()?;

    info!(pageid, tool = %record.tool, instance = %record.instance, "page created");
    Ok(pageid)
}

pub fn list_pages(conn: &Connection, instance_id: &str) -> MtmResult<Vec<Page>> {
    let sql = format!(
        "SELECT {} FROM pages WHERE instance = ? ORDER BY sortorder, id",
        PAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let pages = stmt
        .query_map([instance_id], page_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pages)
}

/// Loads a page; with `instance_id` the page must also belong to that instance.
pub fn get_page(conn: &Connection, pageid: i64, instance_id: Option<&str>) -> MtmResult<Page> {
    let sql = format!("SELECT {} FROM pages WHERE id = ?", PAGE_COLUMNS);
    let page = conn
        .query_row(&sql, [pageid], page_from_row)
        .optional()?
        .ok_or_else(|| MtmError::page_not_found(pageid))?;
    if let Some(instance) = instance_id {
        if page.instance != instance {
            return Err(MtmError::page_not_in_instance());
        }
    }
    Ok(page)
}

pub fn upsert_setting(
    conn: &Connection,
    tool: &str,
    pageid: i64,
    name: &str,
    value: &str,
) -> MtmResult<()> {
    conn.execute(
        "INSERT INTO tool_settings(tool, pageid, name, value) VALUES(?, ?, ?, ?)
         ON CONFLICT(tool, pageid, name) DO UPDATE SET value = excluded.value",
        (tool, pageid, name, value),
    )?;
    Ok(())
}

pub fn get_settings(
    conn: &Connection,
    tool: &str,
    pageid: i64,
) -> MtmResult<BTreeMap<String, String>> {
    let mut stmt =
        conn.prepare("SELECT name, value FROM tool_settings WHERE tool = ? AND pageid = ?")?;
    let rows = stmt
        .query_map((tool, pageid), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

/// Removes the page if and only if its tool cleanup succeeds.
pub fn delete_page(conn: &Connection, registry: &ToolRegistry, page: &Page) -> MtmResult<()> {
    let tx = conn.unchecked_transaction()?;
    delete_page_in(&tx, registry, page)?;
    tx.commit()?;
    info!(pageid = page.id, tool = %page.tool, "page deleted");
    Ok(())
}

// Caller owns the transaction; an error here must lead to rollback.
fn delete_page_in(conn: &Connection, registry: &ToolRegistry, page: &Page) -> MtmResult<()> {
    let handler = registry.resolve(&page.tool)?;
    let cleaned = match handler.on_page_deleted(conn, page) {
        Ok(v) => v,
        Err(e) => {
            warn!(pageid = page.id, tool = %page.tool, error = %e, "tool cleanup failed");
            false
        }
    };
    if !cleaned {
        return Err(MtmError::DeleteFailed { pageid: page.id });
    }

    conn.execute("DELETE FROM tool_settings WHERE pageid = ?", [page.id])?;
    conn.execute("DELETE FROM pages WHERE id = ?", [page.id])?;
    bump_instance_marker(conn, &page.instance)?;
    Ok(())
}

// Drops everything the page's current tool owns, ahead of a tool change.
// Runs inside the caller's transaction.
fn release_tool(conn: &Connection, registry: &ToolRegistry, page: &Page) -> MtmResult<()> {
    let previous = registry.resolve(&page.tool)?;
    if !previous.on_page_deleted(conn, page)? {
        return Err(MtmError::invalid(
            "tool",
            format!("{} refused to release page {}", page.tool, page.id),
        ));
    }
    conn.execute(
        "DELETE FROM tool_settings WHERE pageid = ? AND tool = ?",
        (page.id, &page.tool),
    )?;
    Ok(())
}

/// Advances the page marker (and its instance's) so polling clients refetch.
pub fn bump_marker(conn: &Connection, pageid: i64) -> MtmResult<i64> {
    let (instance, current): (String, i64) = conn
        .query_row(
            "SELECT instance, contentchangedat FROM pages WHERE id = ?",
            [pageid],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| MtmError::page_not_found(pageid))?;
    let next = advance_ms(current);
    conn.execute(
        "UPDATE pages SET contentchangedat = ? WHERE id = ?",
        (next, pageid),
    )?;
    bump_instance_marker(conn, &instance)?;
    Ok(next)
}

fn bump_instance_marker(conn: &Connection, instance_id: &str) -> MtmResult<()> {
    let current: Option<i64> = conn
        .query_row(
            "SELECT contentchangedat FROM instances WHERE id = ?",
            [instance_id],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(current) = current {
        let next = advance_ms(current);
        conn.execute(
            "UPDATE instances SET contentchangedat = ?, timemodified = ? WHERE id = ?",
            (next, next, instance_id),
        )?;
    }
    Ok(())
}

pub fn page_state(conn: &Connection, pageid: i64) -> MtmResult<PageState> {
    conn.query_row(
        "SELECT p.id, i.refreshinterval, p.contentchangedat
         FROM pages p JOIN instances i ON i.id = p.instance
         WHERE p.id = ?",
        [pageid],
        |r| {
            Ok(PageState {
                pageid: r.get(0)?,
                refreshinterval: r.get(1)?,
                contentchangedat: r.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| MtmError::page_not_found(pageid))
}

/// Page switcher model; `active` marks the page currently shown.
pub fn navigation(pages: &[Page], active: Option<i64>) -> Vec<NavEntry> {
    pages
        .iter()
        .map(|p| NavEntry {
            title: p.title.clone(),
            pix: format!("tools/{0}/pix/{0}.svg", p.tool),
            active: if Some(p.id) == active {
                "active".to_string()
            } else {
                String::new()
            },
            pageid: p.id,
            sortorder: p.sortorder,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::db::init_schema;
    use crate::tools::{SettingDef, ToolHandler, ToolTemplates};
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    pub(crate) fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        init_schema(&conn).expect("init schema");
        conn
    }

    pub(crate) fn record(instance: &str, tool: &str, title: &str) -> PageRecord {
        PageRecord {
            id: None,
            instance: instance.to_string(),
            title: title.to_string(),
            question: format!("{}?", title),
            tool: tool.to_string(),
            sortorder: 0,
        }
    }

    /// Counts hook calls; cleanup outcome is configurable.
    struct CountingTool {
        created: Arc<AtomicUsize>,
        cleanup_ok: bool,
    }

    impl ToolHandler for CountingTool {
        fn name(&self) -> &'static str {
            "counting"
        }
        fn templates(&self) -> ToolTemplates {
            ToolTemplates {
                wrapper: "<div>{{title}}</div>",
                content: "{{title}}",
            }
        }
        fn settings_schema(&self, _page: &Page) -> Vec<SettingDef> {
            Vec::new()
        }
        fn render_params(&self, _conn: &Connection, _page: &Page) -> MtmResult<Map<String, Value>> {
            Ok(Map::new())
        }
        fn has_results_view(&self) -> bool {
            false
        }
        fn render_results(&self, _conn: &Connection, _page: &Page) -> MtmResult<String> {
            Ok(String::new())
        }
        fn results(&self, _conn: &Connection, _page: &Page) -> MtmResult<Value> {
            Ok(Value::Object(Map::new()))
        }
        fn store_answer(
            &self,
            _conn: &Connection,
            _page: &Page,
            _ctx: &RequestContext,
            _selection: &Value,
        ) -> MtmResult<()> {
            Ok(())
        }
        fn on_page_created(&self, _conn: &Connection, _page: &Page) -> MtmResult<()> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn on_page_deleted(&self, _conn: &Connection, _page: &Page) -> MtmResult<bool> {
            Ok(self.cleanup_ok)
        }
    }

    fn counting_registry(cleanup_ok: bool) -> (ToolRegistry, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry
            .register(Box::new(CountingTool {
                created: created.clone(),
                cleanup_ok,
            }))
            .expect("register counting tool");
        (registry, created)
    }

    #[test]
    fn insert_assigns_fresh_ids_and_runs_hook_once_each() {
        let conn = memory_db();
        let (registry, created) = counting_registry(true);
        let inst = create_instance(&conn, "Lecture", 1000).expect("instance");

        let a = create_or_update(&conn, &registry, &record(&inst.id, "counting", "A")).expect("a");
        let b = create_or_update(&conn, &registry, &record(&inst.id, "counting", "B")).expect("b");
        assert_ne!(a, b);
        assert_eq!(created.load(Ordering::SeqCst), 2);

        // A deleted id is never reused.
        let page_b = get_page(&conn, b, None).expect("b");
        delete_page(&conn, &registry, &page_b).expect("delete b");
        let c = create_or_update(&conn, &registry, &record(&inst.id, "counting", "C")).expect("c");
        assert!(c > b);
        assert_eq!(created.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn update_keeps_id_and_advances_timemodified() {
        let conn = memory_db();
        let (registry, created) = counting_registry(true);
        let inst = create_instance(&conn, "Lecture", 1000).expect("instance");
        let id = create_or_update(&conn, &registry, &record(&inst.id, "counting", "A")).expect("a");
        let before = get_page(&conn, id, None).expect("page");

        let mut edit = record(&inst.id, "counting", "A2");
        edit.id = Some(id);
        edit.sortorder = 7;
        for _ in 0..3 {
            let prev = get_page(&conn, id, None).expect("page");
            assert_eq!(create_or_update(&conn, &registry, &edit).expect("update"), id);
            let after = get_page(&conn, id, None).expect("page");
            assert!(after.timemodified > prev.timemodified);
            assert!(after.contentchangedat > prev.contentchangedat);
        }

        let after = get_page(&conn, id, None).expect("page");
        assert_eq!(after.title, "A2");
        assert_eq!(after.sortorder, 7);
        assert_eq!(after.timecreated, before.timecreated);
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_tool_is_a_configuration_error_and_persists_nothing() {
        let conn = memory_db();
        let (registry, _) = counting_registry(true);
        let inst = create_instance(&conn, "Lecture", 1000).expect("instance");
        let e = create_or_update(&conn, &registry, &record(&inst.id, "poll", "A"))
            .expect_err("unknown tool");
        assert!(matches!(e, MtmError::Configuration(_)));
        assert!(list_pages(&conn, &inst.id).expect("list").is_empty());
    }

    #[test]
    fn pages_list_by_sortorder_then_id() {
        let conn = memory_db();
        let (registry, _) = counting_registry(true);
        let inst = create_instance(&conn, "Lecture", 1000).expect("instance");
        let mut r = record(&inst.id, "counting", "late");
        r.sortorder = 5;
        let late = create_or_update(&conn, &registry, &r).expect("late");
        let mut r = record(&inst.id, "counting", "tie1");
        r.sortorder = 1;
        let tie1 = create_or_update(&conn, &registry, &r).expect("tie1");
        let tie2 = create_or_update(&conn, &registry, &r).expect("tie2");

        let ids: Vec<i64> = list_pages(&conn, &inst.id)
            .expect("list")
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![tie1, tie2, late]);
    }

    #[test]
    fn get_page_rejects_other_instances() {
        let conn = memory_db();
        let (registry, _) = counting_registry(true);
        let mine = create_instance(&conn, "Mine", 1000).expect("mine");
        let other = create_instance(&conn, "Other", 1000).expect("other");
        let id = create_or_update(&conn, &registry, &record(&mine.id, "counting", "A")).expect("a");

        assert!(get_page(&conn, id, Some(&mine.id)).is_ok());
        let e = get_page(&conn, id, Some(&other.id)).expect_err("cross-instance");
        assert!(matches!(e, MtmError::NotFound(_)));
        let e = get_page(&conn, id + 100, None).expect_err("missing");
        assert!(matches!(e, MtmError::NotFound(_)));

        // Updates are held to the same rule.
        let mut edit = record(&other.id, "counting", "hijack");
        edit.id = Some(id);
        assert!(matches!(
            create_or_update(&conn, &registry, &edit),
            Err(MtmError::NotFound(_))
        ));
    }

    #[test]
    fn setting_upsert_keeps_one_row() {
        let conn = memory_db();
        let (registry, _) = counting_registry(true);
        let inst = create_instance(&conn, "Lecture", 1000).expect("instance");
        let id = create_or_update(&conn, &registry, &record(&inst.id, "counting", "A")).expect("a");

        upsert_setting(&conn, "counting", id, "color", "#fff").expect("set");
        upsert_setting(&conn, "counting", id, "color", "#fff").expect("set again");
        let rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM tool_settings WHERE pageid = ?",
                [id],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(rows, 1);

        upsert_setting(&conn, "counting", id, "color", "#000").expect("overwrite");
        let settings = get_settings(&conn, "counting", id).expect("get");
        assert_eq!(settings.get("color").map(String::as_str), Some("#000"));
        assert_eq!(settings.len(), 1);
    }

    #[test]
    fn failed_cleanup_preserves_page_and_settings() {
        let conn = memory_db();
        let (registry, _) = counting_registry(false);
        let inst = create_instance(&conn, "Lecture", 1000).expect("instance");
        let id = create_or_update(&conn, &registry, &record(&inst.id, "counting", "A")).expect("a");
        upsert_setting(&conn, "counting", id, "color", "#fff").expect("set");

        let page = get_page(&conn, id, None).expect("page");
        let e = delete_page(&conn, &registry, &page).expect_err("cleanup refuses");
        assert!(matches!(e, MtmError::DeleteFailed { pageid } if pageid == id));
        assert!(get_page(&conn, id, None).is_ok());
        assert_eq!(get_settings(&conn, "counting", id).expect("settings").len(), 1);

        let e = delete_instance(&conn, &registry, &inst.id).expect_err("instance delete");
        assert!(matches!(e, MtmError::DeleteFailed { .. }));
        assert!(get_instance(&conn, &inst.id).is_ok());
    }

    #[test]
    fn delete_instance_removes_pages_and_settings() {
        let conn = memory_db();
        let (registry, _) = counting_registry(true);
        let inst = create_instance(&conn, "Lecture", 1000).expect("instance");
        for title in ["A", "B"] {
            let id = create_or_update(&conn, &registry, &record(&inst.id, "counting", title))
                .expect("page");
            upsert_setting(&conn, "counting", id, "color", "#fff").expect("set");
        }
        assert_eq!(delete_instance(&conn, &registry, &inst.id).expect("delete"), 2);
        assert!(matches!(
            get_instance(&conn, &inst.id),
            Err(MtmError::NotFound(_))
        ));
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM tool_settings", [], |r| r.get(0))
            .expect("count");
        assert_eq!(left, 0);
    }

    fn row_count(conn: &Connection, sql: &str, pageid: i64) -> i64 {
        conn.query_row(sql, [pageid], |r| r.get(0)).expect("count")
    }

    #[test]
    fn switching_quiz_to_wordcloud_releases_quiz_rows_and_stays_deletable() {
        use crate::tools::quiz::list_options;

        let conn = memory_db();
        let registry = ToolRegistry::with_builtin_tools().expect("registry");
        let inst = create_instance(&conn, "Lecture", 1000).expect("instance");
        let id = create_or_update(&conn, &registry, &record(&inst.id, "quiz", "Poll"))
            .expect("quiz page");
        let page = get_page(&conn, id, None).expect("page");
        let opt = list_options(&conn, id).expect("options")[0].id;
        registry
            .resolve("quiz")
            .expect("quiz")
            .store_answer(&conn, &page, &RequestContext::new("s1"), &Value::from(opt))
            .expect("answer");
        upsert_setting(&conn, "quiz", id, "charttype", "pie").expect("setting");
        let before = get_page(&conn, id, None).expect("page");

        let mut edit = record(&inst.id, "wordcloud", "Poll");
        edit.id = Some(id);
        assert_eq!(create_or_update(&conn, &registry, &edit).expect("switch"), id);

        let after = get_page(&conn, id, None).expect("page");
        assert_eq!(after.tool, "wordcloud");
        assert!(after.contentchangedat > before.contentchangedat);
        assert_eq!(row_count(&conn, "SELECT COUNT(*) FROM quiz_options WHERE pageid = ?", id), 0);
        assert_eq!(row_count(&conn, "SELECT COUNT(*) FROM quiz_answers WHERE pageid = ?", id), 0);
        assert!(get_settings(&conn, "quiz", id).expect("settings").is_empty());

        delete_page(&conn, &registry, &after).expect("delete after tool change");
        assert!(matches!(get_page(&conn, id, None), Err(MtmError::NotFound(_))));
    }

    #[test]
    fn switching_to_quiz_seeds_options_and_instance_still_deletes() {
        use crate::tools::quiz::list_options;

        let conn = memory_db();
        let registry = ToolRegistry::with_builtin_tools().expect("registry");
        let inst = create_instance(&conn, "Lecture", 1000).expect("instance");
        let id = create_or_update(&conn, &registry, &record(&inst.id, "wordcloud", "Words"))
            .expect("wordcloud page");
        let page = get_page(&conn, id, None).expect("page");
        registry
            .resolve("wordcloud")
            .expect("wordcloud")
            .store_answer(&conn, &page, &RequestContext::new("s1"), &Value::from("cat"))
            .expect("answer");

        let mut edit = record(&inst.id, "quiz", "Words");
        edit.id = Some(id);
        create_or_update(&conn, &registry, &edit).expect("switch");
        assert_eq!(list_options(&conn, id).expect("options").len(), 2);
        assert_eq!(
            row_count(&conn, "SELECT COUNT(*) FROM wordcloud_answers WHERE pageid = ?", id),
            0
        );

        // Same tool again: no second seeding.
        create_or_update(&conn, &registry, &edit).expect("plain update");
        assert_eq!(list_options(&conn, id).expect("options").len(), 2);

        assert_eq!(delete_instance(&conn, &registry, &inst.id).expect("delete"), 1);
    }

    #[test]
    fn refused_release_keeps_the_old_tool() {
        let conn = memory_db();
        let (mut registry, created) = counting_registry(false);
        registry
            .register(Box::new(crate::tools::Wordcloud))
            .expect("wordcloud");
        let inst = create_instance(&conn, "Lecture", 1000).expect("instance");
        let id = create_or_update(&conn, &registry, &record(&inst.id, "counting", "A")).expect("a");

        let mut edit = record(&inst.id, "wordcloud", "A");
        edit.id = Some(id);
        let e = create_or_update(&conn, &registry, &edit).expect_err("refused");
        assert!(matches!(e, MtmError::Validation(_)));
        assert_eq!(get_page(&conn, id, None).expect("page").tool, "counting");
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn instance_validation() {
        let conn = memory_db();
        assert!(matches!(
            create_instance(&conn, "  ", 1000),
            Err(MtmError::Validation(_))
        ));
        assert!(matches!(
            create_instance(&conn, "ok", 10),
            Err(MtmError::Validation(_))
        ));
    }

    #[test]
    fn navigation_marks_active_page() {
        let conn = memory_db();
        let (registry, _) = counting_registry(true);
        let inst = create_instance(&conn, "Lecture", 1000).expect("instance");
        let a = create_or_update(&conn, &registry, &record(&inst.id, "counting", "A")).expect("a");
        let b = create_or_update(&conn, &registry, &record(&inst.id, "counting", "B")).expect("b");
        let pages = list_pages(&conn, &inst.id).expect("list");
        let nav = navigation(&pages, Some(b));
        assert_eq!(nav.len(), 2);
        assert_eq!(nav[0].pageid, a);
        assert_eq!(nav[0].active, "");
        assert_eq!(nav[1].active, "active");
        assert_eq!(nav[1].pix, "tools/counting/pix/counting.svg");
    }

    #[test]
    fn page_state_reports_instance_interval_and_page_marker() {
        let conn = memory_db();
        let (registry, _) = counting_registry(true);
        let inst = create_instance(&conn, "Lecture", 1500).expect("instance");
        let id = create_or_update(&conn, &registry, &record(&inst.id, "counting", "A")).expect("a");
        let before = page_state(&conn, id).expect("state");
        assert_eq!(before.refreshinterval, 1500);
        let bumped = bump_marker(&conn, id).expect("bump");
        let after = page_state(&conn, id).expect("state");
        assert_eq!(after.contentchangedat, bumped);
        assert!(after.contentchangedat > before.contentchangedat);
    }
}
