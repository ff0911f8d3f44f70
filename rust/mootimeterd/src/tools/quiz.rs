use super::{effective_settings, setting_is_on, SettingDef, SettingKind, ToolHandler, ToolTemplates};
use crate::context::RequestContext;
use crate::db::now_ms;
use crate::error::{MtmError, MtmResult};
use crate::pages::{self, Page};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

pub const CHART_TYPES: &[&str] = &["bar", "pie", "line", "doughnut"];
pub const OPTION_TEXT_MAX: usize = 255;
const SEEDED_OPTIONS: usize = 2;

const WRAPPER: &str = r#"<div class="mootimeter-page {{containerclasses}}" data-pageid="{{pageid}}" data-cmid="{{cmid}}">
<div class="mootimetercard {{mootimetercard}}">
<h3 class="mootimeter-title">{{title}}</h3>
<div id="mootimeter_question_div">{{question}}</div>
<div class="mootimeter-quiz-content">
{{#hasoptions}}<ul class="mootimeter-answer-options">{{#options}}<li data-optionid="{{id}}">{{optiontext}}</li>{{/options}}</ul>{{/hasoptions}}
{{^hasoptions}}<p class="mootimeter-empty">No answer options yet.</p>{{/hasoptions}}
</div>
{{#showresults}}<a class="mootimeter-results-link" data-action="showresults" data-pageid="{{pageid}}">Results</a>{{/showresults}}
{{#isediting}}<button class="btn" data-action="addoption" data-pageid="{{pageid}}">Add option</button>{{/isediting}}
</div>
</div>"#;

const CONTENT: &str = r#"<div class="mootimeter-quiz-content" data-pageid="{{pageid}}" data-charttype="{{charttype}}">
<div id="mootimeter_question_div">{{question}}</div>
{{#hasoptions}}<ul class="mootimeter-answer-options">{{#options}}<li data-optionid="{{id}}">{{optiontext}}</li>{{/options}}</ul>{{/hasoptions}}
</div>"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerOption {
    pub id: i64,
    pub pageid: i64,
    pub optiontext: String,
}

/// Single-choice poll rendered as a chart.
pub struct Quiz;

impl Quiz {
    pub const NAME: &'static str = "quiz";
}

pub fn list_options(conn: &Connection, pageid: i64) -> MtmResult<Vec<AnswerOption>> {
    let mut stmt =
        conn.prepare("SELECT id, pageid, optiontext FROM quiz_options WHERE pageid = ? ORDER BY id")?;
    let rows = stmt
        .query_map([pageid], |r| {
            Ok(AnswerOption {
                id: r.get(0)?,
                pageid: r.get(1)?,
                optiontext: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn clean_option_text(text: &str) -> MtmResult<String> {
    let text = text.trim();
    if text.chars().count() > OPTION_TEXT_MAX {
        return Err(MtmError::invalid(
            "optiontext",
            format!("length must be <= {}", OPTION_TEXT_MAX),
        ));
    }
    Ok(text.to_string())
}

fn insert_option(conn: &Connection, pageid: i64, text: &str) -> MtmResult<i64> {
    conn.execute(
        "INSERT INTO quiz_options(pageid, optiontext, timecreated) VALUES(?, ?, ?)",
        (pageid, text, now_ms()),
    )?;
    Ok(conn.last_insert_rowid())
}

fn require_option(conn: &Connection, page: &Page, optionid: i64) -> MtmResult<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM quiz_options WHERE id = ? AND pageid = ?",
            (optionid, page.id),
            |r| r.get(0),
        )
        .optional()?;
    match found {
        Some(_) => Ok(()),
        None => Err(MtmError::NotFound(format!(
            "answer option {} is not part of page {}",
            optionid, page.id
        ))),
    }
}

pub fn add_option(conn: &Connection, page: &Page, text: &str) -> MtmResult<i64> {
    let text = clean_option_text(text)?;
    let tx = conn.unchecked_transaction()?;
    let id = insert_option(&tx, page.id, &text)?;
    pages::bump_marker(&tx, page.id)?;
    tx.commit()?;
    Ok(id)
}

pub fn update_option(conn: &Connection, page: &Page, optionid: i64, text: &str) -> MtmResult<()> {
    let text = clean_option_text(text)?;
    require_option(conn, page, optionid)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE quiz_options SET optiontext = ? WHERE id = ?",
        (&text, optionid),
    )?;
    pages::bump_marker(&tx, page.id)?;
    tx.commit()?;
    Ok(())
}

/// Drops the option together with the answers that chose it.
pub fn delete_option(conn: &Connection, page: &Page, optionid: i64) -> MtmResult<()> {
    require_option(conn, page, optionid)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM quiz_answers WHERE optionid = ?", [optionid])?;
    tx.execute("DELETE FROM quiz_options WHERE id = ?", [optionid])?;
    pages::bump_marker(&tx, page.id)?;
    tx.commit()?;
    Ok(())
}

fn chart_settings(charttype: &str, color: &str) -> Value {
    let options = match charttype {
        "pie" | "doughnut" => json!({
            "plugins": { "legend": { "display": true } }
        }),
        _ => json!({
            "plugins": { "legend": { "display": false } },
            "scales": { "y": { "beginAtZero": true, "ticks": { "stepSize": 1 } } }
        }),
    };
    json!({
        "charttype": charttype,
        "backgroundColor": color,
        "borderRadius": 10,
        "pointStyle": "circle",
        "pointRadius": 10,
        "pointHoverRadius": 15,
        "options": options,
    })
}

fn selection_id(selection: &Value) -> Option<i64> {
    match selection {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl ToolHandler for Quiz {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn templates(&self) -> ToolTemplates {
        ToolTemplates {
            wrapper: WRAPPER,
            content: CONTENT,
        }
    }

    fn settings_schema(&self, _page: &Page) -> Vec<SettingDef> {
        vec![
            SettingDef {
                name: "charttype",
                kind: SettingKind::Choice {
                    options: CHART_TYPES,
                },
                default: "bar",
            },
            SettingDef {
                name: "color",
                kind: SettingKind::Color,
                default: "#f98012",
            },
            SettingDef {
                name: "showresults",
                kind: SettingKind::Bool,
                default: "1",
            },
        ]
    }

    fn render_params(&self, conn: &Connection, page: &Page) -> MtmResult<Map<String, Value>> {
        let settings = effective_settings(conn, self, page)?;
        let options: Vec<Value> = list_options(conn, page.id)?
            .into_iter()
            .map(|o| json!({ "id": o.id, "optiontext": o.optiontext }))
            .collect();

        let mut params = Map::new();
        params.insert("hasoptions".into(), Value::Bool(!options.is_empty()));
        params.insert("options".into(), Value::Array(options));
        params.insert(
            "charttype".into(),
            Value::String(settings.get("charttype").cloned().unwrap_or_default()),
        );
        params.insert(
            "showresults".into(),
            Value::Bool(setting_is_on(&settings, "showresults")),
        );
        Ok(params)
    }

    fn has_results_view(&self) -> bool {
        true
    }

    fn render_results(&self, _conn: &Connection, page: &Page) -> MtmResult<String> {
        Ok(format!(
            "<div class=\"mootimeter-quiz-results\"><canvas id=\"mootimeterquiz-{0}\" class=\"mootimeterquizchart\" data-pageid=\"{0}\"></canvas></div>",
            page.id
        ))
    }

    fn results(&self, conn: &Connection, page: &Page) -> MtmResult<Value> {
        let settings = effective_settings(conn, self, page)?;
        let mut stmt = conn.prepare(
            "SELECT o.optiontext, COUNT(a.id)
             FROM quiz_options o
             LEFT JOIN quiz_answers a ON a.optionid = o.id
             WHERE o.pageid = ?
             GROUP BY o.id
             ORDER BY o.id",
        )?;
        let rows = stmt
            .query_map([page.id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let (labels, values): (Vec<String>, Vec<i64>) = rows.into_iter().unzip();

        let charttype = settings.get("charttype").map(String::as_str).unwrap_or("bar");
        let color = settings.get("color").map(String::as_str).unwrap_or("#f98012");
        Ok(json!({
            "question": page.question,
            "labels": labels,
            "values": values,
            "chartsettings": chart_settings(charttype, color),
        }))
    }

    /// One answer per user; a new choice replaces the old one.
    fn store_answer(
        &self,
        conn: &Connection,
        page: &Page,
        ctx: &RequestContext,
        selection: &Value,
    ) -> MtmResult<()> {
        if ctx.userid.trim().is_empty() {
            return Err(MtmError::invalid("userid", "must not be empty"));
        }
        let optionid = selection_id(selection)
            .ok_or_else(|| MtmError::invalid("selection", "must be an answer option id"))?;
        require_option(conn, page, optionid)?;

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM quiz_answers WHERE pageid = ? AND usermodified = ?",
            (page.id, &ctx.userid),
        )?;
        tx.execute(
            "INSERT INTO quiz_answers(id, pageid, usermodified, optionid, timecreated)
             VALUES(?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                page.id,
                &ctx.userid,
                optionid,
                now_ms(),
            ),
        )?;
        pages::bump_marker(&tx, page.id)?;
        tx.commit()?;
        debug!(pageid = page.id, optionid, "quiz answer stored");
        Ok(())
    }

    fn on_page_created(&self, conn: &Connection, page: &Page) -> MtmResult<()> {
        for _ in 0..SEEDED_OPTIONS {
            insert_option(conn, page.id, "")?;
        }
        Ok(())
    }

    fn on_page_deleted(&self, conn: &Connection, page: &Page) -> MtmResult<bool> {
        conn.execute("DELETE FROM quiz_answers WHERE pageid = ?", [page.id])?;
        conn.execute("DELETE FROM quiz_options WHERE pageid = ?", [page.id])?;
        Ok(true)
    }
}
