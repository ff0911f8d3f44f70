use super::{effective_settings, setting_is_on, SettingDef, SettingKind, ToolHandler, ToolTemplates};
use crate::context::RequestContext;
use crate::db::now_ms;
use crate::error::{MtmError, MtmResult};
use crate::pages::{self, Page};
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use tracing::debug;
use uuid::Uuid;

pub const ANSWER_MAX_CHARS: usize = 100;

const WRAPPER: &str = r#"<div class="mootimeter-page {{containerclasses}}" data-pageid="{{pageid}}" data-cmid="{{cmid}}">
<div class="mootimetercard {{mootimetercard}}">
<h3 class="mootimeter-title">{{title}}</h3>
<div id="mootimeter_question_div">{{question}}</div>
<div class="mootimeter-wordcloud-content" data-color="{{color}}">
<input type="text" id="mootimeter_type_answer" maxlength="{{maxlength}}" placeholder="{{placeholder}}" data-pageid="{{pageid}}">
{{#haslimit}}<p class="mootimeter-limit">{{maxanswersperuser}}</p>{{/haslimit}}
<span class="mootimeter-answercount">{{answercount}}</span>
</div>
{{#showresults}}<a class="mootimeter-results-link" data-action="showresults" data-pageid="{{pageid}}">Results</a>{{/showresults}}
</div>
</div>"#;

const CONTENT: &str = r#"<div class="mootimeter-wordcloud-content" data-pageid="{{pageid}}" data-color="{{color}}">
<div id="mootimeter_question_div">{{question}}</div>
<input type="text" id="mootimeter_type_answer" maxlength="{{maxlength}}" placeholder="{{placeholder}}" data-pageid="{{pageid}}">
</div>"#;

/// Free-text answers aggregated into a weighted word list.
pub struct Wordcloud;

impl Wordcloud {
    pub const NAME: &'static str = "wordcloud";
}

fn answer_count(conn: &Connection, pageid: i64, userid: Option<&str>) -> MtmResult<i64> {
    let n = match userid {
        Some(u) => conn.query_row(
            "SELECT COUNT(*) FROM wordcloud_answers WHERE pageid = ? AND usermodified = ?",
            (pageid, u),
            |r| r.get(0),
        )?,
        None => conn.query_row(
            "SELECT COUNT(*) FROM wordcloud_answers WHERE pageid = ?",
            [pageid],
            |r| r.get(0),
        )?,
    };
    Ok(n)
}

/// `[[answer, count], ...]`, most frequent first.
pub fn answer_list(conn: &Connection, pageid: i64) -> MtmResult<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT answer, COUNT(*) AS cnt
         FROM wordcloud_answers
         WHERE pageid = ?
         GROUP BY answer
         ORDER BY cnt DESC, answer ASC",
    )?;
    let rows = stmt
        .query_map([pageid], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl ToolHandler for Wordcloud {
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
                name: "color",
                kind: SettingKind::Color,
                default: "#f98012",
            },
            SettingDef {
                name: "maxanswersperuser",
                kind: SettingKind::Int { min: 0, max: 100 },
                default: "0",
            },
            SettingDef {
                name: "allowduplicateanswers",
                kind: SettingKind::Bool,
                default: "0",
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
        let max: i64 = settings
            .get("maxanswersperuser")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let mut params = Map::new();
        params.insert("placeholder".into(), Value::String("Type your answer".into()));
        params.insert("maxlength".into(), Value::from(ANSWER_MAX_CHARS));
        params.insert("haslimit".into(), Value::Bool(max > 0));
        params.insert("maxanswersperuser".into(), Value::from(max));
        params.insert(
            "answercount".into(),
            Value::from(answer_count(conn, page.id, None)?),
        );
        params.insert(
            "color".into(),
            Value::String(settings.get("color").cloned().unwrap_or_default()),
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
            "<div class=\"mootimeter-wordcloud-results\"><div id=\"mootimeterwordcloud-{0}\" class=\"mootimeterwordcloud\" data-pageid=\"{0}\"></div></div>",
            page.id
        ))
    }

    fn results(&self, conn: &Connection, page: &Page) -> MtmResult<Value> {
        let list: Vec<Value> = answer_list(conn, page.id)?
            .into_iter()
            .map(|(answer, count)| json!([answer, count]))
            .collect();
        Ok(json!({ "answerlist": list }))
    }

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
        let answer = selection
            .as_str()
            .map(str::trim)
            .ok_or_else(|| MtmError::invalid("selection", "must be text"))?;
        if answer.is_empty() {
            return Err(MtmError::invalid("selection", "must not be empty"));
        }
        if answer.chars().count() > ANSWER_MAX_CHARS {
            return Err(MtmError::invalid(
                "selection",
                format!("length must be <= {}", ANSWER_MAX_CHARS),
            ));
        }

        let settings = effective_settings(conn, self, page)?;
        let max: i64 = settings
            .get("maxanswersperuser")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        if max > 0 && answer_count(conn, page.id, Some(&ctx.userid))? >= max {
            return Err(MtmError::invalid(
                "selection",
                "maximum number of answers reached",
            ));
        }
        if !setting_is_on(&settings, "allowduplicateanswers") {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM wordcloud_answers
                 WHERE pageid = ? AND usermodified = ? AND answer = ?",
                (page.id, &ctx.userid, answer),
                |r| r.get(0),
            )?;
            if exists > 0 {
                return Err(MtmError::invalid("selection", "answer already submitted"));
            }
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO wordcloud_answers(id, pageid, usermodified, answer, timecreated)
             VALUES(?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                page.id,
                &ctx.userid,
                answer,
                now_ms(),
            ),
        )?;
        pages::bump_marker(&tx, page.id)?;
        tx.commit()?;
        debug!(pageid = page.id, "wordcloud answer stored");
        Ok(())
    }

    fn on_page_deleted(&self, conn: &Connection, page: &Page) -> MtmResult<bool> {
        conn.execute("DELETE FROM wordcloud_answers WHERE pageid = ?", [page.id])?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pages::tests::{memory_db, record};
    use crate::pages::{create_instance, create_or_update, get_page};
    use crate::tools::ToolRegistry;

    fn wordcloud_page(conn: &Connection) -> Page {
        let registry = ToolRegistry::with_builtin_tools().expect("registry");
        let inst = create_instance(conn, "Lecture", 1000).expect("instance");
        let id = create_or_update(conn, &registry, &record(&inst.id, "wordcloud", "T"))
            .expect("page");
        get_page(conn, id, None).expect("page")
    }

    #[test]
    fn answers_aggregate_by_count_then_text() {
        let conn = memory_db();
        let page = wordcloud_page(&conn);
        for (user, word) in [("u1", "dog"), ("u2", "cat"), ("u3", "dog"), ("u4", " ant ")] {
            Wordcloud
                .store_answer(&conn, &page, &RequestContext::new(user), &json!(word))
                .expect("store");
        }
        let results = Wordcloud.results(&conn, &page).expect("results");
        assert_eq!(
            results["answerlist"],
            json!([["dog", 2], ["ant", 1], ["cat", 1]])
        );
    }

    #[test]
    fn duplicates_rejected_unless_allowed() {
        let conn = memory_db();
        let page = wordcloud_page(&conn);
        let ctx = RequestContext::new("u1");
        Wordcloud.store_answer(&conn, &page, &ctx, &json!("cat")).expect("first");
        let e = Wordcloud
            .store_answer(&conn, &page, &ctx, &json!("cat"))
            .expect_err("duplicate");
        assert!(matches!(e, MtmError::Validation(_)));

        let allow = json!({ "allowduplicateanswers": true });
        Wordcloud
            .apply_settings(&conn, &page, allow.as_object().expect("object"))
            .expect("apply");
        Wordcloud.store_answer(&conn, &page, &ctx, &json!("cat")).expect("allowed now");
        assert_eq!(
            answer_list(&conn, page.id).expect("list"),
            vec![("cat".to_string(), 2)]
        );
    }

    #[test]
    fn per_user_limit_is_enforced() {
        let conn = memory_db();
        let page = wordcloud_page(&conn);
        let limit = json!({ "maxanswersperuser": 2 });
        Wordcloud
            .apply_settings(&conn, &page, limit.as_object().expect("object"))
            .expect("apply");
        let ctx = RequestContext::new("u1");
        Wordcloud.store_answer(&conn, &page, &ctx, &json!("a")).expect("1");
        Wordcloud.store_answer(&conn, &page, &ctx, &json!("b")).expect("2");
        assert!(Wordcloud.store_answer(&conn, &page, &ctx, &json!("c")).is_err());
        Wordcloud
            .store_answer(&conn, &page, &RequestContext::new("u2"), &json!("c"))
            .expect("other user");
    }

    #[test]
    fn blank_or_anonymous_answers_are_rejected() {
        let conn = memory_db();
        let page = wordcloud_page(&conn);
        assert!(Wordcloud
            .store_answer(&conn, &page, &RequestContext::new("u1"), &json!("   "))
            .is_err());
        assert!(Wordcloud
            .store_answer(&conn, &page, &RequestContext::default(), &json!("cat"))
            .is_err());
        let long = "x".repeat(ANSWER_MAX_CHARS + 1);
        assert!(Wordcloud
            .store_answer(&conn, &page, &RequestContext::new("u1"), &json!(long))
            .is_err());
    }
}
