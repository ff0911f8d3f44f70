//! Client-side results synchronisation.
//!
//! One [`SyncAgent`] per mounted results container. The agent is sans-IO: the
//! host event loop feeds it `mount`, `tick` and `fetch_completed` and carries
//! out the returned [`Effect`]s (issue the fetch, arm or clear the timer,
//! notify formatters that content was replaced).

use crate::answers;
use crate::error::{MtmError, MtmResult};
use crate::pages::{self, PageState};
use crate::tools::ToolRegistry;
use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, warn};

/// What the agent can observe of the hosting document.
pub trait Document {
    fn contains(&self, container_id: &str) -> bool;

    /// The shared page state element, if present.
    fn page_state(&self) -> Option<PageState>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedResults {
    pub contentchangedat: i64,
    pub changed: bool,
    pub payload: Value,
}

impl FetchedResults {
    pub fn from_value(v: Value) -> Option<Self> {
        let contentchangedat = v.get("contentchangedat")?.as_i64()?;
        let changed = v.get("changed").and_then(Value::as_bool).unwrap_or(true);
        Some(Self {
            contentchangedat,
            changed,
            payload: v,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redraw {
    Created,
    Updated,
}

pub trait Visualization {
    /// Draws `payload`; `None` when it cannot be interpreted.
    fn apply(&mut self, payload: &Value) -> Option<Redraw>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    WaitingInterval,
    Fetching,
    Disposed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Fetch { pageid: i64, lastupdated: Option<i64> },
    ArmTimer { interval_ms: i64 },
    ClearTimer,
    ContentReplaced { container: String },
}

pub struct SyncAgent<V> {
    container: String,
    state: SyncState,
    pageid: i64,
    last_updated: i64,
    last_drawn: Option<i64>,
    pending_marker: Option<i64>,
    view: V,
}

impl<V: Visualization> SyncAgent<V> {
    pub fn new(container: impl Into<String>, view: V) -> Self {
        Self {
            container: container.into(),
            state: SyncState::Idle,
            pageid: 0,
            last_updated: 0,
            last_drawn: None,
            pending_marker: None,
            view,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    /// Marker consumed by the last successful fetch.
    pub fn last_updated(&self) -> i64 {
        self.last_updated
    }

    /// Arms the timer and fetches immediately, whatever the markers say.
    pub fn mount(&mut self, doc: &dyn Document) -> Vec<Effect> {
        if self.state != SyncState::Idle {
            return Vec::new();
        }
        let Some(page) = self.observe(doc) else {
            self.state = SyncState::Disposed;
            return Vec::new();
        };
        self.pageid = page.pageid;
        vec![
            self.begin_fetch(page.contentchangedat, None),
            Effect::ArmTimer {
                interval_ms: page.refreshinterval,
            },
        ]
    }

    pub fn tick(&mut self, doc: &dyn Document) -> Vec<Effect> {
        match self.state {
            SyncState::Idle | SyncState::Disposed => return Vec::new(),
            SyncState::WaitingInterval | SyncState::Fetching => {}
        }
        if !doc.contains(&self.container) {
            debug!(container = %self.container, "container gone, stopping sync");
            self.state = SyncState::Disposed;
            self.pending_marker = None;
            return vec![Effect::ClearTimer];
        }
        if self.state == SyncState::Fetching {
            return Vec::new();
        }
        let Some(page) = doc.page_state() else {
            return Vec::new();
        };
        if page.contentchangedat == self.last_updated {
            return Vec::new();
        }
        vec![self.begin_fetch(page.contentchangedat, Some(self.last_updated))]
    }

    pub fn fetch_completed(
        &mut self,
        doc: &dyn Document,
        result: MtmResult<FetchedResults>,
    ) -> Vec<Effect> {
        if self.state != SyncState::Fetching {
            return Vec::new();
        }
        self.state = SyncState::WaitingInterval;
        let Some(consumed) = self.pending_marker.take() else {
            return Vec::new();
        };
        if !doc.contains(&self.container) {
            return Vec::new();
        }

        let fetched = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(container = %self.container, error = %e, "results fetch failed");
                return Vec::new();
            }
        };
        // Nothing new since the previous redraw, even if data came back.
        if !fetched.changed || self.last_drawn == Some(fetched.contentchangedat) {
            self.last_updated = consumed;
            return Vec::new();
        }
        match self.view.apply(&fetched.payload) {
            Some(kind) => {
                self.last_updated = consumed;
                self.last_drawn = Some(fetched.contentchangedat);
                debug!(container = %self.container, ?kind, marker = consumed, "redrawn");
                vec![Effect::ContentReplaced {
                    container: self.container.clone(),
                }]
            }
            None => {
                warn!(container = %self.container, "unusable results payload");
                Vec::new()
            }
        }
    }

    /// Runs one timer tick against a blocking results source.
    pub fn step(&mut self, doc: &dyn Document, source: &mut dyn ResultsSource) -> Vec<Effect> {
        let mut effects = self.tick(doc);
        if let Some(Effect::Fetch {
            pageid,
            lastupdated,
        }) = effects.first().cloned()
        {
            let result = source.fetch(pageid, lastupdated);
            effects.extend(self.fetch_completed(doc, result));
        }
        effects
    }

    fn observe(&self, doc: &dyn Document) -> Option<PageState> {
        if !doc.contains(&self.container) {
            return None;
        }
        doc.page_state()
    }

    fn begin_fetch(&mut self, marker: i64, lastupdated: Option<i64>) -> Effect {
        self.state = SyncState::Fetching;
        self.pending_marker = Some(marker);
        Effect::Fetch {
            pageid: self.pageid,
            lastupdated,
        }
    }
}

pub trait ResultsSource {
    fn fetch(&mut self, pageid: i64, lastupdated: Option<i64>) -> MtmResult<FetchedResults>;
}

/// Reads results straight from a workspace connection.
pub struct LocalResults<'a> {
    conn: &'a Connection,
    registry: &'a ToolRegistry,
}

impl<'a> LocalResults<'a> {
    pub fn new(conn: &'a Connection, registry: &'a ToolRegistry) -> Self {
        Self { conn, registry }
    }
}

impl ResultsSource for LocalResults<'_> {
    fn fetch(&mut self, pageid: i64, lastupdated: Option<i64>) -> MtmResult<FetchedResults> {
        let page = pages::get_page(self.conn, pageid, None)?;
        let value = answers::query(self.conn, self.registry, &page, lastupdated)?;
        FetchedResults::from_value(value)
            .ok_or_else(|| MtmError::Internal(anyhow::anyhow!("results without marker")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub charttype: String,
    pub label: String,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub settings: Value,
}

/// Chart display; updated in place unless the chart type changes.
#[derive(Debug, Default)]
pub struct ChartView {
    pub chart: Option<Chart>,
    pub created: usize,
    pub updated: usize,
}

impl Visualization for ChartView {
    fn apply(&mut self, payload: &Value) -> Option<Redraw> {
        let settings = payload.get("chartsettings")?.clone();
        let charttype = settings.get("charttype")?.as_str()?.to_string();
        let labels = payload
            .get("labels")?
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()?;
        let values = payload
            .get("values")?
            .as_array()?
            .iter()
            .map(Value::as_f64)
            .collect::<Option<Vec<_>>>()?;
        let label = payload
            .get("question")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        if let Some(chart) = self.chart.as_mut() {
            if chart.charttype == charttype {
                chart.label = label;
                chart.labels = labels;
                chart.values = values;
                chart.settings = settings;
                self.updated += 1;
                return Some(Redraw::Updated);
            }
        }
        self.chart = Some(Chart {
            charttype,
            label,
            labels,
            values,
            settings,
        });
        self.created += 1;
        Some(Redraw::Created)
    }
}

/// Word cloud display; the weighted list is replaced in place.
#[derive(Debug, Default)]
pub struct WordcloudView {
    pub words: Option<Vec<(String, i64)>>,
    pub redraws: usize,
}

impl Visualization for WordcloudView {
    fn apply(&mut self, payload: &Value) -> Option<Redraw> {
        let words = payload
            .get("answerlist")?
            .as_array()?
            .iter()
            .map(|entry| {
                let pair = entry.as_array()?;
                Some((pair.first()?.as_str()?.to_string(), pair.get(1)?.as_i64()?))
            })
            .collect::<Option<Vec<_>>>()?;
        self.redraws += 1;
        let kind = if self.words.is_some() {
            Redraw::Updated
        } else {
            Redraw::Created
        };
        self.words = Some(words);
        Some(kind)
    }
}
