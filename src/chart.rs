//! Chart payloads attached to analyst replies
//!
//! The backend returns a figure description (a list of traces plus a layout).
//! Nothing in the session logic looks inside it; only renderers do.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use anyhow::Result;

/// Opaque chart description: `{ data: [trace, ...], layout: {...} }`.
///
/// Unknown top-level keys (`frames`, `config`, ...) are kept so the figure
/// can be handed to an external renderer unmodified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPayload {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub layout: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What a renderer can say about one trace without knowing the chart schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSummary {
    pub kind: String,
    pub name: Option<String>,
    pub points: usize,
}

impl ChartPayload {
    pub fn title(&self) -> Option<String> {
        match self.layout.get("title")? {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj.get("text").and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    }

    pub fn traces(&self) -> Vec<TraceSummary> {
        self.data.iter().map(summarize_trace).collect()
    }

    /// Write the figure as JSON so it can be opened by a real charting tool
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

fn summarize_trace(trace: &Value) -> TraceSummary {
    // Traces without an explicit type default to scatter
    let kind = trace
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("scatter")
        .to_string();
    let name = trace
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    let points = ["x", "y", "values", "labels", "z"]
        .iter()
        .filter_map(|key| trace.get(*key).and_then(Value::as_array))
        .map(Vec::len)
        .max()
        .unwrap_or(0);

    TraceSummary { kind, name, points }
}
