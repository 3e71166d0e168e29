//! Core data model: Rule, Schedule, ReportConfig, Report, Session,
//! Message, and the pagination envelope shared by both listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Enabled/Disabled lifecycle status shared by Rule and ReportConfig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Enabled,
    Disabled,
}

impl Default for Status {
    fn default() -> Self {
        Status::Disabled
    }
}

/// Recurrence kind for a Schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recurring {
    None,
    Daily,
    Weekly,
    Monthly,
}

impl Default for Recurring {
    fn default() -> Self {
        Recurring::None
    }
}

/// Firing schedule for a Rule or ReportConfig. See `schedule::should_run`
/// for the evaluation algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub start_date_time: DateTime<Utc>,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub recurring: Recurring,
    #[serde(default)]
    pub recurring_period: u32,
}

impl Schedule {
    /// A schedule that fires once, immediately.
    pub fn immediate(at: DateTime<Utc>) -> Self {
        Schedule {
            start_date_time: at,
            time: at,
            recurring: Recurring::None,
            recurring_period: 0,
        }
    }
}

/// Channel + optional subtopic pattern a Rule listens on, or an
/// output Message is published to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Binding {
    pub channel: String,
    #[serde(default)]
    pub topic: String,
}

/// Script body plus the interpreter it targets. The Script Sandbox
/// currently supports one kind; the tag is kept so an additional
/// backend can be added without a breaking schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicKind {
    Rhai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logic {
    #[serde(rename = "type")]
    pub kind: LogicKind,
    pub value: String,
}

/// An identified, domain-scoped unit of automation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub domain_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub input: Binding,
    pub logic: Logic,
    #[serde(default)]
    pub output: Option<Binding>,
    pub schedule: Schedule,
    #[serde(default)]
    pub status: Status,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

/// Aggregation applied by the Readers service over a time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    Unspecified,
    Min,
    Max,
    Avg,
    Sum,
    Count,
}

impl Default for Aggregation {
    fn default() -> Self {
        Aggregation::Unspecified
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailDescriptor {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
}

/// Identified, domain-scoped unit of scheduled report generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub domain_id: String,
    #[serde(default)]
    pub channel_ids: Vec<String>,
    #[serde(default)]
    pub client_ids: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub email: Option<EmailDescriptor>,
    pub schedule: Schedule,
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub status: Status,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

fn default_limit() -> u64 {
    10
}

/// A single SenML-shaped measurement as returned by the Readers
/// service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenmlSample {
    pub publisher: String,
    pub channel: String,
    #[serde(default)]
    pub subtopic: String,
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub string_value: Option<String>,
    #[serde(default)]
    pub bool_value: Option<bool>,
    #[serde(default)]
    pub data_value: Option<String>,
}

impl SenmlSample {
    /// Value selection precedence used by the Report Generator's
    /// renderers: numeric, then string, then bool, then data, else
    /// "N/A".
    pub fn display_value(&self) -> String {
        if let Some(v) = self.value {
            format!("{:.2}", v)
        } else if let Some(s) = &self.string_value {
            s.clone()
        } else if let Some(b) = self.bool_value {
            b.to_string()
        } else if let Some(d) = &self.data_value {
            d.clone()
        } else {
            "N/A".to_string()
        }
    }
}

/// Transient output of a ReportConfig evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub samples: HashMap<String, Vec<SenmlSample>>,
    #[serde(with = "base64_bytes")]
    pub pdf: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub csv: Vec<u8>,
}

impl Report {
    pub fn total(&self) -> u64 {
        1
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(bytes).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Caller-supplied, already-authenticated tenancy context. Read-only
/// to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub domain_id: String,
}

/// An inbound or outbound telemetry message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub publisher: String,
    pub channel: String,
    #[serde(default)]
    pub subtopic: String,
    pub payload: Vec<u8>,
    pub created: i64,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

/// Filters accepted by `ListRules`. `None` means "no filter on this
/// field".
#[derive(Debug, Clone, Default)]
pub struct PageMeta {
    pub offset: u64,
    pub limit: u64,
    pub dir: Option<String>,
    pub name: Option<String>,
    pub domain: Option<String>,
    pub input_channel: Option<String>,
    pub input_topic: Option<String>,
    pub status: Option<Status>,
    pub scheduled_before: Option<DateTime<Utc>>,
    pub scheduled_after: Option<DateTime<Utc>>,
    pub recurring: Option<Recurring>,
}

/// Generic offset/limit/total envelope shared by Rule and
/// ReportConfig listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub offset: u64,
    pub limit: u64,
    pub total: u64,
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_value_precedence() {
        let mut s = SenmlSample {
            publisher: "dev1".into(),
            channel: "c1".into(),
            subtopic: String::new(),
            name: "temperature".into(),
            unit: None,
            time: Utc::now(),
            value: Some(20.5),
            string_value: Some("ignored".into()),
            bool_value: None,
            data_value: None,
        };
        assert_eq!(s.display_value(), "20.50");
        s.value = None;
        assert_eq!(s.display_value(), "ignored");
        s.string_value = None;
        s.bool_value = Some(true);
        assert_eq!(s.display_value(), "true");
        s.bool_value = None;
        s.data_value = Some("raw".into());
        assert_eq!(s.display_value(), "raw");
        s.data_value = None;
        assert_eq!(s.display_value(), "N/A");
    }

    #[test]
    fn report_round_trips_through_base64() {
        let report = Report {
            samples: HashMap::new(),
            pdf: vec![0, 1, 2, 255],
            csv: b"a,b,c".to_vec(),
        };
        let json = serde_json::to_string(&report).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pdf, report.pdf);
        assert_eq!(back.csv, report.csv);
    }

    #[test]
    fn status_and_recurring_serialize_uppercase() {
        assert_eq!(serde_json::to_string(&Status::Enabled).unwrap(), "\"ENABLED\"");
        assert_eq!(serde_json::to_string(&Recurring::Daily).unwrap(), "\"DAILY\"");
    }
}
