//! Repository collaborator: persists and queries Rules and
//! ReportConfigs. An in-memory implementation backs unit and
//! integration tests; a SQLite implementation backs the binary.

mod memory;
mod sqlite;

pub use memory::InMemoryRepository;
pub use sqlite::SqliteRepository;

use crate::error::Result;
use crate::model::{Page, PageMeta, ReportConfig, Rule};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence and query operations over Rules.
///
/// Implementations must honor the `status` filter in `list_rules`
/// exactly (a disabled rule must never be returned to a caller
/// filtering on `Status::Enabled`), must serve the `input_channel` +
/// `input_topic` lookup as an indexed query (the Dispatcher calls it
/// for every inbound message), and must make updates atomic with
/// respect to concurrent listing.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn add_rule(&self, rule: Rule) -> Result<Rule>;
    async fn view_rule(&self, id: &str) -> Result<Rule>;
    async fn update_rule(&self, rule: Rule) -> Result<Rule>;
    async fn update_rule_schedule(&self, rule: Rule) -> Result<Rule>;
    async fn update_rule_status(&self, rule: Rule) -> Result<Rule>;
    /// Updates only the schedule's `time` bookkeeping field. Not used
    /// by the stateless Scheduler Loop; exposed for callers that want
    /// to maintain a persisted "last fired" cursor.
    async fn update_rule_due(&self, id: &str, due: DateTime<Utc>) -> Result<Rule>;
    async fn remove_rule(&self, id: &str) -> Result<()>;
    async fn list_rules(&self, filter: PageMeta) -> Result<Page<Rule>>;
}

/// Mirror of `RuleRepository` over ReportConfig.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn add_report_config(&self, cfg: ReportConfig) -> Result<ReportConfig>;
    async fn view_report_config(&self, id: &str) -> Result<ReportConfig>;
    async fn update_report_config(&self, cfg: ReportConfig) -> Result<ReportConfig>;
    async fn update_report_config_schedule(&self, cfg: ReportConfig) -> Result<ReportConfig>;
    async fn update_report_config_status(&self, cfg: ReportConfig) -> Result<ReportConfig>;
    async fn update_report_config_due(&self, id: &str, due: DateTime<Utc>) -> Result<ReportConfig>;
    async fn remove_report_config(&self, id: &str) -> Result<()>;
    async fn list_report_configs(&self, filter: PageMeta) -> Result<Page<ReportConfig>>;
}
