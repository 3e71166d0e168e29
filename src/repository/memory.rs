use super::{ReportRepository, RuleRepository};
use crate::error::{EngineError, Result};
use crate::model::{Page, PageMeta, ReportConfig, Rule};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory `RuleRepository` + `ReportRepository`, used by unit
/// tests and the integration suite in place of the SQLite backend.
/// A single `RwLock<HashMap<..>>` per entity keeps writes atomic with
/// respect to concurrent listing.
#[derive(Default)]
pub struct InMemoryRepository {
    rules: RwLock<HashMap<String, Rule>>,
    reports: RwLock<HashMap<String, ReportConfig>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        InMemoryRepository::default()
    }
}

fn rule_matches(rule: &Rule, filter: &PageMeta) -> bool {
    if let Some(domain) = &filter.domain {
        if &rule.domain_id != domain {
            return false;
        }
    }
    if let Some(channel) = &filter.input_channel {
        if &rule.input.channel != channel {
            return false;
        }
    }
    if let Some(topic) = &filter.input_topic {
        if !rule.input.topic.is_empty() && &rule.input.topic != topic {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if rule.status != status {
            return false;
        }
    }
    if let Some(before) = filter.scheduled_before {
        if rule.schedule.time > before {
            return false;
        }
    }
    if let Some(after) = filter.scheduled_after {
        if rule.schedule.time < after {
            return false;
        }
    }
    if let Some(recurring) = filter.recurring {
        if rule.schedule.recurring != recurring {
            return false;
        }
    }
    if let Some(name) = &filter.name {
        if !rule.name.contains(name.as_str()) {
            return false;
        }
    }
    true
}

fn report_matches(cfg: &ReportConfig, filter: &PageMeta) -> bool {
    if let Some(domain) = &filter.domain {
        if &cfg.domain_id != domain {
            return false;
        }
    }
    if let Some(channel) = &filter.input_channel {
        if !cfg.channel_ids.iter().any(|c| c == channel) {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if cfg.status != status {
            return false;
        }
    }
    if let Some(before) = filter.scheduled_before {
        if cfg.schedule.time > before {
            return false;
        }
    }
    if let Some(after) = filter.scheduled_after {
        if cfg.schedule.time < after {
            return false;
        }
    }
    if let Some(recurring) = filter.recurring {
        if cfg.schedule.recurring != recurring {
            return false;
        }
    }
    if let Some(name) = &filter.name {
        if !cfg.name.contains(name.as_str()) {
            return false;
        }
    }
    true
}

fn paginate<T: Clone>(mut items: Vec<T>, filter: &PageMeta) -> Page<T> {
    let total = items.len() as u64;
    let limit = if filter.limit == 0 { total.max(1) } else { filter.limit };
    let offset = filter.offset.min(items.len() as u64) as usize;
    let end = offset.saturating_add(limit as usize).min(items.len());
    items = items.drain(offset..end).collect();
    Page {
        offset: filter.offset,
        limit,
        total,
        items,
    }
}

#[async_trait]
impl RuleRepository for InMemoryRepository {
    async fn add_rule(&self, rule: Rule) -> Result<Rule> {
        let mut rules = self.rules.write().expect("rules lock poisoned");
        if rules.contains_key(&rule.id) {
            return Err(EngineError::Create(format!(
                "rule {} already exists",
                rule.id
            )));
        }
        rules.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    async fn view_rule(&self, id: &str) -> Result<Rule> {
        self.rules
            .read()
            .expect("rules lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound("rule", id.to_string()))
    }

    async fn update_rule(&self, rule: Rule) -> Result<Rule> {
        let mut rules = self.rules.write().expect("rules lock poisoned");
        let existing = rules
            .get_mut(&rule.id)
            .ok_or_else(|| EngineError::NotFound("rule", rule.id.clone()))?;
        existing.name = rule.name;
        existing.metadata = rule.metadata;
        existing.input = rule.input;
        existing.logic = rule.logic;
        existing.output = rule.output;
        existing.updated_at = rule.updated_at;
        existing.updated_by = rule.updated_by;
        Ok(existing.clone())
    }

    async fn update_rule_schedule(&self, rule: Rule) -> Result<Rule> {
        let mut rules = self.rules.write().expect("rules lock poisoned");
        let existing = rules
            .get_mut(&rule.id)
            .ok_or_else(|| EngineError::NotFound("rule", rule.id.clone()))?;
        existing.schedule = rule.schedule;
        existing.updated_at = rule.updated_at;
        existing.updated_by = rule.updated_by;
        Ok(existing.clone())
    }

    async fn update_rule_status(&self, rule: Rule) -> Result<Rule> {
        let mut rules = self.rules.write().expect("rules lock poisoned");
        let existing = rules
            .get_mut(&rule.id)
            .ok_or_else(|| EngineError::NotFound("rule", rule.id.clone()))?;
        if existing.status == rule.status {
            return Err(EngineError::Invalid(
                "status",
                format!("rule {} already in status {:?}", rule.id, rule.status),
            ));
        }
        existing.status = rule.status;
        existing.updated_at = rule.updated_at;
        existing.updated_by = rule.updated_by;
        Ok(existing.clone())
    }

    async fn update_rule_due(&self, id: &str, due: DateTime<Utc>) -> Result<Rule> {
        let mut rules = self.rules.write().expect("rules lock poisoned");
        let existing = rules
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound("rule", id.to_string()))?;
        existing.schedule.time = due;
        Ok(existing.clone())
    }

    async fn remove_rule(&self, id: &str) -> Result<()> {
        let mut rules = self.rules.write().expect("rules lock poisoned");
        rules
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound("rule", id.to_string()))
    }

    async fn list_rules(&self, filter: PageMeta) -> Result<Page<Rule>> {
        let rules = self.rules.read().expect("rules lock poisoned");
        let mut matched: Vec<Rule> = rules
            .values()
            .filter(|r| rule_matches(r, &filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(paginate(matched, &filter))
    }
}

#[async_trait]
impl ReportRepository for InMemoryRepository {
    async fn add_report_config(&self, cfg: ReportConfig) -> Result<ReportConfig> {
        let mut reports = self.reports.write().expect("reports lock poisoned");
        if reports.contains_key(&cfg.id) {
            return Err(EngineError::Create(format!(
                "report config {} already exists",
                cfg.id
            )));
        }
        reports.insert(cfg.id.clone(), cfg.clone());
        Ok(cfg)
    }

    async fn view_report_config(&self, id: &str) -> Result<ReportConfig> {
        self.reports
            .read()
            .expect("reports lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound("report_config", id.to_string()))
    }

    async fn update_report_config(&self, cfg: ReportConfig) -> Result<ReportConfig> {
        let mut reports = self.reports.write().expect("reports lock poisoned");
        let existing = reports
            .get_mut(&cfg.id)
            .ok_or_else(|| EngineError::NotFound("report_config", cfg.id.clone()))?;
        existing.name = cfg.name;
        existing.channel_ids = cfg.channel_ids;
        existing.client_ids = cfg.client_ids;
        existing.metrics = cfg.metrics;
        existing.aggregation = cfg.aggregation;
        existing.email = cfg.email;
        existing.limit = cfg.limit;
        existing.updated_at = cfg.updated_at;
        existing.updated_by = cfg.updated_by;
        Ok(existing.clone())
    }

    async fn update_report_config_schedule(&self, cfg: ReportConfig) -> Result<ReportConfig> {
        let mut reports = self.reports.write().expect("reports lock poisoned");
        let existing = reports
            .get_mut(&cfg.id)
            .ok_or_else(|| EngineError::NotFound("report_config", cfg.id.clone()))?;
        existing.schedule = cfg.schedule;
        existing.updated_at = cfg.updated_at;
        existing.updated_by = cfg.updated_by;
        Ok(existing.clone())
    }

    async fn update_report_config_status(&self, cfg: ReportConfig) -> Result<ReportConfig> {
        let mut reports = self.reports.write().expect("reports lock poisoned");
        let existing = reports
            .get_mut(&cfg.id)
            .ok_or_else(|| EngineError::NotFound("report_config", cfg.id.clone()))?;
        if existing.status == cfg.status {
            return Err(EngineError::Invalid(
                "status",
                format!("report config {} already in status {:?}", cfg.id, cfg.status),
            ));
        }
        existing.status = cfg.status;
        existing.updated_at = cfg.updated_at;
        existing.updated_by = cfg.updated_by;
        Ok(existing.clone())
    }

    async fn update_report_config_due(&self, id: &str, due: DateTime<Utc>) -> Result<ReportConfig> {
        let mut reports = self.reports.write().expect("reports lock poisoned");
        let existing = reports
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound("report_config", id.to_string()))?;
        existing.schedule.time = due;
        Ok(existing.clone())
    }

    async fn remove_report_config(&self, id: &str) -> Result<()> {
        let mut reports = self.reports.write().expect("reports lock poisoned");
        reports
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound("report_config", id.to_string()))
    }

    async fn list_report_configs(&self, filter: PageMeta) -> Result<Page<ReportConfig>> {
        let reports = self.reports.read().expect("reports lock poisoned");
        let mut matched: Vec<ReportConfig> = reports
            .values()
            .filter(|c| report_matches(c, &filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(paginate(matched, &filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Binding, Logic, LogicKind, Schedule, Status};

    fn rule(id: &str, channel: &str, status: Status) -> Rule {
        Rule {
            id: id.to_string(),
            name: format!("rule-{id}"),
            domain_id: "dom1".to_string(),
            metadata: HashMap::new(),
            input: Binding {
                channel: channel.to_string(),
                topic: String::new(),
            },
            logic: Logic {
                kind: LogicKind::Rhai,
                value: "()".to_string(),
            },
            output: None,
            schedule: Schedule::immediate(Utc::now()),
            status,
            created_at: Utc::now(),
            created_by: "tester".to_string(),
            updated_at: None,
            updated_by: None,
        }
    }

    #[tokio::test]
    async fn add_then_view_round_trips() {
        let repo = InMemoryRepository::new();
        let r = rule("r1", "c1", Status::Enabled);
        repo.add_rule(r.clone()).await.unwrap();
        let fetched = repo.view_rule("r1").await.unwrap();
        assert_eq!(fetched.id, r.id);
    }

    #[tokio::test]
    async fn view_missing_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo.view_rule("missing").await.unwrap_err();
        assert_eq!(err.category(), "NotFound");
    }

    #[tokio::test]
    async fn list_filters_by_channel_and_enabled_status() {
        let repo = InMemoryRepository::new();
        repo.add_rule(rule("enabled-match", "c1", Status::Enabled))
            .await
            .unwrap();
        repo.add_rule(rule("disabled-match", "c1", Status::Disabled))
            .await
            .unwrap();
        repo.add_rule(rule("enabled-other-channel", "c2", Status::Enabled))
            .await
            .unwrap();

        let page = repo
            .list_rules(PageMeta {
                input_channel: Some("c1".to_string()),
                status: Some(Status::Enabled),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].id, "enabled-match");
    }

    #[tokio::test]
    async fn disabled_rule_is_never_returned_under_enabled_filter() {
        let repo = InMemoryRepository::new();
        repo.add_rule(rule("r1", "c1", Status::Disabled))
            .await
            .unwrap();
        let page = repo
            .list_rules(PageMeta {
                status: Some(Status::Enabled),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn enabling_an_already_enabled_rule_is_invalid() {
        let repo = InMemoryRepository::new();
        repo.add_rule(rule("r1", "c1", Status::Enabled))
            .await
            .unwrap();
        let mut update = repo.view_rule("r1").await.unwrap();
        update.status = Status::Enabled;
        let err = repo.update_rule_status(update).await.unwrap_err();
        assert_eq!(err.category(), "Invalid");
    }

    #[tokio::test]
    async fn remove_missing_rule_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo.remove_rule("missing").await.unwrap_err();
        assert_eq!(err.category(), "NotFound");
    }
}
