//! Public Service façade. Wraps the Repository,
//! Dispatcher, Scheduler Loop, and Report Generator behind the
//! operation set a thin transport layer would call.

use crate::dispatcher::Dispatcher;
use crate::error::{EngineError, Result};
use crate::idprovider::IdProvider;
use crate::model::{Message, Page, PageMeta, Report, ReportConfig, Rule, Session, Status};
use crate::repository::{ReportRepository, RuleRepository};
use crate::report::ReportGenerator;
use crate::scheduler_loop::SchedulerLoop;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

/// Engine façade. Field-setting order in `add_rule`/`add_report_config`
/// and the minimal-entity pattern in `enable_rule`/`disable_rule`
/// follow the original service's exact semantics.
pub struct Service {
    rules: Arc<dyn RuleRepository>,
    reports: Arc<dyn ReportRepository>,
    ids: Arc<dyn IdProvider>,
    dispatcher: Arc<Dispatcher>,
    scheduler: Arc<SchedulerLoop>,
    report_generator: Arc<ReportGenerator>,
    errors_rx: Mutex<Option<mpsc::Receiver<EngineError>>>,
}

impl Service {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        reports: Arc<dyn ReportRepository>,
        ids: Arc<dyn IdProvider>,
        dispatcher: Arc<Dispatcher>,
        scheduler: Arc<SchedulerLoop>,
        report_generator: Arc<ReportGenerator>,
        errors_rx: mpsc::Receiver<EngineError>,
    ) -> Self {
        Service {
            rules,
            reports,
            ids,
            dispatcher,
            scheduler,
            report_generator,
            errors_rx: Mutex::new(Some(errors_rx)),
        }
    }

    /// Hands out the error stream. Intended to be taken exactly once,
    /// by the hosting binary's Error Drain task.
    pub fn errors(&self) -> mpsc::Receiver<EngineError> {
        self.errors_rx
            .lock()
            .expect("errors_rx lock poisoned")
            .take()
            .expect("Service::errors() called more than once")
    }

    /// Spawns the Scheduler Loop as a background task. Returns
    /// immediately; the loop runs until `stop_scheduler` is called.
    pub fn start_scheduler(&self) {
        let scheduler = self.scheduler.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.run().await {
                info!(error = %e, "scheduler loop stopped");
            }
        });
    }

    /// Signals the Scheduler Loop to stop the ticker and return.
    pub async fn stop_scheduler(&self) {
        self.scheduler.stop().await;
    }

    /// Delegates to the Message Dispatcher. Non-blocking with respect
    /// to script execution.
    pub async fn handle(&self, msg: Message) {
        self.dispatcher.handle(msg).await;
    }

    // ------------------------------------------------------------------
    // Rules
    // ------------------------------------------------------------------

    #[instrument(skip(self, session, rule), fields(domain_id = %session.domain_id))]
    pub async fn add_rule(&self, session: &Session, mut rule: Rule) -> Result<Rule> {
        let start = Instant::now();
        rule.id = self.ids.id();
        rule.domain_id = session.domain_id.clone();
        rule.created_by = session.user_id.clone();
        rule.created_at = Utc::now();
        rule.status = Status::Enabled;
        rule.updated_at = None;
        rule.updated_by = None;
        if rule.schedule.start_date_time.timestamp() == 0 {
            rule.schedule.start_date_time = rule.created_at;
        }
        rule.schedule.time = rule.schedule.start_date_time;

        let result = self.rules.add_rule(rule).await;
        log_outcome("add_rule", &result, start, |r| r.id.clone());
        result
    }

    #[instrument(skip(self, session), fields(domain_id = %session.domain_id, rule_id = %id))]
    pub async fn view_rule(&self, session: &Session, id: &str) -> Result<Rule> {
        let start = Instant::now();
        let result = self.rules.view_rule(id).await.and_then(|rule| {
            if rule.domain_id != session.domain_id {
                Err(EngineError::NotFound("rule", id.to_string()))
            } else {
                Ok(rule)
            }
        });
        log_outcome("view_rule", &result, start, |r| r.id.clone());
        result
    }

    #[instrument(skip(self, session, rule), fields(domain_id = %session.domain_id, rule_id = %rule.id))]
    pub async fn update_rule(&self, session: &Session, mut rule: Rule) -> Result<Rule> {
        let start = Instant::now();
        rule.updated_at = Some(Utc::now());
        rule.updated_by = Some(session.user_id.clone());
        let result = self.rules.update_rule(rule).await;
        log_outcome("update_rule", &result, start, |r| r.id.clone());
        result
    }

    #[instrument(skip(self, session, rule), fields(domain_id = %session.domain_id, rule_id = %rule.id))]
    pub async fn update_rule_schedule(&self, session: &Session, mut rule: Rule) -> Result<Rule> {
        let start = Instant::now();
        rule.schedule.time = rule.schedule.start_date_time;
        rule.updated_at = Some(Utc::now());
        rule.updated_by = Some(session.user_id.clone());
        let result = self.rules.update_rule_schedule(rule).await;
        log_outcome("update_rule_schedule", &result, start, |r| r.id.clone());
        result
    }

    #[instrument(skip(self, session, filter), fields(domain_id = %session.domain_id))]
    pub async fn list_rules(&self, session: &Session, mut filter: PageMeta) -> Result<Page<Rule>> {
        let start = Instant::now();
        filter.domain = Some(session.domain_id.clone());
        let result = self.rules.list_rules(filter).await;
        match &result {
            Ok(page) => info!(duration_ms = start.elapsed().as_millis() as u64, count = page.items.len(), "list_rules succeeded"),
            Err(e) => warn!(duration_ms = start.elapsed().as_millis() as u64, error = %e, "list_rules failed"),
        }
        result
    }

    #[instrument(skip(self, session), fields(domain_id = %session.domain_id, rule_id = %id))]
    pub async fn remove_rule(&self, session: &Session, id: &str) -> Result<()> {
        let _ = session;
        let start = Instant::now();
        let result = self.rules.remove_rule(id).await;
        match &result {
            Ok(()) => info!(duration_ms = start.elapsed().as_millis() as u64, rule_id = %id, "remove_rule succeeded"),
            Err(e) => warn!(duration_ms = start.elapsed().as_millis() as u64, rule_id = %id, error = %e, "remove_rule failed"),
        }
        result
    }

    #[instrument(skip(self, session), fields(domain_id = %session.domain_id, rule_id = %id))]
    pub async fn enable_rule(&self, session: &Session, id: &str) -> Result<Rule> {
        self.set_rule_status(session, id, Status::Enabled).await
    }

    #[instrument(skip(self, session), fields(domain_id = %session.domain_id, rule_id = %id))]
    pub async fn disable_rule(&self, session: &Session, id: &str) -> Result<Rule> {
        self.set_rule_status(session, id, Status::Disabled).await
    }

    async fn set_rule_status(&self, session: &Session, id: &str, status: Status) -> Result<Rule> {
        let start = Instant::now();
        let minimal = Rule {
            id: id.to_string(),
            name: String::new(),
            domain_id: session.domain_id.clone(),
            metadata: Default::default(),
            input: Default::default(),
            logic: crate::model::Logic {
                kind: crate::model::LogicKind::Rhai,
                value: String::new(),
            },
            output: None,
            schedule: crate::model::Schedule::immediate(Utc::now()),
            status,
            created_at: Utc::now(),
            created_by: String::new(),
            updated_at: Some(Utc::now()),
            updated_by: Some(session.user_id.clone()),
        };
        let result = self.rules.update_rule_status(minimal).await;
        log_outcome("set_rule_status", &result, start, |r| r.id.clone());
        result
    }

    // ------------------------------------------------------------------
    // Report configs
    // ------------------------------------------------------------------

    #[instrument(skip(self, session, cfg), fields(domain_id = %session.domain_id))]
    pub async fn add_report_config(&self, session: &Session, mut cfg: ReportConfig) -> Result<ReportConfig> {
        let start = Instant::now();
        cfg.id = self.ids.id();
        cfg.domain_id = session.domain_id.clone();
        cfg.created_by = session.user_id.clone();
        cfg.created_at = Utc::now();
        cfg.status = Status::Enabled;
        cfg.updated_at = None;
        cfg.updated_by = None;
        if cfg.schedule.start_date_time.timestamp() == 0 {
            cfg.schedule.start_date_time = cfg.created_at;
        }
        cfg.schedule.time = cfg.schedule.start_date_time;

        let result = self.reports.add_report_config(cfg).await;
        log_outcome("add_report_config", &result, start, |c| c.id.clone());
        result
    }

    #[instrument(skip(self, session), fields(domain_id = %session.domain_id, report_config_id = %id))]
    pub async fn view_report_config(&self, session: &Session, id: &str) -> Result<ReportConfig> {
        let start = Instant::now();
        let result = self.reports.view_report_config(id).await.and_then(|cfg| {
            if cfg.domain_id != session.domain_id {
                Err(EngineError::NotFound("report_config", id.to_string()))
            } else {
                Ok(cfg)
            }
        });
        log_outcome("view_report_config", &result, start, |c| c.id.clone());
        result
    }

    #[instrument(skip(self, session, cfg), fields(domain_id = %session.domain_id, report_config_id = %cfg.id))]
    pub async fn update_report_config(&self, session: &Session, mut cfg: ReportConfig) -> Result<ReportConfig> {
        let start = Instant::now();
        cfg.updated_at = Some(Utc::now());
        cfg.updated_by = Some(session.user_id.clone());
        let result = self.reports.update_report_config(cfg).await;
        log_outcome("update_report_config", &result, start, |c| c.id.clone());
        result
    }

    #[instrument(skip(self, session), fields(domain_id = %session.domain_id))]
    pub async fn list_report_configs(&self, session: &Session, mut filter: PageMeta) -> Result<Page<ReportConfig>> {
        let start = Instant::now();
        filter.domain = Some(session.domain_id.clone());
        let result = self.reports.list_report_configs(filter).await;
        match &result {
            Ok(page) => info!(duration_ms = start.elapsed().as_millis() as u64, count = page.items.len(), "list_report_configs succeeded"),
            Err(e) => warn!(duration_ms = start.elapsed().as_millis() as u64, error = %e, "list_report_configs failed"),
        }
        result
    }

    #[instrument(skip(self, session), fields(domain_id = %session.domain_id, report_config_id = %id))]
    pub async fn remove_report_config(&self, session: &Session, id: &str) -> Result<()> {
        let _ = session;
        let start = Instant::now();
        let result = self.reports.remove_report_config(id).await;
        match &result {
            Ok(()) => info!(duration_ms = start.elapsed().as_millis() as u64, report_config_id = %id, "remove_report_config succeeded"),
            Err(e) => warn!(duration_ms = start.elapsed().as_millis() as u64, report_config_id = %id, error = %e, "remove_report_config failed"),
        }
        result
    }

    #[instrument(skip(self, session), fields(domain_id = %session.domain_id, report_config_id = %id))]
    pub async fn enable_report_config(&self, session: &Session, id: &str) -> Result<ReportConfig> {
        self.set_report_config_status(session, id, Status::Enabled).await
    }

    #[instrument(skip(self, session), fields(domain_id = %session.domain_id, report_config_id = %id))]
    pub async fn disable_report_config(&self, session: &Session, id: &str) -> Result<ReportConfig> {
        self.set_report_config_status(session, id, Status::Disabled).await
    }

    async fn set_report_config_status(&self, session: &Session, id: &str, status: Status) -> Result<ReportConfig> {
        let start = Instant::now();
        let minimal = ReportConfig {
            id: id.to_string(),
            name: String::new(),
            domain_id: session.domain_id.clone(),
            channel_ids: Vec::new(),
            client_ids: Vec::new(),
            metrics: Vec::new(),
            aggregation: Default::default(),
            email: None,
            schedule: crate::model::Schedule::immediate(Utc::now()),
            limit: 10,
            status,
            created_at: Utc::now(),
            created_by: String::new(),
            updated_at: Some(Utc::now()),
            updated_by: Some(session.user_id.clone()),
        };
        let result = self.reports.update_report_config_status(minimal).await;
        log_outcome("set_report_config_status", &result, start, |c| c.id.clone());
        result
    }

    /// On-demand report generation, bypassing the schedule.
    #[instrument(skip(self, session), fields(domain_id = %session.domain_id, report_config_id = %id))]
    pub async fn generate_report(&self, session: &Session, id: &str) -> Result<Page<Report>> {
        let start = Instant::now();
        let cfg = self.view_report_config(session, id).await?;
        let result = self.report_generator.generate(&cfg).await;
        match &result {
            Ok(_) => info!(duration_ms = start.elapsed().as_millis() as u64, report_config_id = %id, "generate_report succeeded"),
            Err(e) => warn!(duration_ms = start.elapsed().as_millis() as u64, report_config_id = %id, error = %e, "generate_report failed"),
        }
        result
    }
}

fn log_outcome<T, E: std::fmt::Display>(
    op: &'static str,
    result: &std::result::Result<T, E>,
    start: Instant,
    id_of: impl FnOnce(&T) -> String,
) {
    let duration_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(value) => info!(duration_ms, id = %id_of(value), "{op} succeeded"),
        Err(e) => warn!(duration_ms, error = %e, "{op} failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::emailer::InMemoryEmailer;
    use crate::executor::Executor;
    use crate::messaging::InMemoryBroker;
    use crate::model::{Binding, Logic, LogicKind, Schedule};
    use crate::readers::{Readers, ReadersRequest};
    use crate::repository::InMemoryRepository;
    use crate::ticker::IntervalTicker;
    use async_trait::async_trait;
    use std::time::Duration;

    struct EmptyReaders;

    #[async_trait]
    impl Readers for EmptyReaders {
        async fn read_messages(&self, _req: ReadersRequest) -> Result<Vec<crate::model::SenmlSample>> {
            Ok(Vec::new())
        }
    }

    fn service() -> Service {
        let repo = Arc::new(InMemoryRepository::new());
        let re_pub = Arc::new(InMemoryBroker::new());
        let executor = Arc::new(Executor::new(
            "magistrala.re".to_string(),
            "re@engine.local".to_string(),
            Duration::from_secs(1),
            re_pub,
            Arc::new(InMemoryBroker::new()),
            Arc::new(InMemoryBroker::new()),
            Arc::new(InMemoryEmailer::default()),
        ));
        let report_generator = Arc::new(ReportGenerator::new(
            Arc::new(EmptyReaders),
            Arc::new(InMemoryEmailer::default()),
            EngineSettings {
                publisher_id: "magistrala.re".to_string(),
                reports_epoch: Utc::now(),
                tick_ms: 1000,
                error_channel_capacity: 16,
                script_timeout_ms: 1000,
            },
        ));
        let (errors_tx, errors_rx) = mpsc::channel(16);
        let dispatcher = Arc::new(Dispatcher::new(
            repo.clone(),
            repo.clone(),
            executor.clone(),
            report_generator.clone(),
            errors_tx.clone(),
        ));
        let scheduler = Arc::new(SchedulerLoop::new(
            repo.clone(),
            repo.clone(),
            executor,
            report_generator.clone(),
            Arc::new(IntervalTicker::new(Duration::from_secs(3600))),
            errors_tx,
        ));
        Service::new(
            repo.clone(),
            repo,
            Arc::new(crate::idprovider::UuidIdProvider),
            dispatcher,
            scheduler,
            report_generator,
            errors_rx,
        )
    }

    fn session() -> Session {
        Session {
            user_id: "user1".to_string(),
            domain_id: "dom1".to_string(),
        }
    }

    fn new_rule() -> Rule {
        Rule {
            id: String::new(),
            name: "r1".to_string(),
            domain_id: String::new(),
            metadata: Default::default(),
            input: Binding {
                channel: "c1".to_string(),
                topic: String::new(),
            },
            logic: Logic {
                kind: LogicKind::Rhai,
                value: "42".to_string(),
            },
            output: None,
            schedule: Schedule {
                start_date_time: chrono::DateTime::<Utc>::UNIX_EPOCH,
                time: chrono::DateTime::<Utc>::UNIX_EPOCH,
                recurring: crate::model::Recurring::None,
                recurring_period: 0,
            },
            status: Status::Disabled,
            created_at: chrono::DateTime::<Utc>::UNIX_EPOCH,
            created_by: String::new(),
            updated_at: None,
            updated_by: None,
        }
    }

    #[tokio::test]
    async fn e5_new_rule_defaults_enabled_with_nonzero_start() {
        let svc = service();
        let added = svc.add_rule(&session(), new_rule()).await.unwrap();
        assert_eq!(added.status, Status::Enabled);
        assert_ne!(added.schedule.start_date_time.timestamp(), 0);
        assert_eq!(added.schedule.time, added.schedule.start_date_time);
        assert_eq!(added.domain_id, "dom1");
        assert_eq!(added.created_by, "user1");
    }

    #[tokio::test]
    async fn list_rules_is_scoped_to_caller_domain() {
        let svc = service();
        svc.add_rule(&session(), new_rule()).await.unwrap();
        let other = Session {
            user_id: "user2".to_string(),
            domain_id: "dom2".to_string(),
        };
        let page = svc.list_rules(&other, PageMeta::default()).await.unwrap();
        assert!(page.items.is_empty());
        let page = svc.list_rules(&session(), PageMeta::default()).await.unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn enable_already_enabled_rule_is_invalid() {
        let svc = service();
        let added = svc.add_rule(&session(), new_rule()).await.unwrap();
        let err = svc.enable_rule(&session(), &added.id).await.unwrap_err();
        assert_eq!(err.category(), "Invalid");
    }

    #[tokio::test]
    async fn disable_then_enable_round_trips_status() {
        let svc = service();
        let added = svc.add_rule(&session(), new_rule()).await.unwrap();
        let disabled = svc.disable_rule(&session(), &added.id).await.unwrap();
        assert_eq!(disabled.status, Status::Disabled);
        let enabled = svc.enable_rule(&session(), &added.id).await.unwrap();
        assert_eq!(enabled.status, Status::Enabled);
    }

    #[tokio::test]
    async fn errors_can_only_be_taken_once() {
        let svc = service();
        let _rx = svc.errors();
        let result = std::panic::AssertUnwindSafe(|| svc.errors());
        assert!(std::panic::catch_unwind(result).is_err());
    }

    #[tokio::test]
    async fn stop_scheduler_unblocks_the_background_task() {
        let svc = service();
        svc.start_scheduler();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let result = tokio::time::timeout(Duration::from_millis(200), svc.stop_scheduler()).await;
        assert!(result.is_ok(), "stop_scheduler should not hang");
    }
}
