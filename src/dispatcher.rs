//! Message Dispatcher: the Handle(msg) entrypoint.

use crate::executor::Executor;
use crate::model::{Message, PageMeta, ReportConfig, Rule, Status};
use crate::report::ReportGenerator;
use crate::repository::{ReportRepository, RuleRepository};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::EngineError;

/// Consumes one inbound message, loads matching rules and report
/// configs, and fans out to independent Executor / Report Generator
/// tasks. Never blocks on script execution.
pub struct Dispatcher {
    rules: Arc<dyn RuleRepository>,
    reports: Arc<dyn ReportRepository>,
    executor: Arc<Executor>,
    report_generator: Arc<ReportGenerator>,
    errors: mpsc::Sender<EngineError>,
}

impl Dispatcher {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        reports: Arc<dyn ReportRepository>,
        executor: Arc<Executor>,
        report_generator: Arc<ReportGenerator>,
        errors: mpsc::Sender<EngineError>,
    ) -> Self {
        Dispatcher {
            rules,
            reports,
            executor,
            report_generator,
            errors,
        }
    }

    pub async fn handle(&self, msg: Message) {
        let filter = PageMeta {
            input_channel: Some(msg.channel.clone()),
            input_topic: Some(msg.subtopic.clone()),
            status: Some(Status::Enabled),
            limit: u64::MAX,
            ..Default::default()
        };

        let matched_rules: Vec<Rule> = match self.rules.list_rules(filter.clone()).await {
            Ok(page) => page.items,
            Err(e) => {
                let _ = self.errors.send(e).await;
                return;
            }
        };
        let matched_reports: Vec<ReportConfig> = match self.reports.list_report_configs(filter).await {
            Ok(page) => page.items,
            Err(e) => {
                let _ = self.errors.send(e).await;
                Vec::new()
            }
        };

        debug!(
            channel = %msg.channel,
            subtopic = %msg.subtopic,
            matched_rules = matched_rules.len(),
            matched_reports = matched_reports.len(),
            "dispatching message"
        );

        for rule in matched_rules {
            let executor = self.executor.clone();
            let errors = self.errors.clone();
            let msg = msg.clone();
            tokio::spawn(async move {
                if let Err(e) = executor.execute(&rule, &msg).await {
                    let _ = errors.send(e).await;
                }
            });
        }

        for cfg in matched_reports {
            let generator = self.report_generator.clone();
            let errors = self.errors.clone();
            tokio::spawn(async move {
                if let Err(e) = generator.generate(&cfg).await {
                    let _ = errors.send(e).await;
                }
            });
        }
    }
}
