//! Scheduler Loop: periodically enumerates due rules/reports.

use crate::executor::Executor;
use crate::model::{Message, PageMeta, Status};
use crate::report::ReportGenerator;
use crate::repository::{ReportRepository, RuleRepository};
use crate::schedule::should_run;
use crate::ticker::Ticker;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::error::{EngineError, Result};

/// Long-running task driven by a `Ticker`, enumerating both due rules
/// and due report configs on every tick.
pub struct SchedulerLoop {
    rules: Arc<dyn RuleRepository>,
    reports: Arc<dyn ReportRepository>,
    executor: Arc<Executor>,
    report_generator: Arc<ReportGenerator>,
    ticker: Arc<dyn Ticker>,
    errors: mpsc::Sender<EngineError>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl SchedulerLoop {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        reports: Arc<dyn ReportRepository>,
        executor: Arc<Executor>,
        report_generator: Arc<ReportGenerator>,
        ticker: Arc<dyn Ticker>,
        errors: mpsc::Sender<EngineError>,
    ) -> Self {
        SchedulerLoop {
            rules,
            reports,
            executor,
            report_generator,
            ticker,
            errors,
            shutdown_tx: Mutex::new(None),
        }
    }

    /// Signals a running `run()` loop to stop the ticker and return.
    pub async fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(()).await;
        }
    }

    /// Runs until `stop()` is called. Intended to be spawned as its
    /// own task by the Service.
    pub async fn run(&self) -> Result<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        *self.shutdown_tx.lock().await = Some(shutdown_tx);

        loop {
            let t = tokio::select! {
                t = self.ticker.tick() => t,
                _ = shutdown_rx.recv() => {
                    info!("scheduler loop shutting down");
                    self.ticker.stop();
                    return Err(EngineError::Internal("scheduler loop cancelled".to_string()));
                }
            };
            let started = Instant::now();
            let mut fired = 0usize;

            let filter = PageMeta {
                status: Some(Status::Enabled),
                scheduled_before: Some(t),
                limit: u64::MAX,
                ..Default::default()
            };

            match self.rules.list_rules(filter.clone()).await {
                Ok(page) => {
                    for rule in page.items {
                        if should_run(&rule.schedule, t) {
                            fired += 1;
                            let executor = self.executor.clone();
                            let errors = self.errors.clone();
                            let msg = Message {
                                publisher: String::new(),
                                channel: rule.input.channel.clone(),
                                subtopic: rule.input.topic.clone(),
                                payload: Vec::new(),
                                created: t.timestamp(),
                                domain: rule.domain_id.clone(),
                                protocol: String::new(),
                                metadata: None,
                            };
                            tokio::spawn(async move {
                                if let Err(e) = executor.execute(&rule, &msg).await {
                                    let _ = errors.send(e).await;
                                }
                            });
                        }
                    }
                }
                Err(e) => {
                    let _ = self.errors.send(e).await;
                }
            }

            match self.reports.list_report_configs(filter).await {
                Ok(page) => {
                    for cfg in page.items {
                        if should_run(&cfg.schedule, t) {
                            fired += 1;
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
                Err(e) => {
                    let _ = self.errors.send(e).await;
                }
            }

            debug!(fired, elapsed_ms = started.elapsed().as_millis() as u64, "scheduler tick complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emailer::InMemoryEmailer;
    use crate::messaging::InMemoryBroker;
    use crate::model::{Binding, Logic, LogicKind, Recurring, Rule, Schedule};
    use crate::readers::{Readers, ReadersRequest};
    use crate::repository::InMemoryRepository;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct EmptyReaders;

    #[async_trait]
    impl Readers for EmptyReaders {
        async fn read_messages(&self, _req: ReadersRequest) -> crate::error::Result<Vec<crate::model::SenmlSample>> {
            Ok(Vec::new())
        }
    }

    struct OneShotTicker {
        at: chrono::DateTime<Utc>,
        fired: AtomicBool,
    }

    #[async_trait]
    impl Ticker for OneShotTicker {
        async fn tick(&self) -> chrono::DateTime<Utc> {
            if self.fired.swap(true, Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.at
        }

        fn stop(&self) {}
    }

    #[tokio::test]
    async fn e6_scheduled_rule_fires_with_synthetic_message() {
        let repo = Arc::new(InMemoryRepository::new());
        let due_at = Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap();
        repo.add_rule(Rule {
            id: "r1".to_string(),
            name: "r1".to_string(),
            domain_id: "dom1".to_string(),
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
                start_date_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                time: due_at,
                recurring: Recurring::Daily,
                recurring_period: 2,
            },
            status: Status::Enabled,
            created_at: Utc::now(),
            created_by: "tester".to_string(),
            updated_at: None,
            updated_by: None,
        })
        .await
        .unwrap();

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
            crate::config::EngineSettings {
                publisher_id: "magistrala.re".to_string(),
                reports_epoch: Utc::now(),
                tick_ms: 1000,
                error_channel_capacity: 16,
                script_timeout_ms: 1000,
            },
        ));
        let ticker = Arc::new(OneShotTicker {
            at: due_at,
            fired: AtomicBool::new(false),
        });
        let (errors_tx, mut errors_rx) = mpsc::channel(16);

        let scheduler = Arc::new(SchedulerLoop::new(
            repo,
            Arc::new(InMemoryRepository::new()),
            executor,
            report_generator,
            ticker,
            errors_tx,
        ));
        let handle = tokio::spawn(async move { scheduler.run().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(errors_rx.try_recv().is_err(), "no errors expected");
        let _ = AtomicUsize::new(0);
    }

    #[tokio::test]
    async fn stop_unblocks_run_with_cancellation_error() {
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
            crate::config::EngineSettings {
                publisher_id: "magistrala.re".to_string(),
                reports_epoch: Utc::now(),
                tick_ms: 1000,
                error_channel_capacity: 16,
                script_timeout_ms: 1000,
            },
        ));
        let ticker = Arc::new(crate::ticker::IntervalTicker::new(Duration::from_millis(5)));
        let (errors_tx, _errors_rx) = mpsc::channel(16);

        let scheduler = Arc::new(SchedulerLoop::new(
            repo,
            Arc::new(InMemoryRepository::new()),
            executor,
            report_generator,
            ticker,
            errors_tx,
        ));

        let running = scheduler.clone();
        let handle = tokio::spawn(async move { running.run().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.stop().await;

        let result = handle.await.unwrap();
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().category(), "Internal");
    }
}
