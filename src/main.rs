//! Rule & Report Engine binary: loads configuration, wires the
//! concrete collaborators, starts the Scheduler Loop and a
//! subscription loop over the re-publish bus, and waits for shutdown.
//! No HTTP or gRPC surface is exposed here; the engine is a library
//! consumed by transport layers that aren't part of this crate.

use ruleengine::config::Config;
use ruleengine::dispatcher::Dispatcher;
use ruleengine::emailer::SmtpEmailer;
use ruleengine::executor::Executor;
use ruleengine::idprovider::UuidIdProvider;
use ruleengine::messaging::{PubSub, RedisBroker};
use ruleengine::readers::HttpReaders;
use ruleengine::report::ReportGenerator;
use ruleengine::repository::SqliteRepository;
use ruleengine::scheduler_loop::SchedulerLoop;
use ruleengine::service::Service;
use ruleengine::ticker::IntervalTicker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).cloned();
    let cfg = Config::load(config_path.as_deref())?;

    info!(service = %cfg.service.name, "starting rule & report engine");

    let repository = Arc::new(SqliteRepository::connect(&cfg.database.path).await?);

    let re_pub: Arc<dyn PubSub> = Arc::new(RedisBroker::new(&cfg.redis.url)?);
    let writers_pub = Arc::new(RedisBroker::new(&cfg.redis.url)?);
    let alarms_pub = Arc::new(RedisBroker::new(&cfg.redis.url)?);

    let emailer = Arc::new(SmtpEmailer::new(
        &cfg.smtp.host,
        cfg.smtp.port,
        cfg.smtp.username.as_deref(),
        cfg.smtp.password.as_deref(),
    )?);

    let readers = Arc::new(HttpReaders::new(
        cfg.readers.base_url.clone(),
        Duration::from_secs(cfg.readers.timeout_secs),
    )?);

    let executor = Arc::new(Executor::new(
        cfg.engine.publisher_id.clone(),
        cfg.smtp.from_address.clone(),
        Duration::from_millis(cfg.engine.script_timeout_ms),
        re_pub.clone(),
        writers_pub,
        alarms_pub,
        emailer.clone(),
    ));

    let report_generator = Arc::new(ReportGenerator::new(readers, emailer, cfg.engine.clone()));

    let (errors_tx, errors_rx) = mpsc::channel(cfg.engine.error_channel_capacity);

    let dispatcher = Arc::new(Dispatcher::new(
        repository.clone(),
        repository.clone(),
        executor.clone(),
        report_generator.clone(),
        errors_tx.clone(),
    ));

    let ticker = Arc::new(IntervalTicker::new(Duration::from_millis(cfg.engine.tick_ms)));
    let scheduler = Arc::new(SchedulerLoop::new(
        repository.clone(),
        repository.clone(),
        executor,
        report_generator.clone(),
        ticker,
        errors_tx,
    ));

    let service = Arc::new(Service::new(
        repository.clone(),
        repository,
        Arc::new(UuidIdProvider),
        dispatcher,
        scheduler,
        report_generator,
        errors_rx,
    ));

    let mut errors = service.errors();
    tokio::spawn(async move {
        while let Some(err) = errors.recv().await {
            error!(error = %err, category = err.category(), "engine task failed");
        }
    });

    service.start_scheduler();

    for pattern in &cfg.redis.subscribe_patterns {
        let handler_service = service.clone();
        let full_pattern = format!("{}{}", cfg.redis.key_prefix, pattern);
        re_pub
            .subscribe(
                &full_pattern,
                Arc::new(move |msg| {
                    let service = handler_service.clone();
                    Box::pin(async move {
                        service.handle(msg).await;
                    })
                }),
            )
            .await?;
    }

    info!("rule & report engine running");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    service.stop_scheduler().await;

    Ok(())
}
