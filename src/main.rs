//! Service entry point: HTTP intake plus the background schedules that
//! drain the queue and materialize analytics.

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowlens::config::Settings;
use flowlens::correlate::{
    BlockingCorrelationEngine, DeployIncidentCorrelator, MemoryCorrelationStore, MemoryLinkStore,
};
use flowlens::events::{EventStore, MemoryEventStore};
use flowlens::flow::{wip_by_stage, FlowEngine, MemoryFlowMetricsStore};
use flowlens::forecast::{
    add_working_days, ForecastEngine, MemoryForecastSnapshotStore, Weekdays,
};
use flowlens::normalize::CanonicalNormalizer;
use flowlens::queue::{Dispatcher, MemoryQueueStore};
use flowlens::retention::RetentionSweeper;
use flowlens::server::{build_router, AppState};
use flowlens::stages::StaticStageMappings;
use flowlens::types::{SourceKind, StreamId};

/// How often the dispatcher drains pending queue rows.
const DISPATCH_INTERVAL: Duration = Duration::from_secs(5);
/// How often forecast and correlation snapshots are refreshed.
const ANALYTICS_INTERVAL: Duration = Duration::from_secs(3_600);
/// How often the retention sweep runs.
const RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 3_600);

/// Queue rows processed per dispatch tick.
const DISPATCH_BATCH: usize = 100;

/// Sprint horizon assumed when no plan is configured externally: two
/// working weeks from the analysis date.
const DEFAULT_SPRINT_WORKING_DAYS: u32 = 10;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowlens=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Stores. In-memory implementations back the default single-process
    // wiring; relational backends plug in behind the same traits.
    let queue = Arc::new(MemoryQueueStore::new());
    let events = Arc::new(MemoryEventStore::new());
    let metrics = Arc::new(MemoryFlowMetricsStore::new());
    let forecasts = Arc::new(MemoryForecastSnapshotStore::new());
    let correlations = Arc::new(MemoryCorrelationStore::new());
    let links = Arc::new(MemoryLinkStore::new());
    let settings = Arc::new(Settings::new());
    let stage_mappings = Arc::new(StaticStageMappings::new());
    let calendar = Arc::new(Weekdays);

    let dispatcher = Arc::new(Dispatcher::new(
        queue.clone(),
        events.clone(),
        Arc::new(CanonicalNormalizer::new(stage_mappings.clone())),
    ));
    let flow = Arc::new(FlowEngine::new(events.clone(), metrics.clone()));
    let forecast = Arc::new(ForecastEngine::new(
        events.clone(),
        forecasts.clone(),
        calendar.clone(),
    ));
    let blocking = Arc::new(BlockingCorrelationEngine::new(
        events.clone(),
        forecasts.clone(),
        correlations.clone(),
    ));
    let deploy_incident = Arc::new(DeployIncidentCorrelator::new(events.clone(), links));
    let sweeper = Arc::new(RetentionSweeper::new(
        queue.clone(),
        events.clone(),
        forecasts,
        correlations,
    ));

    let shutdown = CancellationToken::new();

    let dispatch_task = tokio::spawn(dispatch_loop(dispatcher, shutdown.clone()));
    let analytics_task = tokio::spawn(analytics_loop(
        events.clone(),
        flow,
        forecast,
        blocking,
        deploy_incident,
        settings.clone(),
        calendar,
        shutdown.clone(),
    ));
    let retention_task = tokio::spawn(retention_loop(sweeper, settings, shutdown.clone()));

    let app_state = AppState::new(queue, secrets_from_env());
    let app = build_router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind listener");
    let serve = axum::serve(listener, app).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
            shutdown.cancel();
        }
    });

    if let Err(e) = serve.await {
        error!(error = %e, "server error");
    }
    shutdown.cancel();
    let _ = tokio::join!(dispatch_task, analytics_task, retention_task);
    info!("stopped");
}

/// Reads per-source signing secrets from `FLOWLENS_<SOURCE>_SECRET`.
/// Sources with no secret accept deliveries unverified.
fn secrets_from_env() -> HashMap<SourceKind, Vec<u8>> {
    let mut secrets = HashMap::new();
    for source in SourceKind::ALL {
        let var = format!(
            "FLOWLENS_{}_SECRET",
            source.as_str().replace('-', "_").to_uppercase()
        );
        if let Ok(secret) = std::env::var(&var) {
            secrets.insert(source, secret.into_bytes());
        }
    }
    secrets
}

async fn dispatch_loop(dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(DISPATCH_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                // The dispatcher logs its own per-run outcome.
                if let Err(e) = dispatcher.process_pending(DISPATCH_BATCH, Utc::now()) {
                    error!(error = %e, "dispatch tick failed");
                }
            }
        }
    }
}

/// Refreshes flow records, forecast snapshots, and both correlation
/// tables for every stream seen in the event history.
#[allow(clippy::too_many_arguments)]
async fn analytics_loop(
    events: Arc<MemoryEventStore>,
    flow: Arc<FlowEngine>,
    forecast: Arc<ForecastEngine>,
    blocking: Arc<BlockingCorrelationEngine>,
    deploy_incident: Arc<DeployIncidentCorrelator>,
    settings: Arc<Settings>,
    calendar: Arc<Weekdays>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(ANALYTICS_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = analytics_tick(
                    &events,
                    &flow,
                    &forecast,
                    &blocking,
                    &deploy_incident,
                    &settings,
                    &calendar,
                ) {
                    error!(error = %e, "analytics tick failed");
                }
            }
        }
    }
}

fn analytics_tick(
    events: &MemoryEventStore,
    flow: &FlowEngine,
    forecast: &ForecastEngine,
    blocking: &BlockingCorrelationEngine,
    deploy_incident: &DeployIncidentCorrelator,
    settings: &Settings,
    calendar: &Weekdays,
) -> flowlens::events::Result<()> {
    let now = Utc::now();
    let today = now.date_naive();
    let work_items = events.all_work_item_events()?;

    // Flow records for every ticket with history; open tickets are a no-op.
    let tickets: BTreeSet<_> = work_items.iter().map(|e| e.ticket.clone()).collect();
    for ticket in &tickets {
        flow.materialize_ticket(ticket)?;
    }

    // Likewise PR cycle records; open PRs are a no-op.
    let prs: BTreeSet<_> = events
        .all_pr_events()?
        .iter()
        .map(|e| (e.repo.clone(), e.number))
        .collect();
    for (repo, number) in &prs {
        flow.materialize_pr(repo, *number)?;
    }

    let streams: BTreeSet<StreamId> = work_items.iter().filter_map(|e| e.stream.clone()).collect();
    let sprint_end = add_working_days(calendar, today, DEFAULT_SPRINT_WORKING_DAYS);
    for stream in &streams {
        // Remaining scope: tickets currently sitting in a non-terminal stage.
        let in_stream: Vec<_> = work_items
            .iter()
            .filter(|e| e.stream.as_ref() == Some(stream))
            .cloned()
            .collect();
        let remaining: usize = wip_by_stage(&in_stream).values().sum();
        forecast.materialize(stream, remaining as u32, sprint_end, today)?;
        deploy_incident.run(stream, now - chrono::Duration::days(1), now)?;
    }

    blocking.materialize(&settings.severity_rules(), now)?;
    Ok(())
}

async fn retention_loop(
    sweeper: Arc<RetentionSweeper>,
    settings: Arc<Settings>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(RETENTION_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = sweeper.sweep(&settings.retention_policy(), Utc::now()) {
                    error!(error = %e, "retention sweep failed");
                }
            }
        }
    }
}
