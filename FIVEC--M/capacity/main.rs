use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;
use tracing::{info, instrument, warn};

use crate::{
    clock::{Clock, SystemClock},
    config::CapacityConfig,
    decision::DecisionEngine,
    model::{CapacityError, DecisionResult, SignalReading, Task},
    playbook::{Playbook, PlaybookRegistry},
    router::{CapacityRouter, RouteOptions, RouteResult},
    tasks::{
        ledger::{TaskLedger, TaskStore},
        TaskComposer,
    },
    telemetry::{
        CapacityTelemetry, EVENT_DECISION_COMPUTED, EVENT_ROUTE_SELECTED, EVENT_ROUTE_SUPPRESSED,
        EVENT_TASKS_COMPOSED,
    },
};

/// Everything one reading produced.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CycleOutcome {
    /// The decision.
    pub decision: DecisionResult,
    /// All tasks composed for the decision.
    pub tasks: Vec<Task>,
    /// Tasks the store had not seen before.
    pub new_tasks: Vec<Task>,
    /// Route, or `None` when the cooldown suppressed it.
    pub route: Option<RouteResult>,
}

/// Wires engine, composer, router, playbooks, and task store together.
pub struct CapacityRuntime {
    engine: DecisionEngine,
    composer: TaskComposer,
    router: CapacityRouter,
    playbooks: PlaybookRegistry,
    store: Arc<dyn TaskStore>,
    clock: Arc<dyn Clock>,
    telemetry: Option<CapacityTelemetry>,
    fallback_horizon_days: Option<u32>,
    default_cooldown_ms: Option<u64>,
    last_auto_route_at: Mutex<IndexMap<String, DateTime<Utc>>>,
}

impl std::fmt::Debug for CapacityRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapacityRuntime")
            .field("engine", &self.engine)
            .field("composer", &self.composer)
            .field("playbooks", &self.playbooks.len())
            .field("clock", &self.clock)
            .field("telemetry", &self.telemetry)
            .finish_non_exhaustive()
    }
}

impl Default for CapacityRuntime {
    fn default() -> Self {
        Self {
            engine: DecisionEngine::default(),
            composer: TaskComposer::default(),
            router: CapacityRouter::default(),
            playbooks: PlaybookRegistry::builtin(),
            store: Arc::new(TaskLedger::default()),
            clock: Arc::new(SystemClock),
            telemetry: None,
            fallback_horizon_days: None,
            default_cooldown_ms: None,
            last_auto_route_at: Mutex::new(IndexMap::new()),
        }
    }
}

impl CapacityRuntime {
    /// Loads `path` when given, otherwise runs on defaults.
    pub fn bootstrap(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => CapacityConfig::load(path)?,
            None => CapacityConfig::default(),
        };
        Self::from_config(&config)
    }

    /// Builds every component from `config`, including telemetry sinks.
    pub fn from_config(config: &CapacityConfig) -> Result<Self> {
        let sinks = &config.telemetry;
        let telemetry = if sinks.log_path.is_some() || sinks.events_path.is_some() {
            let mut builder = CapacityTelemetry::builder("capacity");
            if let Some(path) = &sinks.log_path {
                builder = builder.log_path(path);
            }
            if let Some(path) = &sinks.events_path {
                builder = builder.event_publisher(Arc::new(FileEventPublisher::new(path)?));
            }
            Some(builder.build()?)
        } else {
            None
        };
        Ok(Self {
            engine: config.build_engine(),
            composer: config.build_composer(),
            router: config.build_router()?,
            playbooks: config.build_playbooks()?,
            telemetry,
            fallback_horizon_days: config.composer.fallback_horizon_days,
            default_cooldown_ms: config.router.default_cooldown_ms,
            ..Self::default()
        })
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the task store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = store;
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: CapacityTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Decision engine in use.
    #[must_use]
    pub const fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Playbook catalog in use.
    #[must_use]
    pub const fn playbooks(&self) -> &PlaybookRegistry {
        &self.playbooks
    }

    /// When `loop_code` was last routed automatically.
    #[must_use]
    pub fn last_auto_route_at(&self, loop_code: &str) -> Option<DateTime<Utc>> {
        self.last_auto_route_at.lock().get(loop_code).copied()
    }

    /// Runs the engine and records the decision in the audit log.
    pub fn decide(&self, reading: &SignalReading) -> Result<DecisionResult, CapacityError> {
        let decision = self.engine.decide(reading)?;
        self.log(
            LogLevel::Info,
            "decision computed",
            Some(&decision.decision_id),
            json!({
                "loopCode": decision.loop_code,
                "primary": decision.primary,
                "secondary": decision.secondary,
                "severity": decision.severity,
            }),
        );
        Ok(decision)
    }

    /// Tasks for `decision`: the named playbook, or every playbook whose
    /// conditions admit the decision.
    pub fn compose(&self, decision: &DecisionResult, playbook: Option<&str>) -> Result<Vec<Task>> {
        let selected: Vec<&Playbook> = match playbook {
            Some(id) => vec![self
                .playbooks
                .get(id)
                .ok_or_else(|| anyhow!("unknown playbook {id}"))?],
            None => self.playbooks.find_for_decision(decision),
        };
        let now = self.clock.now();
        let tasks = match self.fallback_horizon_days {
            Some(days) => {
                if self.composer.due_at(&decision.srt, now).is_err() {
                    self.log(
                        LogLevel::Warn,
                        "horizon fallback applied",
                        Some(&decision.decision_id),
                        json!({ "horizon": decision.srt.horizon, "fallbackDays": days }),
                    );
                }
                self.composer
                    .expand_playbooks_with_fallback(decision, &selected, now, days)
            }
            None => self.composer.expand_playbooks(decision, &selected, now)?,
        };
        Ok(tasks)
    }

    /// Routes `decision`, filling cooldown state the caller left unset and
    /// remembering automatic routes.
    pub fn route(
        &self,
        decision: &DecisionResult,
        options: &RouteOptions,
    ) -> Result<Option<RouteResult>, CapacityError> {
        let loop_code = decision.loop_code.as_str();
        let now = self.clock.now();
        let mut state = self.last_auto_route_at.lock();
        let effective = RouteOptions {
            last_auto_route_at: options
                .last_auto_route_at
                .or_else(|| state.get(loop_code).copied()),
            respect_cooldown_ms: options
                .respect_cooldown_ms
                .or(self.default_cooldown_ms)
                .or(Some(decision.guardrails.cool_down_ms)),
            ..options.clone()
        };
        let route = self
            .router
            .route_from_decision(loop_code, decision, &effective, now)?;
        if route.is_some() && options.override_primary.is_none() {
            state.insert(loop_code.to_string(), now);
        }
        Ok(route)
    }

    /// Decide, compose, persist, and route one reading.
    #[instrument(skip_all, fields(loop_code = %reading.loop_code, indicator = %reading.indicator))]
    pub async fn process(&self, reading: &SignalReading, options: &RouteOptions) -> Result<CycleOutcome> {
        let decision = self.decide(reading)?;
        self.event(
            EVENT_DECISION_COMPUTED,
            json!({
                "decisionId": decision.decision_id,
                "loopCode": decision.loop_code,
                "primary": decision.primary,
                "severity": decision.severity,
            }),
        )
        .await;

        let tasks = self.compose(&decision, None)?;
        let new_tasks = if self.store.has_decision(&decision.decision_id).await? {
            Vec::new()
        } else {
            self.store.persist(&tasks).await?
        };
        self.event(
            EVENT_TASKS_COMPOSED,
            json!({
                "decisionId": decision.decision_id,
                "composed": tasks.len(),
                "new": new_tasks.len(),
            }),
        )
        .await;

        let route = self.route(&decision, options)?;
        match &route {
            Some(route) => {
                info!(screen = %route.params.screen, "routed");
                self.event(
                    EVENT_ROUTE_SELECTED,
                    json!({
                        "decisionId": decision.decision_id,
                        "capacity": route.params.capacity,
                        "screen": route.params.screen,
                        "lifeSafety": options.life_safety,
                    }),
                )
                .await;
            }
            None => {
                self.log(
                    LogLevel::Info,
                    "route suppressed by cooldown",
                    Some(&decision.decision_id),
                    json!({ "loopCode": decision.loop_code }),
                );
                self.event(
                    EVENT_ROUTE_SUPPRESSED,
                    json!({ "decisionId": decision.decision_id, "loopCode": decision.loop_code }),
                )
                .await;
            }
        }

        Ok(CycleOutcome {
            decision,
            tasks,
            new_tasks,
            route,
        })
    }

    fn log(&self, level: LogLevel, message: &str, decision_id: Option<&str>, fields: Value) {
        if let Some(telemetry) = &self.telemetry {
            if let Err(err) = telemetry.log(level, message, decision_id, fields) {
                warn!(error = %err, "audit log write failed");
            }
        }
    }

    async fn event(&self, event_type: &str, payload: Value) {
        if let Some(telemetry) = &self.telemetry {
            if let Err(err) = telemetry.event(event_type, payload).await {
                warn!(event_type, error = %err, "event publish failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        fixtures::{decision_with, fixed_now, health_surge_reading},
        model::Capacity,
    };
    use chrono::Duration;
    use shared_event_bus::MemoryEventBus;
    use shared_logging::read_records;

    fn runtime_at(clock: &Arc<FixedClock>) -> (CapacityRuntime, TaskLedger) {
        let ledger = TaskLedger::default();
        let runtime = CapacityRuntime::default()
            .with_clock(clock.clone())
            .with_store(Arc::new(ledger.clone()));
        (runtime, ledger)
    }

    #[tokio::test]
    async fn health_surge_cycle() {
        let clock = Arc::new(FixedClock::new(fixed_now()));
        let (runtime, ledger) = runtime_at(&clock);
        let outcome = runtime
            .process(&health_surge_reading(), &RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.decision.primary, Capacity::Responsive);
        assert!(outcome
            .tasks
            .iter()
            .any(|task| task.meta.get("playbookId") == Some(&json!("pb-health-surge"))));
        assert_eq!(outcome.new_tasks, outcome.tasks);
        assert_eq!(ledger.len(), outcome.tasks.len());
        let route = outcome.route.unwrap();
        assert_eq!(route.params.screen, "checkpoint");
        assert_eq!(runtime.last_auto_route_at("MES-L03"), Some(fixed_now()));
    }

    #[tokio::test]
    async fn repeated_reading_is_idempotent_and_cooled_down() {
        let clock = Arc::new(FixedClock::new(fixed_now()));
        let (runtime, ledger) = runtime_at(&clock);
        let first = runtime
            .process(&health_surge_reading(), &RouteOptions::default())
            .await
            .unwrap();
        let cooldown = first.decision.guardrails.cool_down_ms;

        let ids = |tasks: &[crate::model::Task]| {
            tasks.iter().map(|task| task.id.clone()).collect::<Vec<_>>()
        };

        let second = runtime
            .process(&health_surge_reading(), &RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(second.decision.decision_id, first.decision.decision_id);
        assert_eq!(second.tasks, first.tasks);
        assert!(second.new_tasks.is_empty());
        assert!(second.route.is_none());
        assert_eq!(ledger.len(), first.tasks.len());

        clock.advance(Duration::milliseconds(1));
        let later = runtime
            .process(&health_surge_reading(), &RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(ids(&later.tasks), ids(&first.tasks));
        assert!(later.new_tasks.is_empty());
        assert!(later.route.is_none());
        assert_eq!(ledger.len(), first.tasks.len());

        clock.set(fixed_now() + Duration::milliseconds(i64::try_from(cooldown).unwrap()));
        let third = runtime
            .process(&health_surge_reading(), &RouteOptions::default())
            .await
            .unwrap();
        assert!(third.route.is_some());
    }

    #[tokio::test]
    async fn life_safety_routes_during_cooldown() {
        let clock = Arc::new(FixedClock::new(fixed_now()));
        let (runtime, _) = runtime_at(&clock);
        runtime
            .process(&health_surge_reading(), &RouteOptions::default())
            .await
            .unwrap();
        let outcome = runtime
            .process(&health_surge_reading(), &RouteOptions::default().life_safety())
            .await
            .unwrap();
        assert!(outcome.route.is_some());
    }

    #[tokio::test]
    async fn telemetry_sees_every_stage() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join("audit.log");
        let bus = Arc::new(MemoryEventBus::new(32));
        let telemetry = CapacityTelemetry::builder("capacity")
            .log_path(&log_path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let clock = Arc::new(FixedClock::new(fixed_now()));
        let (runtime, _) = runtime_at(&clock);
        let runtime = runtime.with_telemetry(telemetry);
        for _ in 0..2 {
            runtime
                .process(&health_surge_reading(), &RouteOptions::default())
                .await
                .unwrap();
        }
        let kinds: Vec<_> = bus.snapshot().into_iter().map(|e| e.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                EVENT_DECISION_COMPUTED,
                EVENT_TASKS_COMPOSED,
                EVENT_ROUTE_SELECTED,
                EVENT_DECISION_COMPUTED,
                EVENT_TASKS_COMPOSED,
                EVENT_ROUTE_SUPPRESSED,
            ]
        );
        let records = read_records(&log_path).unwrap();
        assert!(records
            .iter()
            .any(|r| r.message == "route suppressed by cooldown" && r.decision_id.is_some()));
    }

    #[tokio::test]
    async fn invalid_reading_fails_the_cycle() {
        let runtime = CapacityRuntime::default();
        let reading = SignalReading::new("MES-L03", "bed_occupancy", f64::NAN);
        let err = runtime
            .process(&reading, &RouteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CapacityError>(),
            Some(CapacityError::InvalidReading { .. })
        ));
    }

    #[test]
    fn malformed_horizon_fails_unless_fallback_configured() {
        let mut decision = decision_with(&[Capacity::Responsive], 0.75, true);
        decision.srt.horizon = "garbage".into();

        let strict = CapacityRuntime::default();
        let err = strict.compose(&decision, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CapacityError>(),
            Some(CapacityError::MalformedHorizon(_))
        ));

        let config = CapacityConfig::from_toml_str("[composer]\nfallback_horizon_days = 3").unwrap();
        let clock = Arc::new(FixedClock::new(fixed_now()));
        let lenient = CapacityRuntime::from_config(&config).unwrap().with_clock(clock);
        let tasks = lenient.compose(&decision, None).unwrap();
        assert!(tasks
            .iter()
            .all(|task| task.due_at == fixed_now() + Duration::days(3)));
    }

    #[test]
    fn named_playbook_must_exist() {
        let decision = decision_with(&[Capacity::Responsive], 0.75, true);
        let runtime = CapacityRuntime::default();
        assert!(runtime.compose(&decision, Some("pb-missing")).is_err());
        let tasks = runtime.compose(&decision, Some("pb-health-surge")).unwrap();
        assert!(tasks.iter().any(|task| task.id.contains(":PB:")));
    }
}
