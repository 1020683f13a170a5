use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use uuid::Uuid;

/// Emitted once per computed decision.
pub const EVENT_DECISION_COMPUTED: &str = "capacity.decision.computed";
/// Emitted once per composed task batch.
pub const EVENT_TASKS_COMPOSED: &str = "capacity.tasks.composed";
/// Emitted when a route is produced.
pub const EVENT_ROUTE_SELECTED: &str = "capacity.route.selected";
/// Emitted when the cooldown suppressed a route.
pub const EVENT_ROUTE_SUPPRESSED: &str = "capacity.route.suppressed";

/// Builder for capacity telemetry sinks.
pub struct CapacityTelemetryBuilder {
    component: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl CapacityTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            event_publisher: None,
        }
    }

    /// Sets the audit log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Drops audit records below `level`.
    #[must_use]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<CapacityTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::new(path)?.with_min_level(self.min_level)),
            None => None,
        };
        Ok(CapacityTelemetry {
            inner: Arc::new(TelemetryInner {
                component: self.component,
                logger,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Audit log and event sink shared by the capacity runtime.
#[derive(Clone)]
pub struct CapacityTelemetry {
    inner: Arc<TelemetryInner>,
}

struct TelemetryInner {
    component: String,
    logger: Option<JsonLogger>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl fmt::Debug for CapacityTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapacityTelemetry")
            .field("component", &self.inner.component)
            .field("logs", &self.inner.logger.is_some())
            .field("events", &self.inner.publisher.is_some())
            .finish()
    }
}

impl CapacityTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(component: impl Into<String>) -> CapacityTelemetryBuilder {
        CapacityTelemetryBuilder::new(component)
    }

    /// Component name stamped on records and events.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.inner.component
    }

    /// Writes an audit record, optionally tied to a decision.
    pub fn log(
        &self,
        level: LogLevel,
        message: &str,
        decision_id: Option<&str>,
        fields: Value,
    ) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let mut record = LogRecord::new(&self.inner.component, level, message).with_fields(fields);
            if let Some(id) = decision_id {
                record = record.with_decision(id);
            }
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Publishes a domain event.
    pub async fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(publisher) = &self.inner.publisher {
            publisher
                .publish(EventRecord {
                    id: format!("evt-{}", Uuid::new_v4()),
                    source: self.inner.component.clone(),
                    event_type: event_type.into(),
                    timestamp: Utc::now().to_rfc3339(),
                    payload,
                })
                .await?;
        }
        Ok(())
    }
}
