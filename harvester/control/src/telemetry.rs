use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::{json, Value};
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};

use crate::tuning::Transition;

/// Builder for controller telemetry sinks.
pub struct ControlTelemetryBuilder {
    module: String,
    worker: Option<String>,
    target: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl ControlTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            worker: None,
            target: String::new(),
            log_path: None,
            min_level: LogLevel::Debug,
            event_publisher: None,
        }
    }

    /// Tags every record with a worker id.
    #[must_use]
    pub fn worker(mut self, worker: impl Into<String>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Sets the target events are addressed to.
    #[must_use]
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Sets the log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Drops log records below `level`.
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
    pub fn build(self) -> Result<ControlTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::with_min_level(path, self.min_level)?),
            None => None,
        };
        Ok(ControlTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                worker: self.worker,
                target: self.target,
                logger,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared by a controller and its owner.
#[derive(Clone)]
pub struct ControlTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for ControlTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlTelemetry")
            .field("module", &self.inner.module)
            .field("worker", &self.inner.worker)
            .finish_non_exhaustive()
    }
}

struct TelemetryInner {
    module: String,
    worker: Option<String>,
    target: String,
    logger: Option<JsonLogger>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl ControlTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> ControlTelemetryBuilder {
        ControlTelemetryBuilder::new(module)
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let mut record = LogRecord::new(&self.inner.module, level, message);
            if let Some(worker) = &self.inner.worker {
                record = record.with_worker(worker);
            }
            if let Value::Object(fields) = metadata {
                record.metadata = fields;
            }
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the bus.
    pub async fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(publisher) = &self.inner.publisher {
            let source = self
                .inner
                .worker
                .clone()
                .unwrap_or_else(|| self.inner.module.clone());
            publisher
                .publish(EventRecord::new(
                    source,
                    &self.inner.target,
                    event_type,
                    payload,
                ))
                .await?;
        }
        Ok(())
    }

    /// Records one tuning change in the `field: old -> new` form.
    pub fn transition(&self, transition: &Transition) -> Result<()> {
        self.log(
            LogLevel::Info,
            &transition.to_string(),
            json!({
                "field": transition.field,
                "from": transition.from,
                "to": transition.to,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_event_bus::MemoryEventBus;
    use shared_logging::read_records;
    use tempfile::tempdir;

    #[tokio::test]
    async fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("control.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = ControlTelemetry::builder("control")
            .worker("worker-1")
            .target("n00dles")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();

        telemetry
            .transition(&Transition {
                field: "grow_threshold",
                from: 5_000.0,
                to: 4_000.0,
            })
            .unwrap();
        telemetry
            .event("control.drift", json!({ "iteration": 3 }))
            .await
            .unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "grow_threshold: 5000 -> 4000");
        assert_eq!(records[0].worker.as_deref(), Some("worker-1"));

        let events = bus.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "worker-1");
        assert_eq!(events[0].target, "n00dles");
    }

    #[test]
    fn min_level_filters_debug_records() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("control.log");
        let telemetry = ControlTelemetry::builder("control")
            .log_path(&path)
            .min_level(LogLevel::Info)
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Debug, "control.step", json!({}))
            .unwrap();
        telemetry
            .log(LogLevel::Warn, "control.store", json!({}))
            .unwrap();
        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, LogLevel::Warn);
    }
}
