use std::sync::Arc;

use chrono::Utc;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};
use tracing::{info, warn};

/// Pushes bot lifecycle notices onto the shared event bus and, if a
/// durable logger is configured, persists them as JSON lines — the one
/// place in the runtime that does either, per the manager owning every
/// bot's lifecycle.
pub(crate) struct Telemetry {
    events: Arc<dyn EventPublisher>,
    logger: Option<Arc<JsonLogger>>,
}

impl Telemetry {
    pub(crate) fn new(events: Arc<dyn EventPublisher>, logger: Option<Arc<JsonLogger>>) -> Self {
        Self { events, logger }
    }

    pub(crate) async fn emit(&self, instance_id: &str, event_type: &str, payload: serde_json::Value) {
        info!(instance = instance_id, event = event_type, "bot lifecycle event");

        let record = EventRecord {
            id: uuid::Uuid::new_v4().to_string(),
            source: instance_id.to_string(),
            event_type: event_type.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            payload: payload.clone(),
        };
        if let Err(err) = self.events.publish(record).await {
            warn!(instance = instance_id, error = %err, "failed to publish lifecycle event");
        }

        if let Some(logger) = &self.logger {
            let mut log = LogRecord::new(instance_id, LogLevel::Info, event_type);
            if let serde_json::Value::Object(map) = payload {
                log.metadata = map;
            }
            if let Err(err) = logger.log(&log) {
                warn!(instance = instance_id, error = %err, "failed to persist lifecycle log");
            }
        }
    }
}
