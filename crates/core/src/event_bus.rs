//! Workflow event bus: a trait for emitting workflow events from any module.
//!
//! The dispatcher, scheduler, and ingestion adapters accept an
//! `Arc<dyn EventSink>`; the service logs events, tests capture them.

use crate::types::{EventType, WorkflowEvent};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Trait for emitting workflow events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WorkflowEvent);
}

/// No-op sink for modules that don't need event emission.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: WorkflowEvent) {}
}

/// Sink that writes every event as a structured debug log line.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: WorkflowEvent) {
        debug!(
            event_type = ?event.event_type,
            campaign_id = event.campaign_id.as_deref().unwrap_or(""),
            lead_id = event.lead_id.as_deref().unwrap_or(""),
            execution_id = ?event.execution_id,
            detail = %event.detail,
            "workflow event"
        );
    }
}

/// In-memory sink that captures events for testing.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().expect("event bus mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().expect("event bus mutex poisoned").len()
    }

    pub fn count_type(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .expect("event bus mutex poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event bus mutex poisoned").clear();
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: WorkflowEvent) {
        self.events.lock().expect("event bus mutex poisoned").push(event);
    }
}

/// Convenience builder for creating a `WorkflowEvent` with minimal boilerplate.
pub fn make_event(
    event_type: EventType,
    campaign_id: Option<&str>,
    lead_id: Option<&str>,
    execution_id: Option<Uuid>,
) -> WorkflowEvent {
    WorkflowEvent {
        event_id: Uuid::new_v4(),
        event_type,
        campaign_id: campaign_id.map(str::to_string),
        lead_id: lead_id.map(str::to_string),
        execution_id,
        detail: serde_json::Value::Null,
        timestamp: Utc::now(),
    }
}

/// Convenience: create a no-op sink.
pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

/// Convenience: create a sink that logs through `tracing`.
pub fn tracing_sink() -> Arc<dyn EventSink> {
    Arc::new(TracingSink)
}

/// Convenience: create a capture sink for tests.
pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new())
}
