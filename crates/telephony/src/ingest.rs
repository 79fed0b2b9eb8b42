use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crm_core::error::{CrmError, CrmResult};
use crm_core::event_bus::{make_event, noop_sink, EventSink};
use crm_core::store::CrmStore;
use crm_core::types::{Call, CallDirection, CallStatus, EventType};

use crate::events::{timestamp, CallEvent, CallEventData, CallWebhookPayload};

/// Result of ingesting one webhook.
#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Recorded(Call),
    Ignored { event: String, reason: &'static str },
}

/// Applies telephony vendor events to call records. Each event is an upsert
/// on the call's external id; the last write wins.
pub struct CallEventIngestor {
    store: Arc<dyn CrmStore>,
    webhook_token: Option<String>,
    event_sink: Arc<dyn EventSink>,
}

impl CallEventIngestor {
    pub fn new(store: Arc<dyn CrmStore>, webhook_token: Option<String>) -> Self {
        Self {
            store,
            webhook_token: webhook_token.filter(|t| !t.is_empty()),
            event_sink: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn ingest(&self, payload: CallWebhookPayload) -> CrmResult<IngestOutcome> {
        if let Some(expected) = &self.webhook_token {
            if payload.token.as_deref() != Some(expected.as_str()) {
                warn!(event = %payload.event, "Rejected call webhook with bad token");
                metrics::counter!("telephony.webhooks.rejected").increment(1);
                return Err(CrmError::Unauthorized("invalid webhook token".into()));
            }
        }

        let event = CallEvent::parse(&payload.event);
        metrics::counter!("telephony.events", "event" => event.name().to_string()).increment(1);

        if let CallEvent::Unknown(name) = &event {
            info!(event = %name, "Ignoring unknown call event");
            return Ok(IngestOutcome::Ignored {
                event: name.clone(),
                reason: "unknown event",
            });
        }

        let Some(external_id) = payload.data.external_id() else {
            warn!(event = %payload.event, "Call event without a call id");
            return Ok(IngestOutcome::Ignored {
                event: payload.event,
                reason: "missing call id",
            });
        };

        let mut call = self
            .store
            .get_call(&external_id)?
            .unwrap_or_else(|| Call::new(external_id.clone()));

        merge_snapshot(&mut call, &payload.data);
        apply_event(&mut call, &event, &payload.data);

        if call.lead_id.is_none() {
            call.lead_id = self.match_lead(&call)?;
        }
        call.last_event = event.name().to_string();
        call.updated_at = Utc::now();

        let call = self.store.upsert_call(call)?;
        info!(
            call_id = %call.external_id,
            event = event.name(),
            status = ?call.status,
            lead_id = call.lead_id.as_deref().unwrap_or("-"),
            "Call event ingested"
        );

        let mut ingested =
            make_event(EventType::CallEventIngested, None, call.lead_id.as_deref(), None);
        ingested.detail = serde_json::json!({
            "call_id": call.external_id,
            "event": event.name(),
        });
        self.event_sink.emit(ingested);

        Ok(IngestOutcome::Recorded(call))
    }

    /// The customer's number decides the lead: `from` on inbound calls,
    /// `to` on outbound, either when the direction is unknown.
    fn match_lead(&self, call: &Call) -> CrmResult<Option<String>> {
        let candidates = match call.direction {
            Some(CallDirection::Inbound) => vec![call.from_number.as_deref()],
            Some(CallDirection::Outbound) => vec![call.to_number.as_deref()],
            None => vec![call.from_number.as_deref(), call.to_number.as_deref()],
        };
        for number in candidates.into_iter().flatten() {
            if let Some(lead) = self.store.find_lead_by_phone(number)? {
                return Ok(Some(lead.id));
            }
        }
        Ok(None)
    }
}

/// Copies whatever the event knows about the call onto the record.
fn merge_snapshot(call: &mut Call, data: &CallEventData) {
    if let Some(direction) = data.direction.as_deref() {
        match direction.to_ascii_lowercase().as_str() {
            "inbound" => call.direction = Some(CallDirection::Inbound),
            "outbound" => call.direction = Some(CallDirection::Outbound),
            _ => {}
        }
    }
    if data.from.is_some() {
        call.from_number = data.from.clone();
    }
    if data.to.is_some() {
        call.to_number = data.to.clone();
    }
    if data.agent.is_some() {
        call.agent_name = data.agent.clone();
    }
    if let Some(at) = timestamp(data.started_at) {
        call.started_at = Some(at);
    }
    if let Some(at) = timestamp(data.answered_at) {
        call.answered_at = Some(at);
    }
    if let Some(at) = timestamp(data.ended_at) {
        call.ended_at = Some(at);
    }
    if data.duration.is_some() {
        call.duration_secs = data.duration;
    }
    if data.recording_url.is_some() {
        call.recording_url = data.recording_url.clone();
    }
    if data.voicemail_url.is_some() {
        call.voicemail_url = data.voicemail_url.clone();
    }
}

fn apply_event(call: &mut Call, event: &CallEvent, data: &CallEventData) {
    let now = Utc::now();
    match event {
        CallEvent::Created => {
            call.status = CallStatus::Initiated;
            call.started_at.get_or_insert(now);
        }
        CallEvent::Ringing => call.status = CallStatus::Ringing,
        CallEvent::Answered => {
            call.status = CallStatus::Answered;
            call.answered_at.get_or_insert(now);
        }
        CallEvent::Transferred => call.status = CallStatus::Transferred,
        CallEvent::Hungup | CallEvent::Ended => {
            if call.status != CallStatus::Voicemail {
                call.status = if call.answered_at.is_some() {
                    CallStatus::Completed
                } else {
                    CallStatus::Missed
                };
            }
            let ended = *call.ended_at.get_or_insert(now);
            if call.duration_secs.is_none() {
                if let Some(start) = call.answered_at.or(call.started_at) {
                    call.duration_secs = Some((ended - start).num_seconds().max(0) as u64);
                }
            }
        }
        CallEvent::VoicemailLeft => call.status = CallStatus::Voicemail,
        CallEvent::Commented => {
            if let Some(comment) = data.comment.as_deref().map(str::trim) {
                if !comment.is_empty() {
                    call.comments.push(comment.to_string());
                }
            }
        }
        CallEvent::Tagged => {
            for tag in &data.tags {
                if !call.tags.contains(tag) {
                    call.tags.push(tag.clone());
                }
            }
        }
        CallEvent::Unknown(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::event_bus::capture_sink;
    use crm_core::store::InMemoryStore;
    use crm_core::types::Lead;

    fn payload(event: &str, data: serde_json::Value) -> CallWebhookPayload {
        serde_json::from_value(serde_json::json!({ "event": event, "data": data })).unwrap()
    }

    fn ingestor() -> (CallEventIngestor, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (CallEventIngestor::new(store.clone(), None), store)
    }

    #[test]
    fn test_unknown_event_is_accepted_and_ignored() {
        let (ingestor, store) = ingestor();
        let outcome = ingestor
            .ingest(payload("call.archived", serde_json::json!({ "id": "c-1" })))
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Ignored { reason: "unknown event", .. }));
        assert!(store.get_call("c-1").unwrap().is_none());
    }

    #[test]
    fn test_call_lifecycle_upserts_one_record() {
        let (ingestor, store) = ingestor();
        let mut lead = Lead::new("l1", "o1");
        lead.phone = Some("555-010-2000".into());
        store.insert_lead(lead).unwrap();

        ingestor
            .ingest(payload(
                "call.created",
                serde_json::json!({
                    "id": 42,
                    "direction": "inbound",
                    "raw_digits": "+1 555 010 2000",
                    "started_at": 1_700_000_000,
                }),
            ))
            .unwrap();
        ingestor
            .ingest(payload(
                "call.answered",
                serde_json::json!({ "id": 42, "agent": "Sam", "answered_at": 1_700_000_010 }),
            ))
            .unwrap();
        let outcome = ingestor
            .ingest(payload(
                "call.hungup",
                serde_json::json!({ "id": 42, "ended_at": 1_700_000_130 }),
            ))
            .unwrap();

        let IngestOutcome::Recorded(call) = outcome else {
            panic!("expected a recorded call");
        };
        assert_eq!(call.external_id, "42");
        assert_eq!(call.status, CallStatus::Completed);
        assert_eq!(call.lead_id.as_deref(), Some("l1"));
        assert_eq!(call.agent_name.as_deref(), Some("Sam"));
        assert_eq!(call.duration_secs, Some(120));
        assert_eq!(call.last_event, "hungup");
        assert_eq!(store.get_call("42").unwrap().unwrap().id, call.id);
    }

    #[test]
    fn test_unanswered_call_is_missed() {
        let (ingestor, _) = ingestor();
        ingestor
            .ingest(payload("call.ringing", serde_json::json!({ "id": "c-9" })))
            .unwrap();
        let IngestOutcome::Recorded(call) = ingestor
            .ingest(payload("call.ended", serde_json::json!({ "id": "c-9" })))
            .unwrap()
        else {
            panic!("expected a recorded call");
        };
        assert_eq!(call.status, CallStatus::Missed);
        assert!(call.ended_at.is_some());
    }

    #[test]
    fn test_voicemail_comments_and_tags() {
        let (ingestor, _) = ingestor();
        ingestor
            .ingest(payload(
                "call.voicemail_left",
                serde_json::json!({ "id": "c-2", "voicemail": "https://cdn.example.com/vm.mp3" }),
            ))
            .unwrap();
        ingestor
            .ingest(payload(
                "call.commented",
                serde_json::json!({ "id": "c-2", "content": " Call back Monday " }),
            ))
            .unwrap();
        ingestor
            .ingest(payload(
                "call.tagged",
                serde_json::json!({ "id": "c-2", "tags": ["hot", "nursing"] }),
            ))
            .unwrap();
        let IngestOutcome::Recorded(call) = ingestor
            .ingest(payload("call.tagged", serde_json::json!({ "id": "c-2", "tags": ["hot"] })))
            .unwrap()
        else {
            panic!("expected a recorded call");
        };
        assert_eq!(call.status, CallStatus::Voicemail);
        assert_eq!(call.voicemail_url.as_deref(), Some("https://cdn.example.com/vm.mp3"));
        assert_eq!(call.comments, vec!["Call back Monday".to_string()]);
        assert_eq!(call.tags, vec!["hot".to_string(), "nursing".to_string()]);
    }

    #[test]
    fn test_token_is_checked_when_configured() {
        let store = Arc::new(InMemoryStore::new());
        let ingestor = CallEventIngestor::new(store.clone(), Some("s3cret".into()));

        let mut bad = payload("call.created", serde_json::json!({ "id": "c-3" }));
        bad.token = Some("wrong".into());
        assert!(matches!(ingestor.ingest(bad), Err(CrmError::Unauthorized(_))));
        assert!(store.get_call("c-3").unwrap().is_none());

        let mut good = payload("call.created", serde_json::json!({ "id": "c-3" }));
        good.token = Some("s3cret".into());
        assert!(matches!(ingestor.ingest(good), Ok(IngestOutcome::Recorded(_))));
    }

    #[test]
    fn test_missing_id_is_ignored_and_events_are_emitted() {
        let store = Arc::new(InMemoryStore::new());
        let sink = capture_sink();
        let ingestor = CallEventIngestor::new(store, None).with_event_sink(sink.clone());

        let outcome = ingestor.ingest(payload("call.created", serde_json::json!({}))).unwrap();
        assert!(matches!(outcome, IngestOutcome::Ignored { reason: "missing call id", .. }));
        assert_eq!(sink.count(), 0);

        ingestor
            .ingest(payload("call.created", serde_json::json!({ "id": "c-4" })))
            .unwrap();
        assert_eq!(sink.count_type(EventType::CallEventIngested), 1);
    }
}
