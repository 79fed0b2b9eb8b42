//! Telephony webhook ingestion: turns vendor call events into call records
//! matched to leads by phone number.

pub mod events;
pub mod ingest;

pub use events::{CallEvent, CallEventData, CallWebhookPayload};
pub use ingest::{CallEventIngestor, IngestOutcome};
