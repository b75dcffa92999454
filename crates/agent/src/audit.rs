use tracing::{info, warn};

use concierge_core::audit::{AuditEvent, AuditOutcome, AuditSink};

/// Writes audit events into the structured log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        let session_id = event.session_id.as_deref().unwrap_or("-");
        let turn = event.turn.unwrap_or_default();
        match event.outcome {
            AuditOutcome::Failed => warn!(
                event_name = "audit.event",
                audit_type = %event.event_type,
                category = ?event.category,
                outcome = ?event.outcome,
                session_id,
                turn,
                correlation_id = %event.correlation_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit"
            ),
            _ => info!(
                event_name = "audit.event",
                audit_type = %event.event_type,
                category = ?event.category,
                outcome = ?event.outcome,
                session_id,
                turn,
                correlation_id = %event.correlation_id,
                actor = %event.actor,
                metadata = %metadata,
                "audit"
            ),
        }
    }
}
