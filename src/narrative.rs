//! Narrative sink seam: the core never generates operator-facing prose
//! itself (out of scope, see module docs), but it exposes a trait so a
//! collaborator can subscribe to decisions and render one.

use crate::model::{AuditEvent, Recommendation};

/// Implemented by an external narrative/LLM layer that wants a plain-English
/// account of a decision. The core only calls this synchronously with
/// already-computed facts; it never blocks on it.
pub trait NarrativeSink: Send + Sync {
    fn on_recommendation(&self, pod: &str, recommendation: &Recommendation);
    fn on_audit_event(&self, event: &AuditEvent);
}

/// Default no-op sink used when no narrative layer is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNarrativeSink;

impl NarrativeSink for NullNarrativeSink {
    fn on_recommendation(&self, _pod: &str, _recommendation: &Recommendation) {}
    fn on_audit_event(&self, _event: &AuditEvent) {}
}
