use std::sync::Arc;

use anyhow::Result;
use tracing::Span;

/// Optional tracing of whole workflow calls
///
/// Instrumentation is best effort. An error or a `None` span means the call
/// runs uninstrumented; it never changes what the call emits.
pub trait Instrumentation: Send + Sync {
    /// Open the span that covers one complete workflow call
    fn workflow_span(&self, name: &str) -> Result<Option<Span>>;
}

/// Default instrumentation: nothing is traced
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInstrumentation;

impl Instrumentation for NoopInstrumentation {
    fn workflow_span(&self, _name: &str) -> Result<Option<Span>> {
        Ok(None)
    }
}

/// Opens an `INFO` level `workflow` span through the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingInstrumentation;

impl Instrumentation for TracingInstrumentation {
    fn workflow_span(&self, name: &str) -> Result<Option<Span>> {
        Ok(Some(tracing::info_span!("workflow", workflow.name = %name)))
    }
}

/// Pick the instrumentation for a process from its tracing switch
pub fn from_flag(enabled: bool) -> Arc<dyn Instrumentation> {
    if enabled {
        Arc::new(TracingInstrumentation)
    } else {
        Arc::new(NoopInstrumentation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_has_no_span() {
        assert!(NoopInstrumentation.workflow_span("chain").unwrap().is_none());
        assert!(from_flag(false).workflow_span("chain").unwrap().is_none());
    }

    #[test]
    fn test_tracing_opens_span() {
        assert!(from_flag(true).workflow_span("chain").unwrap().is_some());
    }
}
