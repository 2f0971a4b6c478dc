//! Statement delivery paths
//!
//! Ordinary statements go through [`AsyncSink`]. Terminal statements sent
//! while the host is being torn down go through [`KeepaliveSink`] when the
//! transport can guarantee the request completes.

use async_trait::async_trait;
use lrs_client::Statement;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::signals::{Signals, TrackerSignal};
use crate::transport::Transport;

#[async_trait]
pub trait StatementSink: Send + Sync {
    /// Deliver statements in order.
    ///
    /// Every statement is attempted; the first error is returned.
    async fn deliver(&self, statements: Vec<Statement>) -> Result<()>;
}

/// Sends each statement as its own request
pub struct AsyncSink {
    transport: Arc<dyn Transport>,
    signals: Signals,
}

impl AsyncSink {
    pub fn new(transport: Arc<dyn Transport>, signals: Signals) -> Self {
        Self { transport, signals }
    }
}

#[async_trait]
impl StatementSink for AsyncSink {
    async fn deliver(&self, statements: Vec<Statement>) -> Result<()> {
        let mut first_error = None;

        for statement in statements {
            match self.transport.send_statement(&statement).await {
                Ok(()) => {
                    debug!(verb = %statement.verb.id, object = %statement.object.id, "Statement sent");
                    self.signals.emit(sent(&statement));
                }
                Err(e) => {
                    warn!(verb = %statement.verb.id, object = %statement.object.id, error = %e, "Failed to send statement");
                    self.signals.emit(failed(&statement, &e.to_string()));
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// Sends the whole batch as one request awaited to completion
pub struct KeepaliveSink {
    transport: Arc<dyn Transport>,
    signals: Signals,
}

impl KeepaliveSink {
    pub fn new(transport: Arc<dyn Transport>, signals: Signals) -> Self {
        Self { transport, signals }
    }
}

#[async_trait]
impl StatementSink for KeepaliveSink {
    async fn deliver(&self, statements: Vec<Statement>) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }

        match self.transport.send_statements_keepalive(&statements).await {
            Ok(()) => {
                debug!(count = statements.len(), "Statements sent with keepalive");
                for statement in &statements {
                    self.signals.emit(sent(statement));
                }
                Ok(())
            }
            Err(e) => {
                warn!(count = statements.len(), error = %e, "Failed to send statements with keepalive");
                let message = e.to_string();
                for statement in &statements {
                    self.signals.emit(failed(statement, &message));
                }
                Err(e)
            }
        }
    }
}

/// Sink for terminal statements: keepalive when the transport supports it,
/// otherwise an ordinary send
pub fn terminal_sink(transport: Arc<dyn Transport>, signals: Signals) -> Arc<dyn StatementSink> {
    if transport.supports_keepalive() {
        Arc::new(KeepaliveSink::new(transport, signals))
    } else {
        debug!("Keepalive unavailable, terminal statements use ordinary sends");
        Arc::new(AsyncSink::new(transport, signals))
    }
}

fn sent(statement: &Statement) -> TrackerSignal {
    TrackerSignal::StatementSent {
        verb: statement.verb.id.clone(),
        object: statement.object.id.clone(),
    }
}

fn failed(statement: &Statement, message: &str) -> TrackerSignal {
    TrackerSignal::StatementFailed {
        verb: statement.verb.id.clone(),
        object: statement.object.id.clone(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Delivery, MockTransport};
    use lrs_client::{language_map, Activity, Agent, Verb};

    fn statement(verb: &str) -> Statement {
        Statement::new(
            Agent::mbox("mailto:a@example.com"),
            Verb {
                id: format!("http://adlnet.gov/expapi/verbs/{}", verb),
                display: language_map("en-US", verb),
            },
            Activity::new("https://x/course"),
        )
    }

    #[tokio::test]
    async fn test_terminal_sink_uses_keepalive_when_supported() {
        let mock = Arc::new(MockTransport::new(Agent::mbox("mailto:a@example.com"), "https://x/course"));
        let sink = terminal_sink(mock.clone(), Signals::new());

        sink.deliver(vec![statement("suspended"), statement("terminated")]).await.unwrap();

        let deliveries: Vec<_> = mock.deliveries().await.into_iter().map(|(_, d)| d).collect();
        assert_eq!(deliveries, vec![Delivery::Keepalive, Delivery::Keepalive]);
    }

    #[tokio::test]
    async fn test_terminal_sink_falls_back_to_async() {
        let mock = Arc::new(
            MockTransport::new(Agent::mbox("mailto:a@example.com"), "https://x/course").with_keepalive(false),
        );
        let sink = terminal_sink(mock.clone(), Signals::new());

        sink.deliver(vec![statement("terminated")]).await.unwrap();

        assert_eq!(mock.deliveries().await[0].1, Delivery::Async);
    }

    #[tokio::test]
    async fn test_async_sink_reports_failures() {
        let mock = Arc::new(MockTransport::new(Agent::mbox("mailto:a@example.com"), "https://x/course"));
        let signals = Signals::new();
        let mut rx = signals.subscribe();
        let sink = AsyncSink::new(mock.clone(), signals);

        mock.set_fail_statements(true);
        assert!(sink.deliver(vec![statement("launched")]).await.is_err());

        match rx.recv().await.unwrap() {
            TrackerSignal::StatementFailed { verb, .. } => assert!(verb.ends_with("launched")),
            other => panic!("unexpected signal: {other:?}"),
        }
    }
}
