//! Typed observer registry for domain events

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

use super::types::{DomainEvent, EventKind};

/// Handler invoked with each matching event
pub type EventHandler = Arc<dyn Fn(DomainEvent) -> BoxFuture<'static, ()> + Send + Sync>;

/// Returned by [`EventBus::subscribe`], used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Routes events to handlers registered for their kind.
///
/// Handlers run one after another in registration order; each emission
/// reaches each handler at most once.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<(HandlerId, EventHandler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe<F, Fut>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(DomainEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let handler: EventHandler = Arc::new(move |event| handler(event).boxed());

        self.handlers
            .write()
            .await
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    /// Remove a handler; false if it was not registered
    pub async fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write().await;
        for list in handlers.values_mut() {
            if let Some(index) = list.iter().position(|(h, _)| *h == id) {
                list.remove(index);
                return true;
            }
        }
        false
    }

    pub async fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.read().await.get(&kind).map_or(0, Vec::len)
    }

    /// Run every handler registered for the event's kind, returning how many ran
    pub async fn emit(&self, event: DomainEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = self
            .handlers
            .read()
            .await
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();

        if handlers.is_empty() {
            trace!(kind = ?kind, "No handlers for event");
            return 0;
        }

        for handler in &handlers {
            handler(event.clone()).await;
        }
        handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn visit(id: &str) -> DomainEvent {
        DomainEvent::PageVisited { node_id: id.into() }
    }

    #[tokio::test]
    async fn test_handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for label in ["first", "second"] {
            let seen = seen.clone();
            bus.subscribe(EventKind::PageVisited, move |event| {
                let seen = seen.clone();
                async move {
                    if let DomainEvent::PageVisited { node_id } = event {
                        seen.lock().unwrap().push(format!("{label}:{node_id}"));
                    }
                }
            })
            .await;
        }

        assert_eq!(bus.emit(visit("co-1")).await, 2);
        assert_eq!(*seen.lock().unwrap(), vec!["first:co-1", "second:co-1"]);
    }

    #[tokio::test]
    async fn test_only_matching_kind_is_called() {
        let bus = EventBus::new();
        bus.subscribe(EventKind::MenuVisited, |_| async {}).await;

        assert_eq!(bus.emit(visit("co-1")).await, 0);
        assert_eq!(bus.handler_count(EventKind::MenuVisited).await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let bus = EventBus::new();
        let id = bus.subscribe(EventKind::PageVisited, |_| async {}).await;

        assert!(bus.unsubscribe(id).await);
        assert!(!bus.unsubscribe(id).await);
        assert_eq!(bus.emit(visit("co-1")).await, 0);
    }
}
