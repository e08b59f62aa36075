//! In-process event bus for cross-connector notification
//!
//! Channels are keyed by [`ModuleKind`]. Connectors register named handlers
//! during initialize and the hub removes them again on deactivate, so a
//! subscription never outlives the connector that owns it. Delivery is
//! sequential in registration order; a failing handler is logged and skipped,
//! it never blocks the handlers behind it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use omniflow_shared::{DomainEvent, EventKind, ModuleKind};

use crate::error::{ConnectorError, ConnectorResult};

type EventHandler = Arc<dyn Fn(DomainEvent) -> BoxFuture<'static, ConnectorResult<()>> + Send + Sync>;

/// Declaration of one event handler: identity, channel and event filter.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSpec {
    /// Unique handler id, e.g. `crm.invoice-paid`
    pub id: String,
    /// Human label shown on the admin surface
    pub label: String,
    /// Channel the handler listens on
    pub channel: ModuleKind,
    /// Event kinds that trigger the handler; empty means every kind on the
    /// channel
    pub events: Vec<EventKind>,
    /// Module that owns the handler and whose deactivation removes it
    pub owner: ModuleKind,
}

struct Subscription {
    spec: SubscriptionSpec,
    handler: EventHandler,
}

/// Pub/sub bus shared by every connector in the hub.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    published: AtomicU64,
    delivered: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    /// Register a handler. Fails if the handler id is already taken.
    pub async fn subscribe<F>(&self, spec: SubscriptionSpec, handler: F) -> ConnectorResult<()>
    where
        F: Fn(DomainEvent) -> BoxFuture<'static, ConnectorResult<()>> + Send + Sync + 'static,
    {
        let mut subscriptions = self.subscriptions.write().await;
        if subscriptions.iter().any(|s| s.spec.id == spec.id) {
            return Err(ConnectorError::event_bus(format!(
                "Handler id '{}' is already registered",
                spec.id
            )));
        }
        debug!(handler = %spec.id, channel = %spec.channel, "Registering event handler");
        subscriptions.push(Subscription {
            spec,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    /// Remove one handler by id. Returns whether it existed.
    pub async fn unsubscribe(&self, id: &str) -> bool {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.spec.id != id);
        subscriptions.len() < before
    }

    /// Remove every handler owned by a module. Returns how many were removed.
    pub async fn unsubscribe_owner(&self, owner: ModuleKind) -> usize {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.spec.owner != owner);
        before - subscriptions.len()
    }

    /// Publish an event to its channel and run every matching handler, in
    /// registration order. Returns the number of handlers that ran.
    pub async fn publish(&self, event: DomainEvent) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);

        let matching: Vec<(String, EventHandler)> = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions
                .iter()
                .filter(|s| {
                    s.spec.channel == event.module
                        && (s.spec.events.is_empty() || s.spec.events.contains(&event.kind))
                })
                .map(|s| (s.spec.id.clone(), s.handler.clone()))
                .collect()
        };

        debug!(
            event = %event.kind,
            channel = %event.module,
            handlers = matching.len(),
            "Publishing event"
        );

        let mut ran = 0;
        for (id, handler) in matching {
            if let Err(e) = handler(event.clone()).await {
                warn!(handler = %id, event = %event.kind, error = %e, "Event handler failed");
            }
            ran += 1;
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
        ran
    }

    /// Specs of all live subscriptions, in registration order
    pub async fn subscriptions(&self) -> Vec<SubscriptionSpec> {
        self.subscriptions
            .read()
            .await
            .iter()
            .map(|s| s.spec.clone())
            .collect()
    }

    pub fn published_total(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn delivered_total(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
