//! Connector lifecycle contract and state machine
//!
//! Every connector implements the [`Connector`] trait and is driven through
//! a fixed lifecycle: initialize sets up API clients and verifies
//! connectivity, activate starts background work and event subscriptions,
//! deactivate stops them, destroy releases everything. The
//! [`ManagedConnector`] wrapper owns the status word and rejects calls that
//! arrive out of order.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use omniflow_shared::{
    ModuleKind, PluginDescriptor, PluginStatus, SyncBatch, SyncDirection, SyncReport,
};

use crate::error::{ConnectorError, ConnectorResult};

/// Trait defining the common interface for all connectors
#[async_trait]
pub trait Connector: Send + Sync {
    /// Static descriptor: identity, module, capabilities, endpoints
    fn descriptor(&self) -> PluginDescriptor;

    /// Build API clients, verify the backing system is reachable and
    /// register event-bus handlers
    async fn initialize(&self) -> ConnectorResult<()>;

    /// Start background loops
    async fn activate(&self) -> ConnectorResult<()>;

    /// Stop background loops and drop event subscriptions
    async fn deactivate(&self) -> ConnectorResult<()>;

    /// Release remaining resources; the connector is unusable afterwards
    async fn destroy(&self) -> ConnectorResult<()>;

    /// Check if the backing system is reachable
    async fn health_check(&self) -> ConnectorResult<bool>;

    /// Run one data synchronization pass for a batch of records of a single
    /// entity kind. Inbound imports external records, outbound exports
    /// canonical ones. Later writes win; there is no conflict resolution.
    async fn sync(&self, direction: SyncDirection, batch: SyncBatch) -> ConnectorResult<SyncReport>;
}

/// Serializable view of a managed connector for the HTTP surface
#[derive(Debug, Clone, Serialize)]
pub struct ConnectorSnapshot {
    pub name: String,
    pub module: ModuleKind,
    pub status: PluginStatus,
    pub last_error: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
}

/// A connector plus the lifecycle state the hub tracks for it.
///
/// All transitions run under the status write lock, so lifecycle calls on
/// one connector are serialized and each underlying hook runs at most once
/// per transition.
pub struct ManagedConnector {
    inner: Arc<dyn Connector>,
    status: RwLock<PluginStatus>,
    last_error: RwLock<Option<String>>,
    activated_at: RwLock<Option<DateTime<Utc>>>,
}

impl ManagedConnector {
    pub fn new(inner: Arc<dyn Connector>) -> Self {
        Self {
            inner,
            status: RwLock::new(PluginStatus::Inactive),
            last_error: RwLock::new(None),
            activated_at: RwLock::new(None),
        }
    }

    pub fn name(&self) -> String {
        self.inner.descriptor().name
    }

    pub fn module(&self) -> ModuleKind {
        self.inner.descriptor().module
    }

    pub fn descriptor(&self) -> PluginDescriptor {
        self.inner.descriptor()
    }

    /// Descriptor with the live status folded in
    pub async fn descriptor_with_status(&self) -> PluginDescriptor {
        let mut descriptor = self.inner.descriptor();
        descriptor.status = *self.status.read().await;
        descriptor
    }

    pub async fn status(&self) -> PluginStatus {
        *self.status.read().await
    }

    pub async fn snapshot(&self) -> ConnectorSnapshot {
        ConnectorSnapshot {
            name: self.name(),
            module: self.module(),
            status: *self.status.read().await,
            last_error: self.last_error.read().await.clone(),
            activated_at: *self.activated_at.read().await,
        }
    }

    /// Run the initialize hook. Valid from `Inactive` (first load) and from
    /// `Error` (retry after a failure). The connector stays in `Loading`
    /// until it is activated.
    pub async fn initialize(&self) -> ConnectorResult<()> {
        let mut status = self.status.write().await;
        match *status {
            PluginStatus::Inactive | PluginStatus::Error => {}
            from => {
                return Err(ConnectorError::invalid_transition(
                    self.name(),
                    from,
                    PluginStatus::Loading,
                ));
            }
        }
        *status = PluginStatus::Loading;
        info!(connector = %self.name(), "Initializing connector");

        match self.inner.initialize().await {
            Ok(()) => {
                *self.last_error.write().await = None;
                Ok(())
            }
            Err(e) => {
                *status = PluginStatus::Error;
                *self.last_error.write().await = Some(e.to_string());
                error!(connector = %self.name(), error = %e, "Connector initialization failed");
                Err(e)
            }
        }
    }

    /// Run the activate hook. Requires a completed initialize (`Loading`).
    /// Activating an already active connector is a no-op.
    pub async fn activate(&self) -> ConnectorResult<()> {
        let mut status = self.status.write().await;
        match *status {
            PluginStatus::Active => {
                warn!(connector = %self.name(), "Connector already active, ignoring");
                return Ok(());
            }
            PluginStatus::Loading => {}
            from => {
                return Err(ConnectorError::invalid_transition(
                    self.name(),
                    from,
                    PluginStatus::Active,
                ));
            }
        }

        match self.inner.activate().await {
            Ok(()) => {
                *status = PluginStatus::Active;
                *self.activated_at.write().await = Some(Utc::now());
                info!(connector = %self.name(), "Connector activated");
                Ok(())
            }
            Err(e) => {
                *status = PluginStatus::Error;
                *self.last_error.write().await = Some(e.to_string());
                error!(connector = %self.name(), error = %e, "Connector activation failed");
                Err(e)
            }
        }
    }

    /// Run the deactivate hook. The underlying hook only fires when the
    /// connector is actually active. From `Loading` or `Error` the status
    /// simply falls back to `Inactive`, and deactivating an inactive
    /// connector is a no-op.
    pub async fn deactivate(&self) -> ConnectorResult<()> {
        let mut status = self.status.write().await;
        match *status {
            PluginStatus::Inactive => return Ok(()),
            PluginStatus::Active => match self.inner.deactivate().await {
                Ok(()) => {
                    *status = PluginStatus::Inactive;
                    *self.activated_at.write().await = None;
                    info!(connector = %self.name(), "Connector deactivated");
                    Ok(())
                }
                Err(e) => {
                    *status = PluginStatus::Error;
                    *self.last_error.write().await = Some(e.to_string());
                    error!(connector = %self.name(), error = %e, "Connector deactivation failed");
                    Err(e)
                }
            },
            PluginStatus::Loading | PluginStatus::Error => {
                *status = PluginStatus::Inactive;
                Ok(())
            }
        }
    }

    /// Deactivate if needed, then run the destroy hook. Callable from any
    /// state so the hub can always tear a connector down.
    pub async fn destroy(&self) -> ConnectorResult<()> {
        let mut status = self.status.write().await;
        if *status == PluginStatus::Active {
            if let Err(e) = self.inner.deactivate().await {
                warn!(connector = %self.name(), error = %e, "Deactivate during destroy failed");
            }
        }
        let result = self.inner.destroy().await;
        *status = PluginStatus::Inactive;
        *self.activated_at.write().await = None;
        match result {
            Ok(()) => {
                info!(connector = %self.name(), "Connector destroyed");
                Ok(())
            }
            Err(e) => {
                *self.last_error.write().await = Some(e.to_string());
                error!(connector = %self.name(), error = %e, "Connector destroy failed");
                Err(e)
            }
        }
    }

    pub async fn health_check(&self) -> ConnectorResult<bool> {
        if *self.status.read().await != PluginStatus::Active {
            return Ok(false);
        }
        self.inner.health_check().await
    }

    /// Dispatch a sync pass. Only active connectors move data.
    pub async fn sync(
        &self,
        direction: SyncDirection,
        batch: SyncBatch,
    ) -> ConnectorResult<SyncReport> {
        if *self.status.read().await != PluginStatus::Active {
            return Err(ConnectorError::service_unavailable(self.name()));
        }
        self.inner.sync(direction, batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omniflow_shared::{PluginCapabilities, PluginRuntimeConfig};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct FakeConnector {
        init_calls: AtomicUsize,
        activate_calls: AtomicUsize,
        deactivate_calls: AtomicUsize,
        destroy_calls: AtomicUsize,
        fail_initialize: AtomicBool,
    }

    impl FakeConnector {
        fn new() -> Self {
            Self {
                init_calls: AtomicUsize::new(0),
                activate_calls: AtomicUsize::new(0),
                deactivate_calls: AtomicUsize::new(0),
                destroy_calls: AtomicUsize::new(0),
                fail_initialize: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        fn descriptor(&self) -> PluginDescriptor {
            PluginDescriptor {
                id: "fake".to_string(),
                name: "fake".to_string(),
                version: "0.0.1".to_string(),
                module: ModuleKind::Crm,
                status: PluginStatus::Inactive,
                config: PluginRuntimeConfig::default(),
                capabilities: PluginCapabilities::default(),
            }
        }

        async fn initialize(&self) -> ConnectorResult<()> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_initialize.load(Ordering::SeqCst) {
                return Err(ConnectorError::connection_failed("fake", "refused"));
            }
            Ok(())
        }

        async fn activate(&self) -> ConnectorResult<()> {
            self.activate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn deactivate(&self) -> ConnectorResult<()> {
            self.deactivate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn destroy(&self) -> ConnectorResult<()> {
            self.destroy_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn health_check(&self) -> ConnectorResult<bool> {
            Ok(true)
        }

        async fn sync(
            &self,
            _direction: SyncDirection,
            batch: SyncBatch,
        ) -> ConnectorResult<SyncReport> {
            Ok(SyncReport {
                synced: batch.records.len() as u64,
                ..SyncReport::default()
            })
        }
    }

    fn managed() -> (Arc<FakeConnector>, ManagedConnector) {
        let fake = Arc::new(FakeConnector::new());
        let managed = ManagedConnector::new(fake.clone());
        (fake, managed)
    }

    #[tokio::test]
    async fn test_activate_before_initialize_rejected() {
        let (fake, managed) = managed();
        let err = managed.activate().await.unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidTransition { .. }));
        assert_eq!(fake.activate_calls.load(Ordering::SeqCst), 0);
        assert_eq!(managed.status().await, PluginStatus::Inactive);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let (fake, managed) = managed();

        managed.initialize().await.unwrap();
        assert_eq!(managed.status().await, PluginStatus::Loading);

        managed.activate().await.unwrap();
        assert_eq!(managed.status().await, PluginStatus::Active);
        assert!(managed.snapshot().await.activated_at.is_some());

        managed.deactivate().await.unwrap();
        assert_eq!(managed.status().await, PluginStatus::Inactive);
        assert_eq!(fake.init_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fake.activate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fake.deactivate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_activate_twice_is_noop() {
        let (fake, managed) = managed();
        managed.initialize().await.unwrap();
        managed.activate().await.unwrap();
        managed.activate().await.unwrap();
        assert_eq!(fake.activate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(managed.status().await, PluginStatus::Active);
    }

    #[tokio::test]
    async fn test_failed_initialize_sets_error_state() {
        let (fake, managed) = managed();
        fake.fail_initialize.store(true, Ordering::SeqCst);

        assert!(managed.initialize().await.is_err());
        assert_eq!(managed.status().await, PluginStatus::Error);
        assert!(managed.snapshot().await.last_error.is_some());

        // Activation stays rejected while in error state
        assert!(managed.activate().await.is_err());

        // But a retry of initialize is allowed once the fault clears
        fake.fail_initialize.store(false, Ordering::SeqCst);
        managed.initialize().await.unwrap();
        assert_eq!(managed.status().await, PluginStatus::Loading);
        assert!(managed.snapshot().await.last_error.is_none());
    }

    #[tokio::test]
    async fn test_destroy_from_active_deactivates_first() {
        let (fake, managed) = managed();
        managed.initialize().await.unwrap();
        managed.activate().await.unwrap();

        managed.destroy().await.unwrap();
        assert_eq!(fake.deactivate_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fake.destroy_calls.load(Ordering::SeqCst), 1);
        assert_eq!(managed.status().await, PluginStatus::Inactive);
    }

    #[tokio::test]
    async fn test_initialize_while_loading_rejected() {
        let (_, managed) = managed();
        managed.initialize().await.unwrap();
        let err = managed.initialize().await.unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_health_check_only_when_active() {
        let (_, managed) = managed();
        assert!(!managed.health_check().await.unwrap());
        managed.initialize().await.unwrap();
        managed.activate().await.unwrap();
        assert!(managed.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_requires_active_connector() {
        let (_, managed) = managed();
        let batch = SyncBatch::new(
            omniflow_shared::EntityKind::Company,
            vec![serde_json::json!({"name": "Initech"})],
        );

        let err = managed
            .sync(SyncDirection::Outbound, batch.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::ServiceUnavailable { .. }));

        managed.initialize().await.unwrap();
        managed.activate().await.unwrap();
        let report = managed.sync(SyncDirection::Outbound, batch).await.unwrap();
        assert_eq!(report.synced, 1);
    }
}
