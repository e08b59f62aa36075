//! Connector registry and fleet lifecycle
//!
//! Holds one managed connector per module and drives them through startup
//! and shutdown as a fleet: initialization and activation walk the fleet in
//! ascending priority order, shutdown walks it in reverse. One connector
//! failing never stops the pass; the failure lands in the pass report and
//! the rest of the fleet keeps going.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use omniflow_shared::{
    ModuleKind, PluginDescriptor, PluginStatus, SyncBatch, SyncDirection, SyncReport,
};

use crate::error::{ConnectorError, ConnectorResult};
use crate::lifecycle::{Connector, ConnectorSnapshot, ManagedConnector};

/// Outcome of a fleet-wide lifecycle pass
#[derive(Debug, Clone, Serialize)]
pub struct LifecyclePass {
    pub attempted: usize,
    pub succeeded: usize,
    /// One entry per failed connector: "name: error"
    pub failures: Vec<String>,
}

impl LifecyclePass {
    fn new() -> Self {
        Self {
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    fn record<T>(&mut self, name: &str, result: &ConnectorResult<T>) {
        self.attempted += 1;
        match result {
            Ok(_) => self.succeeded += 1,
            Err(e) => self.failures.push(format!("{}: {}", name, e)),
        }
    }
}

/// Registry of all connectors known to the hub, keyed by module
pub struct ConnectorRegistry {
    connectors: RwLock<Vec<Arc<ManagedConnector>>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: RwLock::new(Vec::new()),
        }
    }

    /// Register a connector. Each module can carry at most one.
    pub async fn register(&self, connector: Arc<dyn Connector>) -> ConnectorResult<()> {
        let descriptor = connector.descriptor();
        let mut connectors = self.connectors.write().await;
        if connectors.iter().any(|c| c.module() == descriptor.module) {
            return Err(ConnectorError::configuration(format!(
                "A connector for module {} is already registered",
                descriptor.module
            )));
        }
        info!(
            connector = %descriptor.name,
            module = %descriptor.module,
            priority = descriptor.config.priority,
            "Connector registered"
        );
        connectors.push(Arc::new(ManagedConnector::new(connector)));
        Ok(())
    }

    pub async fn get(&self, module: ModuleKind) -> Option<Arc<ManagedConnector>> {
        self.connectors
            .read()
            .await
            .iter()
            .find(|c| c.module() == module)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.connectors.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connectors.read().await.is_empty()
    }

    /// Descriptors for every registered connector with live status folded in
    pub async fn descriptors(&self) -> Vec<PluginDescriptor> {
        let connectors = self.ordered_by_priority().await;
        let mut descriptors = Vec::with_capacity(connectors.len());
        for connector in connectors {
            descriptors.push(connector.descriptor_with_status().await);
        }
        descriptors
    }

    pub async fn snapshots(&self) -> Vec<ConnectorSnapshot> {
        let connectors = self.ordered_by_priority().await;
        let mut snapshots = Vec::with_capacity(connectors.len());
        for connector in connectors {
            snapshots.push(connector.snapshot().await);
        }
        snapshots
    }

    // ========================================================================
    // FLEET LIFECYCLE
    // ========================================================================

    /// Initialize the fleet in ascending priority order.
    ///
    /// A connector naming an unregistered dependency is skipped with a
    /// configuration failure; its own hooks never run.
    pub async fn initialize_all(&self) -> LifecyclePass {
        let connectors = self.ordered_by_priority().await;
        let registered: HashSet<String> =
            connectors.iter().map(|c| c.descriptor().id).collect();

        let mut pass = LifecyclePass::new();
        for connector in connectors {
            let descriptor = connector.descriptor();
            if let Some(missing) = descriptor
                .config
                .dependencies
                .iter()
                .find(|d| !registered.contains(*d))
            {
                let result: ConnectorResult<()> = Err(ConnectorError::configuration(format!(
                    "{} requires unregistered connector '{}'",
                    descriptor.name, missing
                )));
                log_outcome("initialize", &descriptor.name, &result, Duration::ZERO);
                pass.record(&descriptor.name, &result);
                continue;
            }

            let started = Instant::now();
            let result = connector.initialize().await;
            log_outcome("initialize", &descriptor.name, &result, started.elapsed());
            pass.record(&descriptor.name, &result);
        }
        info!(
            attempted = pass.attempted,
            succeeded = pass.succeeded,
            "Fleet initialization finished"
        );
        pass
    }

    /// Activate every initialized connector in ascending priority order.
    /// Connectors that never left `Inactive` or sit in `Error` are skipped.
    pub async fn activate_all(&self) -> LifecyclePass {
        let mut pass = LifecyclePass::new();
        for connector in self.ordered_by_priority().await {
            match connector.status().await {
                PluginStatus::Loading | PluginStatus::Active => {}
                status => {
                    debug!(
                        connector = %connector.name(),
                        status = %status,
                        "Skipping activation"
                    );
                    continue;
                }
            }
            let started = Instant::now();
            let result = connector.activate().await;
            log_outcome("activate", &connector.name(), &result, started.elapsed());
            pass.record(&connector.name(), &result);
        }
        info!(
            attempted = pass.attempted,
            succeeded = pass.succeeded,
            "Fleet activation finished"
        );
        pass
    }

    /// Deactivate the fleet in reverse priority order, dependents first
    pub async fn deactivate_all(&self) -> LifecyclePass {
        let mut pass = LifecyclePass::new();
        for connector in self.ordered_by_priority().await.into_iter().rev() {
            let started = Instant::now();
            let result = connector.deactivate().await;
            log_outcome("deactivate", &connector.name(), &result, started.elapsed());
            pass.record(&connector.name(), &result);
        }
        pass
    }

    /// Tear the whole fleet down, reverse priority order
    pub async fn destroy_all(&self) -> LifecyclePass {
        let mut pass = LifecyclePass::new();
        for connector in self.ordered_by_priority().await.into_iter().rev() {
            let started = Instant::now();
            let result = connector.destroy().await;
            log_outcome("destroy", &connector.name(), &result, started.elapsed());
            pass.record(&connector.name(), &result);
        }
        info!(attempted = pass.attempted, "Fleet destroyed");
        pass
    }

    // ========================================================================
    // PER-MODULE OPERATIONS
    // ========================================================================

    pub async fn initialize(&self, module: ModuleKind) -> ConnectorResult<()> {
        let connector = self.require(module).await?;
        let started = Instant::now();
        let result = connector.initialize().await;
        log_outcome("initialize", &connector.name(), &result, started.elapsed());
        result
    }

    pub async fn activate(&self, module: ModuleKind) -> ConnectorResult<()> {
        let connector = self.require(module).await?;
        let started = Instant::now();
        let result = connector.activate().await;
        log_outcome("activate", &connector.name(), &result, started.elapsed());
        result
    }

    pub async fn deactivate(&self, module: ModuleKind) -> ConnectorResult<()> {
        let connector = self.require(module).await?;
        let started = Instant::now();
        let result = connector.deactivate().await;
        log_outcome("deactivate", &connector.name(), &result, started.elapsed());
        result
    }

    /// Route a sync batch to the module's connector
    pub async fn sync(
        &self,
        module: ModuleKind,
        direction: SyncDirection,
        batch: SyncBatch,
    ) -> ConnectorResult<SyncReport> {
        self.require(module).await?.sync(direction, batch).await
    }

    /// Health of every connector by name. Inactive connectors report false.
    pub async fn health(&self) -> BTreeMap<String, bool> {
        let mut health = BTreeMap::new();
        for connector in self.ordered_by_priority().await {
            let healthy = match connector.health_check().await {
                Ok(healthy) => healthy,
                Err(e) => {
                    warn!(connector = %connector.name(), error = %e, "Health check errored");
                    false
                }
            };
            health.insert(connector.name(), healthy);
        }
        health
    }

    async fn require(&self, module: ModuleKind) -> ConnectorResult<Arc<ManagedConnector>> {
        self.get(module)
            .await
            .ok_or_else(|| ConnectorError::not_found(format!("Connector for module {}", module)))
    }

    async fn ordered_by_priority(&self) -> Vec<Arc<ManagedConnector>> {
        let mut connectors = self.connectors.read().await.clone();
        connectors.sort_by_key(|c| c.descriptor().config.priority);
        connectors
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn log_outcome<T>(op: &str, connector: &str, result: &ConnectorResult<T>, elapsed: Duration) {
    let duration_ms = elapsed.as_millis() as u64;
    match result {
        Ok(_) => info!(connector, op, duration_ms, "Lifecycle operation succeeded"),
        Err(e) => error!(connector, op, duration_ms, error = %e, "Lifecycle operation failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use omniflow_shared::{EntityKind, PluginCapabilities, PluginRuntimeConfig};
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeConnector {
        id: String,
        module: ModuleKind,
        priority: u8,
        dependencies: Vec<String>,
        fail_initialize: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl FakeConnector {
        fn new(id: &str, module: ModuleKind, priority: u8, log: Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                id: id.to_string(),
                module,
                priority,
                dependencies: Vec::new(),
                fail_initialize: false,
                log,
            }
        }

        fn push(&self, op: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", op, self.id));
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        fn descriptor(&self) -> PluginDescriptor {
            PluginDescriptor {
                id: self.id.clone(),
                name: self.id.clone(),
                version: "0.0.1".to_string(),
                module: self.module,
                status: PluginStatus::Inactive,
                config: PluginRuntimeConfig {
                    priority: self.priority,
                    dependencies: self.dependencies.clone(),
                    ..PluginRuntimeConfig::default()
                },
                capabilities: PluginCapabilities::default(),
            }
        }

        async fn initialize(&self) -> ConnectorResult<()> {
            self.push("init");
            if self.fail_initialize {
                return Err(ConnectorError::connection_failed(
                    self.id.as_str(),
                    "refused",
                ));
            }
            Ok(())
        }

        async fn activate(&self) -> ConnectorResult<()> {
            self.push("activate");
            Ok(())
        }

        async fn deactivate(&self) -> ConnectorResult<()> {
            self.push("deactivate");
            Ok(())
        }

        async fn destroy(&self) -> ConnectorResult<()> {
            self.push("destroy");
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

    fn shared_log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_module() {
        let log = shared_log();
        let registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(FakeConnector::new("a", ModuleKind::Crm, 1, log.clone())))
            .await
            .unwrap();

        let err = registry
            .register(Arc::new(FakeConnector::new("b", ModuleKind::Crm, 2, log)))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration { .. }));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_startup_follows_priority_order() {
        let log = shared_log();
        let registry = ConnectorRegistry::new();
        // Registered out of order on purpose
        registry
            .register(Arc::new(FakeConnector::new(
                "beta",
                ModuleKind::Accounting,
                2,
                log.clone(),
            )))
            .await
            .unwrap();
        registry
            .register(Arc::new(FakeConnector::new(
                "alpha",
                ModuleKind::Crm,
                1,
                log.clone(),
            )))
            .await
            .unwrap();

        let pass = registry.initialize_all().await;
        assert_eq!(pass.succeeded, 2);
        let pass = registry.activate_all().await;
        assert_eq!(pass.succeeded, 2);

        assert_eq!(
            *log.lock().unwrap(),
            vec!["init:alpha", "init:beta", "activate:alpha", "activate:beta"]
        );
    }

    #[tokio::test]
    async fn test_shutdown_reverses_order() {
        let log = shared_log();
        let registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(FakeConnector::new("alpha", ModuleKind::Crm, 1, log.clone())))
            .await
            .unwrap();
        registry
            .register(Arc::new(FakeConnector::new(
                "beta",
                ModuleKind::Accounting,
                2,
                log.clone(),
            )))
            .await
            .unwrap();

        registry.initialize_all().await;
        registry.activate_all().await;
        log.lock().unwrap().clear();

        let pass = registry.deactivate_all().await;
        assert_eq!(pass.succeeded, 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["deactivate:beta", "deactivate:alpha"]
        );
    }

    #[tokio::test]
    async fn test_missing_dependency_skips_connector() {
        let log = shared_log();
        let registry = ConnectorRegistry::new();
        let mut dependent = FakeConnector::new("dependent", ModuleKind::Crm, 1, log.clone());
        dependent.dependencies = vec!["ghost".to_string()];
        registry.register(Arc::new(dependent)).await.unwrap();
        registry
            .register(Arc::new(FakeConnector::new(
                "standalone",
                ModuleKind::Accounting,
                2,
                log.clone(),
            )))
            .await
            .unwrap();

        let pass = registry.initialize_all().await;
        assert_eq!(pass.succeeded, 1);
        assert_eq!(pass.failures.len(), 1);
        assert!(pass.failures[0].contains("ghost"));

        // The dependent's own hook never ran, the other connector's did
        assert_eq!(*log.lock().unwrap(), vec!["init:standalone"]);
        let status = registry.get(ModuleKind::Crm).await.unwrap().status().await;
        assert_eq!(status, PluginStatus::Inactive);
    }

    #[tokio::test]
    async fn test_failed_connector_does_not_block_fleet() {
        let log = shared_log();
        let registry = ConnectorRegistry::new();
        let mut broken = FakeConnector::new("broken", ModuleKind::Crm, 1, log.clone());
        broken.fail_initialize = true;
        registry.register(Arc::new(broken)).await.unwrap();
        registry
            .register(Arc::new(FakeConnector::new(
                "good",
                ModuleKind::Accounting,
                2,
                log.clone(),
            )))
            .await
            .unwrap();

        let pass = registry.initialize_all().await;
        assert_eq!(pass.attempted, 2);
        assert_eq!(pass.succeeded, 1);
        assert!(!pass.all_succeeded());

        // Activation only touches the survivor
        let pass = registry.activate_all().await;
        assert_eq!(pass.attempted, 1);
        assert_eq!(
            registry.get(ModuleKind::Crm).await.unwrap().status().await,
            PluginStatus::Error
        );
        assert_eq!(
            registry
                .get(ModuleKind::Accounting)
                .await
                .unwrap()
                .status()
                .await,
            PluginStatus::Active
        );
    }

    #[tokio::test]
    async fn test_sync_routes_to_module() {
        let log = shared_log();
        let registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(FakeConnector::new("crm", ModuleKind::Crm, 1, log)))
            .await
            .unwrap();
        registry.initialize_all().await;
        registry.activate_all().await;

        let batch = SyncBatch::new(EntityKind::Company, vec![json!({"name": "Initech"})]);
        let report = registry
            .sync(ModuleKind::Crm, SyncDirection::Outbound, batch.clone())
            .await
            .unwrap();
        assert_eq!(report.synced, 1);

        let err = registry
            .sync(ModuleKind::Accounting, SyncDirection::Outbound, batch)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_health_reports_by_name() {
        let log = shared_log();
        let registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(FakeConnector::new("crm", ModuleKind::Crm, 1, log.clone())))
            .await
            .unwrap();
        registry
            .register(Arc::new(FakeConnector::new(
                "erp",
                ModuleKind::Accounting,
                2,
                log,
            )))
            .await
            .unwrap();

        registry.initialize_all().await;
        registry.activate_all().await;
        let health = registry.health().await;
        assert_eq!(health.len(), 2);
        assert!(health["crm"]);
        assert!(health["erp"]);

        // Deactivated connectors stop reporting healthy
        registry.deactivate(ModuleKind::Crm).await.unwrap();
        let health = registry.health().await;
        assert!(!health["crm"]);
        assert!(health["erp"]);
    }

    #[tokio::test]
    async fn test_descriptors_fold_in_live_status() {
        let log = shared_log();
        let registry = ConnectorRegistry::new();
        registry
            .register(Arc::new(FakeConnector::new("crm", ModuleKind::Crm, 1, log)))
            .await
            .unwrap();
        registry.initialize_all().await;

        let descriptors = registry.descriptors().await;
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].status, PluginStatus::Loading);
    }
}
