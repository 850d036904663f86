//! Instance and deployment inventory used to annotate log records.
//!
//! The inventory is loaded for the stream's date range. For live ranges a
//! background task reloads it on a fixed interval so new instances show up
//! while the stream runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::date_range::DateRange;
use crate::error::SourceError;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub deployment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: Option<String>,
}

/// What a log record gets annotated with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub instance_id: String,
    pub instance_name: String,
    pub deployment_id: Option<String>,
}

/// Where instances and deployments come from
#[async_trait]
pub trait InstancesSource: Send + Sync + 'static {
    async fn list_instances(&self, range: &DateRange) -> Result<Vec<Instance>, SourceError>;
    async fn list_deployments(&self, range: &DateRange) -> Result<Vec<Deployment>, SourceError>;
}

/// Resolves instance ids while converting records
#[async_trait]
pub trait InstanceLookup: Send + Sync {
    async fn lookup(&self, instance_id: &str) -> Option<InstanceInfo>;
}

/// Fixed inventory, replaceable at runtime
#[derive(Debug, Default)]
pub struct StaticInstancesSource {
    instances: Mutex<Vec<Instance>>,
    deployments: Mutex<Vec<Deployment>>,
}

impl StaticInstancesSource {
    pub fn new(instances: Vec<Instance>, deployments: Vec<Deployment>) -> Self {
        Self {
            instances: Mutex::new(instances),
            deployments: Mutex::new(deployments),
        }
    }

    pub fn set_instances(&self, instances: Vec<Instance>) {
        if let Ok(mut current) = self.instances.lock() {
            *current = instances;
        }
    }
}

#[async_trait]
impl InstancesSource for StaticInstancesSource {
    async fn list_instances(&self, _range: &DateRange) -> Result<Vec<Instance>, SourceError> {
        self.instances
            .lock()
            .map(|instances| instances.clone())
            .map_err(|err| SourceError(err.to_string()))
    }

    async fn list_deployments(&self, _range: &DateRange) -> Result<Vec<Deployment>, SourceError> {
        self.deployments
            .lock()
            .map(|deployments| deployments.clone())
            .map_err(|err| SourceError(err.to_string()))
    }
}

#[derive(Debug, Default)]
struct Inventory {
    range: Option<DateRange>,
    instances: HashMap<String, Instance>,
    deployments: HashMap<String, Deployment>,
    /// Ids already looked up without success since the last reload
    misses: HashSet<String>,
}

/// Loads and caches the inventory, refreshing it periodically for live ranges
pub struct InstancesManager<S: InstancesSource> {
    source: Arc<S>,
    inventory: Arc<RwLock<Inventory>>,
    refresh_interval: Duration,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

async fn load(source: &dyn InstancesSource, inventory: &RwLock<Inventory>) -> Result<(), SourceError> {
    let Some(range) = inventory.read().await.range else {
        return Ok(());
    };

    let instances = source.list_instances(&range).await?;
    let deployments = source.list_deployments(&range).await?;

    let mut inventory = inventory.write().await;
    inventory.instances = instances.into_iter().map(|i| (i.id.clone(), i)).collect();
    inventory.deployments = deployments.into_iter().map(|d| (d.id.clone(), d)).collect();
    inventory.misses.clear();
    debug!(
        instances = inventory.instances.len(),
        deployments = inventory.deployments.len(),
        "instances inventory refreshed"
    );
    Ok(())
}

impl<S: InstancesSource> InstancesManager<S> {
    pub fn new(source: Arc<S>, refresh_interval: Duration) -> Self {
        Self {
            source,
            inventory: Arc::new(RwLock::new(Inventory::default())),
            refresh_interval,
            refresh_task: Mutex::new(None),
        }
    }

    /// Load the inventory for `range`. Live ranges also start auto-refresh.
    pub async fn start(&self, range: &DateRange) -> Result<(), SourceError> {
        self.stop();
        self.inventory.write().await.range = Some(*range);
        load(self.source.as_ref(), &self.inventory).await?;

        if range.is_live() {
            let source = Arc::clone(&self.source);
            let inventory = Arc::clone(&self.inventory);
            let period = self.refresh_interval;
            let task = tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // The first tick completes immediately and the inventory is fresh
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if let Err(err) = load(source.as_ref(), &inventory).await {
                        warn!(error = %err, "instances auto-refresh failed, keeping previous inventory");
                    }
                }
            });
            if let Ok(mut slot) = self.refresh_task.lock() {
                *slot = Some(task);
            }
        }
        Ok(())
    }

    /// Stop auto-refresh. The loaded inventory stays available.
    pub fn stop(&self) {
        if let Ok(mut slot) = self.refresh_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.refresh_task
            .lock()
            .map(|slot| slot.as_ref().is_some_and(|task| !task.is_finished()))
            .unwrap_or(false)
    }

    pub async fn refresh(&self) -> Result<(), SourceError> {
        load(self.source.as_ref(), &self.inventory).await
    }

    pub async fn instance(&self, id: &str) -> Option<Instance> {
        self.inventory.read().await.instances.get(id).cloned()
    }

    pub async fn deployment(&self, id: &str) -> Option<Deployment> {
        self.inventory.read().await.deployments.get(id).cloned()
    }

    pub async fn deployment_for_instance(&self, instance_id: &str) -> Option<Deployment> {
        let inventory = self.inventory.read().await;
        let deployment_id = inventory.instances.get(instance_id)?.deployment_id.as_ref()?;
        inventory.deployments.get(deployment_id).cloned()
    }

    pub async fn instance_count(&self) -> usize {
        self.inventory.read().await.instances.len()
    }

    async fn info(&self, instance_id: &str) -> Option<InstanceInfo> {
        self.instance(instance_id).await.map(|instance| InstanceInfo {
            instance_id: instance.id,
            instance_name: instance.name,
            deployment_id: instance.deployment_id,
        })
    }
}

#[async_trait]
impl<S: InstancesSource> InstanceLookup for InstancesManager<S> {
    /// An unknown id triggers one reload, since the instance may have just
    /// started. It is not retried until the inventory is reloaded again.
    async fn lookup(&self, instance_id: &str) -> Option<InstanceInfo> {
        if let Some(info) = self.info(instance_id).await {
            return Some(info);
        }
        if self.inventory.read().await.misses.contains(instance_id) {
            return None;
        }

        let refreshed = self.refresh().await;
        let info = self.info(instance_id).await;
        if info.is_none() {
            self.inventory.write().await.misses.insert(instance_id.to_string());
        }
        if let Err(err) = refreshed {
            warn!(error = %err, instance_id, "instances refresh on lookup miss failed");
        }
        info
    }
}

impl<S: InstancesSource> Drop for InstancesManager<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instance(id: &str, deployment: Option<&str>) -> Instance {
        Instance {
            id: id.to_string(),
            name: format!("{}-name", id),
            deployment_id: deployment.map(str::to_string),
        }
    }

    fn bounded() -> DateRange {
        DateRange::new(Utc::now() - chrono::Duration::hours(1), Some(Utc::now())).unwrap()
    }

    struct CountingSource {
        inner: StaticInstancesSource,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InstancesSource for CountingSource {
        async fn list_instances(&self, range: &DateRange) -> Result<Vec<Instance>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.list_instances(range).await
        }

        async fn list_deployments(&self, range: &DateRange) -> Result<Vec<Deployment>, SourceError> {
            self.inner.list_deployments(range).await
        }
    }

    #[tokio::test]
    async fn test_start_loads_inventory() {
        let source = Arc::new(StaticInstancesSource::new(
            vec![instance("i-1", Some("d-1"))],
            vec![Deployment {
                id: "d-1".to_string(),
                created_at: None,
                state: Some("active".to_string()),
            }],
        ));
        let manager = InstancesManager::new(source, DEFAULT_REFRESH_INTERVAL);
        manager.start(&bounded()).await.unwrap();

        assert_eq!(manager.instance("i-1").await.unwrap().name, "i-1-name");
        assert_eq!(manager.deployment_for_instance("i-1").await.unwrap().id, "d-1");
        assert!(manager.deployment_for_instance("i-2").await.is_none());
        assert!(!manager.is_auto_refreshing());
    }

    #[tokio::test]
    async fn test_lookup_miss_refreshes_once() {
        let source = Arc::new(StaticInstancesSource::new(vec![], vec![]));
        let manager = InstancesManager::new(Arc::clone(&source), DEFAULT_REFRESH_INTERVAL);
        manager.start(&bounded()).await.unwrap();

        source.set_instances(vec![instance("i-9", None)]);
        let info = manager.lookup("i-9").await.unwrap();
        assert_eq!(info.instance_name, "i-9-name");
        assert!(manager.lookup("i-404").await.is_none());
    }

    #[tokio::test]
    async fn test_repeated_misses_reload_once_until_next_refresh() {
        let source = Arc::new(CountingSource {
            inner: StaticInstancesSource::new(vec![instance("i-1", None)], vec![]),
            calls: AtomicUsize::new(0),
        });
        let manager = InstancesManager::new(Arc::clone(&source), DEFAULT_REFRESH_INTERVAL);
        manager.start(&bounded()).await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        for _ in 0..100 {
            assert!(manager.lookup("i-gone").await.is_none());
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // Known ids never reload
        assert!(manager.lookup("i-1").await.is_some());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // A new reload forgets the misses, so the id gets one more chance
        source.inner.set_instances(vec![instance("i-gone", None)]);
        manager.refresh().await.unwrap();
        assert_eq!(manager.lookup("i-gone").await.unwrap().instance_name, "i-gone-name");
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_range_auto_refreshes() {
        let source = Arc::new(CountingSource {
            inner: StaticInstancesSource::new(vec![instance("i-1", None)], vec![]),
            calls: AtomicUsize::new(0),
        });
        let manager = InstancesManager::new(Arc::clone(&source), Duration::from_secs(2));
        manager.start(&DateRange::live(Utc::now())).await.unwrap();
        assert!(manager.is_auto_refreshing());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(4_100)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);

        manager.stop();
        assert!(!manager.is_auto_refreshing());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }
}
