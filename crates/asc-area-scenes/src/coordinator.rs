//! Refresh coordinator
//!
//! Owns the current registry snapshot, refreshes it when either registry
//! reports a change, and fans the new snapshot out to subscribers. Refresh
//! requests arriving while a fetch is in flight are coalesced: they await
//! the in-flight fetch instead of starting another, so at most one fetch
//! runs at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use asc_core::events::{AreaRegistryUpdatedData, EntityRegistryUpdatedData};
use asc_core::SCENE_DOMAIN;
use asc_event_bus::EventBus;
use asc_registries::{AreaRegistry, EntityRegistry};

use crate::snapshot::{build_snapshot, AreaScenesSnapshot};

/// Errors surfaced by a snapshot fetch
#[derive(Debug, Clone, Error)]
pub enum SnapshotError {
    #[error("registry read failed: {0}")]
    RegistryRead(String),
}

/// Errors surfaced by a refresh request
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] SnapshotError),

    /// A coalesced request found no snapshot installed after the in-flight
    /// fetch finished (it failed and none existed before).
    #[error("no snapshot available")]
    NoSnapshot,
}

/// Source of registry snapshots
///
/// The production source reads the registries directly; tests substitute
/// sources with controllable latency and failure behavior.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<AreaScenesSnapshot, SnapshotError>;
}

/// Snapshot source backed by the live registries
pub struct RegistrySnapshotSource {
    areas: Arc<AreaRegistry>,
    entities: Arc<EntityRegistry>,
}

impl RegistrySnapshotSource {
    pub fn new(areas: Arc<AreaRegistry>, entities: Arc<EntityRegistry>) -> Self {
        Self { areas, entities }
    }
}

#[async_trait]
impl SnapshotSource for RegistrySnapshotSource {
    async fn fetch(&self) -> Result<AreaScenesSnapshot, SnapshotError> {
        Ok(build_snapshot(&self.areas, &self.entities))
    }
}

type SnapshotListener = Arc<dyn Fn(&Arc<AreaScenesSnapshot>) + Send + Sync>;

/// Deregistration handle for a coordinator subscription
///
/// The listener is removed when this is dropped (or `unsubscribe` is called
/// explicitly), so holders cannot leak listeners past their own lifetime.
pub struct Subscription {
    id: u64,
    coordinator: Weak<AreaScenesCoordinator>,
}

impl Subscription {
    /// Remove the listener now
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.remove_listener(self.id);
        }
    }
}

/// Coordinates snapshot refreshes for the area-scenes integration
pub struct AreaScenesCoordinator {
    source: Arc<dyn SnapshotSource>,
    bus: Arc<EventBus>,
    entities: Arc<EntityRegistry>,

    /// The most recently installed snapshot
    current: RwLock<Option<Arc<AreaScenesSnapshot>>>,

    /// Receiver for the in-flight fetch, if any; the sender flips it to true
    /// when the fetch (successful or not) completes.
    in_flight: Mutex<Option<watch::Receiver<bool>>>,

    listeners: Mutex<Vec<(u64, SnapshotListener)>>,
    next_listener_id: AtomicU64,

    /// Number of fetches actually executed (coalesced requests don't count)
    refresh_count: AtomicU64,

    tasks: Mutex<Vec<JoinHandle<()>>>,
}

enum RefreshRole {
    Leader(watch::Sender<bool>),
    Follower(watch::Receiver<bool>),
}

impl AreaScenesCoordinator {
    /// Create a new coordinator
    ///
    /// `entities` is consulted when an entity-registry event arrives, to
    /// recover the affected entity's domain.
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        bus: Arc<EventBus>,
        entities: Arc<EntityRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            bus,
            entities,
            current: RwLock::new(None),
            in_flight: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            refresh_count: AtomicU64::new(0),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// The current snapshot, if one has been installed
    pub fn current(&self) -> Option<Arc<AreaScenesSnapshot>> {
        self.current.read().unwrap().clone()
    }

    /// Number of fetches executed so far
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    /// Refresh the snapshot, coalescing with any in-flight fetch
    ///
    /// On success every caller (leader and coalesced followers alike)
    /// observes the snapshot produced by the single fetch that ran.
    /// A failed fetch leaves the previous snapshot installed.
    pub async fn request_refresh(&self) -> Result<Arc<AreaScenesSnapshot>, RefreshError> {
        let role = {
            let mut slot = self.in_flight.lock().unwrap();
            match slot.as_ref() {
                Some(rx) => RefreshRole::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(false);
                    *slot = Some(rx);
                    RefreshRole::Leader(tx)
                }
            }
        };

        match role {
            RefreshRole::Follower(mut rx) => {
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
                self.current().ok_or(RefreshError::NoSnapshot)
            }
            RefreshRole::Leader(tx) => {
                self.refresh_count.fetch_add(1, Ordering::SeqCst);
                debug!("Fetching area/scene snapshot");

                let result = self.source.fetch().await;
                *self.in_flight.lock().unwrap() = None;

                let outcome = match result {
                    Ok(snapshot) => {
                        let snapshot = Arc::new(snapshot);
                        *self.current.write().unwrap() = Some(Arc::clone(&snapshot));
                        debug!(
                            areas = snapshot.areas.len(),
                            scened_areas = snapshot.scenes.len(),
                            "Installed new snapshot"
                        );
                        self.notify_listeners(&snapshot);
                        Ok(snapshot)
                    }
                    Err(err) => {
                        warn!("Snapshot refresh failed, keeping previous data: {}", err);
                        Err(err.into())
                    }
                };

                let _ = tx.send(true);
                outcome
            }
        }
    }

    /// Register a listener invoked after every successful snapshot replacement
    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&Arc<AreaScenesSnapshot>) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().unwrap().push((id, Arc::new(listener)));
        Subscription {
            id,
            coordinator: Arc::downgrade(self),
        }
    }

    fn remove_listener(&self, id: u64) {
        self.listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    fn notify_listeners(&self, snapshot: &Arc<AreaScenesSnapshot>) {
        // Snapshot the list first: listeners may subscribe or unsubscribe
        // re-entrantly (the lifecycle manager creates selectors, which
        // subscribe, from inside this notification).
        let listeners: Vec<SnapshotListener> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }

    /// Start listening for registry change events
    ///
    /// Area-registry events always trigger a refresh. Entity-registry events
    /// trigger one when the affected entity belongs to the scene domain; if
    /// the entity can no longer be resolved (it was just deleted) the event
    /// is conservatively treated as relevant; a spurious refresh is cheaper
    /// than a missed change.
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().unwrap();

        let weak = Arc::downgrade(self);
        let mut area_rx = self.bus.subscribe_typed::<AreaRegistryUpdatedData>();
        tasks.push(tokio::spawn(async move {
            while let Ok(event) = area_rx.recv().await {
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                debug!(area_id = %event.data.area_id, "Area registry updated");
                let _ = coordinator.request_refresh().await;
            }
        }));

        let weak = Arc::downgrade(self);
        let mut entity_rx = self.bus.subscribe_typed::<EntityRegistryUpdatedData>();
        tasks.push(tokio::spawn(async move {
            while let Ok(event) = entity_rx.recv().await {
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                if coordinator.is_relevant_entity_event(&event.data.entity_id) {
                    debug!(entity_id = %event.data.entity_id, "Scene entity registry updated");
                    let _ = coordinator.request_refresh().await;
                }
            }
        }));
    }

    fn is_relevant_entity_event(&self, entity_id: &str) -> bool {
        match self.entities.get(entity_id) {
            Some(entry) => entry.domain() == SCENE_DOMAIN,
            // Entity gone and unrecoverable: refresh anyway
            None => true,
        }
    }

    /// Stop the registry event listeners
    pub fn shutdown(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}

impl Drop for AreaScenesCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
