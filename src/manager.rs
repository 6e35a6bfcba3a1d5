//! Emulator sessions and their realtime collection loops.
//!
//! One session per MDN. A session may own a realtime task that samples the
//! vehicle every collection interval and hands full batches to the storage
//! manager as GPS cycles.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{CollectionConfig, EmulatorConfig};
use crate::errors::EmulatorError;
use crate::generator::{LogGenerator, TrackSample, VehicleState};
use crate::models::{Emulator, GeofenceEvent, GpsCycle, LogReport, Mdn};
use crate::storage::{Delivery, LogStorageManager, PendingLog};

/// Point-in-time view of one session
#[derive(Debug, Clone, PartialEq)]
pub struct EmulatorStatus {
    pub mdn: Mdn,
    pub vehicle_id: u64,
    pub active: bool,
    pub realtime: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub trip_meter: u32,
    pub last_update: Option<DateTime<Utc>>,
}

struct RealtimeTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RealtimeTask {
    fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel and wait for the final flush
    async fn stop(self, mdn: Mdn) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            error!(%mdn, "Realtime task failed: {}", e);
        }
    }
}

struct Session {
    emulator: Emulator,
    state: VehicleState,
    realtime: Option<RealtimeTask>,
}

impl Session {
    fn status(&self) -> EmulatorStatus {
        EmulatorStatus {
            mdn: self.emulator.mdn(),
            vehicle_id: self.emulator.vehicle_id(),
            active: self.state.active,
            realtime: self.realtime.as_ref().is_some_and(RealtimeTask::is_running),
            latitude: self.state.latitude,
            longitude: self.state.longitude,
            trip_meter: self.state.trip_meter(),
            last_update: self.state.last_update,
        }
    }
}

struct Registry {
    sessions: HashMap<Mdn, Session>,
    generator: LogGenerator,
}

impl Registry {
    fn session_mut(&mut self, mdn: Mdn) -> Result<&mut Session, EmulatorError> {
        self.sessions.get_mut(&mdn).ok_or(EmulatorError::NotFound(mdn))
    }
}

struct Inner {
    registry: Mutex<Registry>,
    storage: Arc<LogStorageManager>,
    emulator: EmulatorConfig,
    collection: CollectionConfig,
}

/// Owns every emulator session; cheap to clone.
#[derive(Clone)]
pub struct EmulatorManager {
    inner: Arc<Inner>,
}

impl EmulatorManager {
    pub fn new(
        storage: Arc<LogStorageManager>,
        emulator: EmulatorConfig,
        collection: CollectionConfig,
    ) -> Self {
        Self::with_generator(storage, emulator, collection, LogGenerator::from_entropy())
    }

    pub fn with_generator(
        storage: Arc<LogStorageManager>,
        emulator: EmulatorConfig,
        collection: CollectionConfig,
        generator: LogGenerator,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    sessions: HashMap::new(),
                    generator,
                }),
                storage,
                emulator,
                collection,
            }),
        }
    }

    pub fn storage(&self) -> &Arc<LogStorageManager> {
        &self.inner.storage
    }

    /// Switch an emulator on, creating its session if needed.
    ///
    /// A restarted session keeps its trip meter and parked position.
    pub async fn start(&self, emulator: Emulator) -> Result<Delivery, EmulatorError> {
        let mdn = emulator.mdn();
        let log = {
            let mut registry = self.inner.registry.lock().await;
            let Registry {
                sessions,
                generator,
            } = &mut *registry;

            if sessions.get(&mdn).is_some_and(|s| s.state.active) {
                return Err(EmulatorError::AlreadyActive(mdn));
            }

            let config = &self.inner.emulator;
            let fresh = generator.start_state(
                config.default_latitude,
                config.default_longitude,
                config.start_jitter,
            );
            let session = sessions.entry(mdn).or_insert_with(|| Session {
                emulator: emulator.clone(),
                state: fresh.clone(),
                realtime: None,
            });
            session.emulator = emulator.clone();
            session.state.latitude = fresh.latitude;
            session.state.longitude = fresh.longitude;

            generator.power_on(&session.emulator, &mut session.state, Utc::now())?
        };

        info!(
            %mdn,
            latitude = log.gps_info().latitude(),
            longitude = log.gps_info().longitude(),
            "Emulator started"
        );
        self.inner.storage.register_emulator(&emulator).await?;
        self.inner
            .storage
            .store(&emulator, LogReport::Power(log))
            .await
    }

    /// Switch an emulator off, flushing its realtime batch first
    pub async fn stop(&self, mdn: Mdn) -> Result<Delivery, EmulatorError> {
        let realtime = {
            let mut registry = self.inner.registry.lock().await;
            let session = registry.session_mut(mdn)?;
            if !session.state.active {
                return Err(EmulatorError::Inactive(mdn));
            }
            session.realtime.take()
        };
        if let Some(task) = realtime {
            task.stop(mdn).await;
        }

        self.power_off(mdn).await
    }

    /// Emit the power-OFF log; also stops a realtime task started since `stop` began
    async fn power_off(&self, mdn: Mdn) -> Result<Delivery, EmulatorError> {
        let (emulator, log, late_task) = {
            let mut registry = self.inner.registry.lock().await;
            let Registry {
                sessions,
                generator,
            } = &mut *registry;
            let session = sessions.get_mut(&mdn).ok_or(EmulatorError::NotFound(mdn))?;
            if !session.state.active {
                return Err(EmulatorError::Inactive(mdn));
            }
            let log = generator.power_off(&session.emulator, &mut session.state, Utc::now())?;
            (session.emulator.clone(), log, session.realtime.take())
        };
        if let Some(task) = late_task {
            task.stop(mdn).await;
        }

        info!(%mdn, trip_meter = log.total_trip_meter(), "Emulator stopped");
        self.inner
            .storage
            .store(&emulator, LogReport::Power(log))
            .await
    }

    /// Stop every active emulator, returning how many were stopped
    pub async fn stop_all(&self) -> usize {
        let active: Vec<Mdn> = {
            let registry = self.inner.registry.lock().await;
            let mut mdns: Vec<Mdn> = registry
                .sessions
                .values()
                .filter(|s| s.state.active)
                .map(|s| s.emulator.mdn())
                .collect();
            mdns.sort();
            mdns
        };

        let mut stopped = 0;
        for mdn in active {
            match self.stop(mdn).await {
                Ok(_) => stopped += 1,
                Err(e) => warn!(%mdn, "Failed to stop emulator: {}", e),
            }
        }
        stopped
    }

    /// Produce one full GPS cycle for the current minute of an active emulator
    pub async fn generate(
        &self,
        mdn: Mdn,
        store: bool,
    ) -> Result<(GpsCycle, Option<Delivery>), EmulatorError> {
        let now = Utc::now();
        let start = now
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);

        let (emulator, cycle) = {
            let mut registry = self.inner.registry.lock().await;
            let Registry {
                sessions,
                generator,
            } = &mut *registry;
            let session = sessions.get_mut(&mdn).ok_or(EmulatorError::NotFound(mdn))?;
            if !session.state.active {
                return Err(EmulatorError::Inactive(mdn));
            }
            let cycle = generator.gps_cycle(&session.emulator, &mut session.state, start)?;
            (session.emulator.clone(), cycle)
        };

        debug!(%mdn, samples = cycle.len(), "Generated GPS cycle");
        if !store {
            return Ok((cycle, None));
        }
        let delivery = self
            .inner
            .storage
            .store(&emulator, LogReport::GpsCycle(cycle.clone()))
            .await?;
        Ok((cycle, Some(delivery)))
    }

    /// Spawn the realtime loop; `false` when one is already running
    pub async fn start_realtime(&self, mdn: Mdn, store: bool) -> Result<bool, EmulatorError> {
        let mut registry = self.inner.registry.lock().await;
        let session = registry.session_mut(mdn)?;
        if !session.state.active {
            return Err(EmulatorError::Inactive(mdn));
        }
        if session.realtime.as_ref().is_some_and(RealtimeTask::is_running) {
            return Ok(false);
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(self.clone().run_realtime(mdn, store, token.clone()));
        session.realtime = Some(RealtimeTask { token, handle });

        info!(
            %mdn,
            interval = ?self.inner.collection.interval,
            batch_size = self.inner.collection.batch_size,
            "Realtime collection started"
        );
        Ok(true)
    }

    /// Stop the realtime loop; `false` when none was running
    pub async fn stop_realtime(&self, mdn: Mdn) -> Result<bool, EmulatorError> {
        let task = {
            let mut registry = self.inner.registry.lock().await;
            registry.session_mut(mdn)?.realtime.take()
        };
        match task {
            Some(task) => {
                let running = task.is_running();
                task.stop(mdn).await;
                info!(%mdn, "Realtime collection stopped");
                Ok(running)
            }
            None => Ok(false),
        }
    }

    /// Report a geofence crossing at the vehicle's current position
    pub async fn geofence(
        &self,
        mdn: Mdn,
        geofence_group_id: u64,
        geofence_id: u64,
        event: GeofenceEvent,
    ) -> Result<Delivery, EmulatorError> {
        let (emulator, log) = {
            let mut registry = self.inner.registry.lock().await;
            let Registry {
                sessions,
                generator,
            } = &mut *registry;
            let session = sessions.get_mut(&mdn).ok_or(EmulatorError::NotFound(mdn))?;
            let log = generator.geofence(
                &session.emulator,
                &session.state,
                geofence_group_id,
                geofence_id,
                event,
                Utc::now(),
            )?;
            (session.emulator.clone(), log)
        };

        info!(%mdn, geofence_group_id, geofence_id, ?event, "Geofence event");
        self.inner
            .storage
            .store(&emulator, LogReport::Geofence(log))
            .await
    }

    pub async fn status(&self, mdn: Mdn) -> Result<EmulatorStatus, EmulatorError> {
        let registry = self.inner.registry.lock().await;
        registry
            .sessions
            .get(&mdn)
            .map(Session::status)
            .ok_or(EmulatorError::NotFound(mdn))
    }

    /// Every session, ordered by MDN
    pub async fn list(&self) -> Vec<EmulatorStatus> {
        let registry = self.inner.registry.lock().await;
        let mut statuses: Vec<EmulatorStatus> =
            registry.sessions.values().map(Session::status).collect();
        statuses.sort_by_key(|s| s.mdn);
        statuses
    }

    pub async fn exists(&self, mdn: Mdn) -> bool {
        self.inner.registry.lock().await.sessions.contains_key(&mdn)
    }

    pub async fn is_active(&self, mdn: Mdn) -> bool {
        self.inner
            .registry
            .lock()
            .await
            .sessions
            .get(&mdn)
            .is_some_and(|s| s.state.active)
    }

    /// Undelivered logs of a known emulator
    pub async fn pending(&self, mdn: Mdn) -> Result<Vec<PendingLog>, EmulatorError> {
        if !self.exists(mdn).await {
            return Err(EmulatorError::NotFound(mdn));
        }
        Ok(self.inner.storage.pending(mdn).await)
    }

    async fn run_realtime(self, mdn: Mdn, store: bool, token: CancellationToken) {
        let collection = self.inner.collection.clone();
        let mut ticker = tokio::time::interval(collection.interval);
        let mut samples: Vec<TrackSample> = Vec::with_capacity(collection.batch_size);
        let mut last_send = Instant::now();

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(%mdn, "Realtime collection cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sample(mdn).await {
                        Ok(Some(sample)) => samples.push(sample),
                        Ok(None) => continue,
                        Err(e) => {
                            error!(%mdn, "Realtime sampling stopped: {}", e);
                            break;
                        }
                    }
                    if samples.len() >= collection.batch_size
                        || last_send.elapsed() >= collection.send_interval
                    {
                        self.flush(mdn, &mut samples, store).await;
                        last_send = Instant::now();
                    }
                }
            }
        }

        self.flush(mdn, &mut samples, store).await;
    }

    /// Advance an active vehicle by one sample; `None` while it is switched off
    async fn sample(&self, mdn: Mdn) -> Result<Option<TrackSample>, EmulatorError> {
        let mut registry = self.inner.registry.lock().await;
        let Registry {
            sessions,
            generator,
        } = &mut *registry;
        let session = sessions.get_mut(&mdn).ok_or(EmulatorError::NotFound(mdn))?;
        if !session.state.active {
            return Ok(None);
        }
        Ok(Some(session.state.advance(Utc::now(), generator.rng())))
    }

    async fn flush(&self, mdn: Mdn, samples: &mut Vec<TrackSample>, store: bool) {
        if samples.is_empty() {
            return;
        }

        let batch = std::mem::take(samples);
        let built = {
            let mut registry = self.inner.registry.lock().await;
            let Registry {
                sessions,
                generator,
            } = &mut *registry;
            match sessions.get(&mdn) {
                Some(session) => generator
                    .cycle_from_samples(&session.emulator, &batch)
                    .map(|cycle| (session.emulator.clone(), cycle)),
                None => return,
            }
        };

        let (emulator, cycle) = match built {
            Ok(built) => built,
            Err(e) => {
                error!(%mdn, "Discarding realtime batch: {}", e);
                return;
            }
        };

        if !store {
            debug!(%mdn, samples = cycle.len(), "Realtime batch collected");
            return;
        }
        match self
            .inner
            .storage
            .store(&emulator, LogReport::GpsCycle(cycle))
            .await
        {
            Ok(delivery) => debug!(%mdn, ?delivery, samples = batch.len(), "Realtime batch stored"),
            Err(e) => error!(%mdn, "Failed to store realtime batch: {}", e),
        }
    }
}
