// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Supervisor (spec §4.7): the external contract the API layer calls.
//! Drives the Config Store, Port Allocator, Virtual NIC Manager, Recipe
//! Compiler, Media Server Controller, and per-camera ONVIF Endpoints
//! through the transactional start sequence and the best-effort stop
//! sequence, under the ordering rules in spec §5 (O1, O2).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, Notify, RwLock};
use tracing::{info, warn};

use crate::config::{Camera, CameraStatus, ConfigStore};
use crate::error::{GatewayError, Result};
use crate::mediaserver::MediaServerController;
use crate::onvif::OnvifEndpoint;
use crate::ports::PortAllocator;
use crate::recipe::MediaRecipeCompiler;
use crate::vnic::VirtualNicBackend;

/// Budget for the "wait for the media server to report ready" suspension
/// point in the start sequence (spec §4.7 step 4).
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);
const READY_POLL_BUDGET: Duration = Duration::from_secs(20);

/// Shared deadline for `stop_all` (spec §4.7).
const STOP_ALL_DEADLINE: Duration = Duration::from_secs(15);

/// A cooperative cancellation token with a deadline. Hand-rolled rather than
/// pulling in a dedicated crate: the only consumer is the Supervisor's own
/// start sequence, and the full semantics (cancel-propagation trees) of a
/// generic cancellation-token crate would be unused weight.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<std::sync::atomic::AtomicBool>,
    notify: Arc<Notify>,
    deadline: Instant,
}

impl CancellationToken {
    fn new(budget: Duration) -> Self {
        Self {
            cancelled: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
            deadline: Instant::now() + budget,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(std::sync::atomic::Ordering::SeqCst) || Instant::now() >= self.deadline
    }

    fn check(&self) -> Result<()> {
        if self.cancelled.load(std::sync::atomic::Ordering::SeqCst) {
            Err(GatewayError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Err(GatewayError::Timeout(self.deadline.saturating_duration_since(Instant::now())))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEntry {
    pub id: u32,
    pub status: CameraStatus,
    pub assigned_ip: Option<String>,
    pub last_error: Option<String>,
    /// Lifetime media-server (re)spawn count, uncapped (spec §9). Shared
    /// across all cameras since there is one media-server process; a
    /// climbing number here is the visible signal of a flapping encoder.
    pub media_restart_count: usize,
}

struct PerCamera {
    lock: Arc<AsyncMutex<()>>,
}

pub struct Supervisor {
    config: Arc<ConfigStore>,
    media: Arc<MediaServerController>,
    vnic: Box<dyn VirtualNicBackend>,
    vnic_capability: bool,
    bind_ip: String,
    per_camera: std::sync::Mutex<HashMap<u32, PerCamera>>,
    fleet_lock: RwLock<()>,
    endpoints: AsyncMutex<HashMap<u32, OnvifEndpoint>>,
    in_flight_starts: std::sync::Mutex<HashMap<u32, CancellationToken>>,
}

impl Supervisor {
    pub fn new(config: Arc<ConfigStore>, media: Arc<MediaServerController>, vnic: Box<dyn VirtualNicBackend>) -> Self {
        let vnic_capability = vnic.capability_available();
        let bind_ip = config.settings().bind_ip.resolve();
        Self {
            config,
            media,
            vnic,
            vnic_capability,
            bind_ip,
            per_camera: std::sync::Mutex::new(HashMap::new()),
            fleet_lock: RwLock::new(()),
            endpoints: AsyncMutex::new(HashMap::new()),
            in_flight_starts: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn camera_lock(&self, id: u32) -> Arc<AsyncMutex<()>> {
        let mut map = self.per_camera.lock().unwrap();
        map.entry(id).or_insert_with(|| PerCamera { lock: Arc::new(AsyncMutex::new(())) }).lock.clone()
    }

    /// Transactional start sequence (spec §4.7). On any failure, prior
    /// side effects are reversed and the camera is left `failed` with
    /// `last_error` set.
    pub async fn start_camera(&self, id: u32) -> Result<()> {
        let _fleet_guard = self.fleet_lock.read().await;
        self.start_camera_exclusive(id).await
    }

    /// Same as `start_camera` but assumes the caller already holds the
    /// fleet lock (used by `start_all`, which holds the write half for its
    /// whole sequential run, and by `update_camera`, which holds the read
    /// half across its own stop+start).
    async fn start_camera_exclusive(&self, id: u32) -> Result<()> {
        let cam_lock = self.camera_lock(id);
        let _guard = cam_lock.lock().await;

        let token = CancellationToken::new(READY_POLL_BUDGET + Duration::from_secs(30));
        self.in_flight_starts.lock().unwrap().insert(id, token.clone());
        let result = self.start_camera_locked(id, &token).await;
        self.in_flight_starts.lock().unwrap().remove(&id);

        if let Err(e) = &result {
            if let Ok(mut camera) = self.config.get_camera(id) {
                camera.status = CameraStatus::Failed;
                camera.last_error = Some(e.to_string());
                let _ = self.config.put_camera(camera);
            }
            self.fail_other_running_on_media_dead(Some(id), e);
        }
        result
    }

    /// All cameras share one media server; when it's declared unrecoverable
    /// (spec §8 scenario 6: "status transitions to `failed` for all affected
    /// cameras"), every other camera still marked `Running` loses its stream
    /// too, not just the one operation that happened to observe the error.
    /// `exclude_id` is the camera whose own operation already recorded the
    /// failure; pass `None` when the caller (e.g. the background
    /// reconciliation loop) isn't acting on behalf of any one camera.
    fn fail_other_running_on_media_dead(&self, exclude_id: Option<u32>, err: &GatewayError) {
        if !matches!(err, GatewayError::MediaDead(_)) {
            return;
        }
        for mut camera in self.config.list_cameras() {
            if Some(camera.id) == exclude_id || camera.status != CameraStatus::Running {
                continue;
            }
            camera.status = CameraStatus::Failed;
            camera.last_error = Some(err.to_string());
            let _ = self.config.put_camera(camera);
        }
    }

    /// Called by the background reconciliation task when it finds the media
    /// server has exhausted its crash-restart budget on its own (spec §4.5
    /// autonomous recovery, §8 scenario 6). Fans the failure out to every
    /// `Running` camera since none of them has a working stream anymore.
    pub fn mark_all_running_failed(&self, err: &GatewayError) {
        self.fail_other_running_on_media_dead(None, err);
    }

    async fn start_camera_locked(&self, id: u32, token: &CancellationToken) -> Result<()> {
        // Step 1: validate + persist `starting`.
        let mut camera = self.config.get_camera(id)?;
        camera.status = CameraStatus::Starting;
        self.config.put_camera(camera.clone())?;

        // Step 2: virtual NIC, if requested.
        let mut vnic_created = false;
        if let Some(nic_cfg) = camera.virtual_nic.clone() {
            if nic_cfg.enabled {
                if !self.vnic_capability {
                    return Err(GatewayError::Invalid("virtual NIC capability unavailable on this host".into()));
                }
                token.check()?;
                match self.vnic.create(id, &nic_cfg).await {
                    Ok(ip) => {
                        vnic_created = true;
                        camera.assigned_ip = Some(ip);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let undo_vnic = |camera_id: u32, created: bool| async move {
            if created {
                let _ = self.vnic.destroy(camera_id).await;
            }
        };

        // Step 3: recompile recipes and apply.
        if let Err(e) = token.check() {
            undo_vnic(id, vnic_created).await;
            return Err(e);
        }
        let settings = self.config.settings();
        let mut cameras = self.config.list_cameras();
        for c in cameras.iter_mut() {
            if c.id == id {
                *c = camera.clone();
            }
        }
        let active: Vec<Camera> = cameras.into_iter().filter(|c| c.status == CameraStatus::Starting || c.status == CameraStatus::Running).collect();
        let recipes = MediaRecipeCompiler::compile(&active, settings.rtsp_port);
        if let Err(e) = self.media.apply(&recipes).await {
            undo_vnic(id, vnic_created).await;
            return Err(e);
        }

        // Step 4: wait for readiness.
        let deadline = Instant::now() + READY_POLL_BUDGET;
        loop {
            if let Err(e) = token.check() {
                undo_vnic(id, vnic_created).await;
                return Err(e);
            }
            if self.media.is_ready().await {
                break;
            }
            if Instant::now() >= deadline {
                undo_vnic(id, vnic_created).await;
                return Err(GatewayError::Timeout(READY_POLL_BUDGET));
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }

        // Step 5: start the ONVIF Endpoint.
        if let Err(e) = token.check() {
            undo_vnic(id, vnic_created).await;
            return Err(e);
        }
        let bind_ip = camera.assigned_ip.clone().unwrap_or_else(|| self.bind_ip.clone());
        let mut endpoint = OnvifEndpoint::new(id);
        if let Err(e) = endpoint.start(Arc::clone(&self.config), &bind_ip, camera.onvif_port).await {
            undo_vnic(id, vnic_created).await;
            return Err(e);
        }
        self.endpoints.lock().await.insert(id, endpoint);

        // Step 6: mark running.
        camera.status = CameraStatus::Running;
        camera.last_error = None;
        self.config.put_camera(camera)?;
        info!(camera_id = id, "camera started");
        Ok(())
    }

    /// Best-effort stop sequence (spec §4.7): collects but does not rethrow
    /// teardown errors except the first.
    pub async fn stop_camera(&self, id: u32) -> Result<()> {
        let _fleet_guard = self.fleet_lock.read().await;
        self.stop_camera_exclusive(id).await
    }

    /// Same as `stop_camera` but assumes the caller already holds the fleet
    /// lock (used by `stop_all` and `update_camera`).
    async fn stop_camera_exclusive(&self, id: u32) -> Result<()> {
        let cam_lock = self.camera_lock(id);
        let _guard = cam_lock.lock().await;

        if let Some(token) = self.in_flight_starts.lock().unwrap().get(&id) {
            token.cancel();
        }

        let mut camera = self.config.get_camera(id)?;
        camera.status = CameraStatus::Stopping;
        self.config.put_camera(camera.clone())?;

        let mut first_error: Option<GatewayError> = None;

        if let Some(mut endpoint) = self.endpoints.lock().await.remove(&id) {
            endpoint.stop().await;
        }

        let settings = self.config.settings();
        let remaining: Vec<Camera> = self
            .config
            .list_cameras()
            .into_iter()
            .filter(|c| c.id != id && c.status == CameraStatus::Running)
            .collect();
        let recipes = MediaRecipeCompiler::compile(&remaining, settings.rtsp_port);
        if let Err(e) = self.media.apply(&recipes).await {
            warn!(camera_id = id, error = %e, "reapplying media recipes during stop failed");
            self.fail_other_running_on_media_dead(Some(id), &e);
            first_error.get_or_insert(e);
        }

        if camera.virtual_nic.as_ref().map(|n| n.enabled).unwrap_or(false) {
            if let Err(e) = self.vnic.destroy(id).await {
                warn!(camera_id = id, error = %e, "tearing down virtual NIC during stop failed");
                first_error.get_or_insert(e);
            }
        }

        camera.status = CameraStatus::Stopped;
        camera.assigned_ip = None;
        if let Some(e) = &first_error {
            camera.last_error = Some(e.to_string());
        }
        self.config.put_camera(camera)?;

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Apply a partial update to a camera, allocating a fresh ONVIF port
    /// when the patch omits one. Restarts the camera if it was running so
    /// the new configuration takes effect immediately.
    pub async fn update_camera(&self, id: u32, mut patch: Camera) -> Result<()> {
        let _fleet_guard = self.fleet_lock.read().await;
        let cam_lock = self.camera_lock(id);
        let _guard = cam_lock.lock().await;

        let existing = self.config.get_camera(id)?;
        let was_running = existing.status == CameraStatus::Running;
        patch.id = id;
        patch.status = existing.status;
        self.config.put_camera(patch)?;
        drop(_guard);

        if was_running {
            self.stop_camera_exclusive(id).await?;
            self.start_camera_exclusive(id).await?;
        }
        Ok(())
    }

    pub async fn delete_camera(&self, id: u32) -> Result<Camera> {
        let needs_stop = matches!(
            self.config.get_camera(id).map(|c| c.status),
            Ok(CameraStatus::Running) | Ok(CameraStatus::Starting)
        );
        if needs_stop {
            let _ = self.stop_camera(id).await;
        }

        let _fleet_guard = self.fleet_lock.write().await;
        let removed = self.config.delete_camera(id)?;
        self.per_camera.lock().unwrap().remove(&id);
        Ok(removed)
    }

    /// Allocate the next free ONVIF port for a to-be-created camera.
    pub fn allocate_port(&self) -> Result<u16> {
        let settings = self.config.settings();
        let cameras = self.config.list_cameras();
        PortAllocator::allocate(&cameras, &settings)
    }

    /// Start every camera, ordered by id, sequentially (spec §4.7: avoids a
    /// thundering herd on the media server). Holds the fleet write lock for
    /// the whole run, which blocks new independent `start_camera` /
    /// `stop_camera` callers until it completes, draining none (there is
    /// nothing to drain: the write half only proceeds once existing readers
    /// have already finished).
    pub async fn start_all(&self) -> Vec<(u32, Result<()>)> {
        let _fleet_guard = self.fleet_lock.write().await;
        let mut cameras = self.config.list_cameras();
        cameras.sort_by_key(|c| c.id);
        let mut results = Vec::new();
        for camera in cameras {
            let r = self.start_camera_exclusive(camera.id).await;
            results.push((camera.id, r));
        }
        results
    }

    /// Stop every non-stopped camera in parallel under a shared deadline
    /// (spec §4.7), cancelling any in-flight `start_camera` first.
    pub async fn stop_all(&self) -> Vec<(u32, Result<()>)> {
        let _fleet_guard = self.fleet_lock.write().await;

        {
            let tokens = self.in_flight_starts.lock().unwrap();
            for token in tokens.values() {
                token.cancel();
            }
        }

        let ids: Vec<u32> = self
            .config
            .list_cameras()
            .into_iter()
            .filter(|c| c.status != CameraStatus::Stopped)
            .map(|c| c.id)
            .collect();

        let futures = ids.into_iter().map(|id| async move {
            let r = tokio::time::timeout(STOP_ALL_DEADLINE, self.stop_camera_exclusive(id)).await;
            match r {
                Ok(result) => (id, result),
                Err(_) => (id, Err(GatewayError::Timeout(STOP_ALL_DEADLINE))),
            }
        });
        futures::future::join_all(futures).await
    }

    pub fn status_snapshot(&self) -> Vec<StatusEntry> {
        let media_restart_count = self.media.restart_count();
        self.config
            .list_cameras()
            .into_iter()
            .map(|c| StatusEntry {
                id: c.id,
                status: c.status,
                assigned_ip: c.assigned_ip,
                last_error: c.last_error,
                media_restart_count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IpMode, StreamParams, Upstream, VirtualNicConfig};
    use std::net::TcpListener as StdTcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct FakeVnic {
        capability: bool,
        create_result: Option<String>,
        destroys: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl VirtualNicBackend for FakeVnic {
        fn capability_available(&self) -> bool {
            self.capability
        }

        async fn create(&self, _camera_id: u32, _cfg: &VirtualNicConfig) -> Result<String> {
            self.create_result.clone().ok_or_else(|| GatewayError::NicCreate("fake create failure".into()))
        }

        async fn destroy(&self, _camera_id: u32) -> Result<()> {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// `onvif_port: 0` binds an OS-assigned ephemeral port, which is what
    /// every single-camera test wants. Multi-camera tests pass distinct
    /// nonzero ports instead, since the Config Store rejects two cameras
    /// sharing one ONVIF port (I3).
    fn sample_camera(id: u32, onvif_port: u16, nic: Option<VirtualNicConfig>) -> Camera {
        Camera {
            id,
            name: format!("cam{id}"),
            upstream: Upstream {
                host: "192.0.2.10".into(),
                rtsp_port: 554,
                username: String::new(),
                password: String::new(),
                main_path: "stream1".into(),
                sub_path: "stream2".into(),
            },
            main: StreamParams { width: 1920, height: 1080, framerate: 25, transcode: false },
            sub: StreamParams { width: 640, height: 360, framerate: 10, transcode: false },
            onvif_port,
            onvif_username: "admin".into(),
            onvif_password: "admin".into(),
            virtual_nic: nic,
            auto_start: false,
            path_name: format!("cam{id}"),
            status: CameraStatus::Stopped,
            last_error: None,
            assigned_ip: None,
            unknown: Default::default(),
        }
    }

    fn enabled_nic() -> VirtualNicConfig {
        VirtualNicConfig {
            enabled: true,
            mac: "02:00:00:00:00:01".into(),
            parent_interface: "eth0".into(),
            ip_mode: IpMode::Dhcp,
            static_ip: None,
            prefix_len: None,
            gateway: None,
        }
    }

    /// `MediaServerController` whose readiness probe is satisfied by a raw
    /// listener this test binds itself, so the start sequence doesn't have
    /// to wait on a real `mediamtx`-shaped binary. The controller still
    /// spawns `binary`; `true` exits instantly and harmlessly.
    fn fake_media(dir: &TempDir, binary: &str) -> (Arc<MediaServerController>, StdTcpListener) {
        let probe = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        let media = Arc::new(MediaServerController::new(binary, dir.path().join("mediamtx.json"), port));
        (media, probe)
    }

    fn supervisor_with(media: Arc<MediaServerController>, vnic: Box<dyn VirtualNicBackend>) -> (Supervisor, Arc<ConfigStore>) {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(ConfigStore::open(dir.path().join("config.json")).unwrap());
        let supervisor = Supervisor::new(Arc::clone(&config), media, vnic);
        (supervisor, config)
    }

    #[tokio::test]
    async fn start_then_stop_round_trips_status() {
        let dir = TempDir::new().unwrap();
        let (media, _probe) = fake_media(&dir, "true");
        let vnic = Box::new(FakeVnic { capability: false, create_result: None, destroys: Arc::new(AtomicUsize::new(0)) });
        let (sup, config) = supervisor_with(media, vnic);
        config.put_camera(sample_camera(1, 0, None)).unwrap();

        sup.start_camera(1).await.unwrap();
        assert_eq!(sup.status_snapshot()[0].status, CameraStatus::Running);

        sup.stop_camera(1).await.unwrap();
        assert_eq!(sup.status_snapshot()[0].status, CameraStatus::Stopped);
    }

    #[tokio::test]
    async fn start_with_virtual_nic_assigns_ip() {
        let dir = TempDir::new().unwrap();
        let (media, _probe) = fake_media(&dir, "true");
        // The ONVIF Endpoint binds a real listener to the assigned address,
        // so the fake backend hands back loopback rather than a fabricated
        // LAN address a test sandbox has no interface for.
        let vnic = Box::new(FakeVnic {
            capability: true,
            create_result: Some("127.0.0.1".into()),
            destroys: Arc::new(AtomicUsize::new(0)),
        });
        let (sup, config) = supervisor_with(media, vnic);
        config.put_camera(sample_camera(1, 0, Some(enabled_nic()))).unwrap();

        sup.start_camera(1).await.unwrap();
        let snap = sup.status_snapshot();
        assert_eq!(snap[0].status, CameraStatus::Running);
        assert_eq!(snap[0].assigned_ip.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn failed_media_apply_reverses_vnic_and_marks_camera_failed() {
        let dir = TempDir::new().unwrap();
        // A binary that cannot be spawned makes `MediaServerController::apply`
        // fail at step 3, after the virtual NIC has already been created.
        let (media, _probe) = fake_media(&dir, "this-binary-does-not-exist-anywhere");
        let destroys = Arc::new(AtomicUsize::new(0));
        let vnic = Box::new(FakeVnic { capability: true, create_result: Some("10.0.0.9".into()), destroys: Arc::clone(&destroys) });
        let (sup, config) = supervisor_with(media, vnic);
        config.put_camera(sample_camera(1, 0, Some(enabled_nic()))).unwrap();

        let err = sup.start_camera(1).await.unwrap_err();
        assert_eq!(err.kind(), "E_INTERNAL");
        assert_eq!(destroys.load(Ordering::SeqCst), 1);

        let camera = config.get_camera(1).unwrap();
        assert_eq!(camera.status, CameraStatus::Failed);
        assert!(camera.last_error.is_some());
    }

    #[tokio::test]
    async fn stop_all_stops_every_non_stopped_camera() {
        let dir = TempDir::new().unwrap();
        let (media, _probe) = fake_media(&dir, "true");
        let vnic = Box::new(FakeVnic { capability: false, create_result: None, destroys: Arc::new(AtomicUsize::new(0)) });
        let (sup, config) = supervisor_with(media, vnic);
        config.put_camera(sample_camera(1, 0, None)).unwrap();
        config.put_camera(sample_camera(2, 40002, None)).unwrap();

        let started = sup.start_all().await;
        assert!(started.iter().all(|(_, r)| r.is_ok()));

        let stopped = sup.stop_all().await;
        assert_eq!(stopped.len(), 2);
        assert!(stopped.iter().all(|(_, r)| r.is_ok()));
        assert!(sup.status_snapshot().iter().all(|s| s.status == CameraStatus::Stopped));
    }

    #[tokio::test]
    async fn update_camera_restarts_a_running_camera() {
        let dir = TempDir::new().unwrap();
        let (media, _probe) = fake_media(&dir, "true");
        let vnic = Box::new(FakeVnic { capability: false, create_result: None, destroys: Arc::new(AtomicUsize::new(0)) });
        let (sup, config) = supervisor_with(media, vnic);
        config.put_camera(sample_camera(1, 0, None)).unwrap();
        sup.start_camera(1).await.unwrap();

        let mut patch = config.get_camera(1).unwrap();
        patch.name = "renamed".into();
        sup.update_camera(1, patch).await.unwrap();

        let camera = config.get_camera(1).unwrap();
        assert_eq!(camera.name, "renamed");
        assert_eq!(camera.status, CameraStatus::Running);
    }

    #[tokio::test]
    async fn sixth_crash_within_window_fails_every_running_camera() {
        // "true" exits immediately every time it's spawned, simulating a
        // persistently crash-looping media server (spec §8 scenario 6). The
        // first camera's start is the initial (uncharged) launch; each
        // subsequent camera's start observes the previous process having
        // already crashed and pays into the restart budget. The budget
        // allows 5 such crash-recoveries, so the 6th crash (discovered by
        // the 7th camera's start) is the one that exhausts it. Each camera
        // gets its own ONVIF port (I3 forbids reuse) but they all share the
        // one `MediaServerController`.
        let dir = TempDir::new().unwrap();
        let (media, _probe) = fake_media(&dir, "true");
        let vnic = Box::new(FakeVnic { capability: false, create_result: None, destroys: Arc::new(AtomicUsize::new(0)) });
        let (sup, config) = supervisor_with(media, vnic);
        for id in 1..=7u32 {
            config.put_camera(sample_camera(id, 40010 + id as u16, None)).unwrap();
        }

        let mut last_result = Ok(());
        for id in 1..=7u32 {
            // Give the previous camera's spawned process time to exit so the
            // next `apply()` observes a real crash, not a still-alive process.
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            last_result = sup.start_camera(id).await;
        }

        let err = last_result.expect_err("7th start should exhaust the crash-restart budget");
        assert_eq!(err.kind(), "E_MEDIA_DEAD");

        let failed = sup.status_snapshot().iter().filter(|s| s.status == CameraStatus::Failed).count();
        assert_eq!(failed, 7, "every camera sharing the dead media server should be marked failed");
    }

    #[tokio::test]
    async fn delete_camera_stops_it_first() {
        let dir = TempDir::new().unwrap();
        let (media, _probe) = fake_media(&dir, "true");
        let vnic = Box::new(FakeVnic { capability: false, create_result: None, destroys: Arc::new(AtomicUsize::new(0)) });
        let (sup, config) = supervisor_with(media, vnic);
        config.put_camera(sample_camera(1, 0, None)).unwrap();
        sup.start_camera(1).await.unwrap();

        let removed = sup.delete_camera(1).await.unwrap();
        assert_eq!(removed.id, 1);
        assert!(config.get_camera(1).is_err());
    }
}
