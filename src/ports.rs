// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Port Allocator (spec §4.2): hands out the lowest free ONVIF port in
//! `[8001, 8100]`, respecting the reserved set carried in `GlobalSettings`.
//! Assignments are not persisted by this module directly — the caller
//! (Supervisor) round-trips the chosen port through the Config Store so
//! restart is deterministic, matching how the teacher's `RecordingManager`
//! treats `CameraConfig` as the single source of truth rather than keeping
//! parallel state.

use crate::config::{Camera, GlobalSettings};
use crate::error::{GatewayError, Result};

pub const PORT_RANGE_START: u16 = 8001;
pub const PORT_RANGE_END: u16 = 8100;

pub struct PortAllocator;

impl PortAllocator {
    /// Allocate the lowest free ONVIF port given the current camera set and
    /// global settings. Fails with `E_PORT_EXHAUSTED` when the pool is
    /// empty (spec §8: the 101st camera with all ports used).
    pub fn allocate(cameras: &[Camera], settings: &GlobalSettings) -> Result<u16> {
        let reserved = settings.reserved_ports();
        for port in PORT_RANGE_START..=PORT_RANGE_END {
            if reserved.contains(&port) {
                continue;
            }
            if cameras.iter().any(|c| c.onvif_port == port) {
                continue;
            }
            return Ok(port);
        }
        Err(GatewayError::PortExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraStatus, StreamParams, Upstream};

    fn camera_with_port(id: u32, port: u16) -> Camera {
        Camera {
            id,
            name: format!("cam{id}"),
            upstream: Upstream {
                host: "192.0.2.1".into(),
                rtsp_port: 554,
                username: String::new(),
                password: String::new(),
                main_path: "s1".into(),
                sub_path: "s2".into(),
            },
            main: StreamParams { width: 1920, height: 1080, framerate: 25, transcode: false },
            sub: StreamParams { width: 640, height: 360, framerate: 10, transcode: false },
            onvif_port: port,
            onvif_username: "a".into(),
            onvif_password: "b".into(),
            virtual_nic: None,
            auto_start: false,
            path_name: format!("cam{id}"),
            status: CameraStatus::Stopped,
            last_error: None,
            assigned_ip: None,
            unknown: Default::default(),
        }
    }

    #[test]
    fn allocates_lowest_free_port() {
        let settings = GlobalSettings::default();
        let cams = vec![camera_with_port(1, 8001), camera_with_port(2, 8002)];
        assert_eq!(PortAllocator::allocate(&cams, &settings).unwrap(), 8003);
    }

    #[test]
    fn skips_reserved_ports() {
        let mut settings = GlobalSettings::default();
        settings.rtsp_port = 8001;
        let port = PortAllocator::allocate(&[], &settings).unwrap();
        assert_ne!(port, 8001);
        assert_eq!(port, 8002);
    }

    #[test]
    fn exhaustion_is_injective_until_full() {
        let settings = GlobalSettings::default();
        let cams: Vec<Camera> = (0..100)
            .map(|i| camera_with_port(i, PORT_RANGE_START + i as u16))
            .collect();
        let err = PortAllocator::allocate(&cams, &settings).unwrap_err();
        assert_eq!(err.kind(), "E_PORT_EXHAUSTED");
    }

    #[test]
    fn allocation_is_injective_across_many_cameras() {
        let settings = GlobalSettings::default();
        let mut cams: Vec<Camera> = Vec::new();
        let mut assigned = std::collections::HashSet::new();
        for i in 0..50 {
            let port = PortAllocator::allocate(&cams, &settings).unwrap();
            assert!(assigned.insert(port), "port {port} allocated twice");
            cams.push(camera_with_port(i, port));
        }
    }
}
