// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Config Store (spec §4.1): owns the single JSON document of cameras and
//! global settings. Readers get a cheap deep copy; writers are serialized by
//! a single lock and persist via atomic temp-file + rename, the same
//! preallocate-then-commit discipline the teacher uses for pool files in
//! `storage::chunk_pool::ChunkPool::open`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::{GatewayError, Result};

use super::{Camera, ConfigDocument, IpMode};

pub struct ConfigStore {
    path: PathBuf,
    doc: Arc<RwLock<ConfigDocument>>,
}

impl ConfigStore {
    /// Load an existing document, or start empty if `path` does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            Self::read_from_disk(&path)?
        } else {
            ConfigDocument::default()
        };
        Ok(Self {
            path,
            doc: Arc::new(RwLock::new(doc)),
        })
    }

    fn read_from_disk(path: &Path) -> Result<ConfigDocument> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Internal(format!("cannot read config file: {e}")))?;
        serde_json::from_str(&content)
            .map_err(|e| GatewayError::Invalid(format!("invalid config JSON: {e}")))
    }

    /// Re-read the document from disk, replacing the in-memory copy.
    pub fn load(&self) -> Result<()> {
        let doc = Self::read_from_disk(&self.path)?;
        *self.doc.write() = doc;
        Ok(())
    }

    /// Atomically write the current in-memory document to disk: write to a
    /// sibling temp file, `fsync`, then `rename` over the target. Never
    /// leaves a partially written file behind.
    pub fn save(&self) -> Result<()> {
        let doc = self.doc.read().clone();
        let serialized = serde_json::to_string_pretty(&doc)
            .map_err(|e| GatewayError::Internal(format!("cannot serialize config: {e}")))?;

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let tmp_path = parent.join(format!(
            ".{}.tmp",
            self.path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("config.json")
        ));

        {
            use std::io::Write;
            let mut f = std::fs::File::create(&tmp_path)?;
            f.write_all(serialized.as_bytes())?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        info!(path = ?self.path, "Config Store saved");
        Ok(())
    }

    pub fn get_camera(&self, id: u32) -> Result<Camera> {
        self.doc
            .read()
            .cameras
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(GatewayError::NotFound(id))
    }

    pub fn list_cameras(&self) -> Vec<Camera> {
        self.doc.read().cameras.clone()
    }

    pub fn settings(&self) -> super::GlobalSettings {
        self.doc.read().settings.clone()
    }

    /// Allocate the next dense, monotonic camera id (I1).
    pub fn next_id(&self) -> u32 {
        self.doc
            .read()
            .cameras
            .iter()
            .map(|c| c.id)
            .max()
            .map(|m| m + 1)
            .unwrap_or(1)
    }

    /// Validate and insert/replace a camera record.
    ///
    /// Enforces I2 (unique pathName), I3 (unique ONVIF port, outside
    /// reserved ranges), I4 (valid MAC + parent interface present when the
    /// virtual-NIC flag is set).
    pub fn put_camera(&self, camera: Camera) -> Result<()> {
        self.validate(&camera)?;

        let mut doc = self.doc.write();
        if let Some(slot) = doc.cameras.iter_mut().find(|c| c.id == camera.id) {
            *slot = camera;
        } else {
            doc.cameras.push(camera);
        }
        Ok(())
    }

    pub fn delete_camera(&self, id: u32) -> Result<Camera> {
        let mut doc = self.doc.write();
        let idx = doc
            .cameras
            .iter()
            .position(|c| c.id == id)
            .ok_or(GatewayError::NotFound(id))?;
        Ok(doc.cameras.remove(idx))
    }

    fn validate(&self, camera: &Camera) -> Result<()> {
        if camera.name.trim().is_empty() {
            return Err(GatewayError::Invalid("camera name must not be empty".into()));
        }
        if camera.path_name.trim().is_empty() {
            return Err(GatewayError::Invalid("pathName must not be empty".into()));
        }
        if camera.upstream.host.trim().is_empty() {
            return Err(GatewayError::Invalid("upstream host must not be empty".into()));
        }

        let doc = self.doc.read();

        if doc
            .cameras
            .iter()
            .any(|c| c.id != camera.id && c.path_name == camera.path_name)
        {
            return Err(GatewayError::DuplicatePath(camera.path_name.clone()));
        }

        if doc
            .cameras
            .iter()
            .any(|c| c.id != camera.id && c.onvif_port == camera.onvif_port)
        {
            return Err(GatewayError::PortInUse(camera.onvif_port));
        }
        if doc.settings.reserved_ports().contains(&camera.onvif_port) {
            return Err(GatewayError::PortInUse(camera.onvif_port));
        }

        if let Some(nic) = &camera.virtual_nic {
            if nic.enabled {
                validate_mac(&nic.mac)?;
                if nic.parent_interface.trim().is_empty() {
                    return Err(GatewayError::Invalid(
                        "virtual NIC parent_interface must not be empty".into(),
                    ));
                }
                if nic.ip_mode == IpMode::Static
                    && (nic.static_ip.is_none() || nic.prefix_len.is_none() || nic.gateway.is_none())
                {
                    return Err(GatewayError::Invalid(
                        "static IP mode requires static_ip, prefix_len, and gateway".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Validate a locally-administered 48-bit MAC address (spec I4): six
/// colon-separated hex octets, with the locally-administered bit (bit 1 of
/// the first octet) set and the multicast bit clear.
pub fn validate_mac(mac: &str) -> Result<()> {
    let octets: Vec<&str> = mac.split(':').collect();
    if octets.len() != 6 {
        return Err(GatewayError::BadMac(mac.to_string()));
    }
    let mut bytes = [0u8; 6];
    for (i, o) in octets.iter().enumerate() {
        bytes[i] = u8::from_str_radix(o, 16).map_err(|_| GatewayError::BadMac(mac.to_string()))?;
    }
    let locally_administered = bytes[0] & 0b0000_0010 != 0;
    let multicast = bytes[0] & 0b0000_0001 != 0;
    if !locally_administered || multicast {
        warn!(mac, "MAC is not a locally-administered unicast address");
        return Err(GatewayError::BadMac(mac.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Camera, IpMode, StreamParams, Upstream, VirtualNicConfig};
    use tempfile::TempDir;

    fn sample_camera(id: u32, path_name: &str, port: u16) -> Camera {
        Camera {
            id,
            name: path_name.to_string(),
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
            onvif_port: port,
            onvif_username: "admin".into(),
            onvif_password: "admin".into(),
            virtual_nic: None,
            auto_start: false,
            path_name: path_name.to_string(),
            status: Default::default(),
            last_error: None,
            assigned_ip: None,
            unknown: Default::default(),
        }
    }

    #[test]
    fn round_trip_preserves_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let store = ConfigStore::open(&path).unwrap();
        store.put_camera(sample_camera(1, "front_door", 8001)).unwrap();
        store.save().unwrap();

        let reopened = ConfigStore::open(&path).unwrap();
        let cams = reopened.list_cameras();
        assert_eq!(cams.len(), 1);
        assert_eq!(cams[0].path_name, "front_door");
        assert_eq!(cams[0].onvif_port, 8001);
    }

    #[test]
    fn duplicate_path_name_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json")).unwrap();
        store.put_camera(sample_camera(1, "front_door", 8001)).unwrap();
        let err = store.put_camera(sample_camera(2, "front_door", 8002)).unwrap_err();
        assert_eq!(err.kind(), "E_DUPLICATE_PATH");
    }

    #[test]
    fn duplicate_onvif_port_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json")).unwrap();
        store.put_camera(sample_camera(1, "front_door", 8001)).unwrap();
        let err = store.put_camera(sample_camera(2, "back_door", 8001)).unwrap_err();
        assert_eq!(err.kind(), "E_PORT_IN_USE");
    }

    #[test]
    fn reserved_port_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json")).unwrap();
        let err = store.put_camera(sample_camera(1, "front_door", 9997)).unwrap_err();
        assert_eq!(err.kind(), "E_PORT_IN_USE");
    }

    #[test]
    fn bad_mac_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json")).unwrap();
        let mut cam = sample_camera(1, "front_door", 8001);
        cam.virtual_nic = Some(VirtualNicConfig {
            enabled: true,
            mac: "not-a-mac".into(),
            parent_interface: "eth0".into(),
            ip_mode: IpMode::Dhcp,
            static_ip: None,
            prefix_len: None,
            gateway: None,
        });
        let err = store.put_camera(cam).unwrap_err();
        assert_eq!(err.kind(), "E_BAD_MAC");
    }

    #[test]
    fn valid_locally_administered_mac_accepted() {
        validate_mac("02:de:ad:be:ef:01").unwrap();
    }

    #[test]
    fn universally_administered_mac_rejected() {
        // Bit 1 of the first octet clear => globally-unique OUI, not
        // locally-administered.
        assert!(validate_mac("00:de:ad:be:ef:01").is_err());
    }

    #[test]
    fn delete_then_list_omits_camera() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json")).unwrap();
        store.put_camera(sample_camera(1, "front_door", 8001)).unwrap();
        store.delete_camera(1).unwrap();
        assert!(store.list_cameras().is_empty());
        assert_eq!(store.get_camera(1).unwrap_err().kind(), "E_NOT_FOUND");
    }

    #[test]
    fn ids_are_dense_and_monotonic() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::open(dir.path().join("config.json")).unwrap();
        assert_eq!(store.next_id(), 1);
        store.put_camera(sample_camera(1, "a", 8001)).unwrap();
        assert_eq!(store.next_id(), 2);
        store.put_camera(sample_camera(2, "b", 8002)).unwrap();
        store.delete_camera(1).unwrap();
        assert_eq!(store.next_id(), 3);
    }

    #[test]
    fn unknown_keys_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"cameras": [], "settings": {}, "future_field": "kept"}"#,
        )
        .unwrap();
        let store = ConfigStore::open(&path).unwrap();
        store.save().unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("future_field"));
    }
}
