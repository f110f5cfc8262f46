// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Config Store data model: the JSON-shaped document of cameras and global
//! settings described in spec §3 and §6.

pub mod store;

use serde::{Deserialize, Serialize};

pub use store::ConfigStore;

/// Top-level persisted document: `{ "cameras": [...], "settings": {...} }`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigDocument {
    pub cameras: Vec<Camera>,
    #[serde(default)]
    pub settings: GlobalSettings,
    /// Unknown top-level keys, preserved verbatim across load/save (§6).
    #[serde(flatten)]
    pub unknown: serde_json::Map<String, serde_json::Value>,
}

/// Camera lifecycle state (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl Default for CameraStatus {
    fn default() -> Self {
        CameraStatus::Stopped
    }
}

/// Upstream RTSP source coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upstream {
    pub host: String,
    pub rtsp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub main_path: String,
    pub sub_path: String,
}

/// Declared per-stream parameters (main or sub, independently).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamParams {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    #[serde(default)]
    pub transcode: bool,
}

/// IP configuration mode for a virtual NIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpMode {
    Dhcp,
    Static,
}

/// Virtual-NIC block (spec §3, §4.3). Optional per camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualNicConfig {
    pub enabled: bool,
    /// Locally-administered 48-bit MAC, colon-separated hex octets.
    pub mac: String,
    pub parent_interface: String,
    pub ip_mode: IpMode,
    #[serde(default)]
    pub static_ip: Option<String>,
    #[serde(default)]
    pub prefix_len: Option<u8>,
    #[serde(default)]
    pub gateway: Option<String>,
}

/// A single virtual camera (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub id: u32,
    pub name: String,
    pub upstream: Upstream,
    pub main: StreamParams,
    pub sub: StreamParams,
    pub onvif_port: u16,
    pub onvif_username: String,
    pub onvif_password: String,
    #[serde(default)]
    pub virtual_nic: Option<VirtualNicConfig>,
    #[serde(default)]
    pub auto_start: bool,
    /// Deterministic, filesystem-safe slug derived from `name` (§9). Persisted
    /// so a rename never re-slugs an already-running camera.
    pub path_name: String,
    #[serde(default)]
    pub status: CameraStatus,
    #[serde(default)]
    pub last_error: Option<String>,
    /// IP address assigned to the virtual NIC at runtime (DHCP lease or static
    /// address). Never persisted — derived at start time (§4.3).
    #[serde(skip)]
    pub assigned_ip: Option<String>,
    /// Unknown per-camera keys, preserved verbatim (§6).
    #[serde(flatten)]
    pub unknown: serde_json::Map<String, serde_json::Value>,
}

impl Camera {
    pub fn path_main(&self) -> String {
        format!("{}_main", self.path_name)
    }

    pub fn path_sub(&self) -> String {
        format!("{}_sub", self.path_name)
    }
}

/// Bind address reported to clients (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindAddress {
    Localhost,
    Explicit(String),
    Auto,
}

impl Default for BindAddress {
    fn default() -> Self {
        BindAddress::Localhost
    }
}

impl BindAddress {
    pub fn resolve(&self) -> String {
        match self {
            BindAddress::Localhost => "127.0.0.1".to_string(),
            BindAddress::Explicit(addr) => addr.clone(),
            BindAddress::Auto => local_host_ip(),
        }
    }
}

fn local_host_ip() -> String {
    // Best-effort auto-detection: connect a UDP socket to a public address
    // without sending anything, then read back the local endpoint.
    match std::net::UdpSocket::bind("0.0.0.0:0").and_then(|s| {
        s.connect("8.8.8.8:80")?;
        s.local_addr()
    }) {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => "127.0.0.1".to_string(),
    }
}

/// Global settings (spec §3). Only the networking fields are core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub bind_ip: BindAddress,
    #[serde(default = "default_rtsp_port")]
    pub rtsp_port: u16,
    #[serde(default = "default_hls_port")]
    pub hls_port: u16,
    #[serde(default = "default_media_api_port")]
    pub media_api_port: u16,
    #[serde(default = "default_grid_columns")]
    pub grid_columns: u32,
    #[serde(default = "default_theme")]
    pub theme: String,
    /// Port the thin `api` control surface listens on; UI-layer concern, not
    /// part of the core, but carried through like the teacher's `ApiConfig`.
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            bind_ip: BindAddress::default(),
            rtsp_port: default_rtsp_port(),
            hls_port: default_hls_port(),
            media_api_port: default_media_api_port(),
            grid_columns: default_grid_columns(),
            theme: default_theme(),
            api_port: default_api_port(),
        }
    }
}

fn default_rtsp_port() -> u16 {
    8554
}
fn default_hls_port() -> u16 {
    8888
}
fn default_media_api_port() -> u16 {
    9997
}
fn default_grid_columns() -> u32 {
    3
}
fn default_theme() -> String {
    "dark".to_string()
}
fn default_api_port() -> u16 {
    8080
}

/// Reserved ports the Port Allocator must never hand out (spec §4.2).
pub const WEB_UI_PORT: u16 = 8080;

impl GlobalSettings {
    pub fn reserved_ports(&self) -> [u16; 4] {
        [self.rtsp_port, self.hls_port, self.media_api_port, WEB_UI_PORT]
    }
}

/// Derive a deterministic, filesystem-safe slug from a camera name.
///
/// Lowercases, replaces runs of non-alphanumeric characters with `_`, and
/// trims leading/trailing underscores. Collisions are resolved by the
/// caller (Config Store) appending a numeric suffix (§9).
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("camera");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Front Door"), "front_door");
        assert_eq!(slugify("  Garage!! Cam  "), "garage_cam");
        assert_eq!(slugify("日本語"), "camera");
        assert_eq!(slugify("cam-01_B"), "cam_01_b");
    }
}
