// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Virtual NIC Manager (spec §4.3): gives a camera its own L2 identity on
//! the LAN via a macvlan-style interface, so an NVR sees a distinct IP per
//! camera even though every stream is really served from this host.
//!
//! The actual `ip` invocations only make sense on Linux; everywhere else we
//! report the capability absent rather than pretending to succeed, matching
//! the teacher's platform-conditional capture backends in `camera.rs`.

use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{IpMode, VirtualNicConfig};
use crate::error::{GatewayError, Result};

/// Bound on how long we wait for a DHCP lease before giving up (spec §4.3).
pub const DHCP_LEASE_TIMEOUT: Duration = Duration::from_secs(15);

fn iface_name(camera_id: u32) -> String {
    format!("vcam{camera_id}")
}

/// Backend seam so the Supervisor can be tested without real network
/// privileges (spec §8 — fake backends for vnic lifecycle tests).
#[async_trait::async_trait]
pub trait VirtualNicBackend: Send + Sync {
    /// Whether this host can create virtual NICs at all. Probed once at
    /// startup and cached (spec §9 design note).
    fn capability_available(&self) -> bool;

    async fn create(&self, camera_id: u32, cfg: &VirtualNicConfig) -> Result<String>;

    async fn destroy(&self, camera_id: u32) -> Result<()>;
}

/// Validate a colon-separated MAC is well-formed, locally administered, and
/// not multicast (spec §4.3 invariant I4). Shared with the Config Store's
/// validation so both reject identically.
pub fn validate_mac(mac: &str) -> Result<()> {
    crate::config::store::validate_mac(mac)
}

#[cfg(target_os = "linux")]
pub struct LinuxVirtualNicBackend;

#[cfg(target_os = "linux")]
#[async_trait::async_trait]
impl VirtualNicBackend for LinuxVirtualNicBackend {
    fn capability_available(&self) -> bool {
        std::path::Path::new("/sbin/ip").exists() || std::path::Path::new("/usr/sbin/ip").exists()
    }

    async fn create(&self, camera_id: u32, cfg: &VirtualNicConfig) -> Result<String> {
        let iface = iface_name(camera_id);

        // Idempotent: tear down any stale interface with our name first.
        let _ = run_ip(&["link", "delete", &iface]).await;

        run_ip(&[
            "link", "add", &iface, "link", &cfg.parent_interface, "type", "macvlan", "mode", "bridge",
        ])
        .await
        .map_err(|e| GatewayError::NicCreate(e))?;

        run_ip(&["link", "set", &iface, "address", &cfg.mac])
            .await
            .map_err(|e| GatewayError::NicCreate(e))?;

        run_ip(&["link", "set", &iface, "up"])
            .await
            .map_err(|e| GatewayError::NicCreate(e))?;

        match cfg.ip_mode {
            IpMode::Static => {
                let ip = cfg
                    .static_ip
                    .as_ref()
                    .ok_or_else(|| GatewayError::NicStatic("static_ip missing".into()))?;
                let prefix = cfg
                    .prefix_len
                    .ok_or_else(|| GatewayError::NicStatic("prefix_len missing".into()))?;
                run_ip(&["addr", "add", &format!("{ip}/{prefix}"), "dev", &iface])
                    .await
                    .map_err(GatewayError::NicStatic)?;
                if let Some(gw) = &cfg.gateway {
                    // Best-effort: a missing route doesn't invalidate the address.
                    if let Err(e) = run_ip(&["route", "add", "default", "via", gw, "dev", &iface]).await {
                        debug!(camera_id, error = %e, "route add for virtual NIC failed, continuing");
                    }
                }
                info!(camera_id, iface = %iface, ip = %ip, "virtual NIC assigned static IP");
                Ok(ip.clone())
            }
            IpMode::Dhcp => {
                let lease = timeout(DHCP_LEASE_TIMEOUT, acquire_dhcp_lease(&iface))
                    .await
                    .map_err(|_| GatewayError::NicLease(format!("timed out after {DHCP_LEASE_TIMEOUT:?}")))??;
                info!(camera_id, iface = %iface, ip = %lease, "virtual NIC leased DHCP address");
                Ok(lease)
            }
        }
    }

    async fn destroy(&self, camera_id: u32) -> Result<()> {
        let iface = iface_name(camera_id);
        match run_ip(&["link", "delete", &iface]).await {
            Ok(_) => Ok(()),
            Err(e) if e.contains("Cannot find device") => Ok(()),
            Err(e) => Err(GatewayError::NicCreate(e)),
        }
    }
}

#[cfg(target_os = "linux")]
async fn run_ip(args: &[&str]) -> std::result::Result<(), String> {
    let out = Command::new("ip")
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| e.to_string())?;
    if out.status.success() {
        Ok(())
    } else {
        Err(String::from_utf8_lossy(&out.stderr).trim().to_string())
    }
}

#[cfg(target_os = "linux")]
async fn acquire_dhcp_lease(iface: &str) -> Result<String> {
    let out = Command::new("dhclient")
        .args(["-1", "-v", iface])
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| GatewayError::NicLease(e.to_string()))?;
    if !out.status.success() {
        return Err(GatewayError::NicLease(
            String::from_utf8_lossy(&out.stderr).trim().to_string(),
        ));
    }

    let addr_out = Command::new("ip")
        .args(["-4", "-oneline", "addr", "show", "dev", iface])
        .output()
        .await
        .map_err(|e| GatewayError::NicLease(e.to_string()))?;
    let text = String::from_utf8_lossy(&addr_out.stdout);
    text.split_whitespace()
        .find(|tok| tok.contains('/') && tok.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false))
        .map(|tok| tok.split('/').next().unwrap().to_string())
        .ok_or_else(|| GatewayError::NicLease("dhclient succeeded but no lease address found".into()))
}

/// Non-Linux fallback: the capability is simply absent, so every camera
/// config with `virtual_nic.enabled = true` on such a host surfaces
/// `E_NIC_CREATE` rather than silently pretending to succeed.
pub struct UnsupportedVirtualNicBackend;

#[async_trait::async_trait]
impl VirtualNicBackend for UnsupportedVirtualNicBackend {
    fn capability_available(&self) -> bool {
        false
    }

    async fn create(&self, _camera_id: u32, _cfg: &VirtualNicConfig) -> Result<String> {
        Err(GatewayError::NicCreate(
            "virtual NIC management is not supported on this platform".into(),
        ))
    }

    async fn destroy(&self, _camera_id: u32) -> Result<()> {
        warn!("destroy() called on UnsupportedVirtualNicBackend; nothing to do");
        Ok(())
    }
}

/// Construct the platform-appropriate backend.
pub fn default_backend() -> Box<dyn VirtualNicBackend> {
    #[cfg(target_os = "linux")]
    {
        Box::new(LinuxVirtualNicBackend)
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(UnsupportedVirtualNicBackend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iface_name_is_stable_and_id_scoped() {
        assert_eq!(iface_name(1), "vcam1");
        assert_eq!(iface_name(42), "vcam42");
        assert_ne!(iface_name(1), iface_name(2));
    }

    #[tokio::test]
    async fn unsupported_backend_reports_no_capability() {
        let backend = UnsupportedVirtualNicBackend;
        assert!(!backend.capability_available());
        let cfg = VirtualNicConfig {
            enabled: true,
            mac: "02:00:00:00:00:01".into(),
            parent_interface: "eth0".into(),
            ip_mode: IpMode::Dhcp,
            static_ip: None,
            prefix_len: None,
            gateway: None,
        };
        let err = backend.create(1, &cfg).await.unwrap_err();
        assert_eq!(err.kind(), "E_NIC_CREATE");
    }

    #[tokio::test]
    async fn unsupported_backend_destroy_is_a_no_op() {
        let backend = UnsupportedVirtualNicBackend;
        assert!(backend.destroy(1).await.is_ok());
    }
}
