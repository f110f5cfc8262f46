// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

use thiserror::Error;

/// Error taxonomy for the gateway core (see spec §7).
///
/// Lower layers return the most specific variant; the Supervisor is the
/// boundary that turns these into user-visible outcomes and `last_error`
/// strings on camera records.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error("invalid camera record: {0}")]
    Invalid(String),

    #[error("pathName '{0}' is already in use")]
    DuplicatePath(String),

    #[error("ONVIF port {0} is already in use")]
    PortInUse(u16),

    #[error("no free ONVIF port in the allocator's range")]
    PortExhausted,

    #[error("invalid MAC address: {0}")]
    BadMac(String),

    #[error("failed to create virtual NIC: {0}")]
    NicCreate(String),

    #[error("DHCP lease acquisition failed: {0}")]
    NicLease(String),

    #[error("static IP assignment failed: {0}")]
    NicStatic(String),

    #[error("media server is unrecoverable: {0}")]
    MediaDead(String),

    #[error("failed to bind: {0}")]
    Bind(String),

    #[error("camera '{0}' not found")]
    NotFound(u32),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError::Io(e.to_string())
    }
}

impl GatewayError {
    /// Short error-kind tag, stable across renders, for logs and status APIs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Invalid(_) => "E_INVALID",
            GatewayError::DuplicatePath(_) => "E_DUPLICATE_PATH",
            GatewayError::PortInUse(_) => "E_PORT_IN_USE",
            GatewayError::PortExhausted => "E_PORT_EXHAUSTED",
            GatewayError::BadMac(_) => "E_BAD_MAC",
            GatewayError::NicCreate(_) => "E_NIC_CREATE",
            GatewayError::NicLease(_) => "E_NIC_LEASE",
            GatewayError::NicStatic(_) => "E_NIC_STATIC",
            GatewayError::MediaDead(_) => "E_MEDIA_DEAD",
            GatewayError::Bind(_) => "E_BIND",
            GatewayError::NotFound(_) => "E_NOT_FOUND",
            GatewayError::Cancelled => "E_CANCELLED",
            GatewayError::Timeout(_) => "E_TIMEOUT",
            GatewayError::Internal(_) => "E_INTERNAL",
            GatewayError::Io(_) => "E_INTERNAL",
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
