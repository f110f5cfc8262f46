// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! ONVIF Endpoint (spec §4.6): per-camera SOAP server emulating ONVIF
//! Profile S Device, Media, and Media2 services.

pub mod auth;
pub mod server;
pub mod soap;

pub use server::{EndpointState, OnvifEndpoint};
