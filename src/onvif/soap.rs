// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! SOAP response templates for the ONVIF Profile S surface (spec §4.6):
//! Device.{GetCapabilities, GetDeviceInformation, GetServices,
//! GetSystemDateAndTime}, Media.{GetProfiles, GetStreamUri, GetSnapshotUri}
//! and their Media2 equivalents.
//!
//! Two fixed profile tokens are advertised, `MainProfile` and `SubProfile`,
//! mirroring the camera's declared main/sub stream parameters.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::{Camera, StreamParams};

pub const MAIN_PROFILE_TOKEN: &str = "MainProfile";
pub const SUB_PROFILE_TOKEN: &str = "SubProfile";

fn device_xaddr(base_url: &str) -> String {
    format!("{base_url}/onvif/device_service")
}

/// Stable per-camera device identity, used as the `HardwareId` advertised in
/// `GetDeviceInformation`. Derived rather than stored so it survives config
/// round-trips without needing its own field.
fn device_uuid(camera_id: u32) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("onvif-gateway/camera/{camera_id}").as_bytes())
}

pub fn get_capabilities_response(base_url: &str) -> String {
    let xaddr = device_xaddr(base_url);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
<soap:Body>
<tds:GetCapabilitiesResponse xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
<tds:Capabilities>
<tt:Device xmlns:tt="http://www.onvif.org/ver10/schema">
<tt:XAddr>{xaddr}</tt:XAddr>
<tt:Network>
<tt:IPFilter>false</tt:IPFilter>
<tt:ZeroConfiguration>false</tt:ZeroConfiguration>
<tt:IPVersion6>false</tt:IPVersion6>
<tt:DynDNS>false</tt:DynDNS>
</tt:Network>
<tt:System>
<tt:DiscoveryResolve>false</tt:DiscoveryResolve>
<tt:DiscoveryBye>false</tt:DiscoveryBye>
<tt:RemoteDiscovery>false</tt:RemoteDiscovery>
<tt:SystemBackup>false</tt:SystemBackup>
<tt:SystemLogging>false</tt:SystemLogging>
<tt:FirmwareUpgrade>false</tt:FirmwareUpgrade>
<tt:SupportedVersions>
<tt:Major>2</tt:Major>
<tt:Minor>60</tt:Minor>
</tt:SupportedVersions>
</tt:System>
</tt:Device>
<tt:Media xmlns:tt="http://www.onvif.org/ver10/schema">
<tt:XAddr>{base_url}/onvif/media_service</tt:XAddr>
<tt:StreamingCapabilities>
<tt:RTPMulticast>false</tt:RTPMulticast>
<tt:RTP_TCP>true</tt:RTP_TCP>
<tt:RTP_RTSP_TCP>true</tt:RTP_RTSP_TCP>
</tt:StreamingCapabilities>
</tt:Media>
</tds:Capabilities>
</tds:GetCapabilitiesResponse>
</soap:Body>
</soap:Envelope>"#
    )
}

pub fn get_device_information_response(camera: &Camera) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
<soap:Body>
<tds:GetDeviceInformationResponse xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
<tds:Manufacturer>VirtualCam Gateway</tds:Manufacturer>
<tds:Model>vcam-{id}</tds:Model>
<tds:FirmwareVersion>1.0.0</tds:FirmwareVersion>
<tds:SerialNumber>vcam-{id}</tds:SerialNumber>
<tds:HardwareId>urn:uuid:{uuid}</tds:HardwareId>
</tds:GetDeviceInformationResponse>
</soap:Body>
</soap:Envelope>"#,
        id = camera.id,
        uuid = device_uuid(camera.id),
    )
}

pub fn get_services_response(base_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
<soap:Body>
<tds:GetServicesResponse xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
<tds:Service>
<tds:Namespace>http://www.onvif.org/ver10/device/wsdl</tds:Namespace>
<tds:XAddr>{base_url}/onvif/device_service</tds:XAddr>
<tds:Version><tt:Major xmlns:tt="http://www.onvif.org/ver10/schema">2</tt:Major><tt:Minor xmlns:tt="http://www.onvif.org/ver10/schema">60</tt:Minor></tds:Version>
</tds:Service>
<tds:Service>
<tds:Namespace>http://www.onvif.org/ver10/media/wsdl</tds:Namespace>
<tds:XAddr>{base_url}/onvif/media_service</tds:XAddr>
<tds:Version><tt:Major xmlns:tt="http://www.onvif.org/ver10/schema">2</tt:Major><tt:Minor xmlns:tt="http://www.onvif.org/ver10/schema">60</tt:Minor></tds:Version>
</tds:Service>
<tds:Service>
<tds:Namespace>http://www.onvif.org/ver20/media/wsdl</tds:Namespace>
<tds:XAddr>{base_url}/onvif/media2_service</tds:XAddr>
<tds:Version><tt:Major xmlns:tt="http://www.onvif.org/ver10/schema">2</tt:Major><tt:Minor xmlns:tt="http://www.onvif.org/ver10/schema">60</tt:Minor></tds:Version>
</tds:Service>
</tds:GetServicesResponse>
</soap:Body>
</soap:Envelope>"#
    )
}

pub fn get_system_date_and_time_response(now: DateTime<Utc>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
<soap:Body>
<tds:GetSystemDateAndTimeResponse xmlns:tds="http://www.onvif.org/ver10/device/wsdl">
<tds:SystemDateAndTime>
<tt:DateTimeType xmlns:tt="http://www.onvif.org/ver10/schema">NTP</tt:DateTimeType>
<tt:DaylightSavings xmlns:tt="http://www.onvif.org/ver10/schema">false</tt:DaylightSavings>
<tt:UTCDateTime xmlns:tt="http://www.onvif.org/ver10/schema">
<tt:Time><tt:Hour>{hour}</tt:Hour><tt:Minute>{minute}</tt:Minute><tt:Second>{second}</tt:Second></tt:Time>
<tt:Date><tt:Year>{year}</tt:Year><tt:Month>{month}</tt:Month><tt:Day>{day}</tt:Day></tt:Date>
</tt:UTCDateTime>
</tds:SystemDateAndTime>
</tds:GetSystemDateAndTimeResponse>
</soap:Body>
</soap:Envelope>"#,
        hour = now.format("%H"),
        minute = now.format("%M"),
        second = now.format("%S"),
        year = now.format("%Y"),
        month = now.format("%m"),
        day = now.format("%d"),
    )
}

fn profile_block(token: &str, params: &StreamParams, source_token: &str) -> String {
    format!(
        r#"<trt:Profiles token="{token}" fixed="true">
<tt:Name xmlns:tt="http://www.onvif.org/ver10/schema">{token}</tt:Name>
<tt:VideoSourceConfiguration xmlns:tt="http://www.onvif.org/ver10/schema" token="{source_token}">
<tt:Name>{source_token}</tt:Name>
<tt:UseCount>1</tt:UseCount>
<tt:SourceToken>{source_token}</tt:SourceToken>
<tt:Bounds x="0" y="0" width="{w}" height="{h}"/>
</tt:VideoSourceConfiguration>
<tt:VideoEncoderConfiguration xmlns:tt="http://www.onvif.org/ver10/schema" token="{token}Encoder">
<tt:Name>{token}Encoder</tt:Name>
<tt:UseCount>1</tt:UseCount>
<tt:Encoding>H264</tt:Encoding>
<tt:Resolution><tt:Width>{w}</tt:Width><tt:Height>{h}</tt:Height></tt:Resolution>
<tt:RateControl>
<tt:FrameRateLimit>{fps}</tt:FrameRateLimit>
<tt:EncodingInterval>1</tt:EncodingInterval>
<tt:BitrateLimit>4096</tt:BitrateLimit>
</tt:RateControl>
<tt:H264><tt:GovLength>{fps}</tt:GovLength><tt:H264Profile>Main</tt:H264Profile></tt:H264>
</tt:VideoEncoderConfiguration>
</trt:Profiles>"#,
        token = token,
        source_token = source_token,
        w = params.width,
        h = params.height,
        fps = params.framerate,
    )
}

pub fn get_profiles_response(camera: &Camera) -> String {
    let main = profile_block(MAIN_PROFILE_TOKEN, &camera.main, "MainVideoSource");
    let sub = profile_block(SUB_PROFILE_TOKEN, &camera.sub, "SubVideoSource");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
<soap:Body>
<trt:GetProfilesResponse xmlns:trt="http://www.onvif.org/ver10/media/wsdl">
{main}
{sub}
</trt:GetProfilesResponse>
</soap:Body>
</soap:Envelope>"#
    )
}

/// `rtsp://<bindAddress>:<rtspPort>/<pathName>_<main|sub>` (spec §4.6).
pub fn stream_uri(bind_address: &str, rtsp_port: u16, path: &str) -> String {
    format!("rtsp://{bind_address}:{rtsp_port}/{path}")
}

pub fn get_stream_uri_response(uri: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
<soap:Body>
<trt:GetStreamUriResponse xmlns:trt="http://www.onvif.org/ver10/media/wsdl">
<trt:MediaUri>
<tt:Uri xmlns:tt="http://www.onvif.org/ver10/schema">{uri}</tt:Uri>
<tt:InvalidAfterConnect xmlns:tt="http://www.onvif.org/ver10/schema">false</tt:InvalidAfterConnect>
<tt:InvalidAfterReboot xmlns:tt="http://www.onvif.org/ver10/schema">false</tt:InvalidAfterReboot>
<tt:Timeout xmlns:tt="http://www.onvif.org/ver10/schema">PT60S</tt:Timeout>
</trt:MediaUri>
</trt:GetStreamUriResponse>
</soap:Body>
</soap:Envelope>"#
    )
}

pub fn get_snapshot_uri_response(base_url: &str, path: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
<soap:Body>
<trt:GetSnapshotUriResponse xmlns:trt="http://www.onvif.org/ver10/media/wsdl">
<trt:MediaUri>
<tt:Uri xmlns:tt="http://www.onvif.org/ver10/schema">{base_url}/onvif/snapshot/{path}.jpg</tt:Uri>
<tt:InvalidAfterConnect xmlns:tt="http://www.onvif.org/ver10/schema">false</tt:InvalidAfterConnect>
<tt:InvalidAfterReboot xmlns:tt="http://www.onvif.org/ver10/schema">false</tt:InvalidAfterReboot>
<tt:Timeout xmlns:tt="http://www.onvif.org/ver10/schema">PT60S</tt:Timeout>
</trt:MediaUri>
</trt:GetSnapshotUriResponse>
</soap:Body>
</soap:Envelope>"#
    )
}

/// Media2 profile listing is schema-compatible enough for Profile S clients
/// to reuse the Media1 profile blocks under the `tr2` namespace.
pub fn get_profiles_response_media2(camera: &Camera) -> String {
    let main = profile_block(MAIN_PROFILE_TOKEN, &camera.main, "MainVideoSource");
    let sub = profile_block(SUB_PROFILE_TOKEN, &camera.sub, "SubVideoSource");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
<soap:Body>
<tr2:GetProfilesResponse xmlns:tr2="http://www.onvif.org/ver20/media/wsdl">
{main}
{sub}
</tr2:GetProfilesResponse>
</soap:Body>
</soap:Envelope>"#
    )
}

pub fn get_stream_uri_response_media2(uri: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
<soap:Body>
<tr2:GetStreamUriResponse xmlns:tr2="http://www.onvif.org/ver20/media/wsdl">
<tr2:Uri>{uri}</tr2:Uri>
</tr2:GetStreamUriResponse>
</soap:Body>
</soap:Envelope>"#
    )
}

/// A SOAP 1.2 fault, used for both `ter:NotAuthorized` (spec §4.6) and
/// unrecognized actions.
pub fn fault_response(code: &str, subcode: &str, reason: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
<soap:Body>
<soap:Fault>
<soap:Code>
<soap:Value>soap:{code}</soap:Value>
<soap:Subcode><soap:Value>ter:{subcode}</soap:Value></soap:Subcode>
</soap:Code>
<soap:Reason><soap:Text xml:lang="en">{reason}</soap:Text></soap:Reason>
</soap:Fault>
</soap:Body>
</soap:Envelope>"#
    )
}

pub fn not_authorized_fault() -> String {
    fault_response("Sender", "NotAuthorized", "The action requested requires authorization")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraStatus, Upstream};

    fn camera() -> Camera {
        Camera {
            id: 7,
            name: "Front Door".into(),
            upstream: Upstream {
                host: "192.0.2.5".into(),
                rtsp_port: 554,
                username: String::new(),
                password: String::new(),
                main_path: "s1".into(),
                sub_path: "s2".into(),
            },
            main: StreamParams { width: 1920, height: 1080, framerate: 25, transcode: false },
            sub: StreamParams { width: 640, height: 360, framerate: 10, transcode: false },
            onvif_port: 8001,
            onvif_username: "admin".into(),
            onvif_password: "admin".into(),
            virtual_nic: None,
            auto_start: true,
            path_name: "front_door".into(),
            status: CameraStatus::Running,
            last_error: None,
            assigned_ip: None,
            unknown: Default::default(),
        }
    }

    #[test]
    fn stream_uri_matches_spec_shape() {
        let uri = stream_uri("192.0.2.100", 8554, "front_door_main");
        assert_eq!(uri, "rtsp://192.0.2.100:8554/front_door_main");
    }

    #[test]
    fn get_profiles_advertises_both_fixed_tokens() {
        let xml = get_profiles_response(&camera());
        assert!(xml.contains(r#"token="MainProfile""#));
        assert!(xml.contains(r#"token="SubProfile""#));
        assert!(xml.contains("<tt:Width>1920</tt:Width>"));
        assert!(xml.contains("<tt:Width>640</tt:Width>"));
    }

    #[test]
    fn device_information_embeds_camera_id() {
        let xml = get_device_information_response(&camera());
        assert!(xml.contains("vcam-7"));
    }

    #[test]
    fn device_uuid_is_stable_across_calls() {
        let first = get_device_information_response(&camera());
        let second = get_device_information_response(&camera());
        assert_eq!(first, second);
        assert!(first.contains("urn:uuid:"));
    }

    #[test]
    fn not_authorized_fault_uses_onvif_subcode() {
        let xml = not_authorized_fault();
        assert!(xml.contains("ter:NotAuthorized"));
    }
}
