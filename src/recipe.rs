// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! Media Recipe Compiler (spec §4.4): a pure function from the active
//! camera set to the media-server configuration document. Two recipes are
//! emitted per camera, keyed by `<pathName>_main` and `<pathName>_sub`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Camera;

/// Minimum delay the transcode shell loop sleeps between encoder restarts
/// (spec §5 backpressure, §9 design note).
pub const ENCODER_RESTART_DELAY: Duration = Duration::from_secs(2);

/// I/O timeout applied to pass-through pulls from the upstream (spec §4.4).
pub const PASSTHROUGH_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// The external encoder binary the transcode shell loop invokes. A compiler
/// constant, not user-configurable, matching every transcode example in the
/// retrieval pack.
pub const ENCODER_BIN: &str = "ffmpeg";

/// One entry in the media server's `paths` map (spec §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRecipe {
    /// `"publisher"` when an external process pushes media into this path
    /// (transcode case); the upstream RTSP URL when the media server itself
    /// pulls it (pass-through case).
    pub source: String,
    /// Unique per-recipe tag, required by spec §4.4 even though this gateway
    /// never reuses a source across two paths.
    pub source_protocol: String,
    /// Transport used when pulling from `source` (pass-through only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_protocol_transport: Option<String>,
    /// Read timeout in seconds (pass-through only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_read_timeout_secs: Option<u64>,
    /// Always `false`: the media server must not start a second copy of the
    /// recipe's process on its own init (spec §4.4).
    pub run_on_init_restart: bool,
    /// Always `false`: the stream stays warm regardless of subscriber
    /// presence (spec §4.4).
    pub source_on_demand: bool,
    /// Shell command for the transcode case; absent for pass-through.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_on_init: Option<String>,
}

/// The compiled media-server configuration (spec §6): a `paths` map keyed
/// by `<pathName>_main` / `<pathName>_sub`, stable-sorted by key so that
/// `Compile(S) == Compile(π(S))` for any permutation `π` of the camera set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaServerConfig {
    pub paths: BTreeMap<String, PathRecipe>,
}

pub struct MediaRecipeCompiler;

impl MediaRecipeCompiler {
    /// Compile the configuration for the given (already id-sorted or not —
    /// order does not matter, see determinism property above) camera set.
    pub fn compile(cameras: &[Camera], local_rtsp_port: u16) -> MediaServerConfig {
        let mut sorted: Vec<&Camera> = cameras.iter().collect();
        sorted.sort_by_key(|c| c.id);

        let mut paths = BTreeMap::new();
        for camera in sorted {
            let main_key = camera.path_main();
            paths.insert(
                main_key.clone(),
                Self::compile_stream(camera, &main_key, &camera.upstream.main_path, &camera.main, local_rtsp_port),
            );

            let sub_key = camera.path_sub();
            paths.insert(
                sub_key.clone(),
                Self::compile_stream(camera, &sub_key, &camera.upstream.sub_path, &camera.sub, local_rtsp_port),
            );
        }
        MediaServerConfig { paths }
    }

    fn compile_stream(
        camera: &Camera,
        path_key: &str,
        upstream_path: &str,
        params: &crate::config::StreamParams,
        local_rtsp_port: u16,
    ) -> PathRecipe {
        let upstream_url = upstream_url(camera, upstream_path);

        if params.transcode {
            let local_url = format!("rtsp://127.0.0.1:{local_rtsp_port}/{path_key}");
            PathRecipe {
                source: "publisher".to_string(),
                source_protocol: format!("gateway-transcode-{path_key}"),
                source_protocol_transport: None,
                source_read_timeout_secs: None,
                run_on_init_restart: false,
                source_on_demand: false,
                run_on_init: Some(transcode_shell_loop(&upstream_url, &local_url, params)),
            }
        } else {
            PathRecipe {
                source: upstream_url,
                source_protocol: format!("gateway-passthrough-{path_key}"),
                source_protocol_transport: Some("tcp".to_string()),
                source_read_timeout_secs: Some(PASSTHROUGH_READ_TIMEOUT.as_secs()),
                run_on_init_restart: false,
                source_on_demand: false,
                run_on_init: None,
            }
        }
    }
}

fn upstream_url(camera: &Camera, path: &str) -> String {
    let up = &camera.upstream;
    if up.username.is_empty() {
        format!("rtsp://{}:{}/{}", up.host, up.rtsp_port, path)
    } else {
        format!(
            "rtsp://{}:{}@{}:{}/{}",
            up.username, up.password, up.host, up.rtsp_port, path
        )
    }
}

/// Build the shell-level auto-restart loop wrapping the encoder (spec §4.4,
/// §9). The encoder is always a direct child of the shell (C1): killing the
/// shell's process group kills the encoder with it. The shell restarts the
/// encoder unconditionally on any exit, sleeping `ENCODER_RESTART_DELAY`
/// between iterations (C2), until the shell itself is killed.
fn transcode_shell_loop(upstream_url: &str, local_url: &str, params: &crate::config::StreamParams) -> String {
    let sleep_secs = ENCODER_RESTART_DELAY.as_secs();
    format!(
        "sh -c 'while true; do {bin} -rtsp_transport tcp -i {input} \
         -vf scale={w}:{h} -r {fps} -c:v libx264 -preset veryfast -f rtsp {output}; \
         sleep {sleep}; done'",
        bin = ENCODER_BIN,
        input = shell_quote(upstream_url),
        w = params.width,
        h = params.height,
        fps = params.framerate,
        output = shell_quote(local_url),
        sleep = sleep_secs,
    )
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}
