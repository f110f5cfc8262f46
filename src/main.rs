// This software is provided for non-commercial use only.
// Commercial use is strictly prohibited.
// If you use, modify, or redistribute this software, you must provide proper attribution to the original author.
// (c) 2026 Onur Tuna. All rights reserved.

//! ONVIF Gateway
//!
//! Usage:
//!   onvif-gateway serve  --config gateway.json
//!   onvif-gateway status --config gateway.json
//!   onvif-gateway add-camera --config gateway.json --name "Front Door" --host 192.0.2.10 --rtsp-port 554 --main-path stream1 --sub-path stream2
//!   onvif-gateway remove-camera --config gateway.json --id 3

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gateway::api::{self, AppState};
use gateway::config::{Camera, ConfigStore, StreamParams, Upstream};
use gateway::mediaserver::MediaServerController;
use gateway::supervisor::Supervisor;
use gateway::vnic;

/// How often the background reconciliation task polls for an unnoticed
/// media-server crash (spec §4.5: restart recovery is autonomous, not
/// tied to the next unrelated camera operation).
const RECONCILE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

const EXIT_OK: i32 = 0;
const EXIT_CONFIG_ERROR: i32 = 1;
const EXIT_PORT_BIND_FAILURE: i32 = 2;
const EXIT_MEDIA_SERVER_UNRECOVERABLE: i32 = 3;

#[derive(Parser)]
#[command(name = "onvif-gateway", about = "Virtual-camera ONVIF gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the gateway: media server, Supervisor, and the control API.
    Serve {
        #[arg(short, long, default_value = "gateway.json")]
        config: PathBuf,
        /// Path to the mediamtx-shaped media server binary.
        #[arg(long, default_value = "mediamtx")]
        media_server_bin: PathBuf,
        /// Where the compiled media-server configuration is written.
        #[arg(long, default_value = "mediamtx.json")]
        media_server_config: PathBuf,
    },
    /// Print a brief status snapshot and exit.
    Status {
        #[arg(short, long, default_value = "gateway.json")]
        config: PathBuf,
    },
    /// Register a new camera (stopped, not yet started).
    AddCamera {
        #[arg(short, long, default_value = "gateway.json")]
        config: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        host: String,
        #[arg(long, default_value_t = 554)]
        rtsp_port: u16,
        #[arg(long)]
        main_path: String,
        #[arg(long)]
        sub_path: String,
    },
    /// Remove a camera from the configuration.
    RemoveCamera {
        #[arg(short, long, default_value = "gateway.json")]
        config: PathBuf,
        #[arg(long)]
        id: u32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Command::Serve { config, media_server_bin, media_server_config } => {
            run_serve(config, media_server_bin, media_server_config).await
        }
        Command::Status { config } => run_status(config),
        Command::AddCamera { config, name, host, rtsp_port, main_path, sub_path } => {
            run_add_camera(config, name, host, rtsp_port, main_path, sub_path)
        }
        Command::RemoveCamera { config, id } => run_remove_camera(config, id),
    };

    std::process::exit(code);
}

async fn run_serve(config_path: PathBuf, media_server_bin: PathBuf, media_server_config: PathBuf) -> i32 {
    let config = match ConfigStore::open(&config_path) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!(error = %e, "failed to load config");
            return EXIT_CONFIG_ERROR;
        }
    };
    let settings = config.settings();

    info!(cameras = config.list_cameras().len(), config = ?config_path, "starting onvif gateway");

    let media = Arc::new(MediaServerController::new(
        media_server_bin.to_string_lossy().into_owned(),
        media_server_config,
        settings.media_api_port,
    ));
    let supervisor = Arc::new(Supervisor::new(Arc::clone(&config), Arc::clone(&media), vnic::default_backend()));

    let state = Arc::new(AppState { config: Arc::clone(&config), supervisor: Arc::clone(&supervisor) });
    let router = api::build_router(state);

    let api_addr = format!("{}:{}", settings.bind_ip.resolve(), settings.api_port);
    let listener = match tokio::net::TcpListener::bind(&api_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %api_addr, error = %e, "failed to bind control API port");
            return EXIT_PORT_BIND_FAILURE;
        }
    };
    info!(addr = %api_addr, "control API listening");

    let api_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "control API server error");
        }
    });

    let reconcile_task = {
        let media = Arc::clone(&media);
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(RECONCILE_INTERVAL).await;
                if let Err(e) = media.reconcile().await {
                    error!(error = %e, "media server reconciliation found it unrecoverable");
                    supervisor.mark_all_running_failed(&e);
                }
            }
        })
    };

    let auto_start: Vec<u32> = config.list_cameras().into_iter().filter(|c| c.auto_start).map(|c| c.id).collect();
    for id in auto_start {
        if let Err(e) = supervisor.start_camera(id).await {
            error!(camera_id = id, error = %e, "auto-start failed");
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received ctrl-c, shutting down"),
        Err(e) => error!(error = %e, "signal handler error"),
    }

    reconcile_task.abort();
    let results = supervisor.stop_all().await;
    let media_failed = results.iter().any(|(_, r)| matches!(r, Err(e) if e.kind() == "E_MEDIA_DEAD"));
    media.stop().await;
    api_task.abort();

    if media_failed {
        EXIT_MEDIA_SERVER_UNRECOVERABLE
    } else {
        EXIT_OK
    }
}

fn run_status(config_path: PathBuf) -> i32 {
    let config = match ConfigStore::open(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load config");
            return EXIT_CONFIG_ERROR;
        }
    };

    let cameras = config.list_cameras();
    println!("=== ONVIF Gateway Status ===");
    println!("Cameras: {}", cameras.len());
    for cam in &cameras {
        println!(
            "  [{}] {} ({}) — {:?} port={} ip={}",
            cam.id,
            cam.name,
            cam.path_name,
            cam.status,
            cam.onvif_port,
            cam.assigned_ip.as_deref().unwrap_or("-"),
        );
    }
    EXIT_OK
}

fn run_add_camera(
    config_path: PathBuf,
    name: String,
    host: String,
    rtsp_port: u16,
    main_path: String,
    sub_path: String,
) -> i32 {
    let config = match ConfigStore::open(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load config");
            return EXIT_CONFIG_ERROR;
        }
    };

    let settings = config.settings();
    let onvif_port = match gateway::ports::PortAllocator::allocate(&config.list_cameras(), &settings) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "no free onvif port");
            return EXIT_CONFIG_ERROR;
        }
    };

    let camera = Camera {
        id: config.next_id(),
        path_name: gateway::config::slugify(&name),
        name,
        upstream: Upstream { host, rtsp_port, username: String::new(), password: String::new(), main_path, sub_path },
        main: StreamParams { width: 1920, height: 1080, framerate: 25, transcode: false },
        sub: StreamParams { width: 640, height: 360, framerate: 10, transcode: false },
        onvif_port,
        onvif_username: "admin".to_string(),
        onvif_password: "admin".to_string(),
        virtual_nic: None,
        auto_start: false,
        status: gateway::config::CameraStatus::Stopped,
        last_error: None,
        assigned_ip: None,
        unknown: Default::default(),
    };

    match config.put_camera(camera.clone()) {
        Ok(()) => {
            println!("Added camera [{}] '{}' on ONVIF port {}", camera.id, camera.name, camera.onvif_port);
            EXIT_OK
        }
        Err(e) => {
            error!(error = %e, "failed to add camera");
            EXIT_CONFIG_ERROR
        }
    }
}

fn run_remove_camera(config_path: PathBuf, id: u32) -> i32 {
    let config = match ConfigStore::open(&config_path) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "failed to load config");
            return EXIT_CONFIG_ERROR;
        }
    };

    match config.delete_camera(id) {
        Ok(camera) => {
            println!("Removed camera [{}] '{}'", camera.id, camera.name);
            EXIT_OK
        }
        Err(e) => {
            error!(error = %e, "failed to remove camera");
            EXIT_CONFIG_ERROR
        }
    }
}
