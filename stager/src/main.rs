//! App Stager - Entry Point
//!
//! Dispatches application staging requests to staging workers over the
//! message bus and registers the droplets they produce.

use std::collections::HashMap;
use std::env;

use app_stager::app::options::AppOptions;
use app_stager::app::run::{run, Command};
use app_stager::filesys::file::File;
use app_stager::logs::{init_logging, LogOptions};
use app_stager::storage::layout::StorageLayout;
use app_stager::storage::settings::Settings;
use app_stager::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return;
    }

    // Retrieve the settings file; only an explicit --config must exist
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => StorageLayout::default().settings_file(),
    };
    let settings = if cli_args.contains_key("config") || settings_file.exists().await {
        match Settings::load(&settings_file).await {
            Ok(settings) => settings,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
    } else {
        Settings::default()
    };

    let layout = settings
        .base_dir
        .clone()
        .map(StorageLayout::new)
        .unwrap_or_default();

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let command = if let Some(guid) = cli_args.get("stage") {
        Command::Stage(guid.clone())
    } else if let Some(guid) = cli_args.get("stage-async") {
        Command::StageAsync(guid.clone())
    } else {
        Command::Serve
    };

    let options = AppOptions::from_settings(&settings, layout);

    info!("Running app stager {} with options: {:?}", version.version, options);
    if let Err(e) = run(options, command, await_shutdown_signal()).await {
        error!("App stager failed: {e}");
        std::process::exit(1);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers, waiting for Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
