//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{copy_secret, AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::channel::mqtt::{EventPump, PumpOptions};
use crate::errors::StagerError;
use crate::server::serve::serve;
use crate::server::state::{ServerState, StagingCredentials};

/// What the process does once initialized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve until a shutdown signal
    Serve,

    /// Stage one app synchronously, then exit
    Stage(String),

    /// Request a background staging for one app, then exit
    StageAsync(String),
}

/// Run the app stager
pub async fn run(
    options: AppOptions,
    command: Command,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), StagerError> {
    info!("Initializing app stager...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    let app_state = match init(options, shutdown_tx.clone(), &mut shutdown_manager).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to start app stager: {}", e);
            shutdown_manager.shutdown().await?;
            return Err(e);
        }
    };

    let result = match command {
        Command::Serve => {
            shutdown_signal.await;
            info!("Shutdown signal received, shutting down...");
            Ok(())
        }
        Command::Stage(guid) => tokio::select! {
            result = stage_app(&app_state, &guid) => result,
            _ = shutdown_signal => {
                info!("Shutdown signal received, abandoning staging of {}", guid);
                Ok(())
            }
        },
        Command::StageAsync(guid) => tokio::select! {
            result = stage_app_async(&app_state, &guid) => result,
            _ = shutdown_signal => {
                info!("Shutdown signal received, abandoning staging of {}", guid);
                Ok(())
            }
        },
    };

    // Shutdown
    drop(shutdown_tx);
    shutdown_manager.shutdown().await?;
    result
}

async fn stage_app(app_state: &AppState, guid: &str) -> Result<(), StagerError> {
    let mut app = app_state.stager.find_app(guid).await?;
    app_state.stager.stage(&mut app).await?;
    info!(
        "Staged {} with droplet {}",
        app.guid,
        app.droplet_hash.as_deref().unwrap_or("-")
    );
    Ok(())
}

async fn stage_app_async(app_state: &AppState, guid: &str) -> Result<(), StagerError> {
    let app = app_state.stager.find_app(guid).await?;
    let response = app_state.stager.stage_async(&app).await?;
    info!(
        "Staging {} in the background: task {}, logs at {}",
        app.guid,
        response.task_id.as_deref().unwrap_or("-"),
        response.streaming_log_url.as_deref().unwrap_or("-")
    );
    Ok(())
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, StagerError> {
    let (app_state, pump) = AppState::init(&options).await?;
    let app_state = Arc::new(app_state);
    shutdown_manager.with_app_state(app_state.clone())?;

    if let Some(pump) = pump {
        init_event_pump(
            pump,
            options.message_bus.pump.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    if options.enable_server {
        init_server(
            &options,
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    Ok(app_state)
}

fn init_event_pump(
    pump: EventPump,
    options: PumpOptions,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), StagerError> {
    info!("Initializing message bus event pump...");

    let pump_handle = tokio::spawn(async move {
        pump.run(
            &options,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_event_pump_handle(pump_handle)
}

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), StagerError> {
    info!("Initializing HTTP server...");

    let staging_credentials = match (&options.external.user, &options.external.password) {
        (Some(user), Some(password)) => Some(StagingCredentials::new(
            user.clone(),
            copy_secret(password),
        )),
        _ => None,
    };
    let server_state = ServerState::new(app_state.stager.clone(), staging_credentials);

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    server_handle: Option<JoinHandle<Result<(), StagerError>>>,
    event_pump_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            server_handle: None,
            event_pump_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), StagerError> {
        if self.app_state.is_some() {
            return Err(StagerError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_event_pump_handle(&mut self, handle: JoinHandle<()>) -> Result<(), StagerError> {
        if self.event_pump_handle.is_some() {
            return Err(StagerError::ShutdownError("event_pump_handle already set".to_string()));
        }
        self.event_pump_handle = Some(handle);
        Ok(())
    }

    pub fn with_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), StagerError>>,
    ) -> Result<(), StagerError> {
        if self.server_handle.is_some() {
            return Err(StagerError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), StagerError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), StagerError> {
        info!("Shutting down app stager...");

        // 1. HTTP server, so no new staging starts
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| StagerError::ShutdownError(e.to_string()))??;
        }

        // 2. Event pump
        if let Some(handle) = self.event_pump_handle.take() {
            handle.await.map_err(|e| StagerError::ShutdownError(e.to_string()))?;
        }

        // 3. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
