use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;

use treesync_core::{settings, SyncSettings};
use treesync_sync::{
    copy_single_file, delete_single_path,
    pipeline::{self, SyncRequest},
    CancelFlag, CopyResult, DeleteResult, SyncOutcome, TracingReporter,
};

use crate::error::{io_err, DaemonError};
use crate::monitor::{ChangeMonitor, ChangeSink, MonitorFilter};
use crate::paths::{socket_path, state_dir};
use crate::protocol::{DaemonRequest, DaemonResponse};

const QUEUE_DEPTH: usize = 256;

type SyncReply = oneshot::Sender<Result<SyncSummary, String>>;

/// Work for the processor. Every mutation of the target tree goes through
/// this queue, so full syncs and live changes never overlap.
#[derive(Debug)]
pub(crate) enum SyncJob {
    FullSync {
        trial_run: bool,
        origin: &'static str,
        respond_to: Option<SyncReply>,
    },
    SyncFile(String),
    DeleteFile(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub origin: String,
    pub trial_run: bool,
    pub copied: usize,
    pub deleted: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub duration_ms: u128,
}

impl SyncSummary {
    fn new(origin: &str, trial_run: bool, outcome: SyncOutcome, duration: Duration) -> Self {
        Self {
            origin: origin.to_string(),
            trial_run,
            copied: outcome.copied,
            deleted: outcome.deleted,
            failed: outcome.failed,
            cancelled: outcome.cancelled,
            duration_ms: duration.as_millis(),
        }
    }
}

/// Startup switches for [`run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DaemonOptions {
    /// Queue a full sync before any live change is processed.
    pub initial_sync: bool,
}

/// State shared by the processor, the socket server and the monitor sink.
#[derive(Debug)]
pub(crate) struct DaemonState {
    settings: SyncSettings,
    socket: PathBuf,
    started_at_unix: u64,
    last_sync_at_unix: AtomicU64,
    actions_forwarded: AtomicU64,
    monitoring: AtomicBool,
    sync_in_progress: AtomicBool,
    cancel: CancelFlag,
}

impl DaemonState {
    pub(crate) fn new(home: &Path, settings: SyncSettings) -> Self {
        Self {
            settings,
            socket: socket_path(home),
            started_at_unix: unix_seconds_now(),
            last_sync_at_unix: AtomicU64::new(0),
            actions_forwarded: AtomicU64::new(0),
            monitoring: AtomicBool::new(false),
            sync_in_progress: AtomicBool::new(false),
            cancel: CancelFlag::new(),
        }
    }

    fn request(&self, trial_run: bool) -> SyncRequest {
        SyncRequest::from_settings(&self.settings, trial_run)
    }
}

/// Forwards monitor events into the job queue from the watcher thread.
pub(crate) struct QueueSink {
    tx: mpsc::Sender<SyncJob>,
    auto_sync: bool,
    delete_files: bool,
}

impl QueueSink {
    pub(crate) fn new(tx: mpsc::Sender<SyncJob>, settings: &SyncSettings) -> Self {
        Self {
            tx,
            auto_sync: settings.auto_sync,
            delete_files: settings.delete_files,
        }
    }

    fn forward(&self, job: SyncJob) {
        if self.tx.blocking_send(job).is_err() {
            tracing::warn!("sync queue closed; dropping change");
        }
    }
}

impl ChangeSink for QueueSink {
    fn sync_file(&self, rel: &str) {
        if !self.auto_sync {
            tracing::info!(path = %rel, "change detected (auto-sync off)");
            return;
        }
        self.forward(SyncJob::SyncFile(rel.to_string()));
    }

    fn delete_file(&self, rel: &str) {
        if !self.auto_sync || !self.delete_files {
            tracing::info!(path = %rel, "deletion detected (not propagated)");
            return;
        }
        self.forward(SyncJob::DeleteFile(rel.to_string()));
    }
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path, options: DaemonOptions) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf(), options))
}

/// Run the daemon runtime until `stop` or ctrl-c.
pub async fn run(home: PathBuf, options: DaemonOptions) -> Result<(), DaemonError> {
    let settings = settings::load_at(&home)?;
    pipeline::validate_roots(&settings.roots())?;
    ensure_state_dir(&home)?;

    let state = Arc::new(DaemonState::new(&home, settings));
    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(QUEUE_DEPTH);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    if options.initial_sync {
        sync_tx
            .send(SyncJob::FullSync {
                trial_run: false,
                origin: "startup",
                respond_to: None,
            })
            .await
            .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;
    }

    let mut monitor = ChangeMonitor::new();
    monitor.start(
        &state.settings.source,
        MonitorFilter::new(
            state.settings.user_patterns(),
            state.settings.case_sensitive,
        ),
        Arc::new(QueueSink::new(sync_tx.clone(), &state.settings)),
    )?;
    state.monitoring.store(true, Ordering::SeqCst);
    tracing::info!(
        source = %state.settings.source.display(),
        target = %state.settings.target.display(),
        auto_sync = state.settings.auto_sync,
        delete_files = state.settings.delete_files,
        "daemon started",
    );

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let result = sync_processor_task(state, sync_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let state = state.clone();
        let sync_tx = sync_tx.clone();
        tokio::spawn(async move {
            let result =
                socket_server_task(state, sync_tx, shutdown.clone(), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let cancel = state.cancel.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            cancel.cancel();
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (processor_result, socket_result, signal_result) =
        tokio::join!(processor_handle, socket_handle, signal_handle);

    // Stop events first so nothing blocks on a queue no one drains.
    monitor.stop();
    state.monitoring.store(false, Ordering::SeqCst);

    handle_join("sync_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("daemon stopped");
    Ok(())
}

async fn sync_processor_task(
    state: Arc<DaemonState>,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };
                process_job(&state, job).await?;
            }
        }
    }
    Ok(())
}

pub(crate) async fn process_job(state: &Arc<DaemonState>, job: SyncJob) -> Result<(), DaemonError> {
    match job {
        SyncJob::FullSync {
            trial_run,
            origin,
            respond_to,
        } => {
            let started = Instant::now();
            let request = state.request(trial_run);
            let cancel = state.cancel.clone();
            cancel.reset();
            state.sync_in_progress.store(true, Ordering::SeqCst);

            let result = tokio::task::spawn_blocking(move || {
                pipeline::run(&request, &TracingReporter, &cancel)
            })
            .await;
            state.sync_in_progress.store(false, Ordering::SeqCst);
            let result =
                result.map_err(|err| DaemonError::Protocol(format!("sync task join error: {err}")))?;

            let reply = match result {
                Ok(outcome) => {
                    if !trial_run {
                        state
                            .last_sync_at_unix
                            .store(unix_seconds_now(), Ordering::SeqCst);
                    }
                    let summary = SyncSummary::new(origin, trial_run, outcome, started.elapsed());
                    tracing::info!(
                        origin,
                        copied = summary.copied,
                        deleted = summary.deleted,
                        failed = summary.failed,
                        cancelled = summary.cancelled,
                        duration_ms = summary.duration_ms as u64,
                        "full sync completed",
                    );
                    Ok(summary)
                }
                Err(err) => {
                    tracing::error!(origin, error = %err, "full sync failed");
                    Err(err.to_string())
                }
            };
            if let Some(respond_to) = respond_to {
                let _ = respond_to.send(reply);
            }
        }
        SyncJob::SyncFile(rel) => {
            let request = state.request(false);
            let path = rel.clone();
            let result = tokio::task::spawn_blocking(move || {
                copy_single_file(&request.roots, &path, &request.exclusions())
            })
            .await
            .map_err(|err| DaemonError::Protocol(format!("copy task join error: {err}")))?;

            match result {
                Ok(CopyResult::Copied) => {
                    record_action(state);
                    tracing::info!(path = %rel, "synced");
                }
                Ok(CopyResult::Excluded) => tracing::info!(path = %rel, "ignored excluded file"),
                Ok(CopyResult::SourceMissing) => {
                    tracing::debug!(path = %rel, "source gone before copy")
                }
                Err(err) => tracing::error!(path = %rel, error = %err, "sync failed"),
            }
        }
        SyncJob::DeleteFile(rel) => {
            let target = state.settings.target.clone();
            let path = rel.clone();
            let result = tokio::task::spawn_blocking(move || delete_single_path(&target, &path))
                .await
                .map_err(|err| DaemonError::Protocol(format!("delete task join error: {err}")))?;

            match result {
                Ok(DeleteResult::Deleted { pruned }) => {
                    record_action(state);
                    tracing::info!(path = %rel, pruned, "deleted");
                }
                Ok(DeleteResult::Missing) => tracing::debug!(path = %rel, "already absent"),
                Err(err) => tracing::error!(path = %rel, error = %err, "delete failed"),
            }
        }
    }
    Ok(())
}

fn record_action(state: &DaemonState) {
    state.actions_forwarded.fetch_add(1, Ordering::SeqCst);
    state
        .last_sync_at_unix
        .store(unix_seconds_now(), Ordering::SeqCst);
}

async fn socket_server_task(
    state: Arc<DaemonState>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let socket = state.socket.clone();
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let state = state.clone();
                let sync_tx = sync_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(stream, state, sync_tx, shutdown_tx).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    state: Arc<DaemonState>,
    sync_tx: mpsc::Sender<SyncJob>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: DaemonRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = dispatch(&request, &state, &sync_tx, &shutdown_tx).await;
        write_response(&mut writer, &response).await?;
        if request.cmd == "stop" {
            break;
        }
    }

    Ok(())
}

pub(crate) async fn dispatch(
    request: &DaemonRequest,
    state: &DaemonState,
    sync_tx: &mpsc::Sender<SyncJob>,
    shutdown_tx: &broadcast::Sender<()>,
) -> DaemonResponse {
    match request.cmd.as_str() {
        "status" => DaemonResponse::ok(build_status_payload(state)),
        "sync" => {
            let trial_run = request.trial_run.unwrap_or(false);
            match enqueue_sync(sync_tx, trial_run, "socket").await {
                Ok(summary) => DaemonResponse::ok(json!(summary)),
                Err(err) => DaemonResponse::error(err.to_string()),
            }
        }
        "cancel" => {
            let running = state.sync_in_progress.load(Ordering::SeqCst);
            if running {
                state.cancel.cancel();
                tracing::info!("cancel requested for in-flight sync");
            }
            DaemonResponse::ok(json!({ "cancelled": running }))
        }
        "stop" => {
            state.cancel.cancel();
            let _ = shutdown_tx.send(());
            DaemonResponse::ok(json!({ "stopping": true }))
        }
        other => DaemonResponse::error(format!("unknown command '{other}'")),
    }
}

pub(crate) fn build_status_payload(state: &DaemonState) -> Value {
    json!({
        "running": true,
        "monitoring": state.monitoring.load(Ordering::SeqCst),
        "source": state.settings.source.display().to_string(),
        "target": state.settings.target.display().to_string(),
        "auto_sync": state.settings.auto_sync,
        "delete_files": state.settings.delete_files,
        "started_at_unix": state.started_at_unix,
        "last_sync_at_unix": state.last_sync_at_unix.load(Ordering::SeqCst),
        "actions_forwarded": state.actions_forwarded.load(Ordering::SeqCst),
        "sync_in_progress": state.sync_in_progress.load(Ordering::SeqCst),
        "socket": state.socket.display().to_string(),
    })
}

async fn enqueue_sync(
    sync_tx: &mpsc::Sender<SyncJob>,
    trial_run: bool,
    origin: &'static str,
) -> Result<SyncSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    sync_tx
        .send(SyncJob::FullSync {
            trial_run,
            origin,
            respond_to: Some(tx),
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("sync response"))?;
    outcome.map_err(DaemonError::Protocol)
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

fn ensure_state_dir(home: &Path) -> Result<(), DaemonError> {
    let dir = state_dir(home);
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }
    Ok(())
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Install the daemon's subscriber. `RUST_LOG` filters (default `info`);
/// `TREESYNC_LOG_FORMAT=json` switches to one JSON object per line.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("TREESYNC_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json {
        let _ = fmt().json().with_env_filter(filter).try_init();
    } else {
        let _ = fmt().with_env_filter(filter).with_target(false).try_init();
    }
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}
