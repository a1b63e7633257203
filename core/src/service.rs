/// Ingest service: owns the aggregator and wires producers to it
use crate::aggregator::Aggregator;
use crate::api::start_api_server;
use crate::bridge::{load_buffered, run_udp_bridge, BridgeEvent};
use crate::config::Config;
use crate::demo::{DemoGenerator, DemoHandle};
use crate::error::{FlowError, Result};
use crate::message::{Message, RawMessage};
use crate::view::DashboardStats;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Connection banner shown by front-ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamStatus {
    pub connection_text: String,
    pub stream_title: String,
}

impl StreamStatus {
    pub fn waiting() -> Self {
        Self {
            connection_text: "Waiting for messages".to_string(),
            stream_title: "No stream".to_string(),
        }
    }

    pub fn demo() -> Self {
        Self {
            connection_text: "Demo Mode Active".to_string(),
            stream_title: "Demo: Gaming Live Stream".to_string(),
        }
    }

    pub fn extension() -> Self {
        Self {
            connection_text: "Connected to Extension".to_string(),
            stream_title: "Live Stream Chat".to_string(),
        }
    }
}

/// Immutable view published after every change
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub status: StreamStatus,
    pub board: Aggregator,
}

enum Inbound {
    Message(Message),
    Status(StreamStatus),
}

/// Cloneable entry point for producers and readers
#[derive(Clone)]
pub struct FlowHandle {
    tx: mpsc::UnboundedSender<Inbound>,
    snapshot: watch::Receiver<Arc<Snapshot>>,
}

impl FlowHandle {
    fn send(&self, inbound: Inbound) -> Result<()> {
        self.tx
            .send(inbound)
            .map_err(|_| FlowError::Service("ingest task has stopped".to_string()))
    }

    pub fn push(&self, message: Message) -> Result<()> {
        self.send(Inbound::Message(message))
    }

    /// Validate and push a raw message
    pub fn push_raw(&self, raw: RawMessage) -> Result<()> {
        self.push(Message::try_from(raw)?)
    }

    /// Push every valid message in `event`, returning how many were accepted.
    /// Invalid messages are skipped.
    pub fn push_event(&self, event: BridgeEvent) -> Result<usize> {
        let mut accepted = 0;
        for raw in event.into_raw_messages() {
            match self.push_raw(raw) {
                Ok(()) => accepted += 1,
                Err(FlowError::InvalidMessage(reason)) => {
                    warn!("Skipping invalid message: {}", reason)
                }
                Err(e) => return Err(e),
            }
        }
        Ok(accepted)
    }

    pub fn set_status(&self, status: StreamStatus) -> Result<()> {
        self.send(Inbound::Status(status))
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot.clone()
    }
}

/// The single owner of aggregator state
pub struct FlowService {
    board: Aggregator,
    status: StreamStatus,
    rx: mpsc::UnboundedReceiver<Inbound>,
    publish: watch::Sender<Arc<Snapshot>>,
}

impl FlowService {
    /// Start the ingest task. It runs until every handle is dropped.
    pub fn spawn(config: &Config) -> (FlowHandle, JoinHandle<()>) {
        let board = Aggregator::with_capacity(config.log_capacity);
        let status = StreamStatus::waiting();
        let (tx, rx) = mpsc::unbounded_channel();
        let (publish, snapshot) = watch::channel(Arc::new(Snapshot {
            status: status.clone(),
            board: board.clone(),
        }));

        let service = Self {
            board,
            status,
            rx,
            publish,
        };
        let task = tokio::spawn(service.run());

        (FlowHandle { tx, snapshot }, task)
    }

    async fn run(mut self) {
        while let Some(inbound) = self.rx.recv().await {
            self.apply(inbound);
            // Fold whatever else is already queued into the same snapshot
            while let Ok(inbound) = self.rx.try_recv() {
                self.apply(inbound);
            }
            self.publish.send_replace(Arc::new(Snapshot {
                status: self.status.clone(),
                board: self.board.clone(),
            }));
        }
        debug!("Ingest task stopped");
    }

    fn apply(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Message(message) => {
                let author = message.author.clone();
                let thread_id = self.board.ingest(message);
                debug!("@{} -> {}", author, thread_id);
            }
            Inbound::Status(status) => {
                info!("Status: {} ({})", status.connection_text, status.stream_title);
                self.status = status;
            }
        }
    }
}

/// Read the buffered file and push its messages.
///
/// The status switches to the extension banner only when something was loaded.
pub async fn load_buffered_into(handle: &FlowHandle, path: &Path) -> Result<usize> {
    let raws = load_buffered(path).await?;
    if raws.is_empty() {
        return Ok(0);
    }

    handle.set_status(StreamStatus::extension())?;
    let accepted = handle.push_event(BridgeEvent::Batch { messages: raws })?;
    info!("Loaded {} buffered message(s) from {}", accepted, path.display());
    Ok(accepted)
}

/// Run the headless service until Ctrl+C
pub async fn run(config: Config) -> Result<()> {
    let (handle, ingest_task) = FlowService::spawn(&config);

    let socket = UdpSocket::bind(config.bridge_addr).await?;
    let bridge_task = {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = run_udp_bridge(socket, handle).await {
                error!("Bridge stopped: {}", e);
            }
        })
    };

    let loader_task = config.buffered_path.clone().map(|path| {
        let handle = handle.clone();
        let delay = config.load_delay;
        tokio::spawn(async move {
            sleep(delay).await;
            if let Err(e) = load_buffered_into(&handle, &path).await {
                warn!("Failed to load buffered messages: {}", e);
            }
        })
    });

    let prompt_task = {
        let handle = handle.clone();
        let delay = config.prompt_delay;
        tokio::spawn(async move {
            sleep(delay).await;
            if handle.snapshot().board.total_count() == 0 {
                info!("No extension data, showing demo prompt");
            }
        })
    };

    let demo: Option<DemoHandle> = if config.demo {
        Some(DemoGenerator::from_config(&config).start(handle.clone())?)
    } else {
        None
    };

    let api_task = {
        let handle = handle.clone();
        let api_addr = config.api_addr;
        let feed_size = config.feed_size;
        tokio::spawn(async move {
            if let Err(e) = start_api_server(handle, api_addr, feed_size).await {
                error!("API server stopped: {}", e);
            }
        })
    };

    wait_for_shutdown().await;
    info!("Shutdown signal received, stopping service...");

    if let Some(demo) = demo {
        demo.stop().await;
    }
    api_task.abort();
    bridge_task.abort();
    prompt_task.abort();
    if let Some(task) = loader_task {
        task.abort();
    }

    // API client connections may still hold handles, so stop ingest explicitly
    let stats = DashboardStats::from_aggregator(&handle.snapshot().board);
    ingest_task.abort();

    info!(
        "Service stopped ({} messages, {} threads, {} spam)",
        stats.total, stats.threads, stats.spam
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("SIGTERM received");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
