//! Channel Session Runner
//!
//! Drives one [`ClipboardBridge`] over a byte stream (TCP in the binary,
//! an in-memory duplex in tests).
//!
//! # Architecture
//!
//! ```text
//!              ┌──────────── writer task <── UnboundedSender<Frame> <── bridge
//! stream ──────┤
//!              └──────────── reader task ──> crossbeam ──> dispatch thread ──> bridge.handle_frame
//! ```
//!
//! Inbound frames are dispatched in order on a dedicated thread so that a
//! handler serving local files never stalls the async runtime.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::clipboard::{BridgeOptions, ClipboardBridge, Notification, OsClipboard};
use crate::config::Config;
use crate::protocol::{CliprdrCodec, Frame};

/// Which end of the channel opens the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    /// Sends capabilities and MONITOR_READY first
    Monitor,
    /// Answers MONITOR_READY with capabilities and a format list
    Client,
}

/// Everything one session needs besides the stream
#[derive(Clone)]
pub struct SessionParams {
    pub role: ChannelRole,
    pub conn_id: u32,
    /// Bridge knobs, including the codec's frame limit
    pub options: BridgeOptions,
    pub notifications: Option<Sender<Notification>>,
}

impl SessionParams {
    pub fn from_config(config: &Config, role: ChannelRole) -> Self {
        Self {
            role,
            conn_id: config.transport.conn_id,
            options: BridgeOptions {
                max_frame_size: config.transport.max_frame_size,
                ..BridgeOptions::from(&config.clipboard)
            },
            notifications: None,
        }
    }

    pub fn with_notifications(mut self, notifications: Sender<Notification>) -> Self {
        self.notifications = Some(notifications);
        self
    }
}

/// Run one session until the peer disconnects
pub async fn run_session<S>(
    stream: S,
    os: Arc<dyn OsClipboard>,
    params: SessionParams,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let framed = Framed::new(stream, CliprdrCodec::new(params.options.max_frame_size));
    let (mut frame_sink, mut frame_stream) = framed.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
    let bridge = Arc::new(
        ClipboardBridge::init(
            os,
            Box::new(outbound_tx),
            params.options.clone(),
            params.notifications.clone(),
        )
        .context("Failed to initialize clipboard bridge")?,
    );
    info!("Session started for bridge {} as {:?}", bridge.id(), params.role);

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = frame_sink.send(frame).await {
                warn!("Failed to write frame: {}", e);
                break;
            }
        }
        debug!("Writer task finished");
    });

    let (inbound_tx, inbound_rx) = unbounded::<Frame>();
    let dispatcher = spawn_dispatcher(Arc::clone(&bridge), inbound_rx)?;

    if params.role == ChannelRole::Monitor {
        bridge
            .start_as_monitor(params.conn_id)
            .context("Failed to open the clipboard channel")?;
    }

    let mut receive_task = tokio::spawn(async move {
        while let Some(next) = frame_stream.next().await {
            match next {
                Ok(frame) => {
                    if inbound_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to decode inbound frame: {}", e);
                    break;
                }
            }
        }
        debug!("Reader task finished");
    });

    // Whichever half ends first takes the other down with it
    tokio::select! {
        _ = &mut send_task => {
            debug!("Writer ended, stopping reader");
            receive_task.abort();
        }
        _ = &mut receive_task => {
            debug!("Reader ended, stopping writer");
            send_task.abort();
        }
    }

    info!("Session for bridge {} ended", bridge.id());
    // Unblocks any reader waiting on the peer
    bridge.stop();

    tokio::task::spawn_blocking(move || {
        if dispatcher.join().is_err() {
            error!("Dispatch thread panicked");
        }
    })
    .await
    .context("Failed to join dispatch thread")?;

    // Last reference: Drop runs uninit
    drop(bridge);
    Ok(())
}

fn spawn_dispatcher(
    bridge: Arc<ClipboardBridge>,
    inbound: Receiver<Frame>,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("cliprdr-dispatch".to_string())
        .spawn(move || {
            for frame in inbound.iter() {
                if let Err(e) = bridge.handle_frame(&frame) {
                    error!("Clipboard channel failed: {}", e);
                    bridge.stop();
                    break;
                }
            }
        })
        .context("Failed to spawn dispatch thread")
}

/// Accept peers one after another
pub async fn listen(addr: &str, os: Arc<dyn OsClipboard>, params: SessionParams) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind {}", addr))?;
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = listener.accept().await?;
        info!("Peer connected from {}", peer);
        stream.set_nodelay(true)?;

        if let Err(e) = run_session(stream, Arc::clone(&os), params.clone()).await {
            error!("Session with {} failed: {:#}", peer, e);
        }
    }
}

/// Dial a peer and run a single session
pub async fn connect(addr: &str, os: Arc<dyn OsClipboard>, params: SessionParams) -> Result<()> {
    let stream = TcpStream::connect(addr)
        .await
        .context(format!("Failed to connect to {}", addr))?;
    stream.set_nodelay(true)?;
    info!("Connected to {}", addr);
    run_session(stream, os, params).await
}
