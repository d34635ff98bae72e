//! Clipboard Message Loop
//!
//! OS clipboard ownership is affine to one thread on most platforms, so every
//! ownership change goes through a dedicated loop thread per bridge.
//!
//! ```text
//! Handler thread                     cliprdr-main thread
//! ━━━━━━━━━━━━━━                     ━━━━━━━━━━━━━━━━━━━
//!
//! on_format_list ──SetFiles/SetDelayed──> LoopDelegate::set_files
//!                                          (fetches descriptors, takes ownership)
//! OS clipboard ────ClipboardChanged─────> LoopDelegate::clipboard_changed
//!                                          (sends FORMAT_LIST)
//! App paste ───────Render{reply}────────> LoopDelegate::render
//!     <──────────────bytes─────────────────┘
//! ```
//!
//! Commands are executed strictly in the order they were posted.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, trace, warn};

use crate::clipboard::error::{ClipboardError, Result};

/// Commands executed on the loop thread
pub enum LoopCommand {
    /// Fetch the peer's file descriptors and offer them as virtual files
    SetFiles { conn_id: u32 },

    /// Take ownership and advertise these local ids for delayed rendering
    SetDelayed { conn_id: u32, formats: Vec<u32> },

    /// Release clipboard state; `None` empties regardless of connection
    Empty { conn_id: Option<u32> },

    /// The OS clipboard changed
    ClipboardChanged,

    /// An application pasted a delayed-render format
    Render {
        format_id: u32,
        reply: Sender<Result<Bytes>>,
    },

    /// Stop the loop
    Shutdown,
}

impl std::fmt::Debug for LoopCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopCommand::SetFiles { conn_id } => write!(f, "SetFiles(conn {conn_id})"),
            LoopCommand::SetDelayed { conn_id, formats } => {
                write!(f, "SetDelayed(conn {conn_id}, {formats:?})")
            }
            LoopCommand::Empty { conn_id } => write!(f, "Empty({conn_id:?})"),
            LoopCommand::ClipboardChanged => write!(f, "ClipboardChanged"),
            LoopCommand::Render { format_id, .. } => write!(f, "Render({format_id})"),
            LoopCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Work performed on behalf of the loop
pub trait LoopDelegate: Send + Sync + 'static {
    fn set_files(&self, conn_id: u32);

    fn set_delayed(&self, conn_id: u32, formats: Vec<u32>);

    fn empty(&self, conn_id: Option<u32>);

    fn clipboard_changed(&self);

    fn render(&self, format_id: u32) -> Result<Bytes>;
}

/// Cloneable sender side of a loop
#[derive(Debug, Clone)]
pub struct LoopHandle {
    bridge_id: u64,
    tx: Sender<LoopCommand>,
}

impl LoopHandle {
    pub fn bridge_id(&self) -> u64 {
        self.bridge_id
    }

    pub fn post(&self, command: LoopCommand) -> Result<()> {
        trace!("Posting {:?} to bridge {}", command, self.bridge_id);
        self.tx.send(command).map_err(ClipboardError::from)
    }

    pub fn clipboard_changed(&self) -> Result<()> {
        self.post(LoopCommand::ClipboardChanged)
    }

    /// Ask the loop to render `format_id`, blocking for at most `timeout`
    pub fn render(&self, format_id: u32, timeout: Duration) -> Result<Bytes> {
        let (reply, rx) = crossbeam_channel::bounded(1);
        self.post(LoopCommand::Render { format_id, reply })?;
        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                Err(ClipboardError::Timeout(timeout.as_millis() as u64))
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(ClipboardError::Channel("render reply dropped".to_string()))
            }
        }
    }
}

/// Owns the loop thread
pub struct MessageLoop {
    handle: LoopHandle,
    thread_handle: Option<JoinHandle<()>>,
}

impl MessageLoop {
    /// Spawn the loop thread for `bridge_id`
    pub fn spawn<D: LoopDelegate>(bridge_id: u64, delegate: Arc<D>) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded::<LoopCommand>();

        let thread_handle = thread::Builder::new()
            .name("cliprdr-main".to_string())
            .spawn(move || run_message_loop(bridge_id, delegate, rx))
            .map_err(|e| ClipboardError::Channel(format!("Thread spawn failed: {}", e)))?;

        debug!("Clipboard message loop started for bridge {}", bridge_id);

        Ok(Self {
            handle: LoopHandle { bridge_id, tx },
            thread_handle: Some(thread_handle),
        })
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and join its thread
    pub fn shutdown(&mut self) -> Result<()> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };

        if let Err(e) = self.handle.post(LoopCommand::Shutdown) {
            warn!("Failed to send shutdown command: {}", e);
        }

        if handle.thread().id() == thread::current().id() {
            // Shutdown requested from a command running on the loop itself
            return Ok(());
        }
        if handle.join().is_err() {
            error!("Clipboard message loop panicked during shutdown");
            return Err(ClipboardError::Channel("message loop panicked".to_string()));
        }

        debug!("Clipboard message loop for bridge {} stopped", self.handle.bridge_id);
        Ok(())
    }
}

impl Drop for MessageLoop {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn run_message_loop<D: LoopDelegate>(bridge_id: u64, delegate: Arc<D>, rx: Receiver<LoopCommand>) {
    info!("Clipboard message loop thread started (bridge {})", bridge_id);

    for command in rx.iter() {
        trace!("Loop command {:?}", command);
        match command {
            LoopCommand::SetFiles { conn_id } => delegate.set_files(conn_id),
            LoopCommand::SetDelayed { conn_id, formats } => delegate.set_delayed(conn_id, formats),
            LoopCommand::Empty { conn_id } => delegate.empty(conn_id),
            LoopCommand::ClipboardChanged => delegate.clipboard_changed(),
            LoopCommand::Render { format_id, reply } => {
                let result = delegate.render(format_id);
                if reply.send(result).is_err() {
                    debug!("Render requester for format {} went away", format_id);
                }
            }
            LoopCommand::Shutdown => {
                info!("Shutdown command received");
                break;
            }
        }
    }

    info!("Clipboard message loop thread exited (bridge {})", bridge_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl LoopDelegate for Recorder {
        fn set_files(&self, conn_id: u32) {
            self.calls.lock().push(format!("files:{conn_id}"));
        }

        fn set_delayed(&self, conn_id: u32, formats: Vec<u32>) {
            self.calls.lock().push(format!("delayed:{conn_id}:{formats:?}"));
        }

        fn empty(&self, conn_id: Option<u32>) {
            self.calls.lock().push(format!("empty:{conn_id:?}"));
        }

        fn clipboard_changed(&self) {
            self.calls.lock().push("changed".to_string());
        }

        fn render(&self, format_id: u32) -> Result<Bytes> {
            if format_id == 13 {
                Ok(Bytes::from_static(b"h\0i\0\0\0"))
            } else {
                Err(ClipboardError::UnknownFormat(format_id))
            }
        }
    }

    #[test]
    fn test_commands_run_in_order() {
        let recorder = Arc::new(Recorder::default());
        let mut message_loop = MessageLoop::spawn(1, Arc::clone(&recorder)).unwrap();
        let handle = message_loop.handle();

        handle.post(LoopCommand::SetDelayed { conn_id: 3, formats: vec![13] }).unwrap();
        handle.post(LoopCommand::SetFiles { conn_id: 3 }).unwrap();
        handle.clipboard_changed().unwrap();
        handle.post(LoopCommand::Empty { conn_id: None }).unwrap();
        message_loop.shutdown().unwrap();

        assert_eq!(
            *recorder.calls.lock(),
            vec!["delayed:3:[13]", "files:3", "changed", "empty:None"]
        );
    }

    #[test]
    fn test_render_round_trip() {
        let recorder = Arc::new(Recorder::default());
        let message_loop = MessageLoop::spawn(2, recorder).unwrap();
        let handle = message_loop.handle();

        let data = handle.render(13, Duration::from_secs(5)).unwrap();
        assert_eq!(&data[..], b"h\0i\0\0\0");
        assert!(matches!(
            handle.render(99, Duration::from_secs(5)),
            Err(ClipboardError::UnknownFormat(99))
        ));
    }

    #[test]
    fn test_post_after_shutdown_fails() {
        let recorder = Arc::new(Recorder::default());
        let mut message_loop = MessageLoop::spawn(3, recorder).unwrap();
        let handle = message_loop.handle();
        assert!(message_loop.is_running());

        message_loop.shutdown().unwrap();
        assert!(!message_loop.is_running());
        assert!(matches!(
            handle.render(13, Duration::from_millis(100)),
            Err(ClipboardError::Channel(_))
        ));
    }
}
