//! Handoff of finished buffers from evaluation to the render thread.
//!
//! Evaluation publishes into a single latest-only slot and never waits on
//! rendering. The render thread owns the [`RenderSurface`]; it wakes when a
//! newer frame lands and presents whatever is newest at that moment, so
//! intermediate frames may be skipped. Frames hold immutable shared buffers,
//! so the render side can never see a partially written image.

mod surface;

pub use surface::{DisplayMode, PixelSurface, RenderSurface};

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::buffer::SharedImage;
use crate::graph::NodeId;

/// How long the render thread sleeps before rechecking for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("render surface failed to initialize: {0}")]
    Init(String),

    #[error("render surface failed to present: {0}")]
    Present(String),

    #[error("render thread could not be started: {0}")]
    Spawn(#[from] io::Error),

    #[error("render thread terminated unexpectedly")]
    RenderThread,
}

/// One published image.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub node: NodeId,
    /// Epoch of the snapshot that produced the image.
    pub epoch: u64,
    pub image: SharedImage,
}

#[derive(Debug, Default)]
struct SlotState {
    frame: Option<PreviewFrame>,
    /// Bumped on every accepted publish.
    generation: u64,
}

/// Latest-only frame mailbox.
#[derive(Debug, Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

impl FrameSlot {
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the held frame unless it is newer than `frame`.
    pub fn publish(&self, frame: PreviewFrame) -> bool {
        let mut state = self.lock();
        if state.frame.as_ref().is_some_and(|f| f.epoch > frame.epoch) {
            return false;
        }
        state.frame = Some(frame);
        state.generation += 1;
        self.ready.notify_all();
        true
    }

    pub fn latest(&self) -> Option<PreviewFrame> {
        self.lock().frame.clone()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Wait up to `timeout` for a frame published after `generation`.
    pub fn wait_newer(&self, generation: u64, timeout: Duration) -> Option<(u64, PreviewFrame)> {
        let state = self.lock();
        let (state, _) = self
            .ready
            .wait_timeout_while(state, timeout, |s| s.generation <= generation)
            .unwrap_or_else(|e| e.into_inner());
        if state.generation > generation {
            state.frame.clone().map(|f| (state.generation, f))
        } else {
            None
        }
    }
}

/// Publishing side of a [`FrameSlot`]; cheap to clone into worker threads.
#[derive(Debug, Clone, Default)]
pub struct PreviewBridge {
    slot: Arc<FrameSlot>,
}

impl PreviewBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand `frame` to the render side without blocking on it.
    ///
    /// Returns `false` when a newer frame is already held.
    pub fn publish(&self, frame: PreviewFrame) -> bool {
        let accepted = self.slot.publish(frame);
        if !accepted {
            debug!("dropped preview frame older than the current one");
        }
        accepted
    }

    /// The most recently accepted frame.
    pub fn latest(&self) -> Option<PreviewFrame> {
        self.slot.latest()
    }

    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }
}

/// The render thread and the surface it owns.
///
/// The surface is initialized on the render thread before [`start`]
/// returns, so no frame can be published before a surface exists. Dropping
/// the context without calling [`shutdown`] still tears the surface down.
///
/// [`start`]: RenderContext::start
/// [`shutdown`]: RenderContext::shutdown
pub struct RenderContext<S: RenderSurface> {
    bridge: PreviewBridge,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<S>>,
}

impl<S: RenderSurface + 'static> RenderContext<S> {
    /// Spawn the render thread, initialize `surface` on it and return the
    /// context together with the bridge evaluation should publish into.
    pub fn start(surface: S) -> Result<(Self, PreviewBridge), PreviewError> {
        let bridge = PreviewBridge::new();
        let stop = Arc::new(AtomicBool::new(false));
        let (init_tx, init_rx) = mpsc::channel();

        let thread = {
            let bridge = bridge.clone();
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("texgraph-render".into())
                .spawn(move || render_loop(surface, bridge, stop, init_tx))?
        };

        match init_rx.recv() {
            Ok(Ok(())) => {
                info!("render context started");
                let context = Self {
                    bridge: bridge.clone(),
                    stop,
                    thread: Some(thread),
                };
                Ok((context, bridge))
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(PreviewError::RenderThread)
            }
        }
    }

    pub fn bridge(&self) -> &PreviewBridge {
        &self.bridge
    }

    /// Present any frame still pending, tear the surface down on the render
    /// thread and hand it back.
    pub fn shutdown(mut self) -> Result<S, PreviewError> {
        self.stop.store(true, Ordering::Release);
        let thread = self.thread.take().ok_or(PreviewError::RenderThread)?;
        let surface = thread.join().map_err(|_| PreviewError::RenderThread)?;
        info!("render context shut down");
        Ok(surface)
    }
}

impl<S: RenderSurface> Drop for RenderContext<S> {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.stop.store(true, Ordering::Release);
            let _ = thread.join();
        }
    }
}

fn render_loop<S: RenderSurface>(
    mut surface: S,
    bridge: PreviewBridge,
    stop: Arc<AtomicBool>,
    init: mpsc::Sender<Result<(), PreviewError>>,
) -> S {
    if let Err(e) = surface.init() {
        let _ = init.send(Err(e));
        return surface;
    }
    let _ = init.send(Ok(()));

    let mut presented = 0;
    loop {
        let stopping = stop.load(Ordering::Acquire);
        let next = if stopping {
            let slot = bridge.slot();
            let generation = slot.generation();
            (generation > presented)
                .then(|| slot.latest().map(|f| (generation, f)))
                .flatten()
        } else {
            bridge.slot().wait_newer(presented, POLL_INTERVAL)
        };

        if let Some((generation, frame)) = next {
            presented = generation;
            if let Err(e) = surface.present(&frame) {
                warn!(node = %frame.node, epoch = frame.epoch, error = %e, "present failed");
            }
        }
        if stopping {
            break;
        }
    }

    surface.teardown();
    debug!("render surface torn down");
    surface
}
