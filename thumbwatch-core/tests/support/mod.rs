//! Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, ImageResult, Rgba, RgbaImage};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use thumbwatch_core::{
    Event, EventKind, ImageCodec, ImageCrateCodec, Notice, OpenError, ResampleAlgorithm,
    Subscription, WatchBackend, WatchError, WatchHandle, WatchMessage,
};

pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
struct BackendState {
    senders: HashMap<PathBuf, mpsc::Sender<WatchMessage>>,
    watched: HashMap<PathBuf, HashSet<PathBuf>>,
    closed: HashSet<PathBuf>,
    subscribes: usize,
    failing: HashSet<PathBuf>,
}

/// Backend whose notifications are pushed by the test itself.
#[derive(Clone, Default)]
pub struct ManualBackend {
    state: Arc<Mutex<BackendState>>,
}

impl ManualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later subscribe/add for `path` fail.
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.state.lock().failing.insert(path.into());
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().subscribes
    }

    pub fn is_closed(&self, root: &Path) -> bool {
        self.state.lock().closed.contains(root)
    }

    pub fn watched(&self, root: &Path) -> HashSet<PathBuf> {
        self.state
            .lock()
            .watched
            .get(root)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn send(&self, root: &Path, message: WatchMessage) {
        let sender = self
            .state
            .lock()
            .senders
            .get(root)
            .cloned()
            .expect("root has no live subscription");
        sender.send(message).await.expect("dispatcher went away");
    }

    pub async fn created(&self, root: &Path, path: impl Into<PathBuf>) {
        self.send(root, WatchMessage::Notice(Notice::created(path)))
            .await;
    }

    pub async fn other(&self, root: &Path, path: impl Into<PathBuf>) {
        self.send(root, WatchMessage::Notice(Notice::other(path)))
            .await;
    }

    /// Push a source error. Since the dispatcher handles messages in order,
    /// receiving its event proves everything sent before was processed.
    pub async fn barrier(&self, root: &Path, rx: &mut mpsc::Receiver<Event>) {
        self.send(root, WatchMessage::Error("barrier".into())).await;
        let event = next_event(rx).await;
        assert_eq!(event.kind, EventKind::Error);
        assert!(
            matches!(event.error.as_deref(), Some(WatchError::Source(msg)) if msg == "barrier"),
            "expected barrier, got {event}"
        );
    }
}

impl WatchBackend for ManualBackend {
    fn subscribe(&self, root: &Path) -> thumbwatch_core::Result<Subscription> {
        let mut state = self.state.lock();
        state.subscribes += 1;
        if state.failing.contains(root) {
            return Err(WatchError::subscribe(root, "refused by test backend"));
        }
        let (tx, rx) = mpsc::channel(64);
        state.senders.insert(root.to_path_buf(), tx);
        state.watched.insert(root.to_path_buf(), HashSet::new());
        state.closed.remove(root);
        Ok(Subscription {
            handle: Box::new(ManualHandle {
                root: root.to_path_buf(),
                state: Arc::clone(&self.state),
            }),
            messages: rx,
        })
    }
}

struct ManualHandle {
    root: PathBuf,
    state: Arc<Mutex<BackendState>>,
}

impl WatchHandle for ManualHandle {
    fn add(&mut self, path: &Path) -> thumbwatch_core::Result<()> {
        let mut state = self.state.lock();
        if state.failing.contains(path) {
            return Err(WatchError::subscribe(path, "refused by test backend"));
        }
        state
            .watched
            .entry(self.root.clone())
            .or_default()
            .insert(path.to_path_buf());
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> thumbwatch_core::Result<()> {
        let mut state = self.state.lock();
        let removed = state
            .watched
            .get_mut(&self.root)
            .is_some_and(|set| set.remove(path));
        if removed {
            Ok(())
        } else {
            Err(WatchError::subscribe(path, "not subscribed"))
        }
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.senders.remove(&self.root);
        state.closed.insert(self.root.clone());
    }
}

/// Real codec that reports "unrecognized" for the first `failures` opens.
pub struct FlakyCodec {
    failures: u32,
    opens: Mutex<u32>,
}

impl FlakyCodec {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            opens: Mutex::new(0),
        }
    }

    pub fn opens(&self) -> u32 {
        *self.opens.lock()
    }
}

impl ImageCodec for FlakyCodec {
    fn open(&self, path: &Path) -> Result<DynamicImage, OpenError> {
        let attempt = {
            let mut opens = self.opens.lock();
            *opens += 1;
            *opens
        };
        if attempt <= self.failures {
            return Err(OpenError::Unrecognized("still being written".into()));
        }
        ImageCrateCodec.open(path)
    }

    fn resample(
        &self,
        image: DynamicImage,
        width: u32,
        height: u32,
        algorithm: ResampleAlgorithm,
    ) -> DynamicImage {
        ImageCrateCodec.resample(image, width, height, algorithm)
    }

    fn save(&self, image: &DynamicImage, path: &Path) -> ImageResult<()> {
        ImageCrateCodec.save(image, path)
    }
}

/// Codec whose `open` blocks until the test releases it. Saves are written
/// for real and recorded.
pub struct GatedCodec {
    gate: Mutex<std::sync::mpsc::Receiver<()>>,
    saves: Mutex<Vec<PathBuf>>,
}

impl GatedCodec {
    pub fn new() -> (Self, std::sync::mpsc::Sender<()>) {
        let (tx, rx) = std::sync::mpsc::channel();
        (
            Self {
                gate: Mutex::new(rx),
                saves: Mutex::new(Vec::new()),
            },
            tx,
        )
    }

    pub fn saves(&self) -> Vec<PathBuf> {
        self.saves.lock().clone()
    }
}

impl ImageCodec for GatedCodec {
    fn open(&self, _path: &Path) -> Result<DynamicImage, OpenError> {
        self.gate
            .lock()
            .recv()
            .map_err(|_| OpenError::Other("gate dropped".into()))?;
        Ok(DynamicImage::new_rgb8(4, 4))
    }

    fn resample(
        &self,
        image: DynamicImage,
        _width: u32,
        _height: u32,
        _algorithm: ResampleAlgorithm,
    ) -> DynamicImage {
        image
    }

    fn save(&self, image: &DynamicImage, path: &Path) -> ImageResult<()> {
        self.saves.lock().push(path.to_path_buf());
        ImageCrateCodec.save(image, path)
    }
}

pub fn write_png(path: &Path, width: u32, height: u32) {
    RgbaImage::from_pixel(width, height, Rgba([30, 120, 200, 255]))
        .save(path)
        .expect("write test png");
}

pub fn image_size(path: &Path) -> (u32, u32) {
    image::image_dimensions(path).expect("read thumbnail dimensions")
}

/// Canonical temp dir so paths match what the OS reports.
pub fn gallery() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let root = tmp.path().canonicalize().expect("canonical tempdir");
    (tmp, root)
}

pub async fn next_event(rx: &mut mpsc::Receiver<Event>) -> Event {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

/// Collect events until one of `kind` arrives.
pub async fn wait_for(rx: &mut mpsc::Receiver<Event>, kind: EventKind) -> (Event, Vec<Event>) {
    let mut seen = Vec::new();
    loop {
        let event = next_event(rx).await;
        if event.kind == kind {
            return (event, seen);
        }
        seen.push(event);
    }
}

pub fn drain(rx: &mut mpsc::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
