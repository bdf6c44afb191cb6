//! Host boundary: what the engine needs from a playable media element.

use crate::graph::{GraphHandle, SignalPath};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Stable identity of a media element for the lifetime of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaId(pub u64);

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "media#{}", self.0)
    }
}

/// Playback-rate access. Split out so the speech-rate controller only
/// sees the one property it is allowed to touch.
pub trait PlaybackControl {
    fn playback_rate(&self) -> f64;
    fn set_playback_rate(&mut self, rate: f64);
}

pub trait MediaElement: PlaybackControl {
    fn id(&self) -> MediaId;
    fn sample_rate(&self) -> f32;
    fn channels(&self) -> usize;

    /// Route the element's audio through `path`. The element owns the path
    /// from here on and drives [`SignalPath::process`] from its renderer.
    fn attach(&mut self, path: SignalPath) -> anyhow::Result<()>;

    /// Unroute the processor and give it back, if one was attached.
    fn detach(&mut self) -> Option<SignalPath>;
}

impl<T: PlaybackControl + ?Sized> PlaybackControl for &mut T {
    fn playback_rate(&self) -> f64 {
        (**self).playback_rate()
    }

    fn set_playback_rate(&mut self, rate: f64) {
        (**self).set_playback_rate(rate)
    }
}

impl<T: MediaElement + ?Sized> MediaElement for &mut T {
    fn id(&self) -> MediaId {
        (**self).id()
    }

    fn sample_rate(&self) -> f32 {
        (**self).sample_rate()
    }

    fn channels(&self) -> usize {
        (**self).channels()
    }

    fn attach(&mut self, path: SignalPath) -> anyhow::Result<()> {
        (**self).attach(path)
    }

    fn detach(&mut self) -> Option<SignalPath> {
        (**self).detach()
    }
}

/// One graph per media element, shared by every engine created for it.
#[derive(Clone, Default)]
pub struct GraphStore {
    graphs: Arc<Mutex<HashMap<MediaId, GraphHandle>>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<MediaId, GraphHandle>> {
        self.graphs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, id: MediaId) -> Option<GraphHandle> {
        self.lock().get(&id).cloned()
    }

    pub fn insert(&self, id: MediaId, graph: GraphHandle) {
        self.lock().insert(id, graph);
    }

    pub fn remove(&self, id: MediaId) -> Option<GraphHandle> {
        self.lock().remove(&id)
    }

    pub fn contains(&self, id: MediaId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// In-process media element: holds the attached path and runs it inline.
/// Used by the offline renderer and by tests.
pub struct OfflineMedia {
    id: MediaId,
    sample_rate: f32,
    channels: usize,
    playback_rate: f64,
    path: Option<SignalPath>,
}

impl OfflineMedia {
    pub fn new(id: MediaId, sample_rate: f32, channels: usize) -> Self {
        Self {
            id,
            sample_rate,
            channels,
            playback_rate: 1.0,
            path: None,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.path.is_some()
    }

    /// Run one block through the attached path. Without a path the audio
    /// passes through untouched.
    pub fn process(&mut self, buffer: &mut [&mut [f32]]) {
        if let Some(path) = self.path.as_mut() {
            path.process(buffer);
        }
    }
}

impl PlaybackControl for OfflineMedia {
    fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    fn set_playback_rate(&mut self, rate: f64) {
        self.playback_rate = rate;
    }
}

impl MediaElement for OfflineMedia {
    fn id(&self) -> MediaId {
        self.id
    }

    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn attach(&mut self, path: SignalPath) -> anyhow::Result<()> {
        if self.path.is_some() {
            anyhow::bail!("{} already has a processor attached", self.id);
        }
        if path.channels() != self.channels {
            anyhow::bail!(
                "processor expects {} channels, {} has {}",
                path.channels(),
                self.id,
                self.channels
            );
        }
        self.path = Some(path);
        Ok(())
    }

    fn detach(&mut self) -> Option<SignalPath> {
        self.path.take()
    }
}
