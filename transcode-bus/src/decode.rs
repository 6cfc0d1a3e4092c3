//! Decoding stage: discovers elementary streams and autoplugs them.
//!
//! Each stream is described as a refinement chain, coarse to fine: the caps a
//! demuxer/parser produces first, then (if a decoder exists) the raw caps a
//! decoder would produce. For every level the bin creates a candidate pad and
//! asks its [`AutoplugHandler`] whether to keep refining. The pad is exposed
//! (`pad_added`) as soon as the handler says stop or the chain runs out.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use anyhow::Context;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    caps::Caps,
    element::{AutoplugHandler, DecodeStage},
    pad::{Pad, PadDirection, PadPresence},
    probe,
};

pub enum InputConfig {
    Net { url: String },
    File { path: String },
    /// Streams already probed elsewhere.
    Streams(Vec<DiscoveredStream>),
}

impl InputConfig {
    fn describe(&self) -> String {
        match self {
            InputConfig::Net { url } => url.clone(),
            InputConfig::File { path } => path.clone(),
            InputConfig::Streams(streams) => format!("{} pre-probed streams", streams.len()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveredStream {
    pub index: usize,
    chain: Vec<Caps>,
}

impl DiscoveredStream {
    pub fn new(index: usize, caps: Caps) -> Self {
        Self {
            index,
            chain: vec![caps],
        }
    }

    /// Adds a finer level, e.g. the raw output of a decoder.
    pub fn then(mut self, caps: Caps) -> Self {
        self.chain.push(caps);
        self
    }

    pub fn chain(&self) -> &[Caps] {
        &self.chain
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StreamOutcome {
    /// The pad at `level` of the chain was exposed.
    Exposed {
        level: usize,
        caps: Caps,
        linked: bool,
    },
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamReport {
    pub index: usize,
    pub outcome: StreamOutcome,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DecodeSummary {
    pub streams: Vec<StreamReport>,
}

impl DecodeSummary {
    pub fn linked_count(&self) -> usize {
        self.streams
            .iter()
            .filter(|s| matches!(s.outcome, StreamOutcome::Exposed { linked: true, .. }))
            .count()
    }

    pub fn dropped_count(&self) -> usize {
        self.streams
            .iter()
            .filter(|s| matches!(s.outcome, StreamOutcome::Exposed { linked: false, .. }))
            .count()
    }
}

/// Handle to the discovery workers started by [`DecodeStage::start`].
pub struct DecodeTask {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<StreamReport>>,
}

impl DecodeTask {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits for every stream worker, in stream order.
    pub async fn wait(self) -> DecodeSummary {
        let mut streams = Vec::with_capacity(self.handles.len());
        for result in futures::future::join_all(self.handles).await {
            match result {
                Ok(report) => streams.push(report),
                Err(e) => log::error!("decode worker failed: {:#?}", e),
            }
        }
        streams.sort_by_key(|s| s.index);
        DecodeSummary { streams }
    }
}

pub struct DecodeBin {
    name: String,
    sink: Arc<Pad>,
    shared: Arc<Shared>,
}

struct Shared {
    handler: Mutex<Option<Weak<dyn AutoplugHandler>>>,
    exposed: Mutex<Vec<Arc<Pad>>>,
    cancel: Mutex<CancellationToken>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DecodeBin {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            sink: Pad::new("sink", PadDirection::Sink, PadPresence::Always, Caps::any()),
            shared: Arc::new(Shared {
                handler: Mutex::new(None),
                exposed: Mutex::new(Vec::new()),
                cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Pads exposed so far. The bin keeps them alive so their links hold.
    pub fn src_pads(&self) -> Vec<Arc<Pad>> {
        lock(&self.shared.exposed).clone()
    }

    fn autoplug_stream(
        decoder: &str,
        shared: &Shared,
        handler: &Weak<dyn AutoplugHandler>,
        cancel: &CancellationToken,
        stream: DiscoveredStream,
    ) -> StreamReport {
        let index = stream.index;
        let last = stream.chain.len().saturating_sub(1);
        for (level, caps) in stream.chain.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let Some(handler) = handler.upgrade() else {
                break;
            };
            let pad = Pad::new(
                format!("src_{}", index),
                PadDirection::Src,
                PadPresence::Sometimes,
                caps.clone(),
            );
            let refine = handler.autoplug_continue(&pad, &caps);
            if refine && level < last {
                log::debug!("{}: stream {} refining past {}", decoder, index, caps);
                continue;
            }
            if refine {
                log::debug!("{}: stream {} cannot be refined past {}", decoder, index, caps);
            }
            if cancel.is_cancelled() {
                break;
            }
            lock(&shared.exposed).push(Arc::clone(&pad));
            handler.pad_added(&pad);
            return StreamReport {
                index,
                outcome: StreamOutcome::Exposed {
                    level,
                    caps,
                    linked: pad.is_linked(),
                },
            };
        }
        StreamReport {
            index,
            outcome: StreamOutcome::Cancelled,
        }
    }
}

impl DecodeStage for DecodeBin {
    fn name(&self) -> &str {
        &self.name
    }

    fn sink_pad(&self) -> Arc<Pad> {
        Arc::clone(&self.sink)
    }

    fn connect(&self, handler: Weak<dyn AutoplugHandler>) {
        *lock(&self.shared.handler) = Some(handler);
    }

    fn start(&self, input: InputConfig) -> anyhow::Result<DecodeTask> {
        let handler = lock(&self.shared.handler)
            .clone()
            .ok_or_else(|| anyhow::anyhow!("{}: no autoplug handler connected", self.name))?;
        let runtime = tokio::runtime::Handle::try_current()
            .with_context(|| format!("{}: must be started inside a tokio runtime", self.name))?;

        log::info!("{}: starting with input {}", self.name, input.describe());
        let streams = match input {
            InputConfig::Streams(streams) => streams,
            InputConfig::File { path } => probe::discover(&path)?,
            InputConfig::Net { url } => probe::discover(&url)?,
        };
        if streams.is_empty() {
            log::warn!("{}: input has no streams", self.name);
        }

        let cancel = {
            let mut current = lock(&self.shared.cancel);
            if current.is_cancelled() {
                *current = CancellationToken::new();
            }
            current.child_token()
        };

        let handles = streams
            .into_iter()
            .filter(|s| !s.chain.is_empty())
            .map(|stream| {
                let decoder = self.name.clone();
                let shared = Arc::clone(&self.shared);
                let handler = handler.clone();
                let cancel = cancel.clone();
                runtime.spawn_blocking(move || {
                    Self::autoplug_stream(&decoder, &shared, &handler, &cancel, stream)
                })
            })
            .collect();

        Ok(DecodeTask { cancel, handles })
    }

    fn stop(&self) {
        lock(&self.shared.cancel).cancel();
    }
}

#[cfg(test)]
#[path = "decode_test.rs"]
mod decode_test;
