//! `transcodebin`: a decoding stage autoplugged into an encoding stage.
//!
//! The bin owns one [`DecodeStage`] and one [`EncodeStage`], ghosts the
//! decoder's sink and the encoder's src to the outside, and forwards the
//! target profile to the encoder. While active it routes every stream the
//! decoder discovers onto an encoder input, requesting inputs as needed, and
//! hands those requested inputs back on teardown.

use std::fmt;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use serde::Serialize;

use crate::{
    caps::Caps,
    decode::{DecodeSummary, DecodeTask, InputConfig},
    element::{AutoplugHandler, DecodeStage, EncodeStage, State},
    error::{Error, Result},
    pad::{Pad, PadPresence},
    profile::EncodingProfile,
    registry,
    router::{self, ProvisionedInputs, Route, RouteError},
};

pub const DECODE_BIN: &str = "decodebin";
pub const ENCODE_BIN: &str = "encodebin";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellState {
    /// Stages built and ghosted, no profile yet.
    Constructed,
    Configured,
    Active,
    TornDown,
}

/// One encoder input and the decoder stream feeding it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkedInput {
    pub pad: String,
    pub presence: PadPresence,
    pub stream: String,
    /// Stream caps narrowed to what the encoder input accepts.
    pub caps: Caps,
}

pub struct TranscodeBin {
    name: String,
    decoder: Box<dyn DecodeStage>,
    encoder: Box<dyn EncodeStage>,
    sink: Arc<Pad>,
    src: Arc<Pad>,
    state: RwLock<ShellState>,
    provisioned: ProvisionedInputs,
    last_caps: Mutex<Option<Caps>>,
    task: Mutex<Option<DecodeTask>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TranscodeBin {
    /// Builds the bin with the registered `decodebin` and `encodebin`.
    pub fn new(name: &str) -> Result<Arc<Self>> {
        Self::from_factories(name, DECODE_BIN, ENCODE_BIN)
    }

    /// Builds the bin from the named registry factories. A stage that cannot
    /// be built fails construction.
    pub fn from_factories(
        name: &str,
        decoder_factory: &str,
        encoder_factory: &str,
    ) -> Result<Arc<Self>> {
        let decoder = registry::make(decoder_factory)
            .and_then(|e| e.into_decoder())
            .map_err(|e| Error::construction(decoder_factory, e))?;
        let encoder = registry::make(encoder_factory)
            .and_then(|e| e.into_encoder())
            .map_err(|e| Error::construction(encoder_factory, e))?;
        Ok(Self::with_stages(name, decoder, encoder))
    }

    pub fn with_stages(
        name: &str,
        decoder: Box<dyn DecodeStage>,
        encoder: Box<dyn EncodeStage>,
    ) -> Arc<Self> {
        let sink = Pad::new_ghost("sink", &decoder.sink_pad());
        let src = Pad::new_ghost("src", &encoder.src_pad());
        let state = if encoder.profile().is_some() {
            ShellState::Configured
        } else {
            ShellState::Constructed
        };
        let bin = Arc::new(Self {
            name: name.to_string(),
            decoder,
            encoder,
            sink,
            src,
            state: RwLock::new(state),
            provisioned: ProvisionedInputs::new(),
            last_caps: Mutex::new(None),
            task: Mutex::new(None),
        });
        let handler = Arc::downgrade(&bin);
        bin.decoder.connect(handler);
        log::debug!(
            "{}: built from {} and {}",
            bin.name,
            bin.decoder.name(),
            bin.encoder.name()
        );
        bin
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sink_pad(&self) -> Arc<Pad> {
        Arc::clone(&self.sink)
    }

    pub fn src_pad(&self) -> Arc<Pad> {
        Arc::clone(&self.src)
    }

    pub fn state(&self) -> ShellState {
        *self.read_state()
    }

    pub fn profile(&self) -> Option<EncodingProfile> {
        self.encoder.profile()
    }

    /// Forwards the profile to the encoding stage. Rejected once active.
    pub fn set_profile(&self, profile: Option<EncodingProfile>) -> Result<()> {
        let mut state = self.write_state();
        match *state {
            ShellState::Active => {
                return Err(Error::ProfileLocked {
                    element: self.name.clone(),
                    state: "active".to_string(),
                });
            }
            ShellState::TornDown => return Err(Error::TornDown(self.name.clone())),
            ShellState::Constructed | ShellState::Configured => {}
        }
        let configured = profile.is_some();
        self.encoder.set_profile(profile)?;
        *state = if configured {
            ShellState::Configured
        } else {
            ShellState::Constructed
        };
        Ok(())
    }

    /// Brings the encoder up and starts discovery on `input`.
    pub fn play(&self, input: InputConfig) -> anyhow::Result<()> {
        let mut state = self.write_state();
        match *state {
            ShellState::Configured => {}
            ShellState::Constructed => return Err(Error::NoProfile(self.name.clone()).into()),
            ShellState::Active => anyhow::bail!("{}: already playing", self.name),
            ShellState::TornDown => return Err(Error::TornDown(self.name.clone()).into()),
        }

        self.encoder.set_state(State::Playing)?;
        // Workers block on the state lock until this guard drops, so the
        // first callback always sees `Active`.
        match self.decoder.start(input) {
            Ok(task) => {
                *lock(&self.task) = Some(task);
                *state = ShellState::Active;
                log::info!("{}: playing", self.name);
                Ok(())
            }
            Err(e) => {
                if let Err(reset) = self.encoder.set_state(State::Null) {
                    log::warn!("{}: reset after failed start: {}", self.name, reset);
                }
                Err(e.context(format!("{}: start {}", self.name, self.decoder.name())))
            }
        }
    }

    /// Waits for discovery to finish. `None` if nothing is running.
    pub async fn wait(&self) -> Option<DecodeSummary> {
        let task = lock(&self.task).take()?;
        Some(task.wait().await)
    }

    /// Stops discovery, releases every requested encoder input and resets the
    /// encoder. Safe from any state; later calls do nothing.
    pub fn teardown(&self) {
        let mut state = self.write_state();
        if *state == ShellState::TornDown {
            return;
        }
        let previous = *state;
        *state = ShellState::TornDown;

        if let Some(task) = lock(&self.task).take() {
            task.cancel();
        }
        self.decoder.stop();

        let released = self.provisioned.release_all(self.encoder.as_ref());
        for pad in self.encoder.static_sink_pads() {
            pad.unlink();
        }
        if let Err(e) = self.encoder.set_state(State::Null) {
            log::warn!("{}: {}", self.name, e);
        }
        log::info!(
            "{}: torn down from {:?}, released {} requested inputs",
            self.name,
            previous,
            released
        );
    }

    /// Routes `candidate` onto an encoder input using `hint`.
    pub fn try_route(&self, candidate: &Arc<Pad>, hint: &Caps) -> bool {
        match self.route(candidate, hint) {
            Ok(route) => {
                log::debug!(
                    "{}: {} -> {} ({})",
                    self.name,
                    candidate.name(),
                    route.input_name(),
                    hint
                );
                true
            }
            Err(e) => {
                log::debug!("{}: {} not routed: {}", self.name, candidate.name(), e);
                false
            }
        }
    }

    fn route(&self, candidate: &Arc<Pad>, hint: &Caps) -> std::result::Result<Route, RouteError> {
        // Held for the whole attempt so teardown cannot release an input
        // while it is being linked.
        let state = self.read_state();
        if *state == ShellState::TornDown {
            return Err(RouteError::Closed);
        }
        router::route(self.encoder.as_ref(), &self.provisioned, candidate, hint)
    }

    /// Linked encoder inputs, static ones first.
    pub fn linked_inputs(&self) -> Vec<LinkedInput> {
        self.encoder
            .static_sink_pads()
            .into_iter()
            .chain(self.provisioned.pads())
            .filter_map(|pad| {
                let peer = pad.peer()?;
                Some(LinkedInput {
                    pad: pad.name().to_string(),
                    presence: pad.presence(),
                    stream: peer.name().to_string(),
                    caps: peer.caps().intersect(&pad.caps()),
                })
            })
            .collect()
    }

    pub fn provisioned_count(&self) -> usize {
        self.provisioned.len()
    }

    /// Caps of the most recent candidate seen by `autoplug_continue`. Only
    /// kept for diagnostics; routing never reads it.
    pub fn last_candidate_caps(&self) -> Option<Caps> {
        lock(&self.last_caps).clone()
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ShellState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ShellState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AutoplugHandler for TranscodeBin {
    fn autoplug_continue(&self, pad: &Arc<Pad>, caps: &Caps) -> bool {
        *lock(&self.last_caps) = Some(caps.clone());
        !self.try_route(pad, caps)
    }

    fn pad_added(&self, pad: &Arc<Pad>) {
        if pad.is_linked() {
            return;
        }
        let caps = pad.caps();
        if !self.try_route(pad, &caps) {
            log::warn!(
                "{}: no encoder input for {} ({}), dropping stream",
                self.name,
                pad.name(),
                caps
            );
        }
    }
}

impl fmt::Debug for TranscodeBin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscodeBin")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("decoder", &self.decoder.name())
            .field("encoder", &self.encoder.name())
            .field("provisioned", &self.provisioned_count())
            .finish()
    }
}

impl Drop for TranscodeBin {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "shell_test.rs"]
mod shell_test;
