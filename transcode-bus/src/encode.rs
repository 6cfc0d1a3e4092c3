//! Profile-driven encoding stage.
//!
//! `EncodeBin` turns each stream of its [`EncodingProfile`] into an input
//! slot. Slots with a presence of one get an always-present sink pad as soon
//! as the profile is applied; every slot hands out request pads until its
//! presence is used up. The bin only negotiates; it never touches media data.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    caps::{Caps, MediaKind},
    element::{EncodeStage, State},
    error::{Error, Result},
    pad::{Pad, PadDirection, PadPresence},
    profile::{EncodingProfile, StreamProfile},
};

pub struct EncodeBin {
    name: String,
    src: Arc<Pad>,
    inner: Mutex<EncodeState>,
}

struct EncodeState {
    state: State,
    profile: Option<EncodingProfile>,
    slots: Vec<Slot>,
    pad_counters: HashMap<MediaKind, usize>,
}

struct Slot {
    stream: StreamProfile,
    accepted: Caps,
    static_pad: Option<Arc<Pad>>,
    requested: Vec<Arc<Pad>>,
}

impl Slot {
    fn in_use(&self) -> usize {
        usize::from(self.static_pad.is_some()) + self.requested.len()
    }

    fn has_room(&self) -> bool {
        self.stream.is_unlimited() || self.in_use() < self.stream.presence as usize
    }
}

impl EncodeState {
    fn next_pad_name(&mut self, kind: MediaKind) -> String {
        let counter = self.pad_counters.entry(kind).or_insert(0);
        let name = format!("{}_{}", kind, counter);
        *counter += 1;
        name
    }

    fn outstanding_requests(&self) -> usize {
        self.slots.iter().map(|s| s.requested.len()).sum()
    }
}

impl EncodeBin {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            src: Pad::new("src", PadDirection::Src, PadPresence::Always, Caps::any()),
            inner: Mutex::new(EncodeState {
                state: State::Null,
                profile: None,
                slots: Vec::new(),
                pad_counters: HashMap::new(),
            }),
        }
    }

    pub fn with_profile(name: &str, profile: EncodingProfile) -> Result<Self> {
        let bin = Self::new(name);
        bin.set_profile(Some(profile))?;
        Ok(bin)
    }

    /// Currently handed-out request pads.
    pub fn request_pads(&self) -> Vec<Arc<Pad>> {
        self.lock()
            .slots
            .iter()
            .flat_map(|s| s.requested.iter().cloned())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, EncodeState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EncodeStage for EncodeBin {
    fn name(&self) -> &str {
        &self.name
    }

    fn src_pad(&self) -> Arc<Pad> {
        Arc::clone(&self.src)
    }

    fn static_sink_pads(&self) -> Vec<Arc<Pad>> {
        self.lock()
            .slots
            .iter()
            .filter_map(|s| s.static_pad.clone())
            .collect()
    }

    fn request_pad(&self, caps: &Caps) -> Option<Arc<Pad>> {
        let mut inner = self.lock();
        if inner.profile.is_none() {
            log::debug!("{}: request for {} without a profile", self.name, caps);
            return None;
        }
        let Some(index) = inner
            .slots
            .iter()
            .position(|s| s.has_room() && s.stream.accepts(caps))
        else {
            log::debug!("{}: no free slot accepts {}", self.name, caps);
            return None;
        };
        let kind = inner.slots[index].stream.kind();
        let name = inner.next_pad_name(kind);
        let slot = &mut inner.slots[index];
        let pad = Pad::new(
            name,
            PadDirection::Sink,
            PadPresence::Request,
            slot.accepted.clone(),
        );
        slot.requested.push(Arc::clone(&pad));
        log::debug!(
            "{}: created {} for {} ({}/{})",
            self.name,
            pad.name(),
            caps,
            slot.in_use(),
            slot.stream.presence
        );
        Some(pad)
    }

    fn release_request_pad(&self, pad: &Arc<Pad>) {
        let mut inner = self.lock();
        for slot in inner.slots.iter_mut() {
            if let Some(pos) = slot.requested.iter().position(|p| Arc::ptr_eq(p, pad)) {
                let released = slot.requested.remove(pos);
                released.unlink();
                log::debug!("{}: released {}", self.name, released.name());
                return;
            }
        }
        log::warn!("{}: release of unknown pad {}", self.name, pad.name());
    }

    fn profile(&self) -> Option<EncodingProfile> {
        self.lock().profile.clone()
    }

    fn set_profile(&self, profile: Option<EncodingProfile>) -> Result<()> {
        let mut inner = self.lock();
        if inner.state >= State::Paused {
            return Err(Error::ProfileLocked {
                element: self.name.clone(),
                state: inner.state.to_string(),
            });
        }
        if inner.outstanding_requests() > 0 {
            return Err(Error::ProfileLocked {
                element: self.name.clone(),
                state: "holding request pads".to_string(),
            });
        }
        if let Some(profile) = &profile {
            profile.validate()?;
        }

        for slot in inner.slots.drain(..) {
            if let Some(pad) = slot.static_pad {
                pad.unlink();
            }
        }
        inner.pad_counters.clear();

        let streams = profile
            .as_ref()
            .map(|p| p.streams.clone())
            .unwrap_or_default();
        let mut slots = Vec::with_capacity(streams.len());
        for stream in streams {
            let accepted = stream.accepted_caps();
            let static_pad = (stream.presence == 1).then(|| {
                let name = inner.next_pad_name(stream.kind());
                Pad::new(name, PadDirection::Sink, PadPresence::Always, accepted.clone())
            });
            slots.push(Slot {
                stream,
                accepted,
                static_pad,
                requested: Vec::new(),
            });
        }
        inner.slots = slots;
        inner.profile = profile;
        log::info!(
            "{}: profile set to {}",
            self.name,
            inner
                .profile
                .as_ref()
                .map(|p| p.name.as_str())
                .unwrap_or("<none>")
        );
        Ok(())
    }

    fn state(&self) -> State {
        self.lock().state
    }

    fn set_state(&self, state: State) -> Result<()> {
        let mut inner = self.lock();
        if state >= State::Paused && inner.profile.is_none() {
            return Err(Error::NoProfile(self.name.clone()));
        }
        log::debug!("{}: {} -> {}", self.name, inner.state, state);
        inner.state = state;
        Ok(())
    }
}

#[cfg(test)]
#[path = "encode_test.rs"]
mod encode_test;
