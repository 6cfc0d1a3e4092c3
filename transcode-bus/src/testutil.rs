//! Scriptable encoding stage for routing tests.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::{
    caps::Caps,
    element::{EncodeStage, State},
    error::Result,
    pad::{Pad, PadDirection, PadPresence},
    profile::EncodingProfile,
};

#[derive(Clone)]
pub(crate) struct StubEncoder {
    inner: Arc<StubInner>,
}

struct StubInner {
    src: Arc<Pad>,
    statics: Vec<Arc<Pad>>,
    provision: Option<Caps>,
    limit: Option<usize>,
    broken_links: bool,
    log: Mutex<StubLog>,
}

#[derive(Default)]
struct StubLog {
    requests: usize,
    outstanding: Vec<Arc<Pad>>,
    released: Vec<String>,
    created: usize,
    profile: Option<EncodingProfile>,
    state: Option<State>,
}

pub(crate) struct StubBuilder {
    statics: Vec<Caps>,
    provision: Option<Caps>,
    limit: Option<usize>,
    broken_links: bool,
}

impl StubBuilder {
    pub(crate) fn with_static(mut self, caps: &str) -> Self {
        self.statics.push(caps.parse().unwrap());
        self
    }

    /// Hands out request pads for `caps`, at most `limit` at a time.
    pub(crate) fn provisioning(mut self, caps: &str, limit: Option<usize>) -> Self {
        self.provision = Some(caps.parse().unwrap());
        self.limit = limit;
        self
    }

    /// Request pads are created with caps nothing can link to.
    pub(crate) fn failing_links(mut self) -> Self {
        self.broken_links = true;
        self
    }

    pub(crate) fn build(self) -> StubEncoder {
        let statics = self
            .statics
            .into_iter()
            .enumerate()
            .map(|(i, caps)| {
                Pad::new(format!("static_{}", i), PadDirection::Sink, PadPresence::Always, caps)
            })
            .collect();
        StubEncoder {
            inner: Arc::new(StubInner {
                src: Pad::new("src", PadDirection::Src, PadPresence::Always, Caps::any()),
                statics,
                provision: self.provision,
                limit: self.limit,
                broken_links: self.broken_links,
                log: Mutex::new(StubLog::default()),
            }),
        }
    }
}

impl StubEncoder {
    pub(crate) fn builder() -> StubBuilder {
        StubBuilder {
            statics: Vec::new(),
            provision: None,
            limit: None,
            broken_links: false,
        }
    }

    pub(crate) fn boxed(&self) -> Box<dyn EncodeStage> {
        Box::new(self.clone())
    }

    pub(crate) fn statics(&self) -> &[Arc<Pad>] {
        &self.inner.statics
    }

    /// Number of `request_pad` calls, successful or not.
    pub(crate) fn requests(&self) -> usize {
        self.log().requests
    }

    pub(crate) fn outstanding(&self) -> Vec<Arc<Pad>> {
        self.log().outstanding.clone()
    }

    pub(crate) fn released(&self) -> Vec<String> {
        self.log().released.clone()
    }

    pub(crate) fn last_state(&self) -> Option<State> {
        self.log().state
    }

    fn log(&self) -> MutexGuard<'_, StubLog> {
        self.inner.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EncodeStage for StubEncoder {
    fn name(&self) -> &str {
        "stub-encoder"
    }

    fn src_pad(&self) -> Arc<Pad> {
        Arc::clone(&self.inner.src)
    }

    fn static_sink_pads(&self) -> Vec<Arc<Pad>> {
        self.inner.statics.clone()
    }

    fn request_pad(&self, caps: &Caps) -> Option<Arc<Pad>> {
        let mut log = self.log();
        log.requests += 1;
        let accepted = self.inner.provision.as_ref()?;
        if !accepted.can_intersect(caps) {
            return None;
        }
        if self.inner.limit.is_some_and(|limit| log.outstanding.len() >= limit) {
            return None;
        }
        let pad_caps = if self.inner.broken_links {
            Caps::new_empty()
        } else {
            accepted.clone()
        };
        let pad = Pad::new(
            format!("requested_{}", log.created),
            PadDirection::Sink,
            PadPresence::Request,
            pad_caps,
        );
        log.created += 1;
        log.outstanding.push(Arc::clone(&pad));
        Some(pad)
    }

    fn release_request_pad(&self, pad: &Arc<Pad>) {
        let mut log = self.log();
        log.outstanding.retain(|p| !Arc::ptr_eq(p, pad));
        log.released.push(pad.name().to_string());
    }

    fn profile(&self) -> Option<EncodingProfile> {
        self.log().profile.clone()
    }

    fn set_profile(&self, profile: Option<EncodingProfile>) -> Result<()> {
        self.log().profile = profile;
        Ok(())
    }

    fn state(&self) -> State {
        self.log().state.unwrap_or(State::Null)
    }

    fn set_state(&self, state: State) -> Result<()> {
        self.log().state = Some(state);
        Ok(())
    }
}

pub(crate) fn caps(s: &str) -> Caps {
    s.parse().unwrap()
}

pub(crate) fn candidate(name: &str, caps_str: &str) -> Arc<Pad> {
    Pad::new(name, PadDirection::Src, PadPresence::Sometimes, caps(caps_str))
}
