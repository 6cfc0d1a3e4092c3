//! Routing of decoder pads onto encoder inputs.
//!
//! Order of preference for a candidate pad:
//! 1. an always-present encoder input that is free and accepts the hint;
//! 2. a freshly requested input, which is kept only if the link succeeds.
//!
//! Requested inputs that end up linked are recorded in [`ProvisionedInputs`]
//! so they can be handed back to the encoder exactly once at teardown.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::{
    caps::Caps,
    element::EncodeStage,
    pad::{LinkError, Pad, PadDirection},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Linked to an always-present encoder input.
    Static(String),
    /// Linked to an input requested for this stream.
    Provisioned(String),
}

impl Route {
    pub fn input_name(&self) -> &str {
        match self {
            Route::Static(name) | Route::Provisioned(name) => name,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("no encoder input accepts {0}")]
    NoCompatibleInput(String),
    #[error("linking to {input} failed: {source}")]
    Link {
        input: String,
        #[source]
        source: LinkError,
    },
    #[error("routing is closed")]
    Closed,
}

/// Encoder inputs requested on behalf of the decoder and successfully linked.
#[derive(Default)]
pub struct ProvisionedInputs {
    pads: Mutex<Vec<Arc<Pad>>>,
}

impl ProvisionedInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, pad: &Arc<Pad>) -> bool {
        self.lock().iter().any(|p| Arc::ptr_eq(p, pad))
    }

    pub fn pads(&self) -> Vec<Arc<Pad>> {
        self.lock().clone()
    }

    fn insert(&self, pad: Arc<Pad>) {
        self.lock().push(pad);
    }

    /// Unlinks and releases every recorded input. Returns how many were
    /// released; a second call releases nothing.
    pub fn release_all(&self, encoder: &dyn EncodeStage) -> usize {
        let pads = std::mem::take(&mut *self.lock());
        for pad in &pads {
            pad.unlink();
            encoder.release_request_pad(pad);
        }
        pads.len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Pad>>> {
        self.pads.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// First always-present, unlinked encoder input whose caps intersect `hint`.
pub fn find_static_match(
    encoder: &dyn EncodeStage,
    candidate: &Pad,
    hint: &Caps,
) -> Option<Arc<Pad>> {
    if candidate.direction() != PadDirection::Src {
        return None;
    }
    encoder.static_sink_pads().into_iter().find(|pad| {
        pad.direction() == PadDirection::Sink && !pad.is_linked() && pad.caps().can_intersect(hint)
    })
}

/// Asks the encoder for a new input accepting `hint`. Ownership of the pad
/// is tentative until it is linked and recorded.
pub fn request_input(encoder: &dyn EncodeStage, hint: &Caps) -> Option<Arc<Pad>> {
    encoder.request_pad(hint)
}

/// Links `candidate` to a static input if one fits, otherwise to a newly
/// requested one. A requested input whose link fails is released before
/// returning.
pub fn route(
    encoder: &dyn EncodeStage,
    provisioned: &ProvisionedInputs,
    candidate: &Arc<Pad>,
    hint: &Caps,
) -> Result<Route, RouteError> {
    if let Some(input) = find_static_match(encoder, candidate, hint) {
        return match Pad::link(candidate, &input) {
            Ok(()) => Ok(Route::Static(input.name().to_string())),
            Err(source) => Err(RouteError::Link {
                input: input.name().to_string(),
                source,
            }),
        };
    }

    let input = request_input(encoder, hint)
        .ok_or_else(|| RouteError::NoCompatibleInput(hint.to_string()))?;

    match Pad::link(candidate, &input) {
        Ok(()) => {
            let name = input.name().to_string();
            provisioned.insert(input);
            Ok(Route::Provisioned(name))
        }
        Err(source) => {
            encoder.release_request_pad(&input);
            Err(RouteError::Link {
                input: input.name().to_string(),
                source,
            })
        }
    }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod router_test;
