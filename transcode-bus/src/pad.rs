//! Pads: typed, directional connection points on elements.

use std::{
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::Serialize;
use thiserror::Error;

use crate::caps::Caps;

static NEXT_PAD_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PadId(u64);

impl fmt::Display for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PadDirection {
    Src,
    Sink,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PadPresence {
    /// Exists for the lifetime of the element.
    Always,
    /// Appears while data flows (decoder outputs).
    Sometimes,
    /// Created on demand; must be released by whoever requested it.
    Request,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("cannot link {src} to {sink}: wrong direction")]
    WrongDirection { src: String, sink: String },
    #[error("pad {0} is already linked")]
    WasLinked(String),
    #[error("caps of {src} and {sink} do not intersect")]
    NoFormat { src: String, sink: String },
}

pub struct Pad {
    id: PadId,
    name: String,
    direction: PadDirection,
    presence: PadPresence,
    caps: Caps,
    target: Option<Arc<Pad>>,
    peer: Mutex<Option<Weak<Pad>>>,
}

impl Pad {
    pub fn new(
        name: impl Into<String>,
        direction: PadDirection,
        presence: PadPresence,
        caps: Caps,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: PadId(NEXT_PAD_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            direction,
            presence,
            caps,
            target: None,
            peer: Mutex::new(None),
        })
    }

    /// A passthrough pad exposing `target` on the outside of a bin.
    pub fn new_ghost(name: impl Into<String>, target: &Arc<Pad>) -> Arc<Self> {
        Arc::new(Self {
            id: PadId(NEXT_PAD_ID.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            direction: target.direction,
            presence: PadPresence::Always,
            caps: Caps::any(),
            target: Some(Arc::clone(target)),
            peer: Mutex::new(None),
        })
    }

    pub fn id(&self) -> PadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    pub fn presence(&self) -> PadPresence {
        self.presence
    }

    /// Ghost pads report their target's caps.
    pub fn caps(&self) -> Caps {
        match &self.target {
            Some(target) => target.caps(),
            None => self.caps.clone(),
        }
    }

    pub fn target(&self) -> Option<&Arc<Pad>> {
        self.target.as_ref()
    }

    pub fn is_ghost(&self) -> bool {
        self.target.is_some()
    }

    pub fn peer(&self) -> Option<Arc<Pad>> {
        self.lock_peer().as_ref().and_then(Weak::upgrade)
    }

    pub fn is_linked(&self) -> bool {
        self.peer().is_some()
    }

    /// Links `src` to `sink`. Both pads are locked in id order so concurrent
    /// links over overlapping pads cannot deadlock and a pad is never given
    /// two peers.
    pub fn link(src: &Arc<Pad>, sink: &Arc<Pad>) -> Result<(), LinkError> {
        if src.direction != PadDirection::Src
            || sink.direction != PadDirection::Sink
            || src.id == sink.id
        {
            return Err(LinkError::WrongDirection {
                src: src.name.clone(),
                sink: sink.name.clone(),
            });
        }

        let src_first = src.id < sink.id;
        let (first, second) = if src_first { (src, sink) } else { (sink, src) };
        let mut first_peer = first.lock_peer();
        let mut second_peer = second.lock_peer();
        let (src_peer, sink_peer) = if src_first {
            (&mut *first_peer, &mut *second_peer)
        } else {
            (&mut *second_peer, &mut *first_peer)
        };

        if is_live(src_peer) {
            return Err(LinkError::WasLinked(src.name.clone()));
        }
        if is_live(sink_peer) {
            return Err(LinkError::WasLinked(sink.name.clone()));
        }
        if !src.caps().can_intersect(&sink.caps()) {
            return Err(LinkError::NoFormat {
                src: src.name.clone(),
                sink: sink.name.clone(),
            });
        }

        *src_peer = Some(Arc::downgrade(sink));
        *sink_peer = Some(Arc::downgrade(src));
        Ok(())
    }

    /// Breaks the link on both sides, returning the former peer.
    pub fn unlink(self: &Arc<Self>) -> Option<Arc<Pad>> {
        let peer = self.lock_peer().take().and_then(|w| w.upgrade())?;
        let mut theirs = peer.lock_peer();
        if theirs
            .as_ref()
            .is_some_and(|w| w.as_ptr() == Arc::as_ptr(self))
        {
            *theirs = None;
        }
        drop(theirs);
        Some(peer)
    }

    fn lock_peer(&self) -> MutexGuard<'_, Option<Weak<Pad>>> {
        self.peer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_live(peer: &Option<Weak<Pad>>) -> bool {
    peer.as_ref().is_some_and(|w| w.strong_count() > 0)
}

impl fmt::Debug for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pad")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("presence", &self.presence)
            .field("caps", &self.caps().to_string())
            .field("linked", &self.is_linked())
            .finish()
    }
}

#[cfg(test)]
#[path = "pad_test.rs"]
mod pad_test;
