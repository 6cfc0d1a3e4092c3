//! The seams between the transcode bin and the stages it wraps.

use std::{
    fmt,
    sync::{Arc, Weak},
};

use crate::{
    caps::Caps,
    decode::{DecodeTask, InputConfig},
    error::{Error, Result},
    pad::Pad,
    profile::EncodingProfile,
    shell::TranscodeBin,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    Null,
    Ready,
    Paused,
    Playing,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Null => "NULL",
            State::Ready => "READY",
            State::Paused => "PAUSED",
            State::Playing => "PLAYING",
        };
        f.write_str(s)
    }
}

/// Callbacks a decoding stage delivers while it discovers streams.
///
/// Both methods may be called concurrently from the stage's worker threads.
pub trait AutoplugHandler: Send + Sync {
    /// Asked for every candidate pad before the stage refines it further.
    /// `true` keeps refining, `false` exposes the pad as it is.
    fn autoplug_continue(&self, pad: &Arc<Pad>, caps: &Caps) -> bool;

    /// A pad has been finalized and will not be refined any further.
    fn pad_added(&self, pad: &Arc<Pad>);
}

pub trait DecodeStage: Send + Sync {
    fn name(&self) -> &str;

    fn sink_pad(&self) -> Arc<Pad>;

    fn connect(&self, handler: Weak<dyn AutoplugHandler>);

    /// Starts discovering the streams of `input`. Callbacks fire from worker
    /// threads until the returned task completes or is cancelled.
    fn start(&self, input: InputConfig) -> anyhow::Result<DecodeTask>;

    fn stop(&self);
}

pub trait EncodeStage: Send + Sync {
    fn name(&self) -> &str;

    fn src_pad(&self) -> Arc<Pad>;

    /// Always-present sink pads, in declaration order.
    fn static_sink_pads(&self) -> Vec<Arc<Pad>>;

    /// Creates a new sink pad able to accept `caps`, or `None` when no slot
    /// is left for it.
    fn request_pad(&self, caps: &Caps) -> Option<Arc<Pad>>;

    fn release_request_pad(&self, pad: &Arc<Pad>);

    fn profile(&self) -> Option<EncodingProfile>;

    fn set_profile(&self, profile: Option<EncodingProfile>) -> Result<()>;

    fn state(&self) -> State;

    fn set_state(&self, state: State) -> Result<()>;
}

/// Anything the registry can build.
pub enum Element {
    Decoder(Box<dyn DecodeStage>),
    Encoder(Box<dyn EncodeStage>),
    Transcoder(Arc<TranscodeBin>),
}

impl Element {
    pub fn name(&self) -> &str {
        match self {
            Element::Decoder(d) => d.name(),
            Element::Encoder(e) => e.name(),
            Element::Transcoder(t) => t.name(),
        }
    }

    pub fn into_decoder(self) -> Result<Box<dyn DecodeStage>> {
        match self {
            Element::Decoder(d) => Ok(d),
            other => Err(Error::WrongElementType {
                name: other.name().to_string(),
                expected: "decoding stage",
            }),
        }
    }

    pub fn into_encoder(self) -> Result<Box<dyn EncodeStage>> {
        match self {
            Element::Encoder(e) => Ok(e),
            other => Err(Error::WrongElementType {
                name: other.name().to_string(),
                expected: "encoding stage",
            }),
        }
    }

    pub fn into_transcoder(self) -> Result<Arc<TranscodeBin>> {
        match self {
            Element::Transcoder(t) => Ok(t),
            other => Err(Error::WrongElementType {
                name: other.name().to_string(),
                expected: "transcode bin",
            }),
        }
    }
}
