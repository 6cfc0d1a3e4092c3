/// Registers FFmpeg components and the default element factories. Call once
/// at startup before building a `transcodebin`.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))?;
    registry::register_defaults();
    Ok(())
}

pub mod caps;
pub mod decode;
pub mod element;
pub mod encode;
pub mod error;
pub mod hw;
pub mod pad;
pub mod probe;
pub mod profile;
pub mod registry;
pub mod router;
pub mod shell;
pub mod stream;

#[cfg(test)]
mod testutil;

pub use caps::{Caps, MediaKind, Structure};
pub use decode::{DecodeBin, DecodeSummary, DiscoveredStream, InputConfig};
pub use element::{AutoplugHandler, DecodeStage, Element, EncodeStage, State};
pub use encode::EncodeBin;
pub use error::{Error, Result};
pub use pad::{Pad, PadDirection, PadPresence};
pub use profile::{EncodingProfile, StreamProfile};
pub use shell::{LinkedInput, ShellState, TranscodeBin};
