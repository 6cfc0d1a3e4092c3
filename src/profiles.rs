//! Candidate encoding profiles.

use std::path::Path;

use anyhow::Context;
use transcode_bus::{Caps, EncodingProfile, StreamProfile};

fn caps(s: &str) -> anyhow::Result<Caps> {
    s.parse().with_context(|| format!("parse caps '{}'", s))
}

/// Profiles tried when no profile file is given.
pub fn builtin() -> anyhow::Result<Vec<EncodingProfile>> {
    Ok(vec![
        EncodingProfile::new("mp4")
            .with_description("H.264 video and AAC audio in MP4")
            .with_container(caps("video/quicktime, variant=iso")?)
            .with_stream(StreamProfile::new(caps("video/x-h264")?).with_presence(1))
            .with_stream(StreamProfile::new(caps("audio/mpeg, mpegversion=4")?).with_presence(1)),
        EncodingProfile::new("mpegts")
            .with_description("H.264 video and MPEG-1 layer 2 audio tracks in MPEG-TS")
            .with_container(caps("video/mpegts, systemstream=true, packetsize=188")?)
            .with_stream(StreamProfile::new(caps("video/x-h264")?).with_presence(1))
            .with_stream(StreamProfile::new(caps("audio/mpeg, mpegversion=1, layer=2")?)),
        EncodingProfile::new("webm")
            .with_description("VP8 video and Vorbis audio in WebM")
            .with_container(caps("video/webm")?)
            .with_stream(
                StreamProfile::new(caps("video/x-vp8")?)
                    .with_restriction(caps("video/x-raw, width=[1, 1920], height=[1, 1080]")?)
                    .with_presence(1),
            )
            .with_stream(StreamProfile::new(caps("audio/x-vorbis")?).with_presence(1)),
        EncodingProfile::new("matroska")
            .with_description("H.264 video, Vorbis audio tracks and SSA subtitles in Matroska")
            .with_container(caps("video/x-matroska")?)
            .with_stream(StreamProfile::new(caps("video/x-h264")?).with_presence(1))
            .with_stream(StreamProfile::new(caps("audio/x-vorbis")?))
            .with_stream(StreamProfile::new(caps("application/x-ass")?)),
        EncodingProfile::new("mp3")
            .with_description("MP3 audio only")
            .with_stream(
                StreamProfile::new(caps("audio/mpeg, mpegversion=1, layer=3")?).with_presence(1),
            ),
    ])
}

/// Reads a JSON array of profiles. Every profile must validate.
pub fn load(path: &Path) -> anyhow::Result<Vec<EncodingProfile>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read profiles from {}", path.display()))?;
    let profiles: Vec<EncodingProfile> = serde_json::from_str(&text)
        .with_context(|| format!("parse profiles in {}", path.display()))?;
    for profile in &profiles {
        profile.validate()?;
    }
    log::info!("loaded {} profiles from {}", profiles.len(), path.display());
    Ok(profiles)
}

#[cfg(test)]
#[path = "profiles_test.rs"]
mod profiles_test;
