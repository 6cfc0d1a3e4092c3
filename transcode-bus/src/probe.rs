//! Stream discovery with FFmpeg.
//!
//! Opens an input (file path or URL), walks its streams and turns each into a
//! refinement chain for [`crate::decode::DecodeBin`]: the demuxed caps first,
//! then raw caps when a decoder is available.

use anyhow::Context;
use ffmpeg_next::{codec::Id, media};

use crate::{
    caps::{Caps, Structure},
    decode::DiscoveredStream,
    hw::find_decoder,
    stream::AvStream,
};

pub fn discover(url: &str) -> anyhow::Result<Vec<DiscoveredStream>> {
    let input = ffmpeg_next::format::input(url)
        .with_context(|| format!("open input {}", url))?;

    let mut streams = Vec::with_capacity(input.nb_streams() as usize);
    for stream in input.streams() {
        let av_stream = AvStream::from(stream);
        let discovered = stream_chain(&av_stream);
        log::info!(
            "stream index: {}, codec: {:?}, chain: [{}]",
            av_stream.index(),
            av_stream.codec_id(),
            discovered
                .chain()
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        streams.push(discovered);
    }
    Ok(streams)
}

fn stream_chain(stream: &AvStream) -> DiscoveredStream {
    let parsed = parsed_caps(stream);
    let discovered = DiscoveredStream::new(stream.index(), parsed.clone());
    if parsed.is_raw() {
        return discovered;
    }
    if find_decoder(stream.codec_id()).is_none() {
        log::debug!("no decoder for {:?}, stream {} stays encoded", stream.codec_id(), stream.index());
        return discovered;
    }
    match raw_caps(stream) {
        Some(raw) => discovered.then(raw),
        None => discovered,
    }
}

/// Caps as a demuxer/parser would announce them.
fn parsed_caps(stream: &AvStream) -> Caps {
    let base = media_structure(stream.codec_id(), stream.medium());
    let mut s = if stream.is_video() {
        with_video_fields(base, stream)
    } else if stream.is_audio() {
        with_audio_fields(base, stream)
    } else {
        base
    };
    if stream.codec_id() == Id::PCM_S16LE {
        s = s.with_field("format", "S16LE");
    }
    s.into()
}

fn raw_caps(stream: &AvStream) -> Option<Caps> {
    let s = match stream.medium() {
        media::Type::Video => with_video_fields(Structure::new("video/x-raw"), stream),
        media::Type::Audio => with_audio_fields(Structure::new("audio/x-raw"), stream),
        media::Type::Subtitle => {
            let format = match stream.codec_id() {
                Id::ASS | Id::SSA => "pango-markup",
                _ => "utf8",
            };
            Structure::new("text/x-raw").with_field("format", format)
        }
        _ => return None,
    };
    Some(s.into())
}

fn with_video_fields(mut s: Structure, stream: &AvStream) -> Structure {
    if stream.width() > 0 && stream.height() > 0 {
        s = s
            .with_field("width", stream.width())
            .with_field("height", stream.height());
    }
    let rate = stream.rate();
    if rate.numerator() > 0 && rate.denominator() > 0 {
        s = s.with_field(
            "framerate",
            crate::caps::Value::Fraction(rate.numerator(), rate.denominator()),
        );
    }
    s
}

fn with_audio_fields(mut s: Structure, stream: &AvStream) -> Structure {
    if stream.sample_rate() > 0 {
        s = s.with_field("rate", stream.sample_rate());
    }
    if stream.channels() > 0 {
        s = s.with_field("channels", stream.channels());
    }
    s
}

/// Media type for a codec, with the fields that identify the bitstream.
pub fn media_structure(id: Id, medium: media::Type) -> Structure {
    match id {
        Id::H264 => Structure::new("video/x-h264"),
        Id::HEVC => Structure::new("video/x-h265"),
        Id::VP8 => Structure::new("video/x-vp8"),
        Id::VP9 => Structure::new("video/x-vp9"),
        Id::AV1 => Structure::new("video/x-av1"),
        Id::THEORA => Structure::new("video/x-theora"),
        Id::MJPEG => Structure::new("image/jpeg"),
        Id::MPEG2VIDEO => Structure::new("video/mpeg")
            .with_field("mpegversion", 2)
            .with_field("systemstream", false),
        Id::MPEG4 => Structure::new("video/mpeg")
            .with_field("mpegversion", 4)
            .with_field("systemstream", false),
        Id::RAWVIDEO => Structure::new("video/x-raw"),
        Id::AAC => Structure::new("audio/mpeg").with_field("mpegversion", 4),
        Id::MP3 => Structure::new("audio/mpeg")
            .with_field("mpegversion", 1)
            .with_field("layer", 3),
        Id::MP2 => Structure::new("audio/mpeg")
            .with_field("mpegversion", 1)
            .with_field("layer", 2),
        Id::OPUS => Structure::new("audio/x-opus"),
        Id::VORBIS => Structure::new("audio/x-vorbis"),
        Id::FLAC => Structure::new("audio/x-flac"),
        Id::AC3 => Structure::new("audio/x-ac3"),
        Id::EAC3 => Structure::new("audio/x-eac3"),
        Id::PCM_S16LE => Structure::new("audio/x-raw"),
        Id::SUBRIP => Structure::new("application/x-subtitle"),
        Id::ASS | Id::SSA => Structure::new("application/x-ass"),
        Id::WEBVTT => Structure::new("application/x-subtitle-vtt"),
        Id::MOV_TEXT => Structure::new("application/x-subtitle-tx3g"),
        Id::DVD_SUBTITLE => Structure::new("subpicture/x-dvd"),
        other => match medium {
            media::Type::Video => Structure::new(format!("video/x-ffmpeg-{}", other.name())),
            media::Type::Audio => Structure::new(format!("audio/x-ffmpeg-{}", other.name())),
            media::Type::Subtitle => {
                Structure::new(format!("application/x-subtitle-{}", other.name()))
            }
            _ => Structure::new(format!("application/x-ffmpeg-{}", other.name())),
        },
    }
}

#[cfg(test)]
#[path = "probe_test.rs"]
mod probe_test;
