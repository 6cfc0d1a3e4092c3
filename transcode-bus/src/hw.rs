//! Decoder discovery.
//!
//! A stream can only be refined to raw caps when FFmpeg has a decoder for it.
//! Hardware decoders (CUDA/QSV/V4L2M2M) are preferred, with fallback to the
//! software decoder.

use ffmpeg_next::codec::Id;

/// Try to find a hardware-accelerated decoder for the given codec ID.
pub fn find_hw_decoder(codec_id: Id) -> Option<ffmpeg_next::Codec> {
    let hw_names: &[&str] = match codec_id {
        Id::H264 => &["h264_cuvid", "h264_qsv", "h264_v4l2m2m"],
        Id::HEVC => &["hevc_cuvid", "hevc_qsv", "hevc_v4l2m2m"],
        Id::VP8 => &["vp8_cuvid", "vp8_qsv", "vp8_v4l2m2m"],
        Id::VP9 => &["vp9_cuvid", "vp9_qsv", "vp9_v4l2m2m"],
        Id::AV1 => &["av1_cuvid", "av1_qsv"],
        Id::MPEG2VIDEO => &["mpeg2_cuvid", "mpeg2_qsv", "mpeg2_v4l2m2m"],
        Id::MPEG4 => &["mpeg4_cuvid", "mpeg4_v4l2m2m"],
        _ => &[],
    };

    for name in hw_names {
        if let Some(codec) = ffmpeg_next::decoder::find_by_name(name) {
            log::debug!("found hardware decoder: {}", name);
            return Some(codec);
        }
    }
    None
}

/// Hardware decoder if one is available, otherwise the software decoder.
pub fn find_decoder(codec_id: Id) -> Option<ffmpeg_next::Codec> {
    find_hw_decoder(codec_id).or_else(|| ffmpeg_next::decoder::find(codec_id))
}
