// ============================================================================
// Transcode Bin Tests
// ============================================================================

use std::sync::{Arc, Barrier};

use proptest::prelude::*;

use crate::decode::{DecodeBin, DiscoveredStream, InputConfig, StreamOutcome};
use crate::element::{AutoplugHandler, EncodeStage, State};
use crate::encode::EncodeBin;
use crate::error::Error;
use crate::pad::PadPresence;
use crate::profile::{EncodingProfile, StreamProfile};
use crate::registry;
use crate::shell::{ShellState, TranscodeBin};
use crate::testutil::{StubEncoder, candidate, caps};

fn stub_bin(encoder: &StubEncoder) -> Arc<TranscodeBin> {
    TranscodeBin::with_stages("transcodebin", Box::new(DecodeBin::new("decodebin")), encoder.boxed())
}

fn stub_profile() -> EncodingProfile {
    EncodingProfile::new("stub").with_stream(StreamProfile::new(caps("audio/x-vorbis")))
}

fn streams(formats: &[&str]) -> InputConfig {
    InputConfig::Streams(
        formats
            .iter()
            .enumerate()
            .map(|(i, f)| DiscoveredStream::new(i, caps(f)))
            .collect(),
    )
}

// ------------------------------------------------------------------------
// Lifecycle
// ------------------------------------------------------------------------

#[test]
fn test_teardown_never_activated() {
    let encoder = StubEncoder::builder().provisioning("audio/x-raw", None).build();
    let bin = stub_bin(&encoder);
    assert_eq!(bin.state(), ShellState::Constructed);

    bin.teardown();
    bin.teardown();

    assert_eq!(bin.state(), ShellState::TornDown);
    assert_eq!(bin.provisioned_count(), 0);
    assert!(encoder.released().is_empty());
    assert_eq!(encoder.last_state(), Some(State::Null));
}

#[test]
fn test_ghost_pads_follow_stages() {
    let encoder = StubEncoder::builder().build();
    let bin = stub_bin(&encoder);
    let sink = bin.sink_pad();
    let src = bin.src_pad();
    assert!(sink.is_ghost());
    assert!(src.is_ghost());
    assert!(Arc::ptr_eq(src.target().unwrap(), &encoder.src_pad()));
    assert!(sink.caps().is_any());
}

#[test]
fn test_profile_forwarded_to_encoder() -> anyhow::Result<()> {
    let encoder = StubEncoder::builder().build();
    let bin = stub_bin(&encoder);

    bin.set_profile(Some(stub_profile()))?;
    assert_eq!(bin.state(), ShellState::Configured);
    assert_eq!(encoder.profile(), Some(stub_profile()));
    assert_eq!(bin.profile(), Some(stub_profile()));

    bin.set_profile(None)?;
    assert_eq!(bin.state(), ShellState::Constructed);
    Ok(())
}

#[test]
fn test_profile_rejected_by_encoder_surfaces() {
    let bin = TranscodeBin::with_stages(
        "transcodebin",
        Box::new(DecodeBin::new("decodebin")),
        Box::new(EncodeBin::new("encodebin")),
    );
    let err = bin.set_profile(Some(EncodingProfile::new("empty"))).unwrap_err();
    assert!(matches!(err, Error::InvalidProfile { .. }));
    assert_eq!(bin.state(), ShellState::Constructed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_play_requires_profile() {
    let encoder = StubEncoder::builder().build();
    let bin = stub_bin(&encoder);
    let err = bin.play(streams(&["audio/x-vorbis"])).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoProfile(_))));
    assert_eq!(bin.state(), ShellState::Constructed);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_profile_locked_while_active() -> anyhow::Result<()> {
    let encoder = StubEncoder::builder().with_static("audio/x-vorbis").build();
    let bin = stub_bin(&encoder);
    bin.set_profile(Some(stub_profile()))?;
    bin.play(streams(&["audio/x-vorbis"]))?;
    assert_eq!(bin.state(), ShellState::Active);
    assert_eq!(encoder.last_state(), Some(State::Playing));

    let err = bin.set_profile(None).unwrap_err();
    assert!(matches!(err, Error::ProfileLocked { .. }));
    assert_eq!(encoder.profile(), Some(stub_profile()));

    bin.wait().await;
    bin.teardown();
    assert!(matches!(bin.set_profile(None), Err(Error::TornDown(_))));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_play_failure_resets_encoder() -> anyhow::Result<()> {
    let encoder = StubEncoder::builder().build();
    let bin = stub_bin(&encoder);
    bin.set_profile(Some(stub_profile()))?;

    let missing = std::env::temp_dir().join("transcode-bus-missing-input.mkv");
    let result = bin.play(InputConfig::File {
        path: missing.to_string_lossy().into_owned(),
    });
    assert!(result.is_err());
    assert_eq!(bin.state(), ShellState::Configured);
    assert_eq!(encoder.last_state(), Some(State::Null));
    assert!(bin.wait().await.is_none());
    Ok(())
}

#[test]
fn test_construction_from_registry() -> anyhow::Result<()> {
    registry::register_defaults();
    let bin = TranscodeBin::new("job")?;
    assert_eq!(bin.name(), "job");
    assert_eq!(bin.state(), ShellState::Constructed);
    assert!(bin.src_pad().is_ghost());
    Ok(())
}

#[test]
fn test_construction_fails_for_missing_stage() {
    registry::register_defaults();
    let Err(err) = TranscodeBin::from_factories("job", "decodebin", "no-such-encoder") else {
        panic!("construction without an encoder should fail");
    };
    match err {
        Error::Construction { name, source } => {
            assert_eq!(name, "no-such-encoder");
            assert!(matches!(*source, Error::MissingElement(_)));
        }
        other => panic!("unexpected error: {}", other),
    }

    let err = TranscodeBin::from_factories("job", "encodebin", "encodebin").unwrap_err();
    assert!(matches!(err, Error::Construction { .. }));
}

#[test]
fn test_debug_shows_name_and_state() {
    let encoder = StubEncoder::builder().provisioning("audio/x-raw", None).build();
    let bin = stub_bin(&encoder);
    let pad = candidate("src_0", "audio/x-raw");
    assert!(!bin.autoplug_continue(&pad, &pad.caps()));

    let shown = format!("{:?}", bin);
    assert!(shown.starts_with("TranscodeBin"), "{}", shown);
    assert!(shown.contains("name: \"transcodebin\""), "{}", shown);
    assert!(shown.contains("state: Constructed"), "{}", shown);
    assert!(shown.contains("decoder: \"decodebin\""), "{}", shown);
    assert!(shown.contains("provisioned: 1"), "{}", shown);
}

// ------------------------------------------------------------------------
// Routing
// ------------------------------------------------------------------------

#[test]
fn test_autoplug_continue_records_last_caps() {
    let encoder = StubEncoder::builder().with_static("audio/x-vorbis").build();
    let bin = stub_bin(&encoder);
    assert!(bin.last_candidate_caps().is_none());

    let pad = candidate("src_0", "video/x-h264");
    assert!(bin.autoplug_continue(&pad, &pad.caps()));
    assert_eq!(bin.last_candidate_caps(), Some(caps("video/x-h264")));
}

#[test]
fn test_pad_added_routes_with_own_caps() {
    let encoder = StubEncoder::builder().with_static("audio/x-vorbis").build();
    let bin = stub_bin(&encoder);

    // A stale candidate must not influence the finalized pad.
    let other = candidate("src_1", "video/x-h264");
    bin.autoplug_continue(&other, &other.caps());

    let pad = candidate("src_0", "audio/x-vorbis");
    bin.pad_added(&pad);
    assert!(Arc::ptr_eq(&pad.peer().unwrap(), &encoder.statics()[0]));
}

#[test]
fn test_pad_added_leaves_linked_pad_alone() {
    let encoder = StubEncoder::builder().provisioning("audio/x-raw", None).build();
    let bin = stub_bin(&encoder);
    let pad = candidate("src_0", "audio/x-raw");

    assert!(!bin.autoplug_continue(&pad, &pad.caps()));
    bin.pad_added(&pad);
    assert_eq!(encoder.requests(), 1);
    assert_eq!(bin.provisioned_count(), 1);
    assert!(encoder.released().is_empty());
}

#[test]
fn test_linked_inputs_report_negotiated_caps() {
    let encoder = StubEncoder::builder()
        .with_static("audio/x-raw, rate=48000, channels=2")
        .build();
    let bin = stub_bin(&encoder);
    let pad = candidate("src_0", "audio/x-raw, rate=[8000, 96000], layout=interleaved");

    bin.pad_added(&pad);
    let linked = bin.linked_inputs();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].pad, "static_0");
    assert_eq!(
        linked[0].caps,
        caps("audio/x-raw, rate=48000, channels=2, layout=interleaved")
    );
}

#[test]
fn test_routing_closed_after_teardown() {
    let encoder = StubEncoder::builder().with_static("audio/x-raw").build();
    let bin = stub_bin(&encoder);
    bin.teardown();

    let pad = candidate("src_0", "audio/x-raw");
    assert!(bin.autoplug_continue(&pad, &pad.caps()));
    bin.pad_added(&pad);
    assert!(!pad.is_linked());
    assert_eq!(encoder.requests(), 0);
}

#[test]
fn test_concurrent_provisioning_respects_limit() {
    let encoder = StubEncoder::builder().provisioning("audio/x-vorbis", Some(2)).build();
    let bin = stub_bin(&encoder);
    let pads: Vec<_> = (0..3)
        .map(|i| candidate(&format!("src_{}", i), "audio/x-vorbis"))
        .collect();
    let barrier = Barrier::new(pads.len());

    let routed = std::thread::scope(|s| {
        let handles: Vec<_> = pads
            .iter()
            .map(|pad| {
                let bin = &bin;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    !bin.autoplug_continue(pad, &pad.caps())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join())
            .filter(|r| matches!(r, Ok(true)))
            .count()
    });

    assert_eq!(routed, 2);
    assert_eq!(bin.provisioned_count(), 2);
    assert_eq!(pads.iter().filter(|p| p.is_linked()).count(), 2);
    assert!(encoder.released().is_empty());
}

#[test]
fn test_teardown_while_routing() {
    for _ in 0..50 {
        let encoder = StubEncoder::builder().provisioning("audio/x-raw", None).build();
        let bin = stub_bin(&encoder);
        let pads: Vec<_> = (0..8)
            .map(|i| candidate(&format!("src_{}", i), "audio/x-raw"))
            .collect();
        let barrier = Barrier::new(pads.len() + 1);

        std::thread::scope(|s| {
            for pad in &pads {
                let bin = &bin;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    bin.autoplug_continue(pad, &pad.caps());
                });
            }
            barrier.wait();
            bin.teardown();
        });

        assert_eq!(bin.state(), ShellState::TornDown);
        assert_eq!(bin.provisioned_count(), 0);
        assert!(encoder.outstanding().is_empty());
        assert!(pads.iter().all(|p| !p.is_linked()));

        let mut released = encoder.released();
        let total = released.len();
        released.sort();
        released.dedup();
        assert_eq!(released.len(), total, "input released twice");
        assert_eq!(total, encoder.requests());
    }
}

proptest! {
    #[test]
    fn prop_autoplug_continue_negates_routing(kinds in prop::collection::vec(0u8..4, 1..10)) {
        let encoder = StubEncoder::builder()
            .with_static("audio/x-vorbis")
            .provisioning("text/x-raw", Some(2))
            .build();
        let bin = stub_bin(&encoder);
        let mut static_free = true;
        let mut slots = 2;
        let mut pads = Vec::new();

        for (i, kind) in kinds.into_iter().enumerate() {
            let (format, routable) = match kind {
                0 => ("audio/x-vorbis, channels=2", std::mem::replace(&mut static_free, false)),
                1 => {
                    let free = slots > 0;
                    if free {
                        slots -= 1;
                    }
                    ("text/x-raw, format=utf8", free)
                }
                2 => ("video/x-h264", false),
                _ => ("application/x-ass", false),
            };
            let pad = candidate(&format!("src_{}", i), format);
            prop_assert_eq!(bin.autoplug_continue(&pad, &pad.caps()), !routable);
            prop_assert_eq!(pad.is_linked(), routable);
            pads.push(pad);
        }
        prop_assert_eq!(bin.provisioned_count(), 2 - slots);
    }
}

// ------------------------------------------------------------------------
// Scenarios driven through the decoding stage
// ------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn test_static_input_and_unsupported_stream() -> anyhow::Result<()> {
    let encoder = StubEncoder::builder().with_static("audio/x-vorbis").build();
    let bin = stub_bin(&encoder);
    bin.set_profile(Some(stub_profile()))?;

    bin.play(streams(&["audio/x-vorbis, rate=48000", "application/x-ass"]))?;
    let summary = bin.wait().await.unwrap();

    assert_eq!(summary.linked_count(), 1);
    assert_eq!(summary.dropped_count(), 1);
    assert_eq!(bin.provisioned_count(), 0);
    assert!(encoder.outstanding().is_empty());

    let linked = bin.linked_inputs();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].pad, "static_0");
    assert_eq!(linked[0].stream, "src_0");
    assert_eq!(linked[0].presence, PadPresence::Always);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_streams_provisioned_up_to_limit() -> anyhow::Result<()> {
    let encoder = StubEncoder::builder().provisioning("audio/x-vorbis", Some(2)).build();
    let bin = stub_bin(&encoder);
    bin.set_profile(Some(stub_profile()))?;

    bin.play(streams(&["audio/x-vorbis"; 3]))?;
    let summary = bin.wait().await.unwrap();

    assert_eq!(summary.streams.len(), 3);
    assert_eq!(summary.linked_count(), 2);
    assert_eq!(summary.dropped_count(), 1);
    assert_eq!(bin.provisioned_count(), 2);
    assert_eq!(encoder.outstanding().len(), 2);
    assert!(
        bin.linked_inputs()
            .iter()
            .all(|input| input.presence == PadPresence::Request)
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_teardown_drains_provisioned_inputs() -> anyhow::Result<()> {
    let encoder = StubEncoder::builder().provisioning("text/x-raw", None).build();
    let bin = stub_bin(&encoder);
    bin.set_profile(Some(stub_profile()))?;
    bin.play(streams(&["text/x-raw", "text/x-raw", "text/x-raw"]))?;
    bin.wait().await.unwrap();
    assert_eq!(bin.provisioned_count(), 3);

    bin.teardown();
    assert_eq!(bin.provisioned_count(), 0);
    assert!(encoder.outstanding().is_empty());
    let mut released = encoder.released();
    released.sort();
    released.dedup();
    assert_eq!(released.len(), 3);
    assert!(bin.linked_inputs().is_empty());

    bin.teardown();
    assert_eq!(encoder.released().len(), 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_drop_releases_provisioned_inputs() -> anyhow::Result<()> {
    let encoder = StubEncoder::builder().provisioning("text/x-raw", None).build();
    let bin = stub_bin(&encoder);
    bin.set_profile(Some(stub_profile()))?;
    bin.play(streams(&["text/x-raw"]))?;
    bin.wait().await.unwrap();

    drop(bin);
    assert_eq!(encoder.released().len(), 1);
    assert!(encoder.outstanding().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refines_until_encoder_accepts() -> anyhow::Result<()> {
    let profile = EncodingProfile::new("webm")
        .with_container(caps("video/webm"))
        .with_stream(StreamProfile::new(caps("video/x-vp8")).with_presence(1))
        .with_stream(StreamProfile::new(caps("audio/x-vorbis")).with_presence(1));
    let bin = TranscodeBin::with_stages(
        "transcodebin",
        Box::new(DecodeBin::new("decodebin")),
        Box::new(EncodeBin::new("encodebin")),
    );
    bin.set_profile(Some(profile))?;

    let video = DiscoveredStream::new(0, caps("video/x-h264, width=640, height=480"))
        .then(caps("video/x-raw, width=640, height=480"));
    let audio = DiscoveredStream::new(1, caps("audio/x-vorbis, rate=44100, channels=2"))
        .then(caps("audio/x-raw, rate=44100, channels=2"));
    bin.play(InputConfig::Streams(vec![video, audio]))?;
    let summary = bin.wait().await.unwrap();

    assert_eq!(summary.linked_count(), 2);
    assert!(matches!(
        summary.streams[0].outcome,
        StreamOutcome::Exposed { level: 1, linked: true, .. }
    ));
    assert!(matches!(
        summary.streams[1].outcome,
        StreamOutcome::Exposed { level: 0, linked: true, .. }
    ));

    let linked = bin.linked_inputs();
    assert_eq!(linked.len(), 2);
    assert_eq!(linked[0].pad, "video_0");
    assert!(linked[0].caps.is_raw());
    assert_eq!(linked[1].pad, "audio_0");
    assert_eq!(linked[1].caps, caps("audio/x-vorbis, rate=44100, channels=2"));
    assert_eq!(bin.provisioned_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_single_stream_last_candidate() -> anyhow::Result<()> {
    let encoder = StubEncoder::builder().with_static("video/x-raw").build();
    let bin = stub_bin(&encoder);
    bin.set_profile(Some(stub_profile()))?;

    let raw = caps("video/x-raw, format=I420");
    bin.play(InputConfig::Streams(vec![
        DiscoveredStream::new(0, caps("video/x-h264")).then(raw.clone()),
    ]))?;
    bin.wait().await.unwrap();

    assert_eq!(bin.last_candidate_caps(), Some(raw));
    assert!(encoder.statics()[0].is_linked());
    Ok(())
}
