use ffmpeg_next::Rational;

use super::*;
use crate::testing::{RecordingMuxer, call_kinds, written_packets};

fn packet(pts: i64, dts: i64) -> EncodedPacket {
    EncodedPacket::new(vec![0u8; 16], Rational::new(1, 30))
        .with_timestamps(Some(pts), Some(dts))
        .with_duration(1)
}

fn writer_with_stream() -> anyhow::Result<ContainerWriter<RecordingMuxer>> {
    let mut writer = ContainerWriter::new(RecordingMuxer::new());
    writer.add_stream(&codec::Parameters::new(), Rational::new(1, 30))?;
    Ok(writer)
}

#[test]
fn test_write_order() -> anyhow::Result<()> {
    let mut writer = writer_with_stream()?;
    let log = writer.muxer().log();
    writer.write_header()?;
    writer.write_packet(&packet(0, -1))?;
    writer.write_packet(&packet(2, 0))?;
    writer.write_packet(&packet(1, 1))?;
    writer.write_trailer()?;
    writer.close()?;

    assert_eq!(
        call_kinds(&log),
        vec!["add_stream", "header", "packet", "packet", "packet", "trailer", "close"]
    );
    assert_eq!(
        written_packets(&log),
        vec![
            (Some(0), Some(-1), 1),
            (Some(2), Some(0), 1),
            (Some(1), Some(1), 1)
        ]
    );
    assert_eq!(writer.packets_written(), 3);
    assert!(writer.is_closed());
    Ok(())
}

#[test]
fn test_packet_before_header() -> anyhow::Result<()> {
    let mut writer = writer_with_stream()?;
    let err = writer.write_packet(&packet(0, 0)).unwrap_err();
    assert!(err.is_state());
    assert_eq!(writer.packets_written(), 0);
    Ok(())
}

#[test]
fn test_header_requires_stream() {
    let mut writer = ContainerWriter::new(RecordingMuxer::new());
    assert!(writer.write_header().unwrap_err().is_state());
    assert!(!writer.header_written());
}

#[test]
fn test_header_and_trailer_exactly_once() -> anyhow::Result<()> {
    let mut writer = writer_with_stream()?;
    let log = writer.muxer().log();
    writer.write_header()?;
    assert!(writer.write_header().unwrap_err().is_state());
    writer.write_trailer()?;
    assert!(writer.write_trailer().unwrap_err().is_state());
    assert!(writer.write_packet(&packet(0, 0)).unwrap_err().is_state());
    writer.close()?;
    assert!(writer.close().unwrap_err().is_state());

    assert_eq!(call_kinds(&log), vec!["add_stream", "header", "trailer", "close"]);
    Ok(())
}

#[test]
fn test_trailer_before_header() -> anyhow::Result<()> {
    let mut writer = writer_with_stream()?;
    assert!(writer.write_trailer().unwrap_err().is_state());
    assert!(writer.close().unwrap_err().is_state());
    Ok(())
}

#[test]
fn test_single_track_only() -> anyhow::Result<()> {
    let mut writer = writer_with_stream()?;
    let err = writer
        .add_stream(&codec::Parameters::new(), Rational::new(1, 30))
        .unwrap_err();
    assert!(err.is_state());

    writer.write_header()?;
    let mut other = ContainerWriter::new(RecordingMuxer::new());
    other.add_stream(&codec::Parameters::new(), Rational::new(1, 30))?;
    other.write_header()?;
    assert!(
        other
            .add_stream(&codec::Parameters::new(), Rational::new(1, 30))
            .unwrap_err()
            .is_state()
    );
    Ok(())
}

#[test]
fn test_empty_packets_skipped() -> anyhow::Result<()> {
    let mut writer = writer_with_stream()?;
    let log = writer.muxer().log();
    writer.write_header()?;
    writer.write_packet(&packet(0, 0))?;
    writer.write_packet(&EncodedPacket::new(Vec::new(), Rational::new(1, 30)))?;
    writer.write_packet(&packet(1, 1))?;

    assert_eq!(writer.packets_written(), 2);
    assert_eq!(writer.packets_skipped(), 1);
    assert_eq!(written_packets(&log).len(), 2);
    Ok(())
}

#[test]
fn test_decreasing_dts_rejected() -> anyhow::Result<()> {
    let mut writer = writer_with_stream()?;
    writer.write_header()?;
    writer.write_packet(&packet(3, 2))?;
    let err = writer.write_packet(&packet(4, 1)).unwrap_err();
    assert!(err.is_state());

    // Compared after rescaling into the stream time base.
    let finer = EncodedPacket::new(vec![1u8], Rational::new(1, 90000))
        .with_timestamps(Some(9000), Some(6000));
    writer.write_packet(&finer)?;
    Ok(())
}

#[test]
fn test_write_failure_is_io_error() -> anyhow::Result<()> {
    let mut muxer = RecordingMuxer::new();
    muxer.fail_packet_at = Some(2);
    let mut writer = ContainerWriter::new(muxer);
    writer.add_stream(&codec::Parameters::new(), Rational::new(1, 30))?;
    writer.write_header()?;
    writer.write_packet(&packet(0, 0))?;
    assert!(writer.write_packet(&packet(1, 1)).unwrap_err().is_io());
    assert_eq!(writer.packets_written(), 1);
    Ok(())
}

#[test]
fn test_failed_trailer_counts_as_written() -> anyhow::Result<()> {
    let mut muxer = RecordingMuxer::new();
    muxer.fail_trailer = true;
    let mut writer = ContainerWriter::new(muxer);
    let log = writer.muxer().log();
    writer.add_stream(&codec::Parameters::new(), Rational::new(1, 30))?;
    writer.write_header()?;

    assert!(writer.write_trailer().unwrap_err().is_io());
    assert!(writer.trailer_written());
    assert!(writer.write_trailer().unwrap_err().is_state());
    writer.close()?;
    assert_eq!(call_kinds(&log), vec!["add_stream", "header", "trailer", "close"]);
    Ok(())
}

#[test]
fn test_drop_after_header_finalizes() -> anyhow::Result<()> {
    let mut writer = writer_with_stream()?;
    let log = writer.muxer().log();
    writer.write_header()?;
    writer.write_packet(&packet(0, 0))?;
    drop(writer);

    assert_eq!(
        call_kinds(&log),
        vec!["add_stream", "header", "packet", "trailer", "close"]
    );
    Ok(())
}

#[test]
fn test_drop_before_header_discards() -> anyhow::Result<()> {
    let writer = writer_with_stream()?;
    let log = writer.muxer().log();
    drop(writer);
    assert_eq!(call_kinds(&log), vec!["add_stream", "discard"]);
    Ok(())
}

#[test]
fn test_drop_after_close_is_silent() -> anyhow::Result<()> {
    let mut writer = writer_with_stream()?;
    let log = writer.muxer().log();
    writer.write_header()?;
    writer.write_trailer()?;
    writer.close()?;
    drop(writer);
    assert_eq!(call_kinds(&log), vec!["add_stream", "header", "trailer", "close"]);
    Ok(())
}

#[test]
fn test_header_time_base_used_for_ordering() -> anyhow::Result<()> {
    let mut muxer = RecordingMuxer::new();
    muxer.header_time_base = Some(Rational::new(1, 1000));
    let mut writer = ContainerWriter::new(muxer);
    writer.add_stream(&codec::Parameters::new(), Rational::new(1, 30))?;
    writer.write_header()?;
    assert_eq!(writer.stream_time_base(), Some(Rational::new(1, 1000)));

    writer.write_packet(&packet(1, 1))?;
    writer.write_packet(&packet(2, 2))?;
    assert!(writer.write_packet(&packet(3, 0)).unwrap_err().is_state());
    Ok(())
}

#[test]
fn test_open_unknown_format() {
    crate::init().ok();
    let path = std::env::temp_dir().join(format!("frame-encoder-{}.nope", std::process::id()));
    let err = ContainerWriter::open(&path, None).err().expect("format should not be guessed");
    assert!(err.is_resource());
}
