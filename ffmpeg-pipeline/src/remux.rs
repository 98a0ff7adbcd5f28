//! Stream copy into a fresh container with synthetic timestamps.
//!
//! The source's own timestamps are not trusted: every output packet gets
//! `pts = dts = ts`, where `ts` starts at zero and advances by the packet's
//! duration rescaled into the destination time base.

use std::path::Path;

use ffmpeg_next::Rational;

use crate::{
    error::{Error, Result},
    input::{FfmpegDemuxer, PacketSource},
    output::{ContainerWriter, FfmpegMuxer, Muxer},
    timestamp::rescale_duration,
};

#[derive(Debug, Default)]
pub struct RemuxSummary {
    pub packets_read: u64,
    pub packets_written: u64,
    pub packets_skipped: u64,
    /// Why the copy stopped before end of stream, if it did.
    pub aborted: Option<Error>,
    /// Trailer or close failure after the copy finished.
    pub finalize_error: Option<Error>,
}

impl RemuxSummary {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none() && self.finalize_error.is_none()
    }
}

pub struct Remuxer<S: PacketSource = FfmpegDemuxer, M: Muxer = FfmpegMuxer> {
    source: S,
    writer: ContainerWriter<M>,
}

impl Remuxer<FfmpegDemuxer, FfmpegMuxer> {
    pub fn open(
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        format: Option<&str>,
    ) -> Result<Self> {
        let source = FfmpegDemuxer::open(input)?;
        let writer = ContainerWriter::open(output, format)?;
        Ok(Self::new(source, writer))
    }
}

impl<S: PacketSource, M: Muxer> Remuxer<S, M> {
    pub fn new(source: S, writer: ContainerWriter<M>) -> Self {
        Self { source, writer }
    }

    /// Copies every packet of the source track. A packet that cannot be read
    /// or written ends the copy; that is reported in the summary, not as an
    /// error, and the container is still finalized.
    pub fn run(mut self) -> Result<RemuxSummary> {
        let src_time_base = self.source.time_base();
        self.writer
            .add_stream(self.source.parameters(), src_time_base)?;
        self.writer.write_header()?;
        let dst_time_base = self.writer.stream_time_base().unwrap_or(src_time_base);

        // One frame in source ticks, for packets that carry no duration.
        let fallback = self
            .source
            .frame_rate()
            .map(|rate| rescale_duration(1, Rational::new(rate.denominator(), rate.numerator()), src_time_base))
            .filter(|duration| *duration > 0);

        let mut summary = RemuxSummary::default();
        let mut ts = 0i64;
        loop {
            let packet = match self.source.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => break,
                Err(e) => {
                    log::error!("remux stopped reading after {} packets: {}", summary.packets_read, e);
                    summary.aborted = Some(e);
                    break;
                }
            };
            summary.packets_read += 1;
            if packet.is_empty() {
                summary.packets_skipped += 1;
                continue;
            }

            let src_duration = if packet.duration() > 0 {
                packet.duration()
            } else {
                fallback.unwrap_or(0)
            };
            // Never zero, or consecutive packets would share a timestamp.
            let duration = rescale_duration(src_duration, packet.time_base(), dst_time_base).max(1);

            let retimed = packet.retimed(ts, duration, dst_time_base);
            if let Err(e) = self.writer.write_packet(&retimed) {
                log::error!("remux aborted at packet {} (ts {}): {}", summary.packets_read, ts, e);
                summary.aborted = Some(e);
                break;
            }
            summary.packets_written += 1;
            ts += duration;
        }

        if let Err(e) = self.writer.write_trailer().and_then(|_| self.writer.close()) {
            log::warn!("remux finalize failed: {}", e);
            summary.finalize_error = Some(Error::finalize(e));
        }

        log::info!(
            "remux finished: {} packets read, {} written, {} skipped{}",
            summary.packets_read,
            summary.packets_written,
            summary.packets_skipped,
            if summary.aborted.is_some() { " (aborted)" } else { "" }
        );
        Ok(summary)
    }
}

/// Remuxes `input` into `output`, guessing the output container from its
/// extension unless `format` is given.
pub fn remux_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    format: Option<&str>,
) -> Result<RemuxSummary> {
    Remuxer::open(input, output, format)?.run()
}

#[cfg(test)]
#[path = "remux_test.rs"]
mod remux_test;
