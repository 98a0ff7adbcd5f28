use std::path::Path;

use crate::{
    descriptor::StreamDescriptor,
    encoder::{EncoderSession, FfmpegEncoder, SessionState, VideoEncoder},
    error::{Error, Result},
    frame::Frame,
    output::{ContainerWriter, FfmpegMuxer, Muxer},
    packet::EncodedPacket,
};

#[derive(Debug, Default)]
pub struct EncodeSummary {
    pub frames_submitted: u64,
    pub packets_written: u64,
    /// Packets from the final flush that reached the container. Empty ones
    /// are counted in `skipped_packets` instead.
    pub drained_packets: u64,
    pub skipped_packets: u64,
    /// Trailer or close failed after every packet was written. The encode
    /// itself completed.
    pub finalize_error: Option<Error>,
}

/// Frame-in, file-out encode of one video track.
///
/// Creating the pipeline configures the encoder and writes the container
/// header; [`finish`](Self::finish) drains the encoder, writes the remaining
/// packets, the trailer, and closes the file. Any other exit (an error or a
/// plain drop) tears down the encoder and finalizes what was written.
pub struct EncodePipeline<E: VideoEncoder = FfmpegEncoder, M: Muxer = FfmpegMuxer> {
    session: EncoderSession<E>,
    writer: ContainerWriter<M>,
    finished: bool,
}

impl EncodePipeline<FfmpegEncoder, FfmpegMuxer> {
    pub fn create(
        path: impl AsRef<Path>,
        format: Option<&str>,
        descriptor: StreamDescriptor,
    ) -> Result<Self> {
        Self::with_writer(ContainerWriter::open(path, format)?, descriptor)
    }
}

impl<E: VideoEncoder, M: Muxer> EncodePipeline<E, M> {
    pub fn with_writer(mut writer: ContainerWriter<M>, descriptor: StreamDescriptor) -> Result<Self> {
        let mut session = EncoderSession::new();
        session.configure(descriptor, &mut writer)?;
        writer.write_header()?;
        Ok(Self {
            session,
            writer,
            finished: false,
        })
    }

    pub fn session(&self) -> &EncoderSession<E> {
        &self.session
    }

    pub fn writer(&self) -> &ContainerWriter<M> {
        &self.writer
    }

    /// Encodes one packed frame and writes whatever packets it released.
    /// Returns the number of packets written; empty ones are skipped and
    /// not counted.
    pub fn push(&mut self, frame: &Frame) -> Result<usize> {
        self.check_open()?;
        let packets = self.session.encode(frame);
        self.write_all(packets)
    }

    /// Same as [`push`](Self::push) for a frame already in the encoder's
    /// pixel format.
    pub fn push_planar(&mut self, frame: &mut ffmpeg_next::frame::Video) -> Result<usize> {
        self.check_open()?;
        let packets = self.session.submit(frame);
        self.write_all(packets)
    }

    pub fn finish(mut self) -> Result<EncodeSummary> {
        self.check_open()?;
        let drained = self.session.drain();
        let drained_packets = self.write_all(drained)? as u64;
        self.finished = true;

        let finalize_error = self
            .writer
            .write_trailer()
            .and_then(|_| self.writer.close())
            .err()
            .map(|e| {
                log::warn!("encode completed but the container was not finalized: {}", e);
                Error::finalize(e)
            });

        Ok(EncodeSummary {
            frames_submitted: self.session.frames_submitted(),
            packets_written: self.writer.packets_written(),
            drained_packets,
            skipped_packets: self.writer.packets_skipped(),
            finalize_error,
        })
    }

    /// Drops buffered packets and finalizes the output as far as it got.
    pub fn abort(mut self) {
        self.teardown();
    }

    fn check_open(&self) -> Result<()> {
        if self.finished {
            return Err(Error::state("pipeline already finished"));
        }
        Ok(())
    }

    fn write_all(&mut self, packets: Result<Vec<EncodedPacket>>) -> Result<usize> {
        let packets = match packets {
            Ok(packets) => packets,
            Err(e) => {
                // A bad frame leaves the session usable; anything that closed
                // it ends the pipeline too.
                if self.session.state() == SessionState::Closed {
                    self.teardown();
                }
                return Err(e);
            }
        };
        let before = self.writer.packets_written();
        for packet in &packets {
            if let Err(e) = self.writer.write_packet(packet) {
                log::error!("write packet failed, tearing down: {}", e);
                self.teardown();
                return Err(e);
            }
        }
        Ok((self.writer.packets_written() - before) as usize)
    }

    fn teardown(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.session.abort();
        self.writer.abort();
    }
}

impl<E: VideoEncoder, M: Muxer> Drop for EncodePipeline<E, M> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
