use std::path::{Path, PathBuf};

use ffmpeg_next::{Rational, codec, media};

use crate::{
    error::{Error, Result},
    packet::EncodedPacket,
};

/// Source of already-encoded packets for a single video track.
pub trait PacketSource {
    fn parameters(&self) -> &codec::Parameters;

    fn time_base(&self) -> Rational;

    /// Average frame rate, when the source knows it.
    fn frame_rate(&self) -> Option<Rational>;

    /// Next packet of the track, `None` at end of stream.
    fn read_packet(&mut self) -> Result<Option<EncodedPacket>>;
}

/// Reads the best video stream of a container without decoding it.
pub struct FfmpegDemuxer {
    inner: ffmpeg_next::format::context::Input,
    path: PathBuf,
    stream_index: usize,
    parameters: codec::Parameters,
    time_base: Rational,
    frame_rate: Option<Rational>,
}

impl FfmpegDemuxer {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = ffmpeg_next::format::input(path)
            .map_err(|e| Error::resource(format!("cannot open input {}: {}", path.display(), e)))?;

        let stream = input
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| Error::configuration(format!("{} has no video stream", path.display())))?;
        let stream_index = stream.index();
        let parameters = stream.parameters();
        let time_base = stream.time_base();
        let avg = stream.avg_frame_rate();
        let frame_rate = (avg.numerator() > 0 && avg.denominator() > 0).then_some(avg);

        log::info!(
            "input {} opened: stream {} {:?}, time base {}, frame rate {:?}",
            path.display(),
            stream_index,
            parameters.id(),
            time_base,
            frame_rate
        );

        Ok(Self {
            inner: input,
            path: path.to_path_buf(),
            stream_index,
            parameters,
            time_base,
            frame_rate,
        })
    }
}

impl PacketSource for FfmpegDemuxer {
    fn parameters(&self) -> &codec::Parameters {
        &self.parameters
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn frame_rate(&self) -> Option<Rational> {
        self.frame_rate
    }

    fn read_packet(&mut self) -> Result<Option<EncodedPacket>> {
        loop {
            let mut packet = ffmpeg_next::codec::packet::Packet::empty();
            match packet.read(&mut self.inner) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    return Ok(Some(EncodedPacket::from_av(&packet, self.time_base)));
                }
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(e) => {
                    return Err(Error::io(format!(
                        "read packet from {}: {}",
                        self.path.display(),
                        e
                    )));
                }
            }
        }
    }
}
