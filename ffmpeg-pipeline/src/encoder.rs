use ffmpeg_next::{Rational, codec, format::Pixel};

use crate::{
    descriptor::StreamDescriptor,
    error::{Error, Result},
    frame::Frame,
    output::{ContainerWriter, Muxer},
    packet::EncodedPacket,
    scaler::ColorSpaceConverter,
    timestamp::{TimestampAllocator, rescale_duration},
};

/// Outcome of one poll of the encoder.
#[derive(Debug)]
pub enum Receive {
    Packet(EncodedPacket),
    /// Nothing more until the encoder gets more input.
    Again,
    /// Flush complete; the encoder will never produce another packet.
    Eof,
}

/// The codec capability an [`EncoderSession`] drives.
pub trait VideoEncoder: Sized {
    /// Opens the codec for `descriptor`. `global_header` asks the codec to put
    /// its parameter sets in extradata rather than in-band.
    fn open(descriptor: &StreamDescriptor, global_header: bool) -> Result<Self>;

    fn pixel_format(&self) -> Pixel;

    fn time_base(&self) -> Rational;

    /// Codec parameters for the output stream. Only meaningful once opened.
    fn parameters(&self) -> codec::Parameters;

    fn send_frame(&mut self, frame: &ffmpeg_next::frame::Video) -> Result<()>;

    fn send_eof(&mut self) -> Result<()>;

    fn receive_packet(&mut self) -> Result<Receive>;
}

pub struct FfmpegEncoder {
    inner: ffmpeg_next::codec::encoder::Video,
    name: String,
    pixel_format: Pixel,
    time_base: Rational,
}

impl VideoEncoder for FfmpegEncoder {
    fn open(descriptor: &StreamDescriptor, global_header: bool) -> Result<Self> {
        let codec = ffmpeg_next::encoder::find_by_name(&descriptor.codec)
            .ok_or_else(|| Error::configuration(format!("codec not found: {}", descriptor.codec)))?;

        let mut context = ffmpeg_next::codec::Context::new_with_codec(codec);
        if global_header {
            context.set_flags(ffmpeg_next::codec::flag::Flags::GLOBAL_HEADER);
        }
        let mut encoder = context.encoder().video().map_err(|e| {
            Error::configuration(format!("{} is not a video encoder: {}", descriptor.codec, e))
        })?;
        encoder.set_width(descriptor.width);
        encoder.set_height(descriptor.height);
        encoder.set_format(descriptor.pixel_format);
        encoder.set_time_base(descriptor.time_base);
        encoder.set_frame_rate(Some(descriptor.frame_rate));
        encoder.set_bit_rate(descriptor.bitrate);
        encoder.set_gop(descriptor.gop_size);
        encoder.set_max_b_frames(descriptor.max_b_frames);

        let encoder = encoder
            .open_with(descriptor.encoder_dictionary())
            .map_err(|e| {
                Error::configuration(format!("failed to open encoder {}: {}", descriptor.codec, e))
            })?;
        let time_base: Rational = unsafe { (*encoder.0.as_ptr()).time_base.into() };

        log::info!(
            "encoder opened: {} {}x{} {:?}, {} fps, time base {}, gop {}, max b-frames {}, options {:?}",
            descriptor.codec,
            descriptor.width,
            descriptor.height,
            descriptor.pixel_format,
            descriptor.frame_rate,
            time_base,
            descriptor.gop_size,
            descriptor.max_b_frames,
            descriptor.encoder_options()
        );

        Ok(Self {
            inner: encoder,
            name: descriptor.codec.clone(),
            pixel_format: descriptor.pixel_format,
            time_base,
        })
    }

    fn pixel_format(&self) -> Pixel {
        self.pixel_format
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn parameters(&self) -> codec::Parameters {
        let mut parameters = codec::Parameters::new();
        unsafe {
            ffmpeg_next::ffi::avcodec_parameters_from_context(
                parameters.as_mut_ptr(),
                self.inner.0.as_ptr(),
            );
        }
        parameters
    }

    fn send_frame(&mut self, frame: &ffmpeg_next::frame::Video) -> Result<()> {
        self.inner
            .send_frame(frame)
            .map_err(|e| Error::encode(format!("{} rejected frame: {}", self.name, e)))
    }

    fn send_eof(&mut self) -> Result<()> {
        self.inner
            .send_eof()
            .map_err(|e| Error::encode(format!("{} rejected end of input: {}", self.name, e)))
    }

    fn receive_packet(&mut self) -> Result<Receive> {
        let mut packet = ffmpeg_next::codec::packet::Packet::empty();
        match self.inner.receive_packet(&mut packet) {
            Ok(()) => Ok(Receive::Packet(EncodedPacket::from_av(&packet, self.time_base))),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(Receive::Again)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(Receive::Eof),
            Err(err) => Err(Error::encode(format!("{} receive packet: {}", self.name, err))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Configured,
    Encoding,
    Draining,
    Closed,
}

/// Polls allowed on top of the frames still buffered inside the encoder
/// before it is considered stuck.
const POLL_SLACK: u64 = 16;

struct Active<E> {
    encoder: E,
    descriptor: StreamDescriptor,
    timestamps: TimestampAllocator,
}

struct Core<E> {
    state: SessionState,
    active: Option<Active<E>>,
    frames_submitted: u64,
    packets_emitted: u64,
    drained_packets: u64,
}

impl<E: VideoEncoder> Core<E> {
    fn new() -> Self {
        Self {
            state: SessionState::Unconfigured,
            active: None,
            frames_submitted: 0,
            packets_emitted: 0,
            drained_packets: 0,
        }
    }

    fn ready_for_frames(&self) -> Result<&Active<E>> {
        match self.state {
            SessionState::Unconfigured => Err(Error::state("submit called before configure")),
            SessionState::Draining | SessionState::Closed => {
                Err(Error::state("submit called after drain"))
            }
            SessionState::Configured | SessionState::Encoding => self
                .active
                .as_ref()
                .ok_or_else(|| Error::state("encoder is not open")),
        }
    }

    fn submit(&mut self, frame: &mut ffmpeg_next::frame::Video) -> Result<Vec<EncodedPacket>> {
        self.ready_for_frames()?;
        let Some(active) = self.active.as_mut() else {
            return Err(Error::state("encoder is not open"));
        };

        let descriptor = &active.descriptor;
        if frame.width() != descriptor.width || frame.height() != descriptor.height {
            return Err(Error::configuration(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.width(),
                frame.height(),
                descriptor.width,
                descriptor.height
            )));
        }
        if frame.format() != active.encoder.pixel_format() {
            return Err(Error::configuration(format!(
                "frame is {:?}, encoder expects {:?}",
                frame.format(),
                active.encoder.pixel_format()
            )));
        }

        let (index, pts) = active.timestamps.allocate();
        frame.set_pts(Some(pts));
        self.state = SessionState::Encoding;

        if let Err(e) = active.encoder.send_frame(frame) {
            log::error!("frame {} rejected, aborting encoder session: {}", index, e);
            self.abort();
            return Err(e);
        }
        self.frames_submitted += 1;
        self.collect(false)
    }

    fn drain(&mut self) -> Result<Vec<EncodedPacket>> {
        match self.state {
            SessionState::Unconfigured => return Err(Error::state("drain called before configure")),
            SessionState::Draining | SessionState::Closed => {
                return Err(Error::state("drain called after session closed"));
            }
            SessionState::Configured | SessionState::Encoding => {}
        }
        self.state = SessionState::Draining;

        let Some(active) = self.active.as_mut() else {
            return Err(Error::state("encoder is not open"));
        };
        if let Err(e) = active.encoder.send_eof() {
            self.abort();
            return Err(e);
        }

        let packets = self.collect(true)?;
        self.drained_packets = packets.len() as u64;
        self.state = SessionState::Closed;
        self.active = None;

        log::info!(
            "encoder drained: {} frames submitted, {} packets emitted, {} from flush",
            self.frames_submitted,
            self.packets_emitted,
            self.drained_packets
        );
        Ok(packets)
    }

    /// Polls until the encoder reports `Again` (or `Eof` when draining).
    fn collect(&mut self, draining: bool) -> Result<Vec<EncodedPacket>> {
        let in_flight = self.frames_submitted.saturating_sub(self.packets_emitted);
        let max_polls = in_flight + POLL_SLACK;
        let mut packets = Vec::new();
        let mut polls = 0;

        loop {
            if polls >= max_polls {
                self.abort();
                return Err(Error::encode(if draining {
                    format!("encoder never signalled end of stream after {} polls", polls)
                } else {
                    format!("encoder never asked for more input after {} polls", polls)
                }));
            }
            polls += 1;

            let Some(active) = self.active.as_mut() else {
                return Err(Error::state("encoder is not open"));
            };
            let received = match active.encoder.receive_packet() {
                Ok(received) => received,
                Err(e) => {
                    self.abort();
                    return Err(e);
                }
            };

            match received {
                Receive::Packet(packet) => {
                    let packet = Self::complete(active, packet);
                    self.packets_emitted += 1;
                    packets.push(packet);
                }
                Receive::Again if draining => continue,
                Receive::Again => break,
                Receive::Eof if draining => break,
                Receive::Eof => {
                    self.abort();
                    return Err(Error::encode("encoder signalled end of stream before drain"));
                }
            }
        }

        Ok(packets)
    }

    /// Fills in a missing duration; pts/dts are forwarded untouched.
    fn complete(active: &Active<E>, packet: EncodedPacket) -> EncodedPacket {
        if packet.duration() > 0 {
            return packet;
        }
        let duration = rescale_duration(
            active.timestamps.frame_duration(),
            active.timestamps.time_base(),
            packet.time_base(),
        );
        packet.with_duration(duration)
    }

    fn abort(&mut self) {
        self.state = SessionState::Closed;
        self.active = None;
    }
}

/// Owns the codec and conversion context for one video track and runs the
/// submit/drain state machine:
///
/// ```text
/// Unconfigured --configure--> Configured --submit--> Encoding --drain--> Draining --> Closed
/// ```
///
/// A submission may yield no packets at all; packets lag their frames by
/// however many frames the codec buffers for lookahead and B-frames.
pub struct EncoderSession<E: VideoEncoder = FfmpegEncoder> {
    core: Core<E>,
    converter: ColorSpaceConverter,
}

impl<E: VideoEncoder> Default for EncoderSession<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: VideoEncoder> EncoderSession<E> {
    pub fn new() -> Self {
        Self {
            core: Core::new(),
            converter: ColorSpaceConverter::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.core.state
    }

    pub fn descriptor(&self) -> Option<&StreamDescriptor> {
        self.core.active.as_ref().map(|a| &a.descriptor)
    }

    pub fn frames_submitted(&self) -> u64 {
        self.core.frames_submitted
    }

    pub fn packets_emitted(&self) -> u64 {
        self.core.packets_emitted
    }

    pub fn drained_packets(&self) -> u64 {
        self.core.drained_packets
    }

    /// Opens the encoder and registers its stream with `writer`. Fails if the
    /// codec is unavailable or the container cannot carry it; either way the
    /// session stays unconfigured and nothing is leaked.
    pub fn configure<M: Muxer>(
        &mut self,
        descriptor: StreamDescriptor,
        writer: &mut ContainerWriter<M>,
    ) -> Result<()> {
        if self.core.state != SessionState::Unconfigured {
            return Err(Error::state("configure called twice"));
        }
        descriptor.validate()?;
        TimestampAllocator::new(descriptor.frame_rate, descriptor.time_base)?;

        let encoder = E::open(&descriptor, writer.global_header())?;
        // Frame pts must be expressed in whatever time base the codec settled on.
        let timestamps = TimestampAllocator::new(descriptor.frame_rate, encoder.time_base())?;
        writer.add_stream(&encoder.parameters(), descriptor.time_base)?;

        self.core.active = Some(Active {
            encoder,
            descriptor,
            timestamps,
        });
        self.core.state = SessionState::Configured;
        Ok(())
    }

    /// Feeds an already planar frame. Its pts is overwritten with the
    /// allocated one.
    pub fn submit(&mut self, frame: &mut ffmpeg_next::frame::Video) -> Result<Vec<EncodedPacket>> {
        let result = self.core.submit(frame);
        if self.core.state == SessionState::Closed {
            self.converter.release();
        }
        result
    }

    /// Converts a packed frame to the encoder's format, then submits it.
    pub fn encode(&mut self, frame: &Frame) -> Result<Vec<EncodedPacket>> {
        let (format, width, height) = {
            let active = self.core.ready_for_frames()?;
            (
                active.encoder.pixel_format(),
                active.descriptor.width,
                active.descriptor.height,
            )
        };
        let planar = self.converter.convert(frame, format, width, height)?;
        let result = self.core.submit(planar);
        if self.core.state == SessionState::Closed {
            self.converter.release();
        }
        result
    }

    /// Signals end of input and collects every packet the encoder still
    /// holds. The session is closed afterwards.
    pub fn drain(&mut self) -> Result<Vec<EncodedPacket>> {
        let result = self.core.drain();
        self.converter.release();
        result
    }

    /// Tears the session down without flushing; buffered packets are lost.
    pub fn abort(&mut self) {
        if self.core.state != SessionState::Closed {
            log::warn!(
                "aborting encoder session in state {:?}, {} frames submitted, {} packets emitted",
                self.core.state,
                self.core.frames_submitted,
                self.core.packets_emitted
            );
        }
        self.core.abort();
        self.converter.release();
    }
}

#[cfg(test)]
#[path = "encoder_test.rs"]
mod encoder_test;
