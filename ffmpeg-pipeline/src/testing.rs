//! Scripted in-memory capabilities for driving the pipeline without a real
//! codec or container.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use ffmpeg_next::{Rational, codec, format::Pixel};

use crate::{
    descriptor::StreamDescriptor,
    encoder::{Receive, VideoEncoder},
    error::{Error, Result},
    input::PacketSource,
    output::Muxer,
    packet::EncodedPacket,
    timestamp::TimestampAllocator,
};

pub const FAKE_CODEC: &str = "fake";

pub fn fake_descriptor(width: u32, height: u32, max_b_frames: usize) -> StreamDescriptor {
    StreamDescriptor {
        width,
        height,
        frame_rate: Rational::new(30, 1),
        codec: FAKE_CODEC.to_string(),
        time_base: Rational::new(1, 30),
        pixel_format: Pixel::YUV420P,
        max_b_frames,
        preset: None,
        ..Default::default()
    }
}

pub fn planar_frame(width: u32, height: u32) -> ffmpeg_next::frame::Video {
    ffmpeg_next::frame::Video::new(Pixel::YUV420P, width, height)
}

/// Reordering encoder: the first frame comes out alone as a keyframe, then
/// frames are buffered in groups of `max_b_frames + 1` and released anchor
/// first, like an IPBB stream. Packet durations are left at zero.
///
/// Behaviour knobs come from the descriptor's extra options:
/// `fake-reject-at=N` fails the Nth frame, `fake-endless-drain=1` keeps
/// producing packets after end of input, `fake-empty-flush=1` returns empty
/// payloads from the flush.
pub struct FakeEncoder {
    time_base: Rational,
    pixel_format: Pixel,
    group: usize,
    delay: i64,
    frame_duration: i64,
    pending: Vec<i64>,
    ready: VecDeque<EncodedPacket>,
    decode_index: i64,
    received: usize,
    reject_at: Option<usize>,
    endless_drain: bool,
    empty_flush: bool,
    eof_sent: bool,
}

impl FakeEncoder {
    fn release(&mut self, pts: i64, empty: bool) {
        let dts = (self.decode_index - self.delay) * self.frame_duration;
        let data = if empty {
            Vec::new()
        } else {
            format!("frame-{}", pts).into_bytes()
        };
        let packet = EncodedPacket::new(data, self.time_base)
            .with_timestamps(Some(pts), Some(dts))
            .with_key(self.decode_index == 0);
        self.decode_index += 1;
        self.ready.push_back(packet);
    }

    fn release_group(&mut self) {
        let mut group = std::mem::take(&mut self.pending);
        if let Some(anchor) = group.pop() {
            self.release(anchor, false);
        }
        for pts in group {
            self.release(pts, false);
        }
    }
}

impl VideoEncoder for FakeEncoder {
    fn open(descriptor: &StreamDescriptor, _global_header: bool) -> Result<Self> {
        if descriptor.codec != FAKE_CODEC {
            return Err(Error::configuration(format!("codec not found: {}", descriptor.codec)));
        }
        let timestamps = TimestampAllocator::new(descriptor.frame_rate, descriptor.time_base)?;
        Ok(Self {
            time_base: descriptor.time_base,
            pixel_format: descriptor.pixel_format,
            group: descriptor.max_b_frames + 1,
            delay: descriptor.max_b_frames.min(1) as i64,
            frame_duration: timestamps.frame_duration(),
            pending: Vec::new(),
            ready: VecDeque::new(),
            decode_index: 0,
            received: 0,
            reject_at: descriptor.option("fake-reject-at").and_then(|v| v.parse().ok()),
            endless_drain: descriptor.option("fake-endless-drain").is_some(),
            empty_flush: descriptor.option("fake-empty-flush").is_some(),
            eof_sent: false,
        })
    }

    fn pixel_format(&self) -> Pixel {
        self.pixel_format
    }

    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn parameters(&self) -> codec::Parameters {
        codec::Parameters::new()
    }

    fn send_frame(&mut self, frame: &ffmpeg_next::frame::Video) -> Result<()> {
        if self.eof_sent {
            return Err(Error::encode("frame sent after end of input"));
        }
        self.received += 1;
        if self.reject_at == Some(self.received) {
            return Err(Error::encode(format!("frame {} rejected", self.received)));
        }
        let pts = frame.pts().unwrap_or_default();
        if self.decode_index == 0 && self.ready.is_empty() && self.pending.is_empty() {
            self.release(pts, false);
            return Ok(());
        }
        self.pending.push(pts);
        if self.pending.len() == self.group {
            self.release_group();
        }
        Ok(())
    }

    fn send_eof(&mut self) -> Result<()> {
        self.eof_sent = true;
        let pending = std::mem::take(&mut self.pending);
        for pts in pending {
            self.release(pts, self.empty_flush);
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Receive> {
        if let Some(packet) = self.ready.pop_front() {
            return Ok(Receive::Packet(packet));
        }
        if !self.eof_sent {
            return Ok(Receive::Again);
        }
        if self.endless_drain {
            let pts = self.decode_index * self.frame_duration;
            self.release(pts, false);
            return Ok(self.ready.pop_front().map_or(Receive::Again, Receive::Packet));
        }
        Ok(Receive::Eof)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MuxCall {
    AddStream(Rational),
    WriteHeader,
    WritePacket {
        pts: Option<i64>,
        dts: Option<i64>,
        duration: i64,
        size: usize,
        time_base: Rational,
    },
    WriteTrailer,
    Close,
    Discard,
}

pub type CallLog = Rc<RefCell<Vec<MuxCall>>>;

/// Records every call in a log that outlives the muxer.
#[derive(Default)]
pub struct RecordingMuxer {
    calls: CallLog,
    pub global_header: bool,
    pub reject_codec: bool,
    pub fail_header: bool,
    /// 1-based index of the `write_packet` call that fails.
    pub fail_packet_at: Option<usize>,
    pub fail_trailer: bool,
    /// Time base the "format" switches the stream to when the header is
    /// written.
    pub header_time_base: Option<Rational>,
    time_base: Option<Rational>,
    packets: usize,
}

impl RecordingMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> CallLog {
        self.calls.clone()
    }

    fn record(&self, call: MuxCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl Muxer for RecordingMuxer {
    fn global_header(&self) -> bool {
        self.global_header
    }

    fn add_stream(&mut self, _parameters: &codec::Parameters, time_base: Rational) -> Result<usize> {
        if self.reject_codec {
            return Err(Error::configuration("container cannot carry codec"));
        }
        self.time_base = Some(time_base);
        self.record(MuxCall::AddStream(time_base));
        Ok(0)
    }

    fn stream_time_base(&self) -> Option<Rational> {
        self.time_base
    }

    fn write_header(&mut self) -> Result<()> {
        if self.fail_header {
            return Err(Error::io("header rejected"));
        }
        if let Some(time_base) = self.header_time_base {
            self.time_base = Some(time_base);
        }
        self.record(MuxCall::WriteHeader);
        Ok(())
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        self.packets += 1;
        if self.fail_packet_at == Some(self.packets) {
            return Err(Error::io(format!("packet {} not written", self.packets)));
        }
        self.record(MuxCall::WritePacket {
            pts: packet.pts(),
            dts: packet.dts(),
            duration: packet.duration(),
            size: packet.len(),
            time_base: packet.time_base(),
        });
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.record(MuxCall::WriteTrailer);
        if self.fail_trailer {
            return Err(Error::io("trailer rejected"));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.record(MuxCall::Close);
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.record(MuxCall::Discard);
        Ok(())
    }
}

/// Calls in `log` with packet writes collapsed to their kind.
pub fn call_kinds(log: &CallLog) -> Vec<&'static str> {
    log.borrow()
        .iter()
        .map(|call| match call {
            MuxCall::AddStream(_) => "add_stream",
            MuxCall::WriteHeader => "header",
            MuxCall::WritePacket { .. } => "packet",
            MuxCall::WriteTrailer => "trailer",
            MuxCall::Close => "close",
            MuxCall::Discard => "discard",
        })
        .collect()
}

/// `(pts, dts, duration)` of every packet written.
pub fn written_packets(log: &CallLog) -> Vec<(Option<i64>, Option<i64>, i64)> {
    log.borrow()
        .iter()
        .filter_map(|call| match call {
            MuxCall::WritePacket {
                pts, dts, duration, ..
            } => Some((*pts, *dts, *duration)),
            _ => None,
        })
        .collect()
}

pub struct VecSource {
    parameters: codec::Parameters,
    time_base: Rational,
    frame_rate: Option<Rational>,
    packets: VecDeque<EncodedPacket>,
    /// 1-based index of the read that fails.
    pub fail_at: Option<usize>,
    reads: usize,
}

impl VecSource {
    pub fn new(time_base: Rational, frame_rate: Option<Rational>, packets: Vec<EncodedPacket>) -> Self {
        Self {
            parameters: codec::Parameters::new(),
            time_base,
            frame_rate,
            packets: packets.into(),
            fail_at: None,
            reads: 0,
        }
    }
}

impl PacketSource for VecSource {
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
        self.reads += 1;
        if self.fail_at == Some(self.reads) {
            return Err(Error::io(format!("read {} failed", self.reads)));
        }
        Ok(self.packets.pop_front())
    }
}
