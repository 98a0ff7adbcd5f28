use bytes::Bytes;
use ffmpeg_next::Rational;
use ffmpeg_next::codec::packet::{Flags, Packet};

/// Compressed payload plus the timestamps the encoder (or the source
/// container) reported for it. Timestamps are in `time_base` ticks.
#[derive(Clone, Debug)]
pub struct EncodedPacket {
    data: Bytes,
    pts: Option<i64>,
    dts: Option<i64>,
    duration: i64,
    is_key: bool,
    stream_index: usize,
    time_base: Rational,
}

impl EncodedPacket {
    pub fn new(data: impl Into<Bytes>, time_base: Rational) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            duration: 0,
            is_key: false,
            stream_index: 0,
            time_base,
        }
    }

    pub fn with_timestamps(mut self, pts: Option<i64>, dts: Option<i64>) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_key(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    pub fn with_stream_index(mut self, stream_index: usize) -> Self {
        self.stream_index = stream_index;
        self
    }

    /// Same payload, fresh timestamps in a new time base.
    pub fn retimed(&self, ts: i64, duration: i64, time_base: Rational) -> Self {
        Self {
            data: self.data.clone(),
            pts: Some(ts),
            dts: Some(ts),
            duration,
            is_key: self.is_key,
            stream_index: self.stream_index,
            time_base,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    pub fn dts(&self) -> Option<i64> {
        self.dts
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn from_av(packet: &Packet, time_base: Rational) -> Self {
        Self {
            data: packet
                .data()
                .map(Bytes::copy_from_slice)
                .unwrap_or_default(),
            pts: packet.pts(),
            dts: packet.dts(),
            duration: packet.duration(),
            is_key: packet.is_key(),
            stream_index: packet.stream(),
            time_base,
        }
    }

    pub fn to_av(&self) -> Packet {
        let mut packet = Packet::copy(&self.data);
        packet.set_pts(self.pts);
        packet.set_dts(self.dts);
        packet.set_duration(self.duration);
        packet.set_stream(self.stream_index);
        if self.is_key {
            packet.set_flags(Flags::KEY);
        }
        packet
    }
}
