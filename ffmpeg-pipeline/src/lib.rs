/// Registers FFmpeg components (formats, codecs). Call once at startup before
/// opening encoders or containers.
pub fn init() -> error::Result<()> {
    ffmpeg_next::init().map_err(|e| error::Error::resource(format!("ffmpeg_next init: {}", e)))?;
    ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Warning);
    Ok(())
}

pub mod descriptor;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod input;
pub mod output;
pub mod packet;
pub mod pipeline;
pub mod remux;
pub mod scaler;
pub mod timestamp;

#[cfg(test)]
mod testing;

pub use descriptor::StreamDescriptor;
pub use encoder::{EncoderSession, FfmpegEncoder, Receive, SessionState, VideoEncoder};
pub use error::{Error, Result};
pub use frame::Frame;
pub use input::{FfmpegDemuxer, PacketSource};
pub use output::{ContainerWriter, FfmpegMuxer, Muxer};
pub use packet::EncodedPacket;
pub use pipeline::{EncodePipeline, EncodeSummary};
pub use remux::{RemuxSummary, Remuxer};
pub use scaler::ColorSpaceConverter;
pub use timestamp::TimestampAllocator;
