use std::path::{Path, PathBuf};

use ffmpeg_next::{Rational, codec};

use crate::{
    error::{Error, Result},
    packet::EncodedPacket,
    timestamp::rescale_duration,
};

/// The container capability a [`ContainerWriter`] drives.
pub trait Muxer {
    /// Whether the format wants codec parameter sets in extradata.
    fn global_header(&self) -> bool;

    /// Adds the video track. Codecs the format cannot carry are a
    /// configuration error.
    fn add_stream(&mut self, parameters: &codec::Parameters, time_base: Rational) -> Result<usize>;

    /// Time base of the track. The format may change it while writing the
    /// header.
    fn stream_time_base(&self) -> Option<Rational>;

    fn write_header(&mut self) -> Result<()>;

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()>;

    fn write_trailer(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Closes and removes whatever was written. Used when the header never
    /// made it out, so the output holds nothing a reader could use.
    fn discard(&mut self) -> Result<()> {
        self.close()
    }

    fn dump_format(&self) {}
}

pub struct FfmpegMuxer {
    inner: ffmpeg_next::format::context::Output,
    path: PathBuf,
    stream_index: Option<usize>,
    closed: bool,
}

impl FfmpegMuxer {
    /// Opens `path` for writing. The container format is guessed from the
    /// extension unless `format` names one.
    pub fn create(path: impl AsRef<Path>, format: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let output = match format {
            Some(format) => ffmpeg_next::format::output_as(path, format),
            None => ffmpeg_next::format::output(path),
        }
        .map_err(|e| Error::resource(format!("cannot open output {}: {}", path.display(), e)))?;

        log::info!(
            "output {} opened as {}",
            path.display(),
            output.format().name()
        );

        Ok(Self {
            inner: output,
            path: path.to_path_buf(),
            stream_index: None,
            closed: false,
        })
    }

    fn has_flag(&self, flag: ffmpeg_next::format::flag::Flags) -> bool {
        self.inner.format().flags().contains(flag)
    }
}

impl Muxer for FfmpegMuxer {
    fn global_header(&self) -> bool {
        self.has_flag(ffmpeg_next::format::flag::Flags::GLOBAL_HEADER)
    }

    fn add_stream(&mut self, parameters: &codec::Parameters, time_base: Rational) -> Result<usize> {
        let id = parameters.id();
        let supported = unsafe {
            ffmpeg_next::ffi::avformat_query_codec(self.inner.format().as_ptr(), id.into(), 0)
        };
        if supported == 0 {
            return Err(Error::configuration(format!(
                "{} cannot carry {:?}",
                self.inner.format().name(),
                id
            )));
        }

        let mut parameters = parameters.clone();
        // Tags are container specific; let the muxer pick its own.
        unsafe {
            (*parameters.as_mut_ptr()).codec_tag = 0;
        }

        let mut stream = self
            .inner
            .add_stream(ffmpeg_next::encoder::find(id))
            .map_err(|e| Error::resource(format!("cannot add stream: {}", e)))?;
        stream.set_parameters(parameters);
        stream.set_time_base(time_base);
        let index = stream.index();
        self.stream_index = Some(index);
        Ok(index)
    }

    fn stream_time_base(&self) -> Option<Rational> {
        self.stream_index
            .and_then(|index| self.inner.stream(index))
            .map(|stream| stream.time_base())
    }

    fn write_header(&mut self) -> Result<()> {
        self.inner
            .write_header()
            .map_err(|e| Error::io(format!("write header to {}: {}", self.path.display(), e)))
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        let index = self
            .stream_index
            .ok_or_else(|| Error::state("no stream to write to"))?;
        let out_time_base = self
            .stream_time_base()
            .ok_or_else(|| Error::state(format!("stream {} not found", index)))?;

        let mut av = packet.to_av();
        av.set_stream(index);
        av.set_position(-1);
        av.rescale_ts(packet.time_base(), out_time_base);
        av.write_interleaved(&mut self.inner)
            .map_err(|e| Error::io(format!("write packet to {}: {}", self.path.display(), e)))
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.inner
            .write_trailer()
            .map_err(|e| Error::io(format!("write trailer to {}: {}", self.path.display(), e)))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed || self.has_flag(ffmpeg_next::format::flag::Flags::NO_FILE) {
            self.closed = true;
            return Ok(());
        }
        self.closed = true;
        let ret = unsafe { ffmpeg_next::ffi::avio_closep(&mut (*self.inner.as_mut_ptr()).pb) };
        if ret < 0 {
            return Err(Error::io(format!(
                "close {}: {}",
                self.path.display(),
                ffmpeg_next::Error::from(ret)
            )));
        }
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.close()?;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(format!("remove {}: {}", self.path.display(), e))),
        }
    }

    fn dump_format(&self) {
        ffmpeg_next::format::context::output::dump(&self.inner, 0, self.path.to_str());
    }
}

/// Owns the output container and enforces its write order:
///
/// ```text
/// add_stream -> write_header -> write_packet* -> write_trailer -> close
/// ```
///
/// Each of header and trailer is written exactly once. Dropping a writer that
/// was not closed finalizes whatever it can (see [`ContainerWriter::abort`]).
pub struct ContainerWriter<M: Muxer = FfmpegMuxer> {
    muxer: M,
    stream_added: bool,
    header_written: bool,
    trailer_written: bool,
    closed: bool,
    dump_format: bool,
    last_dts: Option<i64>,
    packets_written: u64,
    packets_skipped: u64,
}

impl ContainerWriter<FfmpegMuxer> {
    pub fn open(path: impl AsRef<Path>, format: Option<&str>) -> Result<Self> {
        Ok(Self::new(FfmpegMuxer::create(path, format)?))
    }
}

impl<M: Muxer> ContainerWriter<M> {
    pub fn new(muxer: M) -> Self {
        Self {
            muxer,
            stream_added: false,
            header_written: false,
            trailer_written: false,
            closed: false,
            dump_format: false,
            last_dts: None,
            packets_written: 0,
            packets_skipped: 0,
        }
    }

    /// Log the output layout once the header is out.
    pub fn set_dump_format(&mut self, dump_format: bool) {
        self.dump_format = dump_format;
    }

    pub fn muxer(&self) -> &M {
        &self.muxer
    }

    pub fn global_header(&self) -> bool {
        self.muxer.global_header()
    }

    pub fn header_written(&self) -> bool {
        self.header_written
    }

    pub fn trailer_written(&self) -> bool {
        self.trailer_written
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    pub fn packets_skipped(&self) -> u64 {
        self.packets_skipped
    }

    pub fn stream_time_base(&self) -> Option<Rational> {
        self.muxer.stream_time_base()
    }

    pub fn add_stream(&mut self, parameters: &codec::Parameters, time_base: Rational) -> Result<usize> {
        if self.header_written || self.closed {
            return Err(Error::state("stream added after header"));
        }
        if self.stream_added {
            return Err(Error::state("container already has a video track"));
        }
        let index = self.muxer.add_stream(parameters, time_base)?;
        self.stream_added = true;
        Ok(index)
    }

    /// Writes the container header. Only valid once the encoder is open and
    /// its parameters were copied into the stream.
    pub fn write_header(&mut self) -> Result<()> {
        if self.closed || self.trailer_written {
            return Err(Error::state("header written after trailer"));
        }
        if self.header_written {
            return Err(Error::state("header already written"));
        }
        if !self.stream_added {
            return Err(Error::state("header written before any stream was added"));
        }
        self.muxer.write_header()?;
        self.header_written = true;
        log::info!(
            "container header written, stream time base {:?}",
            self.muxer.stream_time_base()
        );
        if self.dump_format {
            self.muxer.dump_format();
        }
        Ok(())
    }

    pub fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        if !self.header_written {
            return Err(Error::state("packet written before header"));
        }
        if self.trailer_written || self.closed {
            return Err(Error::state("packet written after trailer"));
        }
        if packet.is_empty() {
            self.packets_skipped += 1;
            log::debug!("skipping empty packet pts {:?}", packet.pts());
            return Ok(());
        }

        let dts = match (packet.dts(), self.muxer.stream_time_base()) {
            (Some(dts), Some(time_base)) => Some(rescale_duration(dts, packet.time_base(), time_base)),
            (dts, None) => dts,
            (None, _) => None,
        };
        if let (Some(dts), Some(last)) = (dts, self.last_dts) {
            if dts < last {
                return Err(Error::state(format!(
                    "packet dts {} goes back before {}",
                    dts, last
                )));
            }
        }

        self.muxer.write_packet(packet)?;
        if dts.is_some() {
            self.last_dts = dts;
        }
        self.packets_written += 1;
        Ok(())
    }

    /// Finalizes the container index. Counts as done even when it fails; a
    /// second attempt would only corrupt the file further.
    pub fn write_trailer(&mut self) -> Result<()> {
        if !self.header_written {
            return Err(Error::state("trailer written before header"));
        }
        if self.trailer_written || self.closed {
            return Err(Error::state("trailer already written"));
        }
        self.trailer_written = true;
        self.muxer.write_trailer()?;
        log::info!(
            "container trailer written: {} packets, {} empty packets skipped",
            self.packets_written,
            self.packets_skipped
        );
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::state("container already closed"));
        }
        if !self.trailer_written {
            return Err(Error::state("container closed before trailer"));
        }
        self.closed = true;
        self.muxer.close()
    }

    /// Teardown for error and cancellation paths. A file whose header is out
    /// still gets its trailer so it stays readable; a file without a header
    /// is removed.
    pub fn abort(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if !self.header_written {
            if let Err(e) = self.muxer.discard() {
                log::warn!("discard output failed: {}", e);
            }
            return;
        }
        if !self.trailer_written {
            self.trailer_written = true;
            if let Err(e) = self.muxer.write_trailer() {
                log::warn!("write trailer during teardown failed: {}", e);
            }
        }
        if let Err(e) = self.muxer.close() {
            log::warn!("close output during teardown failed: {}", e);
        }
    }
}

impl<M: Muxer> Drop for ContainerWriter<M> {
    fn drop(&mut self) {
        self.abort();
    }
}

#[cfg(test)]
#[path = "output_test.rs"]
mod output_test;
