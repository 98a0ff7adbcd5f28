use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::Context;
use ffmpeg_next::software::scaling::flag::Flags;

use crate::error::{Error, Result};
use crate::frame::{Frame, bytes_per_pixel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ConversionKey {
    source: Pixel,
    width: u32,
    height: u32,
    target: Pixel,
}

struct Scaler {
    key: ConversionKey,
    context: Context,
    source: ffmpeg_next::frame::Video,
    output: ffmpeg_next::frame::Video,
}

impl Scaler {
    fn new(key: ConversionKey) -> Result<Self> {
        let context = Context::get(
            key.source,
            key.width,
            key.height,
            key.target,
            key.width,
            key.height,
            Flags::BICUBIC,
        )
        .map_err(|e| {
            Error::resource(format!(
                "cannot create conversion context {:?} -> {:?} ({}x{}): {}",
                key.source, key.target, key.width, key.height, e
            ))
        })?;

        Ok(Self {
            key,
            context,
            source: ffmpeg_next::frame::Video::new(key.source, key.width, key.height),
            output: ffmpeg_next::frame::Video::new(key.target, key.width, key.height),
        })
    }

    fn load(&mut self, data: &[u8], bpp: usize) {
        let row = self.key.width as usize * bpp;
        let stride = self.source.stride(0);
        let plane = self.source.data_mut(0);
        for (y, src) in data
            .chunks_exact(row)
            .take(self.key.height as usize)
            .enumerate()
        {
            let offset = y * stride;
            plane[offset..offset + row].copy_from_slice(src);
        }
    }

    fn run(&mut self) -> Result<()> {
        // The encoder may still reference the previous picture's buffers.
        let ret = unsafe { ffmpeg_next::ffi::av_frame_make_writable(self.output.as_mut_ptr()) };
        if ret < 0 {
            return Err(Error::resource(format!(
                "cannot allocate planar frame: {}",
                ffmpeg_next::Error::from(ret)
            )));
        }
        self.context
            .run(&self.source, &mut self.output)
            .map_err(|e| Error::resource(format!("color conversion failed: {}", e)))
    }
}

unsafe impl Send for Scaler {}

/// Packed to planar conversion. The conversion context is created on first
/// use and then fixed: a frame with different geometry or format is a
/// configuration error, not a reason to rebuild it.
#[derive(Default)]
pub struct ColorSpaceConverter {
    scaler: Option<Scaler>,
}

impl ColorSpaceConverter {
    pub fn new() -> Self {
        Self { scaler: None }
    }

    /// Converts `frame` into `target` at `width`x`height`. The returned
    /// buffer belongs to the converter and is overwritten by the next call.
    pub fn convert(
        &mut self,
        frame: &Frame,
        target: Pixel,
        width: u32,
        height: u32,
    ) -> Result<&mut ffmpeg_next::frame::Video> {
        if frame.width() != width || frame.height() != height {
            return Err(Error::configuration(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.width(),
                frame.height(),
                width,
                height
            )));
        }
        let bpp = bytes_per_pixel(frame.format()).ok_or_else(|| {
            Error::configuration(format!("unsupported source format {:?}", frame.format()))
        })?;
        let required = width as usize * height as usize * bpp;
        if frame.data().len() < required {
            return Err(Error::configuration(format!(
                "frame buffer holds {} bytes, {}x{} {:?} needs {}",
                frame.data().len(),
                width,
                height,
                frame.format(),
                required
            )));
        }

        let key = ConversionKey {
            source: frame.format(),
            width,
            height,
            target,
        };
        let scaler = match self.scaler.take() {
            Some(scaler) if scaler.key != key => {
                let err = Error::configuration(format!(
                    "conversion context is fixed to {:?}, got {:?}",
                    scaler.key, key
                ));
                self.scaler = Some(scaler);
                return Err(err);
            }
            Some(scaler) => scaler,
            None => {
                log::debug!(
                    "creating conversion context {:?} -> {:?} ({}x{})",
                    key.source,
                    key.target,
                    width,
                    height
                );
                Scaler::new(key)?
            }
        };
        let scaler = self.scaler.insert(scaler);

        scaler.load(frame.data(), bpp);
        scaler.run()?;
        Ok(&mut scaler.output)
    }

    pub fn is_initialized(&self) -> bool {
        self.scaler.is_some()
    }

    /// Frees the conversion context and its buffers.
    pub fn release(&mut self) {
        self.scaler = None;
    }
}
