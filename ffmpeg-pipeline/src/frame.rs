use std::fmt::{Display, Formatter};

use bytes::Bytes;
use ffmpeg_next::format::Pixel;

/// Packed-pixel input frame as supplied by the caller. Rows are tightly
/// packed: the stride is `width * bytes_per_pixel(format)`.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Bytes,
    format: Pixel,
    width: u32,
    height: u32,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>, format: Pixel, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            format,
            width,
            height,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn format(&self) -> Pixel {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Minimum buffer length for the declared geometry, None for formats
    /// that are not packed single-plane layouts.
    pub fn required_len(&self) -> Option<usize> {
        bytes_per_pixel(self.format)
            .map(|bpp| self.width as usize * self.height as usize * bpp)
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "Frame data_len: {}, width: {}, height: {}, format: {:?}",
            self.data.len(),
            self.width,
            self.height,
            self.format
        )
    }
}

/// Bytes per pixel of the packed source formats the converter accepts.
pub fn bytes_per_pixel(format: Pixel) -> Option<usize> {
    match format {
        Pixel::GRAY8 => Some(1),
        Pixel::RGB24 | Pixel::BGR24 => Some(3),
        Pixel::RGBA | Pixel::BGRA | Pixel::ARGB | Pixel::ABGR => Some(4),
        _ => None,
    }
}
