use ffmpeg_next::{Dictionary, Rational, format::Pixel};

use crate::error::{Error, Result};

/// Everything the encoder and container need to know about the single video
/// track. Bound to an [`EncoderSession`](crate::EncoderSession) at configure
/// time and never changed afterwards.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    /// Target bitrate in bits per second.
    pub bitrate: usize,
    /// Encoder name, e.g. "libx264", "libx265", "mpeg4".
    pub codec: String,
    pub time_base: Rational,
    /// Planar format the encoder consumes; input frames are converted to it.
    pub pixel_format: Pixel,
    pub gop_size: u32,
    pub max_b_frames: usize,
    /// Encoder speed/quality preset, e.g. "ultrafast".
    pub preset: Option<String>,
    pub lossless: bool,
    /// Extra encoder private options, applied after preset/lossless.
    pub options: Vec<(String, String)>,
}

impl Default for StreamDescriptor {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: Rational::new(30, 1),
            bitrate: 120_000_000,
            codec: "libx264".to_string(),
            time_base: Rational::new(1, 30),
            pixel_format: Pixel::YUV420P,
            gop_size: 12,
            max_b_frames: 2,
            preset: Some("ultrafast".to_string()),
            lossless: false,
            options: Vec::new(),
        }
    }
}

impl StreamDescriptor {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::configuration(format!(
                "invalid video size {}x{}",
                self.width, self.height
            )));
        }
        if self.frame_rate.numerator() <= 0 || self.frame_rate.denominator() <= 0 {
            return Err(Error::configuration(format!(
                "invalid frame rate {}/{}",
                self.frame_rate.numerator(),
                self.frame_rate.denominator()
            )));
        }
        if self.time_base.numerator() <= 0 || self.time_base.denominator() <= 0 {
            return Err(Error::configuration(format!(
                "invalid time base {}/{}",
                self.time_base.numerator(),
                self.time_base.denominator()
            )));
        }
        if self.codec.is_empty() {
            return Err(Error::configuration("no codec selected"));
        }
        if self.pixel_format == Pixel::None {
            return Err(Error::configuration("invalid encoder pixel format"));
        }
        Ok(())
    }

    /// Resolves preset/lossless/extra options into the ordered list of
    /// encoder private options handed to the codec at open time.
    pub fn encoder_options(&self) -> Vec<(String, String)> {
        let mut options = Vec::new();
        if let Some(preset) = &self.preset {
            options.push(("preset".to_string(), preset.clone()));
        }
        if self.lossless {
            let (key, value) = lossless_option(&self.codec);
            options.push((key.to_string(), value.to_string()));
        }
        for (key, value) in &self.options {
            options.retain(|(k, _)| k != key);
            options.push((key.clone(), value.clone()));
        }
        options
    }

    pub fn encoder_dictionary(&self) -> Dictionary<'static> {
        let mut dict = Dictionary::new();
        for (key, value) in self.encoder_options() {
            dict.set(&key, &value);
        }
        dict
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn lossless_option(codec: &str) -> (&'static str, &'static str) {
    if codec.contains("x264") || codec.contains("h264") {
        ("qp", "0")
    } else if codec.contains("x265") || codec.contains("hevc") {
        ("x265-params", "lossless=1")
    } else {
        ("lossless", "1")
    }
}
