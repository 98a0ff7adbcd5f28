use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ffmpeg_next::{format::Pixel, Rational};
use ffmpeg_pipeline::StreamDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ratio {
    pub num: i32,
    pub den: i32,
}

impl Ratio {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }
}

impl From<Ratio> for Rational {
    fn from(ratio: Ratio) -> Self {
        Rational::new(ratio.num, ratio.den)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    pub output: PathBuf,
    /// Container format name; guessed from `output` when unset.
    pub format: Option<String>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Ratio,
    pub time_base: Ratio,
    pub bitrate: usize,
    pub codec: String,
    pub pixel_format: String,
    pub gop_size: u32,
    pub max_b_frames: usize,
    pub preset: Option<String>,
    pub lossless: bool,
    /// Extra encoder private options.
    pub options: BTreeMap<String, String>,
    /// Number of test pattern frames to encode.
    pub frames: u64,
    pub remux_output: Option<PathBuf>,
    pub remux_format: Option<String>,
    pub dump_format: bool,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        let descriptor = StreamDescriptor::default();
        Self {
            output: PathBuf::from("output.mp4"),
            format: None,
            width: descriptor.width,
            height: descriptor.height,
            frame_rate: Ratio::new(
                descriptor.frame_rate.numerator(),
                descriptor.frame_rate.denominator(),
            ),
            time_base: Ratio::new(
                descriptor.time_base.numerator(),
                descriptor.time_base.denominator(),
            ),
            bitrate: descriptor.bitrate,
            codec: descriptor.codec,
            pixel_format: "yuv420p".to_string(),
            gop_size: descriptor.gop_size,
            max_b_frames: descriptor.max_b_frames,
            preset: descriptor.preset,
            lossless: descriptor.lossless,
            options: BTreeMap::new(),
            frames: 300,
            remux_output: None,
            remux_format: None,
            dump_format: false,
        }
    }
}

impl EncodeConfig {
    /// Reads a JSON config; missing fields keep their defaults. No path means
    /// all defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_descriptor(&self) -> anyhow::Result<StreamDescriptor> {
        let pixel_format: Pixel = self
            .pixel_format
            .parse()
            .map_err(|_| anyhow::anyhow!("unknown pixel format {:?}", self.pixel_format))?;

        let descriptor = StreamDescriptor {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate.into(),
            bitrate: self.bitrate,
            codec: self.codec.clone(),
            time_base: self.time_base.into(),
            pixel_format,
            gop_size: self.gop_size,
            max_b_frames: self.max_b_frames,
            preset: self.preset.clone(),
            lossless: self.lossless,
            options: self
                .options
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}
