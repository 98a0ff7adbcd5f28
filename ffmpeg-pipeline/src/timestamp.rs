//! Input presentation timestamps and duration rescaling.
//!
//! Timestamps derive from the frame index alone, never from wall-clock time.
//! Once the encoder hands a packet back, its pts/dts are authoritative and are
//! never recomputed here.

use ffmpeg_next::{Rational, Rescale, Rounding};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct TimestampAllocator {
    /// Duration of one frame in seconds (inverse of the frame rate).
    frame_period: Rational,
    time_base: Rational,
    next_index: i64,
}

impl TimestampAllocator {
    pub fn new(frame_rate: Rational, time_base: Rational) -> Result<Self> {
        if frame_rate.numerator() <= 0 || frame_rate.denominator() <= 0 {
            return Err(Error::configuration(format!(
                "frame rate must be positive, got {}/{}",
                frame_rate.numerator(),
                frame_rate.denominator()
            )));
        }
        if time_base.numerator() <= 0 || time_base.denominator() <= 0 {
            return Err(Error::configuration(format!(
                "time base must be positive, got {}/{}",
                time_base.numerator(),
                time_base.denominator()
            )));
        }
        // One frame must span at least one tick or consecutive pts collide.
        let ticks_num = time_base.denominator() as i64 * frame_rate.denominator() as i64;
        let ticks_den = time_base.numerator() as i64 * frame_rate.numerator() as i64;
        if ticks_num < ticks_den {
            return Err(Error::configuration(format!(
                "time base {}/{} is too coarse for {}/{} fps",
                time_base.numerator(),
                time_base.denominator(),
                frame_rate.numerator(),
                frame_rate.denominator()
            )));
        }

        Ok(Self {
            frame_period: Rational::new(frame_rate.denominator(), frame_rate.numerator()),
            time_base,
            next_index: 0,
        })
    }

    /// `round(index * time_base.den / (time_base.num * frame_rate))`
    pub fn pts(&self, index: i64) -> i64 {
        index.rescale_with(self.frame_period, self.time_base, Rounding::NearInfinity)
    }

    /// Hands out the next frame index and its pts.
    pub fn allocate(&mut self) -> (i64, i64) {
        let index = self.next_index;
        self.next_index += 1;
        (index, self.pts(index))
    }

    /// Nominal length of one frame in time-base ticks.
    pub fn frame_duration(&self) -> i64 {
        self.pts(1)
    }

    pub fn allocated(&self) -> i64 {
        self.next_index
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }
}

/// `round(duration * src.num * dst.den / (src.den * dst.num))`
pub fn rescale_duration(duration: i64, src: Rational, dst: Rational) -> i64 {
    duration.rescale_with(src, dst, Rounding::NearInfinity)
}
