use bytes::{BufMut, BytesMut};
use ffmpeg_next::format::Pixel;
use ffmpeg_pipeline::Frame;

/// Endless RGB24 gradient that shifts a little every frame.
pub struct TestPattern {
    width: u32,
    height: u32,
    index: u64,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            index: 0,
        }
    }
}

impl Iterator for TestPattern {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let shift = self.index as usize;
        let mut data = BytesMut::with_capacity(self.width as usize * self.height as usize * 3);
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                data.put_u8(((x + shift) & 0xff) as u8);
                data.put_u8(((y + shift) & 0xff) as u8);
                data.put_u8(((shift * 3) & 0xff) as u8);
            }
        }
        self.index += 1;
        Some(Frame::new(data.freeze(), Pixel::RGB24, self.width, self.height))
    }
}
