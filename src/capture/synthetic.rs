// capture/synthetic.rs — A generated scene that drifts one step per frame.
//
// A horizontal/vertical intensity ramp with six bright rectangles, shifted
// by `step` pixels every frame. The ramp gives the Sobel-X filter a
// constant response and the rectangle edges give it strong ones, so both
// the device kernel and the reference filter see non-trivial input.

use crate::error::CaptureError;
use crate::frame::{Frame, FrameSize};
use crate::pipeline::FrameSource;

#[derive(Debug, Clone)]
pub struct SyntheticSource {
    size: FrameSize,
    step: usize,
    index: u64,
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(size: FrameSize) -> Self {
        SyntheticSource { size, step: 2, index: 0, limit: None }
    }

    /// Pixels the scene moves per frame.
    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step;
        self
    }

    /// End the stream after `limit` frames.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl FrameSource for SyntheticSource {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.limit.is_some_and(|l| self.index >= l) {
            return Ok(None);
        }
        let shift = (self.index as usize).wrapping_mul(self.step);
        self.index += 1;
        Ok(Some(make_scene(self.size, shift, shift / 2)))
    }
}

/// Render the scene shifted by (dx, dy).
pub fn make_scene(size: FrameSize, dx: usize, dy: usize) -> Frame {
    let FrameSize { width: w, height: h } = size;
    let mut img = Frame::new(w, h);
    if size.is_empty() {
        return img;
    }
    for y in 0..h {
        for x in 0..w {
            let sx = (x + dx) % w;
            let sy = (y + dy) % h;
            img.set(x, y, ((sx * 200 / w) + (sy * 55 / h)) as u8);
        }
    }
    for rect in 0..6usize {
        let rx = (50 + rect * 100).wrapping_add(dx) % w;
        let ry = (40 + (rect % 3) * 120).wrapping_add(dy) % h;
        let bright = 180u8.wrapping_add(rect as u8 * 10);
        for y in ry..(ry + 60).min(h) {
            for x in rx..(rx + 80).min(w) {
                img.set(x, y, bright);
            }
        }
    }
    img
}
