// frame.rs — Single-channel frame buffer shared by every backend.
//
// A `Frame` is the unit of work of the pipeline: one grayscale picture,
// row-major, one byte per pixel, no stride padding. Both the device
// executor and the reference filter consume and produce this exact layout,
// so pixel (x, y) always lives at index `y * width + x`.
//
// Capture collaborators that hand out padded rows (GStreamer aligns GRAY8
// rows to 4 bytes) compact them with `Frame::from_strided` before the frame
// enters the pipeline.
//
// OWNERSHIP
// ─────────
// The orchestrator owns each frame for exactly one iteration. Backends take
// `&Frame` and return a fresh `Frame`; nothing below the orchestrator holds
// on to a frame after `run` returns.

use std::fmt;

/// Dimensions of a frame in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: usize,
    pub height: usize,
}

impl FrameSize {
    /// Reference capture resolution.
    pub const VGA: FrameSize = FrameSize { width: 640, height: 480 };

    pub const fn new(width: usize, height: usize) -> Self {
        FrameSize { width, height }
    }

    /// Number of pixels (and bytes) in a frame of this size.
    #[inline]
    pub const fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// `pixel_count`, or `None` when `width * height` overflows.
    pub const fn checked_pixel_count(&self) -> Option<usize> {
        self.width.checked_mul(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

/// A grayscale frame: `width * height` bytes, row-major.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    size: FrameSize,
}

impl Frame {
    /// Create a black frame.
    pub fn new(width: usize, height: usize) -> Self {
        Frame {
            data: vec![0u8; width * height],
            size: FrameSize::new(width, height),
        }
    }

    /// Create a frame with every pixel set to `value`.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Frame {
            data: vec![value; width * height],
            size: FrameSize::new(width, height),
        }
    }

    /// Wrap an existing pixel vector.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "data length ({}) must equal width * height ({})",
            data.len(),
            width * height,
        );
        Frame {
            data,
            size: FrameSize::new(width, height),
        }
    }

    /// Copy a padded image (row pitch `stride` bytes) into a compact frame.
    ///
    /// Only the first `width` bytes of each row are kept. The last row may
    /// be short (no trailing padding), which is how most capture APIs lay
    /// out their final row.
    ///
    /// # Panics
    /// Panics if `stride < width` or `data` is too short for `height` rows.
    pub fn from_strided(width: usize, height: usize, stride: usize, data: &[u8]) -> Self {
        assert!(stride >= width, "stride ({stride}) must be >= width ({width})");
        if height > 0 {
            let needed = (height - 1) * stride + width;
            assert!(
                data.len() >= needed,
                "strided data too short: {} < {needed}",
                data.len()
            );
        }
        let mut frame = Frame::new(width, height);
        for y in 0..height {
            let src = &data[y * stride..y * stride + width];
            frame.row_mut(y).copy_from_slice(src);
        }
        frame
    }

    // --- Accessors ---

    #[inline]
    pub fn width(&self) -> usize {
        self.size.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.size.height
    }

    #[inline]
    pub fn size(&self) -> FrameSize {
        self.size
    }

    /// Pixel value at (x, y). x is column, y is row.
    ///
    /// # Panics
    /// Panics if (x, y) is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.bounds_check(x, y);
        self.data[y * self.size.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        self.bounds_check(x, y);
        let idx = y * self.size.width + x;
        self.data[idx] = value;
    }

    /// Borrow one row.
    #[inline]
    pub fn row(&self, y: usize) -> &[u8] {
        assert!(y < self.size.height, "row {y} out of bounds (height {})", self.size.height);
        let start = y * self.size.width;
        &self.data[start..start + self.size.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        assert!(y < self.size.height, "row {y} out of bounds (height {})", self.size.height);
        let start = y * self.size.width;
        &mut self.data[start..start + self.size.width]
    }

    /// Iterate over all pixels as `(x, y, value)`.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, u8)> + '_ {
        let w = self.size.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(idx, &v)| (idx % w, idx / w, v))
    }

    /// The flat row-major pixel buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// The 3×3 patch whose top-left corner is (x, y), row by row.
    ///
    /// Returns `None` when the patch would leave the frame. Used to log a
    /// small before/after sample each iteration.
    pub fn patch3(&self, x: usize, y: usize) -> Option<[[u8; 3]; 3]> {
        if x + 3 > self.size.width || y + 3 > self.size.height {
            return None;
        }
        let mut out = [[0u8; 3]; 3];
        for (dy, row) in out.iter_mut().enumerate() {
            row.copy_from_slice(&self.row(y + dy)[x..x + 3]);
        }
        Some(out)
    }

    /// Number of pixels that differ from `other`.
    ///
    /// # Panics
    /// Panics if the frames have different sizes.
    pub fn count_mismatches(&self, other: &Frame) -> usize {
        assert_eq!(self.size, other.size, "cannot compare frames of different size");
        self.data
            .iter()
            .zip(other.data.iter())
            .filter(|(a, b)| a != b)
            .count()
    }

    #[inline]
    fn bounds_check(&self, x: usize, y: usize) {
        assert!(
            x < self.size.width && y < self.size.height,
            "pixel ({x},{y}) out of bounds for frame {}",
            self.size,
        );
    }
}

// Prints at most 8 rows × 16 columns; full dumps of a VGA frame are useless.
impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frame {{ {} }}", self.size)?;
        for y in 0..self.size.height.min(8) {
            write!(f, "  row {y}: [")?;
            for x in 0..self.size.width.min(16) {
                if x > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", self.get(x, y))?;
            }
            if self.size.width > 16 {
                write!(f, ", ...")?;
            }
            writeln!(f, "]")?;
        }
        if self.size.height > 8 {
            writeln!(f, "  ...")?;
        }
        Ok(())
    }
}

impl std::ops::Index<(usize, usize)> for Frame {
    type Output = u8;

    #[inline]
    fn index(&self, (x, y): (usize, usize)) -> &u8 {
        self.bounds_check(x, y);
        &self.data[y * self.size.width + x]
    }
}

impl std::ops::IndexMut<(usize, usize)> for Frame {
    #[inline]
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut u8 {
        self.bounds_check(x, y);
        let idx = y * self.size.width + x;
        &mut self.data[idx]
    }
}
