// filter.rs — The one definition of the 3×3 filter.
//
// Both execution paths (the WGSL kernel in shaders/conv3x3.wgsl and the
// host filter in convolution.rs) are driven by a `FilterSpec`:
//
//   weights     — 3×3 signed integers, indexed weights[i + j*3] where i is
//                 the column offset (x) and j the row offset (y), both 0..3
//                 with the centre tap at (1, 1).
//   margin      — pixels with x <= margin, x >= width - margin (same for y)
//                 are copied through untouched.
//   normalise   — divide the weighted sum by the sum of the weights of the
//                 taps that were in bounds; a zero weight sum divides by 1.
//   narrow      — truncate toward zero, then keep the low byte
//                 (two's-complement wrap, NOT a clamp to [0, 255]).
//
// The GPU never sees its own copy of the weights: `FilterSpec::gpu_params`
// packs them into the uniform buffer the kernel reads. Changing the matrix
// here changes both backends at once.
//
// Integer weights keep the two paths exact. The kernel accumulates in i32,
// so `ConvKernel::new` bounds every weight by MAX_WEIGHT: nine taps of 255
// at that weight still fit in i32, and within that range the f64 quotient
// the host computes truncates to the same integer as the kernel's division.

use crate::frame::FrameSize;

/// Margin used by the live pipeline.
pub const DEFAULT_MARGIN: usize = 20;

/// Largest weight magnitude for which `9 * 255 * |w|` fits in an i32.
pub const MAX_WEIGHT: i32 = i32::MAX / (9 * 255);

/// A fixed 3×3 convolution matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvKernel {
    weights: [i32; 9],
}

impl ConvKernel {
    /// Horizontal gradient (Sobel-X):
    /// ```text
    /// -1  0  1
    /// -2  0  2
    /// -1  0  1
    /// ```
    pub const SOBEL_X: ConvKernel = ConvKernel {
        weights: [-1, 0, 1, -2, 0, 2, -1, 0, 1],
    };

    /// Leaves the centre pixel in place (weight sum 1).
    pub const IDENTITY: ConvKernel = ConvKernel {
        weights: [0, 0, 0, 0, 1, 0, 0, 0, 0],
    };

    /// 3×3 box blur (weight sum 9).
    pub const BOX: ConvKernel = ConvKernel { weights: [1; 9] };

    /// # Panics
    /// Panics if any weight lies outside `-MAX_WEIGHT..=MAX_WEIGHT`.
    pub const fn new(weights: [i32; 9]) -> Self {
        let mut k = 0;
        while k < 9 {
            assert!(
                weights[k] >= -MAX_WEIGHT && weights[k] <= MAX_WEIGHT,
                "kernel weight out of range"
            );
            k += 1;
        }
        ConvKernel { weights }
    }

    /// Weight at column offset `i` and row offset `j` (both in 0..3).
    #[inline]
    pub fn weight(&self, i: usize, j: usize) -> i32 {
        self.weights[i + j * 3]
    }

    pub fn weights(&self) -> &[i32; 9] {
        &self.weights
    }

    /// Sum of all nine weights.
    pub fn sum(&self) -> i32 {
        self.weights.iter().sum()
    }
}

impl Default for ConvKernel {
    fn default() -> Self {
        ConvKernel::SOBEL_X
    }
}

/// Everything that defines the filter's output, shared by all backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterSpec {
    pub kernel: ConvKernel,
    pub margin: usize,
}

impl Default for FilterSpec {
    fn default() -> Self {
        FilterSpec {
            kernel: ConvKernel::SOBEL_X,
            margin: DEFAULT_MARGIN,
        }
    }
}

impl FilterSpec {
    pub fn new(kernel: ConvKernel, margin: usize) -> Self {
        FilterSpec { kernel, margin }
    }

    /// Whether (x, y) is filtered (true) or copied through (false).
    ///
    /// Strict on every side: with margin 20 on a 640-wide frame the filtered
    /// columns are 21..=619.
    #[inline]
    pub fn is_interior(&self, x: usize, y: usize, size: FrameSize) -> bool {
        let m = self.margin;
        // `width - x > m` is `x + m < width` without overflow for huge margins.
        x > m && y > m && size.width.saturating_sub(x) > m && size.height.saturating_sub(y) > m
    }

    /// Pack the filter into the layout of the WGSL `FilterParams` uniform.
    ///
    /// A margin of at least the larger frame side already leaves no interior
    /// pixel, so it is clamped there to stay representable as an i32 in the
    /// kernel without changing which pixels are filtered.
    pub fn gpu_params(&self, size: FrameSize) -> FilterParams {
        let w = &self.kernel.weights;
        let margin = self
            .margin
            .min(size.width.max(size.height))
            .min(i32::MAX as usize);
        FilterParams {
            width: size.width as u32,
            height: size.height as u32,
            margin: margin as u32,
            pixel_count: size.pixel_count() as u32,
            rows: [
                [w[0], w[1], w[2], 0],
                [w[3], w[4], w[5], 0],
                [w[6], w[7], w[8], 0],
            ],
        }
    }
}

/// Uniform block consumed by `my_filter` (must match WGSL struct FilterParams).
///
/// Uniform arrays need a 16-byte element stride, so each kernel row is a
/// `vec4<i32>` with an unused fourth lane.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FilterParams {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
    pub pixel_count: u32,
    pub rows: [[i32; 4]; 3],
}

/// Narrow a normalised sum to a pixel byte.
///
/// Truncates toward zero, then reinterprets the low 8 bits through a signed
/// byte. Out-of-range values wrap: 256 → 0, 510 → 254, -1 → 255, -510 → 2.
#[inline]
pub fn narrow_to_byte(value: f64) -> u8 {
    (value as i32) as i8 as u8
}
