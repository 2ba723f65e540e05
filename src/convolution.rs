// convolution.rs — Host reference 3×3 convolution.
//
// This is the ground truth for the device kernel. The GPU path in
// gpu/executor.rs is validated against `apply` pixel-for-pixel, and the
// pipeline can run on `ReferenceBackend` alone when no device is usable.
//
// Per pixel (x, y), with the rules from filter.rs:
//
//   outside the interior  →  out = in
//   inside the interior   →  sum  = Σ in[x+i-1, y+j-1] * w[i + 3j]   (valid taps)
//                            wsum = Σ w[i + 3j]                     (valid taps)
//                            out  = narrow(sum / (wsum == 0 ? 1 : wsum))
//
// BORDER HANDLING: skip.
// Taps that fall outside the frame contribute to neither the sum nor the
// denominator (no zero padding, no edge replication). With margin >= 1
// every interior pixel has all nine taps in bounds; margin 0 is the only
// configuration that reaches the skipping branch.
//
// The interior loop splits into a fully-in-bounds fast path and a checked
// path. Both compute in f64 so the narrowing sees the same value either way.

use crate::filter::{narrow_to_byte, FilterSpec};
use crate::frame::{Frame, FrameSize};

/// Filter a frame with the reference algorithm.
///
/// Always returns a frame of the same size as `input`.
pub fn apply(input: &Frame, spec: &FilterSpec) -> Frame {
    let out = apply_raw(input.as_slice(), input.width(), input.height(), spec);
    Frame::from_vec(input.width(), input.height(), out)
}

/// Filter a raw row-major buffer of `width * height` bytes.
///
/// # Panics
/// Panics if `input.len() != width * height`.
pub fn apply_raw(input: &[u8], width: usize, height: usize, spec: &FilterSpec) -> Vec<u8> {
    assert_eq!(
        input.len(),
        width * height,
        "input length ({}) must equal width * height ({})",
        input.len(),
        width * height,
    );

    let size = FrameSize::new(width, height);
    let full_sum = spec.kernel.sum();
    // Identity copy covers the margin; the interior is overwritten below.
    let mut out = input.to_vec();

    for y in 0..height {
        for x in 0..width {
            if !spec.is_interior(x, y, size) {
                continue;
            }
            let all_taps_valid = x >= 1 && y >= 1 && x + 1 < width && y + 1 < height;
            let value = if all_taps_valid {
                convolve_unchecked(input, width, x, y, spec, full_sum)
            } else {
                convolve_checked(input, size, x, y, spec)
            };
            out[y * width + x] = value;
        }
    }
    out
}

/// All nine taps are inside the frame.
#[inline]
fn convolve_unchecked(
    input: &[u8],
    width: usize,
    x: usize,
    y: usize,
    spec: &FilterSpec,
    weight_sum: i32,
) -> u8 {
    let mut sum = 0.0f64;
    for j in 0..3 {
        let row = (y + j - 1) * width;
        for i in 0..3 {
            let px = input[row + x + i - 1];
            sum += px as f64 * spec.kernel.weight(i, j) as f64;
        }
    }
    normalise(sum, weight_sum as f64)
}

/// Some taps may fall outside the frame; those are skipped entirely.
fn convolve_checked(input: &[u8], size: FrameSize, x: usize, y: usize, spec: &FilterSpec) -> u8 {
    let mut sum = 0.0f64;
    let mut weight_sum = 0.0f64;
    for j in 0..3 {
        for i in 0..3 {
            let px = x as isize + i as isize - 1;
            let py = y as isize + j as isize - 1;
            if px < 0 || py < 0 || px >= size.width as isize || py >= size.height as isize {
                continue;
            }
            let k = spec.kernel.weight(i, j) as f64;
            sum += input[py as usize * size.width + px as usize] as f64 * k;
            weight_sum += k;
        }
    }
    normalise(sum, weight_sum)
}

#[inline]
fn normalise(sum: f64, weight_sum: f64) -> u8 {
    let denom = if weight_sum == 0.0 { 1.0 } else { weight_sum };
    narrow_to_byte(sum / denom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ConvKernel;

    fn spec(kernel: ConvKernel, margin: usize) -> FilterSpec {
        FilterSpec::new(kernel, margin)
    }

    #[test]
    fn test_output_same_length() {
        let img = Frame::filled(17, 9, 3);
        let out = apply(&img, &FilterSpec::default());
        assert_eq!(out.size(), img.size());
        assert_eq!(out.as_slice().len(), 17 * 9);
    }

    #[test]
    fn test_identity_kernel_reproduces_input() {
        let data: Vec<u8> = (0..64).map(|v| (v * 3) as u8).collect();
        let img = Frame::from_vec(8, 8, data);
        let out = apply(&img, &spec(ConvKernel::IDENTITY, 0));
        assert_eq!(out, img);
    }

    #[test]
    fn test_box_filter_mean() {
        // 3×3 block of 9s around (2, 2), box kernel, margin 1 → interior
        // is just (2, 2): mean of nine 9s = 9.
        let mut img = Frame::new(5, 5);
        for y in 1..4 {
            for x in 1..4 {
                img.set(x, y, 9);
            }
        }
        img.set(2, 2, 18);
        let out = apply(&img, &spec(ConvKernel::BOX, 1));
        // (8 * 9 + 18) / 9 = 10
        assert_eq!(out.get(2, 2), 10);
    }

    #[test]
    fn test_checked_path_skips_out_of_bounds_taps() {
        // Margin 0 on a 3×3 frame: pixel (2, 2) is interior, and its right
        // column and bottom row of taps are outside the frame.
        // Box kernel, valid taps = 4 → denominator 4.
        let img = Frame::from_vec(3, 3, vec![
            0, 0, 0,
            0, 4, 8,
            0, 12, 16,
        ]);
        let out = apply(&img, &spec(ConvKernel::BOX, 0));
        // (4 + 8 + 12 + 16) / 4 = 10
        assert_eq!(out.get(2, 2), 10);
        // Row 0 / column 0 never filtered with margin 0.
        assert_eq!(out.get(0, 0), 0);
        assert_eq!(out.get(1, 0), 0);
    }

    #[test]
    fn test_zero_weight_sum_divides_by_one() {
        // Sobel-X over a ramp: weight sum is 0, so the raw sum is the output.
        let mut img = Frame::new(5, 5);
        for y in 0..5 {
            for x in 0..5 {
                img.set(x, y, (x * 10) as u8);
            }
        }
        let out = apply(&img, &spec(ConvKernel::SOBEL_X, 1));
        // Interior (2..=3, 2..=3): (1 + 2 + 1) * (20) = 80.
        assert_eq!(out.get(2, 2), 80);
        assert_eq!(out.get(3, 3), 80);
    }

    #[test]
    fn test_partial_zero_weight_sum_at_border() {
        // Margin 0, Sobel-X. Pixel (1, 2) on a 3-tall frame loses its bottom
        // row of taps: remaining weights -1 0 1 / -2 0 2 still sum to 0, so
        // the denominator is 1.
        let img = Frame::from_vec(3, 3, vec![
            1, 0, 5,
            2, 0, 7,
            3, 0, 11,
        ]);
        let out = apply(&img, &spec(ConvKernel::SOBEL_X, 0));
        // -1*2 + 1*7 + -2*3 + 2*11 = 21
        assert_eq!(out.get(1, 2), 21);
    }

    #[test]
    fn test_margin_copied_through() {
        let data: Vec<u8> = (0..100).map(|v| v as u8).collect();
        let img = Frame::from_vec(10, 10, data);
        let out = apply(&img, &spec(ConvKernel::SOBEL_X, 3));
        for (x, y, v) in img.pixels() {
            if x <= 3 || y <= 3 || x >= 7 || y >= 7 {
                assert_eq!(out.get(x, y), v, "margin pixel ({x},{y}) changed");
            }
        }
    }

    #[test]
    #[should_panic(expected = "must equal")]
    fn test_raw_length_mismatch_panics() {
        apply_raw(&[0u8; 10], 4, 4, &FilterSpec::default());
    }
}
