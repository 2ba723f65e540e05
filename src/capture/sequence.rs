// capture/sequence.rs — Play a directory of still images as a stream.
//
// Files are taken in lexicographic name order (zero-padded timestamps, as
// dataset dumps use, sort correctly). Every image is decoded with the
// `image` crate and converted to 8-bit luma. The first image fixes the
// frame size; a later image of a different size is an error rather than
// being rescaled.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CaptureError;
use crate::frame::{Frame, FrameSize};
use crate::pipeline::FrameSource;

const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct ImageSequence {
    dir: PathBuf,
    files: Vec<PathBuf>,
    size: FrameSize,
    next: usize,
    looping: bool,
    /// The first image, decoded while probing the size.
    first: Option<Frame>,
}

impl ImageSequence {
    /// Index `dir` and decode its first image.
    ///
    /// # Errors
    /// `CaptureError::Io` if the directory cannot be read,
    /// `CaptureError::Empty` if it holds no supported images,
    /// `CaptureError::Decode` if the first image is unreadable.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CaptureError> {
        let dir = dir.as_ref().to_path_buf();
        let files = list_images(&dir)?;
        let first_path = files.first().ok_or_else(|| CaptureError::Empty(dir.clone()))?;
        let first = load_grayscale(first_path)?;
        log::info!("image sequence {}: {} files, {}", dir.display(), files.len(), first.size());
        Ok(ImageSequence {
            dir,
            size: first.size(),
            files,
            next: 0,
            looping: false,
            first: Some(first),
        })
    }

    /// Restart from the first file instead of ending.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSource for ImageSequence {
    fn frame_size(&self) -> FrameSize {
        self.size
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.next >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            self.next = 0;
        }
        let idx = self.next;
        self.next += 1;

        if idx == 0 {
            if let Some(frame) = self.first.take() {
                return Ok(Some(frame));
            }
        }

        let path = &self.files[idx];
        let frame = load_grayscale(path)?;
        if frame.size() != self.size {
            return Err(CaptureError::SizeMismatch {
                path: path.clone(),
                expected: self.size,
                actual: frame.size(),
            });
        }
        Ok(Some(frame))
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Decode any supported image into a grayscale frame.
pub fn load_grayscale(path: &Path) -> Result<Frame, CaptureError> {
    let img = image::open(path).map_err(|source| CaptureError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let gray = img.to_luma8();
    let (w, h) = gray.dimensions();
    Ok(Frame::from_vec(w as usize, h as usize, gray.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("convstream-seq-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_png(path: &Path, w: u32, h: u32, value: u8) {
        image::GrayImage::from_pixel(w, h, image::Luma([value]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_plays_in_name_order() {
        let dir = scratch_dir("order");
        write_png(&dir.join("002.png"), 4, 3, 20);
        write_png(&dir.join("001.png"), 4, 3, 10);
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut seq = ImageSequence::open(&dir).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.frame_size(), FrameSize::new(4, 3));
        assert_eq!(seq.next_frame().unwrap().unwrap().get(0, 0), 10);
        assert_eq!(seq.next_frame().unwrap().unwrap().get(0, 0), 20);
        assert!(seq.next_frame().unwrap().is_none());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_looping_restarts() {
        let dir = scratch_dir("loop");
        write_png(&dir.join("a.png"), 2, 2, 5);
        let mut seq = ImageSequence::open(&dir).unwrap().looping(true);
        for _ in 0..3 {
            assert_eq!(seq.next_frame().unwrap().unwrap().get(1, 1), 5);
        }
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let dir = scratch_dir("size");
        write_png(&dir.join("a.png"), 4, 4, 0);
        write_png(&dir.join("b.png"), 5, 4, 0);
        let mut seq = ImageSequence::open(&dir).unwrap();
        seq.next_frame().unwrap();
        let err = seq.next_frame().unwrap_err();
        assert!(matches!(err, CaptureError::SizeMismatch { .. }));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_empty_dir() {
        let dir = scratch_dir("empty");
        assert!(matches!(ImageSequence::open(&dir), Err(CaptureError::Empty(_))));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_dir_is_io() {
        let err = ImageSequence::open("/nonexistent/convstream/frames").err().unwrap();
        assert!(matches!(err, CaptureError::Io(_)));
    }
}
