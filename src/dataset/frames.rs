//! 图像帧来源
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_FPS;
use crate::error::{NavError, Result};
use crate::frame::Frame;

/// A finite, ordered stream of frames at a known rate.
pub trait FrameSource {
    /// Native frame rate [Hz].
    fn fps(&self) -> f64;
    /// Frames left to read, when the source knows it.
    fn frame_count(&self) -> Option<usize>;
    /// `Ok(None)` at the end of the stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Drop the next `n` frames. Returns how many were dropped.
    fn skip(&mut self, n: usize) -> Result<usize> {
        let mut skipped = 0;
        while skipped < n {
            if self.next_frame()?.is_none() {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Numeric part of a file stem: `frame_000123.png` -> 123.
fn frame_index(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Directory of numbered still images, decoded with `image`.
#[derive(Debug)]
pub struct ImageSequence {
    paths: VecDeque<PathBuf>,
    fps: f64,
}

impl ImageSequence {
    pub fn new(dir: &Path, fps: f64) -> Result<Self> {
        let to_input_error = |source| NavError::Input {
            path: dir.to_path_buf(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(to_input_error)? {
            let path = entry.map_err(to_input_error)?.path();
            if path.is_file() && is_image(&path) {
                paths.push(path);
            }
        }
        Self::sort_frames(&mut paths);
        log::info!("{} images found in {:?}", paths.len(), dir);
        Ok(Self::from_paths(paths, fps))
    }

    pub fn from_paths(paths: Vec<PathBuf>, fps: f64) -> Self {
        Self {
            paths: paths.into(),
            fps,
        }
    }

    /// Numbered files by number, the rest by name after them.
    fn sort_frames(paths: &mut [PathBuf]) {
        paths.sort_by(|a, b| match (frame_index(a), frame_index(b)) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.cmp(b),
        });
    }
}

impl FrameSource for ImageSequence {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> Option<usize> {
        Some(self.paths.len())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let img = image::open(&path).map_err(|source| NavError::Image { path, source })?;
        Ok(Some(Frame::from_image(&img)))
    }

    fn skip(&mut self, n: usize) -> Result<usize> {
        let n = n.min(self.paths.len());
        self.paths.drain(..n);
        Ok(n)
    }
}

/// Frames already in memory.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    frames: VecDeque<Frame>,
    fps: f64,
}

impl FrameBuffer {
    pub fn new(frames: Vec<Frame>, fps: f64) -> Self {
        Self {
            frames: frames.into(),
            fps,
        }
    }
}

impl FrameSource for FrameBuffer {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> Option<usize> {
        Some(self.frames.len())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}

/// Image directory or, with the `cv` feature, a video file.
///
/// Image directories have no rate of their own and default to
/// [`DEFAULT_FPS`] when `fps` is `None`.
pub fn open(path: &Path, fps: Option<f64>) -> Result<Box<dyn FrameSource>> {
    if path.is_dir() {
        return Ok(Box::new(ImageSequence::new(path, fps.unwrap_or(DEFAULT_FPS))?));
    }
    open_video(path, fps)
}

#[cfg(feature = "cv")]
fn open_video(path: &Path, fps: Option<f64>) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(VideoFile::open(path, fps)?))
}

#[cfg(not(feature = "cv"))]
fn open_video(path: &Path, _fps: Option<f64>) -> Result<Box<dyn FrameSource>> {
    Err(NavError::Config(format!(
        "{:?} is not an image directory; video files need the `cv` feature",
        path
    )))
}

#[cfg(feature = "cv")]
pub use video::VideoFile;

#[cfg(feature = "cv")]
mod video {
    use std::path::Path;

    use ndarray::Array2;
    use opencv::{core::Mat, imgproc, prelude::*, videoio};

    use super::FrameSource;
    use crate::error::{NavError, Result};
    use crate::frame::Frame;

    /// Video container decoded by OpenCV `videoio`.
    pub struct VideoFile {
        capture: videoio::VideoCapture,
        fps: f64,
        remaining: Option<usize>,
        bgr: Mat,
        gray: Mat,
    }

    impl VideoFile {
        /// `fps_override` replaces the container's frame rate when given.
        pub fn open(path: &Path, fps_override: Option<f64>) -> Result<Self> {
            let name = path.to_string_lossy();
            let capture = videoio::VideoCapture::from_file(&name, videoio::CAP_ANY)?;
            if !capture.is_opened()? {
                return Err(NavError::Input {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidData, "cannot open video"),
                });
            }
            let native_fps = capture.get(videoio::CAP_PROP_FPS)?;
            let count = capture.get(videoio::CAP_PROP_FRAME_COUNT)?;
            let fps = fps_override.unwrap_or(native_fps);
            log::info!("video {:?}: {} frames at {} fps", path, count, native_fps);
            Ok(Self {
                capture,
                fps,
                remaining: (count > 0.0).then_some(count as usize),
                bgr: Mat::default(),
                gray: Mat::default(),
            })
        }

        fn gray_to_frame(gray: &Mat) -> Result<Frame> {
            let rows = gray.rows() as usize;
            let cols = gray.cols() as usize;
            let mut luma = Array2::<f32>::zeros((rows, cols));
            for r in 0..rows {
                for c in 0..cols {
                    luma[(r, c)] = *gray.at_2d::<u8>(r as i32, c as i32)? as f32;
                }
            }
            Ok(Frame::from_luma(luma))
        }
    }

    impl FrameSource for VideoFile {
        fn fps(&self) -> f64 {
            self.fps
        }

        fn frame_count(&self) -> Option<usize> {
            self.remaining
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if !self.capture.read(&mut self.bgr)? || self.bgr.empty() {
                return Ok(None);
            }
            if let Some(n) = self.remaining.as_mut() {
                *n = n.saturating_sub(1);
            }
            if self.bgr.channels() == 1 {
                return Self::gray_to_frame(&self.bgr).map(Some);
            }
            imgproc::cvt_color(&self.bgr, &mut self.gray, imgproc::COLOR_BGR2GRAY, 0)?;
            Self::gray_to_frame(&self.gray).map(Some)
        }

        /// Advances the demuxer without decoding.
        fn skip(&mut self, n: usize) -> Result<usize> {
            let mut skipped = 0;
            while skipped < n && self.capture.grab()? {
                skipped += 1;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining = remaining.saturating_sub(skipped);
            }
            Ok(skipped)
        }
    }
}
