//! Frame source over a directory of still images.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cinefocus_media::{Frame, FrameSource, MediaError, MediaResult};
use tracing::{debug, warn};

const EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Plays image files in lexical order, looping at the end.
///
/// Each call to [`FrameSource::current_frame`] advances one file. A file
/// that fails to decode is skipped for that frame.
#[derive(Debug)]
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    next: usize,
    dims: (u32, u32),
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>) -> MediaResult<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(MediaError::FileNotFound(dir.to_path_buf()));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(MediaError::InvalidFrame(format!(
                "no images found in {}",
                dir.display()
            )));
        }

        debug!(count = paths.len(), dir = %dir.display(), "Opened image sequence");
        Ok(Self {
            paths,
            next: 0,
            dims: (0, 0),
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn current_frame(&mut self) -> Option<Frame> {
        let path = &self.paths[self.next];
        self.next = (self.next + 1) % self.paths.len();

        match image::open(path) {
            Ok(image) => {
                let frame = image.to_rgb8();
                self.dims = frame.dimensions();
                Some(Arc::new(frame))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to decode frame");
                None
            }
        }
    }

    fn native_dimensions(&self) -> (u32, u32) {
        self.dims
    }
}
