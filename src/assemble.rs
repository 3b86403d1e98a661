//! Animated-GIF assembly from captured frames.
//!
//! Frames come in as the JPEG files capture wrote to disk and go out as a
//! single looping GIF. Frame order in the artifact is exactly the input
//! order, which is device-index order at capture time.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame};
use thiserror::Error;

/// Display duration of each frame in the assembled animation.
pub const FRAME_DELAY_MS: u32 = 128;

/// Errors that can occur while writing the artifact.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("failed to create '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("GIF encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Assemble `frame_paths` into a looping GIF at `output_path`.
///
/// Returns `Ok(None)` without touching the filesystem when the input list
/// is empty or no frame could be decoded; otherwise writes one GIF whose
/// frame count equals the number of decodable inputs and returns its path.
/// A frame that fails to decode is logged and skipped. Source frame files
/// are left in place.
pub fn assemble(
    frame_paths: &[PathBuf],
    output_path: &Path,
) -> Result<Option<PathBuf>, AssembleError> {
    if frame_paths.is_empty() {
        log::warn!("No frames to assemble");
        return Ok(None);
    }

    println!("Creating GIF with {} frame(s)...", frame_paths.len());

    let mut frames = Vec::with_capacity(frame_paths.len());
    for path in frame_paths {
        match image::open(path) {
            Ok(img) => {
                // Capture wrote RGB JPEGs; the GIF encoder wants RGBA.
                let rgba = img.to_rgba8();
                frames.push(Frame::from_parts(
                    rgba,
                    0,
                    0,
                    Delay::from_numer_denom_ms(FRAME_DELAY_MS, 1),
                ));
            }
            Err(e) => log::warn!("Skipping frame '{}': {}", path.display(), e),
        }
    }

    if frames.is_empty() {
        log::warn!("No decodable frames; GIF not written");
        return Ok(None);
    }

    let file = File::create(output_path).map_err(|source| AssembleError::Create {
        path: output_path.to_path_buf(),
        source,
    })?;
    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder.set_repeat(Repeat::Infinite)?;
    encoder.encode_frames(frames)?;

    Ok(Some(output_path.to_path_buf()))
}
