//! Webcam probing and burst capture.
//!
//! The booth holds a fixed bank of cameras, one frame each per session.
//! Discovery probes device indices sequentially: an index that opens but
//! never delivers a frame (virtual or busy devices do this) is not a
//! working camera, so every probe demands one real frame before the
//! device is retained.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::query;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType, Resolution as NokhwaResolution,
};
use nokhwa::Camera;
use thiserror::Error;

/// How many cameras a full booth carries.
pub const DEFAULT_CAMERA_COUNT: usize = 3;

/// Highest device index probed during discovery. Configurable because
/// some systems expose dozens of virtual capture devices before the real
/// ones.
pub const DEFAULT_PROBE_CEILING: u32 = 20;

/// Requested capture resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Information about an available camera device, for `list-cameras`.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub description: String,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.index, self.name, self.description)
    }
}

/// Errors that can occur during camera operations.
///
/// None of these abort a session; they are logged and the affected device
/// simply contributes no frame.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to query cameras: {0}")]
    QueryFailed(String),

    #[error("camera {index}: frame read failed: {message}")]
    CaptureFailed { index: u32, message: String },

    #[error("camera {index}: frame decode failed: {message}")]
    DecodeFailed { index: u32, message: String },
}

/// List all camera devices the OS knows about.
///
/// Returns an empty vector (not an error) when no cameras are attached.
pub fn list_cameras() -> Result<Vec<CameraInfo>, CameraError> {
    let devices = query(ApiBackend::Auto).map_err(|e| CameraError::QueryFailed(e.to_string()))?;

    Ok(devices
        .into_iter()
        .map(|d| CameraInfo {
            index: d.index().as_index().unwrap_or(0),
            name: d.human_name(),
            description: d.description().to_string(),
        })
        .collect())
}

/// A source of captured frame files, one per device per session.
///
/// Implemented by [`CaptureBank`]; the session controller is generic over
/// this so it can run against a stub without hardware.
pub trait FrameSource {
    /// Capture one frame from every held device, in ascending index
    /// order, writing each to `output_dir`. Returns the written paths;
    /// devices that fail contribute nothing.
    fn capture_all(&mut self, output_dir: &Path, timestamp: &str) -> Vec<PathBuf>;
}

/// One open, verified-working capture device.
struct CameraDevice {
    index: u32,
    camera: Camera,
}

impl CameraDevice {
    /// Read and decode one frame from the device.
    fn read_frame(&mut self) -> Result<RgbImage, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::CaptureFailed {
                index: self.index,
                message: e.to_string(),
            })?;
        buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::DecodeFailed {
                index: self.index,
                message: e.to_string(),
            })
    }
}

impl fmt::Debug for CameraDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraDevice")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// The set of probed, retained capture devices used by a session.
#[derive(Debug, Default)]
pub struct CaptureBank {
    devices: Vec<CameraDevice>,
}

impl CaptureBank {
    /// Probe device indices `0..probe_ceiling` and retain up to
    /// `target_count` working cameras.
    ///
    /// Zero, partial, and full banks are all valid outcomes: a booth with
    /// fewer cameras still produces (smaller) GIFs, so discovery never
    /// fails the process.
    pub fn initialize(target_count: usize, probe_ceiling: u32, resolution: Resolution) -> Self {
        println!("Scanning for cameras (looking for {})...", target_count);

        let mut devices = Vec::new();
        for index in 0..probe_ceiling {
            if devices.len() >= target_count {
                break;
            }
            let Some(mut camera) = open_device(index, resolution) else {
                continue;
            };
            if let Err(e) = camera.open_stream() {
                log::debug!("Camera {}: stream failed to start: {}", index, e);
                continue;
            }
            // Openable is not the same as working: demand one real frame.
            match camera.frame() {
                Ok(_) => {
                    println!("  Found working camera at index {}", index);
                    devices.push(CameraDevice { index, camera });
                }
                Err(e) => {
                    log::debug!("Camera {}: opened but delivered no frame: {}", index, e);
                    let _ = camera.stop_stream();
                }
            }
        }

        if devices.is_empty() {
            log::warn!("No working cameras detected");
        } else if devices.len() < target_count {
            log::warn!(
                "Only found {} of {} requested camera(s)",
                devices.len(),
                target_count
            );
        } else {
            println!("{} camera(s) ready", devices.len());
        }

        Self { devices }
    }

    /// Number of devices currently held.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Stop every stream and drop the handles. Idempotent.
    pub fn release_all(&mut self) {
        for device in &mut self.devices {
            match device.camera.stop_stream() {
                Ok(()) => log::info!("Released camera {}", device.index),
                Err(e) => log::debug!("Camera {}: stop_stream failed: {}", device.index, e),
            }
        }
        self.devices.clear();
    }
}

impl FrameSource for CaptureBank {
    fn capture_all(&mut self, output_dir: &Path, timestamp: &str) -> Vec<PathBuf> {
        if let Err(e) = fs::create_dir_all(output_dir) {
            log::error!(
                "Cannot create output directory '{}': {}",
                output_dir.display(),
                e
            );
            return Vec::new();
        }

        let mut captured = Vec::new();
        for device in &mut self.devices {
            let frame = match device.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("{}", e);
                    continue;
                }
            };
            let path = output_dir.join(frame_filename(device.index, timestamp));
            match frame.save(&path) {
                Ok(()) => {
                    println!("  Camera {}: {}", device.index, path.display());
                    captured.push(path);
                }
                Err(e) => {
                    log::warn!("Camera {}: failed to write frame: {}", device.index, e);
                }
            }
        }
        captured
    }
}

impl Drop for CaptureBank {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// Open a device without starting the stream.
///
/// Tries the requested resolution with MJPEG first, then falls back to
/// whatever the device considers its best format.
fn open_device(index: u32, resolution: Resolution) -> Option<Camera> {
    let format_attempts = [
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            NokhwaResolution::new(resolution.width, resolution.height),
            NokhwaFrameFormat::MJPEG,
            30,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
    ];

    for requested in format_attempts {
        match Camera::new(CameraIndex::Index(index), requested) {
            Ok(camera) => return Some(camera),
            Err(e) => log::debug!("Camera {}: open attempt failed: {}", index, e),
        }
    }
    None
}

fn frame_filename(index: u32, timestamp: &str) -> String {
    format!("cam{}_{}.jpg", index, timestamp)
}
