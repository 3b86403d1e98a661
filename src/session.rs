//! The session state machine and polling loop.
//!
//! One session is one countdown→capture→assemble→upload→reset cycle,
//! kicked off by a `START` token from the board. The controller owns the
//! sequencing; every sub-operation reports its outcome as a value, so a
//! session always reaches the reset step and the rig is never left
//! mid-countdown.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::assemble;
use crate::camera::FrameSource;
use crate::transport::{self, CommandLink};
use crate::upload::{UploadOutcome, Uploader};

/// Delay between idle polls of the serial link. Bounds busy-waiting
/// without materially hurting trigger latency.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause between `GO` and the first frame read, covering light and
/// shutter lag on the rig.
pub const GO_SETTLE: Duration = Duration::from_millis(500);

/// Pause before the reset token is sent.
pub const RESET_PAUSE: Duration = Duration::from_millis(500);

/// Default delay between countdown steps.
pub const DEFAULT_COUNTDOWN_DELAY: Duration = Duration::from_secs(1);

/// Timestamp format shared by frame and artifact filenames.
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Source of timed pauses, so tests can run sessions without wall-clock
/// waits.
pub trait Clock {
    fn sleep(&self, duration: Duration);
}

/// Real sleeping clock used in production.
#[derive(Debug, Default)]
pub struct WallClock;

impl Clock for WallClock {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Where the controller currently is in the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Counting,
    Capturing,
    Assembling,
    Uploading,
    Resetting,
}

/// Record of one completed session.
#[derive(Debug)]
pub struct SessionReport {
    pub triggered_at: DateTime<Local>,
    /// Captured frame paths, in device-index order.
    pub frames: Vec<PathBuf>,
    pub artifact: Option<PathBuf>,
    /// `None` when there was no artifact to upload.
    pub upload: Option<UploadOutcome>,
}

/// Tunables for the session loop.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub countdown_delay: Duration,
    pub output_dir: PathBuf,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            countdown_delay: DEFAULT_COUNTDOWN_DELAY,
            output_dir: PathBuf::from("captures"),
        }
    }
}

/// Drives the booth: polls the link for a trigger, runs the cycle,
/// resets, and goes back to listening.
pub struct SessionController<L, S, C> {
    link: L,
    source: S,
    uploader: Uploader,
    clock: C,
    settings: SessionSettings,
    state: SessionState,
}

impl<L: CommandLink, S: FrameSource> SessionController<L, S, WallClock> {
    pub fn new(link: L, source: S, uploader: Uploader, settings: SessionSettings) -> Self {
        Self::with_clock(link, source, uploader, settings, WallClock)
    }
}

impl<L: CommandLink, S: FrameSource, C: Clock> SessionController<L, S, C> {
    pub fn with_clock(
        link: L,
        source: S,
        uploader: Uploader,
        settings: SessionSettings,
        clock: C,
    ) -> Self {
        Self {
            link,
            source,
            uploader,
            clock,
            settings,
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Main loop: poll for the trigger until shutdown is requested.
    ///
    /// There is deliberately no timeout on the wait; the booth idles
    /// indefinitely between visitors.
    pub fn run(&mut self) {
        println!("Listening for button press (Ctrl+C to exit)");
        while !shutdown_requested() {
            if let Some(report) = self.poll_once() {
                println!(
                    "Session complete: {} frame(s) captured",
                    report.frames.len()
                );
                println!("Listening for button press");
            }
            self.clock.sleep(POLL_INTERVAL);
        }
    }

    /// One idle-loop iteration: read at most one token, run a session if
    /// it is the trigger. All other tokens are ignored, not errors.
    pub fn poll_once(&mut self) -> Option<SessionReport> {
        match self.link.poll() {
            Some(token) if token == transport::START => {
                println!("Button pressed!");
                Some(self.run_session())
            }
            Some(token) => {
                log::debug!("Ignoring token '{}'", token);
                None
            }
            None => None,
        }
    }

    /// Run one full cycle. Infallible by construction: capture, assembly,
    /// and upload each report failure as a value, and the reset step runs
    /// unconditionally.
    fn run_session(&mut self) -> SessionReport {
        let triggered_at = Local::now();
        let timestamp = triggered_at.format(TIMESTAMP_FORMAT).to_string();

        self.state = SessionState::Counting;
        for step in transport::COUNTDOWN {
            self.link.send(step);
            self.clock.sleep(self.settings.countdown_delay);
        }
        self.link.send(transport::GO);
        self.clock.sleep(GO_SETTLE);

        self.state = SessionState::Capturing;
        println!("Capturing images...");
        let frames = self.source.capture_all(&self.settings.output_dir, &timestamp);

        self.state = SessionState::Assembling;
        let artifact = if frames.is_empty() {
            println!("No frames captured; skipping GIF");
            None
        } else {
            let output = self
                .settings
                .output_dir
                .join(format!("photobooth_{}.gif", timestamp));
            match assemble::assemble(&frames, &output) {
                Ok(Some(path)) => {
                    println!("GIF saved: {}", path.display());
                    Some(path)
                }
                Ok(None) => None,
                Err(e) => {
                    log::error!("GIF assembly failed: {}", e);
                    None
                }
            }
        };

        let upload = artifact.as_deref().map(|path| {
            self.state = SessionState::Uploading;
            let outcome = self.uploader.upload(path);
            match &outcome {
                UploadOutcome::Success(body) => println!("Upload succeeded: {}", body),
                UploadOutcome::Failed(error) => println!("Upload failed: {}", error),
                UploadOutcome::NotAttempted { reason } => println!("Upload skipped: {}", reason),
            }
            outcome
        });

        self.state = SessionState::Resetting;
        self.clock.sleep(RESET_PAUSE);
        self.link.send(transport::RESET);
        // Button presses during the session are stale by now; drop them
        // rather than chaining straight into another countdown.
        while self.link.poll().is_some() {}
        self.state = SessionState::Idle;

        SessionReport {
            triggered_at,
            frames,
            artifact,
            upload,
        }
    }

    /// Give the link and frame source back for orderly shutdown.
    pub fn into_parts(self) -> (L, S) {
        (self.link, self.source)
    }
}

/// Global flag for handling Ctrl+C across the application
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Check if shutdown has been requested.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler.
///
/// This should be called once at program startup.
pub fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}
