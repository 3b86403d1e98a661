use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use photobooth::camera::{self, CaptureBank, Resolution};
use photobooth::config::Config;
use photobooth::session::{
    setup_ctrlc_handler, SessionController, SessionSettings, DEFAULT_COUNTDOWN_DELAY,
};
use photobooth::transport::{self, Transport};
use photobooth::upload::{Uploader, DEFAULT_TIMEOUT};

/// Parse and validate the countdown delay (seconds, > 0)
fn parse_delay(s: &str) -> Result<f64, String> {
    let delay: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if delay <= 0.0 {
        return Err(format!("Countdown delay must be positive, got {}", delay));
    }
    Ok(delay)
}

/// photobooth: serial-triggered countdown, capture, GIF, upload
#[derive(Parser, Debug)]
#[command(name = "photobooth")]
#[command(version, about = "Button-triggered photobooth controller", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Run with defaults (auto-detected serial port, 3 cameras)
    photobooth

    # Explicit port and faster countdown
    photobooth --port /dev/ttyACM0 --delay 0.5

    # Two cameras into a custom directory, uploading to a gallery
    photobooth --cameras 2 --output-dir /srv/booth --endpoint https://gallery.example/api/images

    # See what hardware is attached
    photobooth list-ports
    photobooth list-cameras")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Serial port (e.g. /dev/ttyUSB0, COM3)
    #[arg(long)]
    port: Option<String>,

    /// Baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Delay between countdown steps in seconds
    #[arg(long, value_parser = parse_delay)]
    delay: Option<f64>,

    /// Number of cameras to capture with
    #[arg(long)]
    cameras: Option<usize>,

    /// Highest device index to probe when scanning for cameras
    #[arg(long)]
    probe_ceiling: Option<u32>,

    /// Directory for captured frames and assembled GIFs
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Upload endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Config file path
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available serial ports
    ListPorts,
    /// List available cameras
    ListCameras,
}

/// Load .env before anything reads the environment.
///
/// Does not override existing environment variables.
fn load_env() {
    // dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
}

fn run_list_ports() -> Result<(), serialport::Error> {
    let ports = transport::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    println!("Available serial ports:");
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(info) => {
                let product = info.product.unwrap_or_else(|| "USB serial".to_string());
                println!("  {} ({})", port.port_name, product);
            }
            _ => println!("  {}", port.port_name),
        }
    }
    Ok(())
}

fn run_list_cameras() -> Result<(), camera::CameraError> {
    let cameras = camera::list_cameras()?;
    if cameras.is_empty() {
        println!("No cameras found");
        return Ok(());
    }
    println!("Available cameras:");
    for info in cameras {
        println!("  {}", info);
    }
    Ok(())
}

fn run_booth(cli: Cli) {
    // Config file: explicit --config must exist; the default path may not.
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    config.apply_env();

    // Merge settings: CLI args > config file > env > built-in defaults
    let port = cli
        .port
        .or(config.serial.port)
        .unwrap_or_else(transport::default_port);
    let baud = cli.baud.or(config.serial.baud).unwrap_or(transport::DEFAULT_BAUD);
    let delay = cli
        .delay
        .or(config.serial.countdown_delay_secs)
        .map(Duration::from_secs_f64)
        .unwrap_or(DEFAULT_COUNTDOWN_DELAY);
    let cameras = cli
        .cameras
        .or(config.capture.cameras)
        .unwrap_or(camera::DEFAULT_CAMERA_COUNT);
    let probe_ceiling = cli
        .probe_ceiling
        .or(config.capture.probe_ceiling)
        .unwrap_or(camera::DEFAULT_PROBE_CEILING);
    let output_dir = cli
        .output_dir
        .or(config.capture.output_dir)
        .unwrap_or_else(|| PathBuf::from("captures"));
    let resolution = Resolution {
        width: config.capture.width.unwrap_or(Resolution::default().width),
        height: config.capture.height.unwrap_or(Resolution::default().height),
    };
    let endpoint = cli.endpoint.or(config.upload.endpoint);
    let token = config.upload.token;
    let timeout = config
        .upload
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    println!("Photobooth controller");
    println!("  Port: {}", port);
    println!("  Baud rate: {}", baud);
    println!("  Countdown delay: {:.1}s", delay.as_secs_f64());
    println!("  Cameras: {}", cameras);
    println!("  Output directory: {}", output_dir.display());
    match &endpoint {
        Some(endpoint) => println!("  Upload endpoint: {}", endpoint),
        None => eprintln!("Warning: no upload endpoint configured; GIFs stay local."),
    }
    println!();

    if let Err(e) = setup_ctrlc_handler() {
        eprintln!("Warning: failed to install Ctrl+C handler: {}", e);
    }

    let link = match Transport::open(&port, baud) {
        Ok(link) => link,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nTroubleshooting:");
            eprintln!("  1. Check that the controller board is connected via USB");
            eprintln!("  2. Verify the correct port with `photobooth list-ports`");
            eprintln!("  3. Try a different port with --port");
            std::process::exit(1);
        }
    };

    let bank = CaptureBank::initialize(cameras, probe_ceiling, resolution);

    let uploader = match Uploader::new(endpoint, token, timeout) {
        Ok(uploader) => uploader,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let settings = SessionSettings {
        countdown_delay: delay,
        output_dir,
    };
    let mut controller = SessionController::new(link, bank, uploader, settings);
    controller.run();

    // Orderly shutdown: release the cameras, then close the link (which
    // sends a final RESET so the rig is not left mid-countdown).
    let (link, mut bank) = controller.into_parts();
    bank.release_all();
    link.close();
}

fn main() {
    load_env();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::ListPorts) => {
            if let Err(e) = run_list_ports() {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Command::ListCameras) => {
            if let Err(e) = run_list_cameras() {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        None => run_booth(cli),
    }
}
