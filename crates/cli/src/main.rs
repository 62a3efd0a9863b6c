use clap::{Parser, ValueEnum};
use rtsp::media::mjpeg;
use rtsp::{Authenticator, BasicAuth, Credential, DigestAuth, Server, ServerConfig, SessionManager};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use std::{fs, io, thread};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum AuthScheme {
    Basic,
    Digest,
}

#[derive(Parser)]
#[command(
    name = "rtsp-server",
    about = "Standalone RTSP server streaming JPEG files as MJPEG"
)]
struct Args {
    /// Bind address (host:port)
    #[arg(long, short, default_value = "0.0.0.0:8554")]
    bind: String,

    /// Require this username (with --password)
    #[arg(long, requires = "password")]
    username: Option<String>,

    #[arg(long, requires = "username")]
    password: Option<String>,

    #[arg(long, value_enum, default_value = "basic")]
    auth: AuthScheme,

    #[arg(long, default_value = "rtsp-engine")]
    realm: String,

    /// JPEG file, or a directory of .jpg/.jpeg files played in name order
    #[arg(long)]
    jpeg: Option<PathBuf>,

    #[arg(long, default_value_t = 10)]
    fps: u32,

    /// Override the width read from the JPEG headers
    #[arg(long)]
    width: Option<u16>,

    /// Override the height read from the JPEG headers
    #[arg(long)]
    height: Option<u16>,

    #[arg(long, default_value_t = 50000)]
    udp_port_start: u16,

    #[arg(long, default_value_t = 51000)]
    udp_port_end: u16,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let frames = match &args.jpeg {
        Some(path) => match load_frames(path) {
            Ok(frames) if !frames.is_empty() => frames,
            Ok(_) => {
                eprintln!("No JPEG files found in {}", path.display());
                return ExitCode::FAILURE;
            }
            Err(e) => {
                eprintln!("Failed to read {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Vec::new(),
    };

    let config = ServerConfig {
        udp_port_range: (args.udp_port_start, args.udp_port_end),
        ..ServerConfig::default()
    };
    let mut server = match authenticator(&args) {
        Some(auth) => Server::with_auth(&args.bind, config, auth),
        None => Server::with_config(&args.bind, config),
    };

    if let Err(e) = server.start() {
        eprintln!("Failed to start server: {}", e);
        return ExitCode::FAILURE;
    }

    let running = Arc::new(AtomicBool::new(true));
    let reaper = spawn_reaper(server.session_manager().clone(), running.clone());
    let source = (!frames.is_empty()).then(|| {
        spawn_frame_source(
            server.session_manager().clone(),
            frames,
            &args,
            running.clone(),
        )
    });

    println!("RTSP server on {}, press Enter to stop", args.bind);
    let mut input = String::new();
    let _ = io::stdin().read_line(&mut input);

    running.store(false, Ordering::SeqCst);
    let _ = reaper.join();
    if let Some(source) = source {
        let _ = source.join();
    }
    server.stop();
    ExitCode::SUCCESS
}

fn authenticator(args: &Args) -> Option<Arc<dyn Authenticator>> {
    let (username, password) = (args.username.as_ref()?, args.password.as_ref()?);
    let credential = Credential::new(username, password, &args.realm);
    Some(match args.auth {
        AuthScheme::Basic => Arc::new(BasicAuth::new(credential)),
        AuthScheme::Digest => Arc::new(DigestAuth::new(credential)),
    })
}

fn load_frames(path: &Path) -> io::Result<Vec<Vec<u8>>> {
    if !path.is_dir() {
        return Ok(vec![fs::read(path)?]);
    }
    let mut files: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        })
        .collect();
    files.sort();
    files.iter().map(fs::read).collect()
}

/// Calls `check_timeouts` once per second.
fn spawn_reaper(sessions: SessionManager, running: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_secs(1));
            let report = sessions.check_timeouts();
            if report.removed > 0 {
                tracing::info!(removed = report.removed, remaining = report.sessions, "reaped idle sessions");
            }
            tracing::trace!(sessions = report.sessions, playing = report.playing, "keepalive check");
        }
    })
}

/// Loops the frames forever at `--fps`.
fn spawn_frame_source(
    sessions: SessionManager,
    frames: Vec<Vec<u8>>,
    args: &Args,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    let interval = Duration::from_secs(1) / args.fps.max(1);
    let (width, height) = (args.width, args.height);
    thread::spawn(move || {
        let start = Instant::now();
        let mut next = start;
        for frame in frames.iter().cycle() {
            if !running.load(Ordering::SeqCst) {
                break;
            }
            let (w, h) = mjpeg::frame_dimensions(frame).unwrap_or((0, 0));
            let timestamp_ms = start.elapsed().as_millis() as u32;
            if let Err(e) = sessions.feed_frame(timestamp_ms, frame, width.unwrap_or(w), height.unwrap_or(h)) {
                tracing::warn!(error = %e, "frame dropped");
            }
            next += interval;
            thread::sleep(next.saturating_duration_since(Instant::now()));
        }
    })
}
