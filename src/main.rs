//! VRM ASMR Stage - headless driver
//!
//! Mounts the stage with a headless renderer and a stereo voice, loads an
//! avatar and feeds display callbacks until the frame budget runs out or the
//! process is interrupted.

use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vrm_asmr::{
    audio::StereoVoice,
    config::Config,
    render::HeadlessRenderer,
    stage::{Collaborators, FrameOutcome, LifecycleManager, MonotonicClock, OrbitRig, StageEvent},
};

/// VRM ASMR Stage - drive a VRM avatar headless
#[derive(Parser, Debug)]
#[command(name = "vrm-asmr", version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Avatar file (overrides config)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Idle animation clip (overrides config)
    #[arg(long)]
    idle_clip: Option<PathBuf>,

    /// Stop after this many rendered frames
    #[arg(short, long)]
    frames: Option<u64>,

    /// Host display callback rate in Hz
    #[arg(long, default_value_t = 240.0)]
    fps: f64,

    /// Keep the camera on the avatar
    #[arg(long)]
    follow_camera: bool,

    /// Hide the microphone prop
    #[arg(long)]
    hide_microphone: bool,

    /// Constant voice level fed to lip sync; above 0 the voice counts as playing
    #[arg(long, default_value_t = 0.0)]
    volume: f32,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(log_level.into())
                .from_env_lossy(),
        )
        .init();

    info!("Starting {} v{}", vrm_asmr::NAME, vrm_asmr::VERSION);

    if args.fps.is_nan() || args.fps <= 0.0 {
        anyhow::bail!("--fps must be greater than 0");
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(args))?;

    info!("Stage stopped");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = if let Some(ref path) = args.config {
        Config::from_file(path)?
    } else {
        Config::load()?
    };

    if let Some(ref model) = args.model {
        config.avatar.default_model_path = model.clone();
    }
    if let Some(ref clip) = args.idle_clip {
        config.avatar.idle_clip_path = Some(clip.clone());
    }
    if args.hide_microphone {
        config.microphone.visible = false;
    }

    config.validate()?;
    Ok(config)
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    info!("Avatar: {}", config.avatar.default_model_path.display());
    info!("Target rate: {} fps, host rate: {} Hz", config.frame.target_fps, args.fps);

    let renderer = HeadlessRenderer::new();
    let voice = StereoVoice::new();
    voice.set_playing(args.volume > 0.0);

    let mut stage = LifecycleManager::new(
        config.clone(),
        Collaborators {
            renderer: Box::new(renderer.clone()),
            controls: Box::new(OrbitRig::new(&config.camera)),
            audio: Box::new(voice.clone()),
            clock: Box::new(MonotonicClock::new()),
        },
    );
    let mut events = stage.subscribe();

    stage.mount()?;
    stage.set_follow_camera(args.follow_camera);
    stage.set_voice_volume(args.volume);
    stage.request_default_avatar();

    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / args.fps));
    let start = Instant::now();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let ts = start.elapsed().as_secs_f64() * 1000.0;
                match stage.on_frame(ts) {
                    FrameOutcome::Rendered { frame, .. } => {
                        if args.frames.is_some_and(|limit| frame >= limit) {
                            info!("Frame budget reached");
                            break;
                        }
                    }
                    FrameOutcome::Skipped => {}
                    FrameOutcome::Stopped => break,
                }
                log_events(&mut events);
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    stage.teardown();
    log_events(&mut events);

    let (left, right) = voice.gains();
    info!(
        "Rendered {} frames; voice gains L {:.3} R {:.3}; {} renderer resources still live",
        renderer.frames_rendered(),
        left,
        right,
        renderer.live_count()
    );
    Ok(())
}

fn log_events(events: &mut tokio::sync::broadcast::Receiver<StageEvent>) {
    loop {
        match events.try_recv() {
            Ok(StageEvent::CameraUpdated(_)) => {}
            Ok(StageEvent::AvatarPlaced(root)) => info!("Avatar placed at {:?}", root),
            Ok(StageEvent::LoadingChanged(loading)) => {
                info!("{}", if loading { "Loading avatar..." } else { "Loading finished" })
            }
            Ok(StageEvent::LoadFailed(message)) => error!("{}", message),
            Err(TryRecvError::Lagged(n)) => warn!("Dropped {} stage events", n),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
