use std::{
    io::Write as _,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use svg2gif::{
    CaptureOpts, GifEncoderFactory, JobEvent, JobOrchestrator, OrchestratorOpts, RenderConfig,
    RenderOverrides, ResvgRasterizer, SamplePhase,
    capture::{CaptureDriver, PageDocument},
    pipeline::{analyze_with, viewport_for},
    plan::checked_plan,
};

#[derive(Parser, Debug)]
#[command(name = "svg2gif", version)]
struct Cli {
    /// Log debug output to stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert an animated SVG into a looping GIF.
    Render(RenderArgs),
    /// Print detected timing and the frame plan without rendering.
    Inspect(InspectArgs),
    /// Capture a single moment of the animation as a PNG.
    Frame(FrameArgs),
}

#[derive(clap::Args, Debug, Clone)]
struct SettingsArgs {
    /// Base settings as JSON; flags override individual fields.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    fps: Option<u32>,

    /// Canvas width in CSS pixels.
    #[arg(long)]
    width: Option<u32>,

    /// Device pixel scale.
    #[arg(long)]
    scale: Option<f64>,

    /// 1 (best) to 30 (fastest).
    #[arg(long)]
    quality: Option<u8>,

    /// Seconds to hold the last frame.
    #[arg(long)]
    hold: Option<f64>,

    /// Page background color.
    #[arg(long)]
    bg: Option<String>,
}

impl SettingsArgs {
    fn base(&self) -> anyhow::Result<RenderConfig> {
        Ok(match &self.config {
            Some(path) => RenderConfig::from_json_file(path)?,
            None => RenderConfig::default(),
        })
    }

    fn overrides(&self, output_name: Option<String>) -> RenderOverrides {
        RenderOverrides {
            fps: self.fps,
            width: self.width,
            scale: self.scale,
            quality: self.quality,
            hold_s: self.hold,
            background: self.bg.clone(),
            output_name,
        }
    }

    fn effective(&self) -> anyhow::Result<RenderConfig> {
        let cfg = self.overrides(None).apply(&self.base()?);
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input SVG.
    input: PathBuf,

    /// Output GIF path (defaults to the input path with a `.gif` extension).
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// How to report progress on stdout.
    #[arg(long, value_enum, default_value_t = EventFormat::Text)]
    events: EventFormat,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Input SVG.
    input: PathBuf,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input SVG.
    input: PathBuf,

    /// Animation time in seconds.
    #[arg(long, default_value_t = 0.0)]
    time: f64,

    /// Output PNG path.
    #[arg(short, long)]
    out: PathBuf,

    #[command(flatten)]
    settings: SettingsArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EventFormat {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Inspect(args) => cmd_inspect(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else if quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")
}

fn read_markup(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("read svg '{}'", path.display()))
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    Ok(())
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let markup = read_markup(&args.input)?;
    let base = args.settings.base()?;
    let input_name = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());
    let overrides = args.settings.overrides(input_name);
    let cfg = overrides.apply(&base);
    cfg.validate()?;

    let out = args
        .out
        .clone()
        .unwrap_or_else(|| args.input.with_extension("gif"));

    if args.events == EventFormat::Text {
        let spec = analyze_with(&markup, &cfg);
        let viewport = viewport_for(&spec, &cfg)?;
        println!("Input:    {}", args.input.display());
        println!("Output:   {}", out.display());
        println!(
            "Size:     {}x{} @ {}x",
            viewport.width, viewport.height, cfg.scale
        );
        println!("FPS:      {}", cfg.fps);
        println!(
            "Duration: {:.2}s + {:.2}s hold",
            spec.duration_s, cfg.hold_s
        );
    }

    let artifact = runtime()?.block_on(async {
        let orchestrator = JobOrchestrator::new(
            ResvgRasterizer::new(),
            GifEncoderFactory,
            base,
            OrchestratorOpts {
                max_concurrent_jobs: 1,
                ..Default::default()
            },
        );
        let id = orchestrator.submit(markup, &overrides)?;
        let mut events = orchestrator.subscribe(&id)?;

        let mut stdout = std::io::stdout().lock();
        while let Some(event) = events.next().await {
            match args.events {
                EventFormat::Json => writeln!(stdout, "{}", serde_json::to_string(&event)?)?,
                EventFormat::Text => print_event(&mut stdout, &event)?,
            }
            stdout.flush()?;
            if let JobEvent::Error { message } = &event {
                anyhow::bail!("conversion failed: {message}");
            }
        }

        anyhow::Ok(orchestrator.fetch_result(&id)?)
    })?;

    ensure_parent_dir(&out)?;
    std::fs::write(&out, artifact.bytes.as_slice())
        .with_context(|| format!("write gif '{}'", out.display()))?;

    if args.events == EventFormat::Text {
        println!(
            "Done: {} ({:.1} KB)",
            out.display(),
            artifact.len() as f64 / 1024.0
        );
    }
    Ok(())
}

fn print_event(out: &mut impl std::io::Write, event: &JobEvent) -> std::io::Result<()> {
    match event {
        JobEvent::Progress(p) => match p.phase {
            SamplePhase::Sampling => write!(out, "\rFrame {} / {}", p.current_index, p.total_count),
            SamplePhase::Holding => writeln!(out, "\nAdding hold frame..."),
        },
        JobEvent::Done { .. } | JobEvent::Error { .. } => Ok(()),
    }
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let markup = read_markup(&args.input)?;
    let cfg = args.settings.effective()?;
    let spec = analyze_with(&markup, &cfg);
    let frames = checked_plan(&spec, &cfg)?;
    let viewport = viewport_for(&spec, &cfg)?;

    println!("duration: {:.3}s", spec.duration_s);
    match spec.aspect_ratio {
        Some(ratio) => println!("aspect ratio: {ratio:.4}"),
        None => println!("aspect ratio: none (square canvas)"),
    }
    println!("canvas: {}x{}", viewport.width, viewport.height);
    println!(
        "frames: {} ({} intervals at {} fps + hold of {:.2}s)",
        frames.len(),
        frames.regular_count(),
        cfg.fps,
        cfg.hold_s
    );
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let markup = read_markup(&args.input)?;
    let cfg = args.settings.effective()?;
    let spec = analyze_with(&markup, &cfg);
    let viewport = viewport_for(&spec, &cfg)?;
    let page = PageDocument::new(markup, &viewport, cfg.background_rgba()?);

    let frame = runtime()?.block_on(async {
        let rasterizer = ResvgRasterizer::new();
        let mut driver =
            CaptureDriver::start(&rasterizer, viewport, &page, &CaptureOpts::default()).await?;
        let captured = driver.capture(args.time).await;
        driver.close().await?;
        anyhow::Ok(captured?)
    })?;

    ensure_parent_dir(&args.out)?;
    image::save_buffer_with_format(
        &args.out,
        &frame.to_straight_rgba(),
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
