use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use stillframe::ffmpeg::{FfmpegLogLevel, FfmpegSampleSource, probe_track, set_ffmpeg_log_level};
use stillframe::{
    ExtractOptions, ExtractionRequest, FrameRect, ImageDecoder, OutputFrame, PixelFormat,
    ProgressCallback, ProgressInfo, SeekMode, ThreadingMode, TrackDescriptor, TrackKind,
    VideoFrameDecoder, metadata_only,
};

const CLI_AFTER_HELP: &str = "Examples:\n  stillframe probe input.mp4 --json\n  stillframe frame input.mp4 --out thumb.png --time 0:00:05 --seek-mode closest\n  stillframe frame photo.heic --out crop.png --rect 0,0,512,512\n  stillframe completions zsh > _stillframe";

#[derive(Debug, Parser)]
#[command(
    name = "stillframe",
    version,
    about = "Extract a single frame or still image from a media file",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar while decoding.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    /// Tile feeding for images (auto, single, multi).
    #[arg(long)]
    threads: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Describe the video track of a media file.
    #[command(
        about = "Print track information",
        visible_alias = "info",
        after_help = "Examples:\n  stillframe probe input.mp4\n  stillframe probe input.mp4 --json"
    )]
    Probe {
        /// Input media path.
        input: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract one frame (video) or one rect (image) to an image file.
    #[command(
        about = "Extract a single frame",
        after_help = "Examples:\n  stillframe frame input.mp4 --out thumb.png\n  stillframe frame input.mp4 --out exact.png --time 12.5 --seek-mode closest\n  stillframe frame input.mp3 --out cover.jpg --embedded"
    )]
    Frame {
        /// Input media path.
        input: PathBuf,
        /// Output image path; the extension picks the encoding.
        #[arg(long)]
        out: PathBuf,
        /// Target time (seconds, MM:SS or HH:MM:SS). Defaults to the track's thumbnail time.
        #[arg(long)]
        time: Option<String>,
        /// Seek mode: previous | next | closest-sync | closest.
        #[arg(long, default_value = "previous")]
        seek_mode: String,
        /// Pixel format: rgb8 | rgba8 | bgra8 | rgb565 | gray8.
        #[arg(long, default_value = "rgb8")]
        pixel_format: String,
        /// Rect to extract from an image, as left,top,right,bottom.
        #[arg(long)]
        rect: Option<String>,
        /// Use the embedded thumbnail instead of decoding.
        #[arg(long)]
        embedded: bool,
        /// Apply the track rotation before saving.
        #[arg(long)]
        oriented: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::from_secs_f64(seconds.max(0.0)));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::from_secs_f64(total_seconds.max(0.0)))
}

fn parse_rect(value: &str) -> Result<FrameRect, Box<dyn std::error::Error>> {
    let edges = value
        .split(',')
        .map(|edge| edge.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()?;
    match edges.as_slice() {
        &[left, top, right, bottom] => Ok(FrameRect::new(left, top, right, bottom)),
        _ => Err(format!("rect needs four edges, got {value}").into()),
    }
}

fn parse_seek_mode(value: &str) -> Option<SeekMode> {
    match value.to_ascii_lowercase().as_str() {
        "previous" | "previous-sync" => Some(SeekMode::PreviousSync),
        "next" | "next-sync" => Some(SeekMode::NextSync),
        "closest-sync" | "nearest" => Some(SeekMode::ClosestSync),
        "closest" | "exact" => Some(SeekMode::Closest),
        _ => None,
    }
}

fn parse_pixel_format(value: &str) -> Option<PixelFormat> {
    match value.to_ascii_lowercase().as_str() {
        "rgb8" | "rgb" => Some(PixelFormat::Rgb8),
        "rgba8" | "rgba" => Some(PixelFormat::Rgba8),
        "bgra8" | "bgra" => Some(PixelFormat::Bgra8),
        "rgb565" | "565" => Some(PixelFormat::Rgb565),
        "gray8" | "gray" | "greyscale" | "grayscale" => Some(PixelFormat::Gray8),
        _ => None,
    }
}

fn parse_threading(value: &str) -> Option<ThreadingMode> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Some(ThreadingMode::Auto),
        "single" | "1" => Some(ThreadingMode::SingleThreaded),
        "multi" | "2" => Some(ThreadingMode::MultiThreaded),
        _ => None,
    }
}

fn parse_log_level(value: &str) -> Option<FfmpegLogLevel> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(FfmpegLogLevel::Quiet),
        "panic" => Some(FfmpegLogLevel::Panic),
        "fatal" => Some(FfmpegLogLevel::Fatal),
        "error" => Some(FfmpegLogLevel::Error),
        "warning" | "warn" => Some(FfmpegLogLevel::Warning),
        "info" => Some(FfmpegLogLevel::Info),
        "verbose" => Some(FfmpegLogLevel::Verbose),
        "debug" => Some(FfmpegLogLevel::Debug),
        "trace" => Some(FfmpegLogLevel::Trace),
        _ => None,
    }
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

/// Mirrors decoder progress onto a terminal spinner.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template(
            "{spinner:.green} {bar:40.cyan/blue} {pos} {msg}",
        )?);
        bar.enable_steady_tick(Duration::from_millis(100));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
        if let Some(pts) = info.current_pts_us {
            self.bar.set_message(format!("{:.3}s", pts as f64 / 1_000_000.0));
        }
    }
}

fn extract_options(
    global: &GlobalOptions,
) -> Result<(ExtractOptions, Option<ProgressBar>), Box<dyn std::error::Error>> {
    let mut options = ExtractOptions::new();
    let mut bar = None;

    if let Some(threads) = &global.threads {
        let mode =
            parse_threading(threads).ok_or(format!("unsupported --threads mode: {threads}"))?;
        options = options.with_threading(mode);
    }

    if global.progress {
        let progress = TerminalProgress::new()?;
        bar = Some(progress.bar.clone());
        options = options.with_progress(Arc::new(progress)).with_batch_size(1);
    }

    Ok((options, bar))
}

fn track_json(track: &TrackDescriptor) -> serde_json::Value {
    json!({
        "codec": track.codec.to_string(),
        "kind": match track.kind {
            TrackKind::Video => "video",
            TrackKind::Image => "image",
        },
        "width": track.width,
        "height": track.height,
        "duration_seconds": track.duration.as_secs_f64(),
        "frame_rate": track.frame_rate,
        "rotation": track.rotation.degrees(),
        "grid": track.grid.map(|grid| json!({
            "rows": grid.rows,
            "columns": grid.columns,
            "tile_width": grid.tile_width,
            "tile_height": grid.tile_height,
        })),
        "embedded_thumbnail": track.embedded_thumbnail.is_some(),
    })
}

fn decode_frame(
    input: &Path,
    track: &TrackDescriptor,
    request: &ExtractionRequest,
    options: ExtractOptions,
) -> Result<OutputFrame, Box<dyn std::error::Error>> {
    let mut source = FfmpegSampleSource::open(input)?;
    let mut session = source.decoder_session()?;
    let component = format!("ffmpeg.{}", track.codec);

    let frame = match track.kind {
        TrackKind::Video => VideoFrameDecoder::video(component, track, &mut source, &mut session)
            .with_options(options)
            .extract(request)?,
        TrackKind::Image => ImageDecoder::image(component, track, &mut source, &mut session)
            .with_options(options)
            .extract(request)?,
    };
    Ok(frame)
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(level) = &cli.global.log_level {
        let parsed = parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
        set_ffmpeg_log_level(parsed);
    }

    match cli.command {
        Commands::Probe { input, json } => {
            let track = probe_track(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&track_json(&track))?);
            } else {
                println!("{} {}", "file:".bold(), input.display());
                println!("{} {}", "codec:".bold(), track.codec);
                println!("{} {}x{}", "size:".bold(), track.width, track.height);
                println!("{} {:.3}s", "duration:".bold(), track.duration.as_secs_f64());
                if let Some(rate) = track.frame_rate {
                    println!("{} {rate:.3}", "frame rate:".bold());
                }
                println!("{} {}°", "rotation:".bold(), track.rotation.degrees());
                if track.embedded_thumbnail.is_some() {
                    println!("{} yes", "embedded thumbnail:".bold());
                }
            }
        }
        Commands::Frame {
            input,
            out,
            time,
            seek_mode,
            pixel_format,
            rect,
            embedded,
            oriented,
        } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let track = probe_track(&input)?;
            let pixel_format = parse_pixel_format(&pixel_format)
                .ok_or(format!("unsupported --pixel-format: {pixel_format}"))?;

            let frame = if embedded {
                metadata_only(&track, pixel_format, true)?
            } else {
                let seek_mode = parse_seek_mode(&seek_mode)
                    .ok_or(format!("unsupported --seek-mode: {seek_mode}"))?;
                let mut request = ExtractionRequest::new()
                    .with_seek_mode(seek_mode)
                    .with_pixel_format(pixel_format);
                if let Some(time) = &time {
                    request = request.at_time(parse_timecode(time)?);
                }
                if let Some(rect) = &rect {
                    request = request.with_rect(parse_rect(rect)?);
                }

                let (options, bar) = extract_options(&cli.global)?;
                let frame = decode_frame(&input, &track, &request, options)?;
                if let Some(bar) = bar {
                    bar.finish_with_message("done");
                }
                frame
            };

            if cli.global.verbose {
                eprintln!(
                    "decoded {}x{} {:?} frame (pts {:?})",
                    frame.width, frame.height, frame.pixel_format, frame.pts_us
                );
            }
            if oriented {
                frame.to_oriented_image()?.save(&out)?;
            } else {
                frame.save(&out)?;
            }
            println!("{} {}", "saved".green().bold(), out.display());
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "stillframe", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
