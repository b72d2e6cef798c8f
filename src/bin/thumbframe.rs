use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use thumbframe::{
    ByteSource, FfmpegLogLevel, MediaSession, OperationType, Orientation, ProgressCallback,
    ProgressInfo, ScoringStrategy, SelectionRequest, SessionOptions,
};

const CLI_AFTER_HELP: &str = "Examples:\n  thumbframe meta input.mp4 --json\n  thumbframe grab input.mp4 --out thumb.jpg\n  thumbframe grab input.webm --out thumb.png --at 00:00:03 --alpha\n  cat input.mkv | thumbframe grab - --out thumb.jpg --position 0.5\n  thumbframe completions zsh > _thumbframe";

#[derive(Debug, Parser)]
#[command(
    name = "thumbframe",
    version,
    about = "Pick a thumbnail frame and metadata out of a video or cover-art stream",
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
    /// Show additional output.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar while frames are scanned.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,

    /// Read the input as a forward-only stream, even if it is a file.
    #[arg(long)]
    stream: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print metadata for a media file.
    #[command(
        about = "Print media metadata",
        visible_alias = "probe",
        after_help = "Examples:\n  thumbframe meta input.mp4\n  thumbframe meta input.mp3 --json"
    )]
    Meta {
        /// Input media path, or `-` for stdin.
        input: String,

        /// Output metadata as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Select a frame and save it as an image.
    #[command(
        about = "Save a thumbnail frame",
        after_help = "Examples:\n  thumbframe grab input.mp4 --out thumb.jpg\n  thumbframe grab input.mp4 --out thumb.png --frame 120\n  thumbframe grab input.mp4 --out thumb.png --position 0.25 --representative"
    )]
    Grab {
        /// Input media path, or `-` for stdin.
        input: String,
        /// Output image path; the extension picks the format.
        #[arg(long)]
        out: PathBuf,
        /// 1-based frame index.
        #[arg(long, conflicts_with_all = ["at", "position"])]
        frame: Option<u64>,
        /// Timestamp (seconds, MM:SS or HH:MM:SS).
        #[arg(long, conflicts_with = "position")]
        at: Option<String>,
        /// Fraction of the duration, 0.0 to 1.0.
        #[arg(long)]
        position: Option<f64>,
        /// Cap how many frames may be decoded.
        #[arg(long)]
        max_frames: Option<u64>,
        /// Export RGBA instead of RGB.
        #[arg(long)]
        alpha: bool,
        /// Pick the frame closest to the average instead of the most detailed one.
        #[arg(long)]
        representative: bool,
        /// Keep the stored orientation instead of rotating upright.
        #[arg(long)]
        no_rotate: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::try_from_secs_f64(seconds.max(0.0))?);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [minutes, seconds] => (0, minutes.parse::<u64>()?, seconds),
        [hours, minutes, seconds] => (hours.parse::<u64>()?, minutes.parse::<u64>()?, seconds),
        _ => return Err(format!("invalid time format: {trimmed}").into()),
    };
    let total = hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds.parse::<f64>()?;
    Ok(Duration::try_from_secs_f64(total.max(0.0))?)
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

fn parse_request(
    frame: Option<u64>,
    at: Option<&str>,
    position: Option<f64>,
) -> Result<SelectionRequest, Box<dyn std::error::Error>> {
    Ok(match (frame, at, position) {
        (Some(index), _, _) => SelectionRequest::Frame(index),
        (_, Some(at), _) => SelectionRequest::Duration(parse_timecode(at)?),
        (_, _, Some(position)) => SelectionRequest::Position(position),
        _ => SelectionRequest::Best,
    })
}

fn open_source(input: &str, stream: bool) -> Result<ByteSource, Box<dyn std::error::Error>> {
    if input == "-" {
        let stdin: Box<dyn Read + Send> = Box::new(std::io::stdin());
        return Ok(ByteSource::from_reader(stdin, None));
    }
    if stream {
        let file = File::open(input)?;
        let size = file.metadata()?.len();
        return Ok(ByteSource::from_reader(file, Some(size)));
    }
    Ok(ByteSource::open_file(input)?)
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

fn upright(image: DynamicImage, orientation: Orientation) -> DynamicImage {
    // rotation_degrees is counter-clockwise; image rotates clockwise.
    match orientation.rotation_degrees() {
        90 => image.rotate270(),
        180 => image.rotate180(),
        270 => image.rotate90(),
        _ => image,
    }
}

fn session_options(global: &GlobalOptions) -> Result<SessionOptions, Box<dyn std::error::Error>> {
    let mut options = SessionOptions::new();
    if global.progress {
        options = options.with_progress(Arc::new(TerminalProgress::new()?));
    }
    Ok(options)
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(level) = &global.log_level {
        let parsed = parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
        thumbframe::set_ffmpeg_log_level(parsed);
    }
    if global.verbose {
        thumbframe::set_log_handler(|level, message| {
            eprintln!("{} {message}", format!("[ffmpeg {level:?}]").dimmed());
        });
    }
    Ok(())
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        let label = match info.operation {
            OperationType::FrameScan => "scanning frames",
            OperationType::DurationProbe => "measuring duration",
            _ => "working",
        };
        self.bar.set_message(label);
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
    }
}

impl Drop for TerminalProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Meta { input, json } => {
            let source = open_source(&input, cli.global.stream)?;
            let session = MediaSession::open_with_options(source, session_options(&cli.global)?)?;
            let metadata = session.metadata();
            if json {
                println!("{}", serde_json::to_string_pretty(metadata)?);
            } else {
                println!("Duration: {:?}", metadata.duration);
                if metadata.has_video {
                    println!(
                        "Video: {}x{}{}{}",
                        metadata.width,
                        metadata.height,
                        metadata.fps.map(|fps| format!(" @ {fps:.2} fps")).unwrap_or_default(),
                        if metadata.has_alpha { " (alpha)" } else { "" },
                    );
                    println!("Orientation: {}", metadata.orientation.code());
                }
                println!("Audio: {}", if metadata.has_audio { "yes" } else { "no" });
                if !metadata.title.is_empty() {
                    println!("Title: {}", metadata.title);
                }
                if !metadata.artist.is_empty() {
                    println!("Artist: {}", metadata.artist);
                }
            }
        }
        Commands::Grab {
            input,
            out,
            frame,
            at,
            position,
            max_frames,
            alpha,
            representative,
            no_rotate,
        } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let request = parse_request(frame, at.as_deref(), position)?;

            let mut options = session_options(&cli.global)?;
            if let Some(max_frames) = max_frames {
                options = options.with_max_frames(max_frames);
            }
            if representative {
                options = options.with_scoring(ScoringStrategy::Representative);
            }

            let source = open_source(&input, cli.global.stream)?;
            let mut session = MediaSession::open_with_options(source, options)?;
            let selected = session.select(request)?;
            let exported = session.export(if alpha { 4 } else { 3 })?;
            let orientation = session.metadata().orientation;
            session.close();

            let mut image = exported.into_image()?;
            if !no_rotate {
                image = upright(image, orientation);
            }
            image.save(&out)?;

            if cli.global.verbose {
                eprintln!(
                    "{} frame {} at {:.3}s -> {}",
                    "saved".green().bold(),
                    selected.index,
                    selected.timestamp.as_secs_f64(),
                    out.display()
                );
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "thumbframe", &mut std::io::stdout());
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_timecode_formats() {
        assert_eq!(parse_timecode("75").unwrap().as_secs(), 75);
        assert_eq!(parse_timecode("01:15").unwrap().as_secs(), 75);
        assert_eq!(
            parse_timecode("00:01:15.5").unwrap(),
            Duration::from_millis(75_500)
        );
        assert!(parse_timecode("").is_err());
        assert!(parse_timecode("1:2:3:4").is_err());
    }

    #[test]
    fn parse_timecode_rejects_unrepresentable_values() {
        assert!(parse_timecode("inf").is_err());
        assert!(parse_timecode("1e30").is_err());
        assert!(parse_timecode("00:00:1e30").is_err());
        assert!(parse_timecode("18446744073709551615:00:00").is_err());
        assert_eq!(parse_timecode("-3").unwrap(), Duration::ZERO);
    }

    #[test]
    fn request_precedence() {
        assert_eq!(parse_request(None, None, None).unwrap(), SelectionRequest::Best);
        assert_eq!(
            parse_request(Some(4), None, None).unwrap(),
            SelectionRequest::Frame(4)
        );
        assert_eq!(
            parse_request(None, Some("2"), None).unwrap(),
            SelectionRequest::Duration(Duration::from_secs(2))
        );
        assert_eq!(
            parse_request(None, None, Some(0.5)).unwrap(),
            SelectionRequest::Position(0.5)
        );
    }

    #[test]
    fn log_level_aliases() {
        assert_eq!(parse_log_level("WARN"), Some(FfmpegLogLevel::Warning));
        assert_eq!(parse_log_level("loud"), None);
    }

    #[test]
    fn rotation_is_applied_clockwise() {
        let image = DynamicImage::new_rgb8(4, 2);
        let rotated = upright(image.clone(), Orientation::Rotate90);
        assert_eq!((rotated.width(), rotated.height()), (2, 4));
        let unchanged = upright(image, Orientation::Normal);
        assert_eq!((unchanged.width(), unchanged.height()), (4, 2));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
