use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use video_leech::downloader::models::FormatChoice;
use video_leech::downloader::progress::human_size;
use video_leech::{
    DirectorySink, FfmpegTranscoder, LeechConfig, LeechError, LeechResult, PipelineOrchestrator,
    RequesterId, ToolManager, ToolType, YtDlpExtractor,
};

/// Requester id used for local runs
const LOCAL_REQUESTER: RequesterId = RequesterId(0);

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(author, version, about = "Fetch a video, make it streamable, split it into parts", long_about = None)]
pub struct Cli {
    /// TOML config file; environment variables are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the selectable resolutions for a URL
    Formats { url: String },
    /// Run the whole pipeline and write the parts to a directory
    Fetch {
        url: String,
        /// Highest resolution to accept
        #[arg(long, conflicts_with = "format")]
        height: Option<u32>,
        /// Exact format id from `formats`
        #[arg(long)]
        format: Option<String>,
        /// Output directory for the parts
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Show discovered yt-dlp / ffmpeg / ffprobe binaries
    Tools,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "video_leech=info,leech=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {}", err.user_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> LeechResult<()> {
    let config = match &cli.config {
        Some(path) => LeechConfig::load(path)?,
        None => LeechConfig::from_env()?,
    };
    let tools = ToolManager::with_overrides(
        config.ytdlp_path.clone(),
        config.ffmpeg_path.clone(),
        config.ffprobe_path.clone(),
    );

    match cli.command {
        Commands::Tools => {
            for tool in tools.get_all_tools() {
                let status = if tool.is_available { "ok" } else { "missing" };
                let detail = tool
                    .version
                    .clone()
                    .or_else(|| tool.path.clone())
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<8} {:<10} {}", tool.name, status, detail);
            }
            Ok(())
        }
        Commands::Formats { url } => {
            let orchestrator = build(&config, &tools, PathBuf::from("."));
            let submission = orchestrator.submit(&url, LOCAL_REQUESTER).await?;
            println!("{}", submission.title);
            for choice in &submission.choices {
                println!(
                    "  {:<8} id={:<12} ~{}",
                    choice.label,
                    choice.format_id,
                    human_size(choice.estimated_size_bytes)
                );
            }
            Ok(())
        }
        Commands::Fetch {
            url,
            height,
            format,
            out,
        } => {
            let orchestrator = Arc::new(build(&config, &tools, out));
            let submission = orchestrator.submit(&url, LOCAL_REQUESTER).await?;
            let format_id = pick_format(&submission.choices, height, format)?;
            info!(title = %submission.title, format = %format_id, "selected");

            let token = submission.token.clone();
            let canceller = orchestrator.clone();
            let cancel_token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling");
                    canceller.cancel(&cancel_token);
                }
            });

            // Sessions past their TTL are dropped and their runs cancelled
            let sweeper = orchestrator.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    sweeper.sweep_expired();
                }
            });

            let report = orchestrator.run(&token, &format_id).await?;
            println!(
                "{} part(s), {}",
                report.parts_delivered,
                human_size(report.total_bytes)
            );
            Ok(())
        }
    }
}

fn build(config: &LeechConfig, tools: &ToolManager, out: PathBuf) -> PipelineOrchestrator {
    let extractor = Arc::new(YtDlpExtractor::new(
        tools.resolve(ToolType::YtDlp),
        config.metadata_timeout_secs,
    ));
    let transcoder = Arc::new(FfmpegTranscoder::new(
        tools.resolve(ToolType::Ffmpeg),
        tools.resolve(ToolType::Ffprobe),
    ));
    let sink = Arc::new(DirectorySink::new(out));
    PipelineOrchestrator::new(config, extractor, transcoder, sink)
}

/// Exact id if given, else the best choice at or below `height`, else the best
fn pick_format(
    choices: &[FormatChoice],
    height: Option<u32>,
    format: Option<String>,
) -> LeechResult<String> {
    if let Some(id) = format {
        return if choices.iter().any(|c| c.format_id == id) {
            Ok(id)
        } else {
            Err(LeechError::FormatNotOffered(id))
        };
    }

    let picked = match height {
        Some(h) => choices
            .iter()
            .find(|c| c.height > 0 && c.height <= h)
            .or_else(|| choices.last()),
        None => choices.first(),
    };
    picked
        .map(|c| c.format_id.clone())
        .ok_or(LeechError::NoFormatsAvailable)
}
