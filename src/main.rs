use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use transcript_clipper::captions::CaptionSource;
use transcript_clipper::{
    create_llm, format_transcript, ClipError, ClipPipeline, Config, DirectoryCaptionSource,
    ExtractionMode, PromptSet,
};

fn cli() -> Command {
    Command::new("Transcript Clipper")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Find topic and highlight clip ranges in podcast transcripts")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (defaults to transcript-clipper.toml)")
                .global(true),
        )
        .arg(
            Arg::new("captions-dir")
                .long("captions-dir")
                .value_name("DIR")
                .help("Directory containing <video>.json or <video>.srt captions")
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("topic")
                .about("Ranges where a topic is discussed")
                .arg(video_arg())
                .arg(
                    Arg::new("topic")
                        .short('t')
                        .long("topic")
                        .value_name("TEXT")
                        .help("Topic to search for")
                        .required(true),
                )
                .arg(output_arg()),
        )
        .subcommand(
            Command::new("highlights")
                .about("Ranges interesting enough for a short clip")
                .arg(video_arg())
                .arg(output_arg()),
        )
        .subcommand(
            Command::new("transcript")
                .about("Print the annotated transcript sent to the oracle")
                .arg(video_arg()),
        )
        .subcommand(Command::new("check").about("Validate configuration and oracle connectivity"))
}

fn video_arg() -> Arg {
    Arg::new("video")
        .long("video")
        .value_name("ID")
        .help("Video id whose captions should be searched")
        .required(true)
}

fn output_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .value_name("FILE")
        .help("Write the ranges to a file instead of stdout")
}

fn init_logging(level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("transcript_clipper={},warn", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(matches: &ArgMatches) -> Result<Config> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path))?,
        None => Config::load()?,
    };

    if let Some(dir) = matches.get_one::<String>("captions-dir") {
        config.captions.captions_dir = PathBuf::from(dir);
    }

    Ok(config)
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info", matches.get_flag("verbose"));
            exit_with(e);
        }
    };
    init_logging(&config.logging.level, matches.get_flag("verbose"));

    if let Err(e) = run(&matches, config).await {
        exit_with(e);
    }
}

async fn run(matches: &ArgMatches, config: Config) -> Result<()> {
    match matches.subcommand() {
        Some(("topic", sub)) => {
            let topic = required(sub, "topic")?;
            let mode = ExtractionMode::topic(topic)?;
            extract(sub, config, mode).await
        }
        Some(("highlights", sub)) => extract(sub, config, ExtractionMode::Highlights).await,
        Some(("transcript", sub)) => {
            let captions = DirectoryCaptionSource::new(&config.captions.captions_dir);
            let cues = captions.fetch_cues(required(sub, "video")?).await?;
            let transcript = format_transcript(&transcript_clipper::captions::prepare_cues(cues))?;
            println!("{}", transcript);
            Ok(())
        }
        Some(("check", _)) => check(config).await,
        _ => Err(anyhow::anyhow!("no subcommand given")),
    }
}

async fn extract(matches: &ArgMatches, config: Config, mode: ExtractionMode) -> Result<()> {
    config.validate()?;
    let video_id = required(matches, "video")?;
    debug!("{}", config.summary());

    let llm = create_llm(&config.llm)?;
    let captions = Arc::new(DirectoryCaptionSource::new(&config.captions.captions_dir));
    let prompts = match &config.pipeline.prompt_dir {
        Some(dir) => PromptSet::load(dir).await?,
        None => PromptSet::default(),
    };

    let pipeline = ClipPipeline::new(llm, captions, config.pipeline.clone())?
        .with_prompts(prompts)
        .with_temperature(config.llm.temperature);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupted, cancelling outstanding oracle calls");
            ctrl_c.cancel();
        }
    });

    info!("🚀 Transcript Clipper starting ({} for {})", mode.label(), video_id);
    let ranges = pipeline.run(video_id, mode, &cancel).await?;
    let json = serde_json::to_string_pretty(&ranges)?;

    match matches.get_one::<String>("output") {
        Some(path) => {
            tokio::fs::write(path, format!("{}\n", json)).await?;
            info!("💾 Wrote {} ranges to {}", ranges.len(), path);
        }
        None => println!("{}", json),
    }

    Ok(())
}

async fn check(config: Config) -> Result<()> {
    config.validate()?;
    println!("{}", config.summary());

    let llm = create_llm(&config.llm)?;
    if llm.is_available().await {
        info!("✅ {:?} oracle is reachable", llm.provider_type());
    } else {
        warn!("⚠️ {:?} oracle did not answer the availability check", llm.provider_type());
    }

    if !config.captions.captions_dir.is_dir() {
        warn!(
            "⚠️ Captions directory {} does not exist",
            config.captions.captions_dir.display()
        );
    }

    Ok(())
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing required argument --{}", name))
}

/// Print a machine-readable error report and exit non-zero
fn exit_with(e: anyhow::Error) -> ! {
    let report = match e.downcast_ref::<ClipError>() {
        Some(clip_error) => serde_json::json!({ "error": clip_error.report() }),
        None => serde_json::json!({
            "error": { "kind": "internal", "message": format!("{:#}", e) }
        }),
    };
    error!("❌ {:#}", e);
    println!("{}", report);
    std::process::exit(1);
}
