//! Mediagrab - inspect media URLs and download a chosen format.
//!
//! This is the command line host for `mediagrab-core`.

mod cli;
mod error;
mod logging;
mod progress;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mediagrab_core::{
    DownloadObserver, LibraryEntry, MediaInfo, MediaLibrary, MediaService, MediagrabConfig,
    NoopObserver, Result, TaskState,
};
use tracing::{debug, info, warn};

use crate::cli::{Cli, Commands, ConfigCommand, DownloadArg, LibraryArg, LibraryCommand};
use crate::logging::LoggingConfig;
use crate::progress::TerminalProgress;

/// Exit code for a download stopped with Ctrl-C.
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging = if cli.verbose {
        LoggingConfig::development()
    } else {
        LoggingConfig::production()
    };
    if let Some(dir) = &cli.log_dir {
        logging = logging.with_log_directory(dir.clone());
    }
    let _guard = match logging::init(&logging) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: logging disabled: {e}");
            None
        }
    };

    info!("Starting mediagrab {}", env!("CARGO_PKG_VERSION"));

    let json = cli.json;
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", error::render(&e, json));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => MediagrabConfig::load_from(path)?,
        None => MediagrabConfig::load()?,
    };
    if let Some(ytdlp) = &cli.ytdlp {
        config.ytdlp_path.clone_from(ytdlp);
    }
    debug!("Using yt-dlp at {}", config.ytdlp_path.display());

    match cli.cmd {
        Commands::Info(arg) => {
            let service = MediaService::from_config(&config, Arc::new(NoopObserver))?;
            let media = service.get_info(&arg.url).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&media)?);
            } else {
                print_media(&media);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Download(arg) => download(&config, arg, cli.json).await,
        Commands::Version => {
            let service = MediaService::from_config(&config, Arc::new(NoopObserver))?;
            let provider = service.library_version().await?;
            if cli.json {
                let versions = serde_json::json!({
                    "mediagrab": env!("CARGO_PKG_VERSION"),
                    "yt_dlp": provider,
                });
                println!("{versions}");
            } else {
                println!("mediagrab {}", env!("CARGO_PKG_VERSION"));
                println!("yt-dlp {provider}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Library(arg) => library(&config, arg, cli.json),
        Commands::Config(arg) => {
            match arg.cmd {
                ConfigCommand::Show => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
                ConfigCommand::Save => {
                    let path = match &cli.config {
                        Some(path) => {
                            config.save_to(path)?;
                            path.clone()
                        }
                        None => {
                            config.save()?;
                            MediagrabConfig::config_file_path()
                        }
                    };
                    if !cli.json {
                        println!("Wrote {}", path.display());
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn library(config: &MediagrabConfig, arg: LibraryArg, json: bool) -> Result<ExitCode> {
    let library = arg
        .dir
        .map_or_else(|| MediaLibrary::from_config(config), MediaLibrary::new);

    match arg.cmd {
        LibraryCommand::List => {
            let entries = library.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_library(&library, &entries);
            }
        }
        LibraryCommand::Delete { name } => {
            library.delete(&name)?;
            if !json {
                println!("Deleted {name}");
            }
        }
        LibraryCommand::Clear => {
            let removed = library.delete_all()?;
            if json {
                println!("{}", serde_json::json!({ "deleted": removed }));
            } else {
                println!("Deleted {removed} files from {}", library.directory().display());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn download(config: &MediagrabConfig, arg: DownloadArg, json: bool) -> Result<ExitCode> {
    let observer: Arc<dyn DownloadObserver> = if json {
        Arc::new(NoopObserver)
    } else {
        Arc::new(TerminalProgress::new())
    };
    let service = MediaService::from_config(config, observer)?;

    let title = match arg.title {
        Some(title) => title,
        None => service.get_info(&arg.url).await?.title,
    };
    let destination = arg
        .output
        .unwrap_or_else(|| config.download_directory.clone());

    let handle = service.start_download(&arg.url, &arg.format, &destination, &title)?;

    let task = tokio::select! {
        task = handle.wait() => task,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling download");
            service.stop_download();
            handle.wait().await
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&task)?);
    }

    Ok(match task.state {
        TaskState::Completed => {
            if !json {
                println!("Saved to {}", destination.display());
            }
            ExitCode::SUCCESS
        }
        TaskState::Cancelled => ExitCode::from(EXIT_CANCELLED),
        _ => {
            if !json {
                eprintln!(
                    "Error: {}",
                    task.error.as_deref().unwrap_or("download failed")
                );
            }
            ExitCode::FAILURE
        }
    })
}

fn print_media(media: &MediaInfo) {
    println!("{}", media.title);
    println!("  url:      {}", media.source_url);
    println!(
        "  duration: {}:{:02}",
        media.duration_secs / 60,
        media.duration_secs % 60
    );
    if !media.thumbnail_url.is_empty() {
        println!("  thumb:    {}", media.thumbnail_url);
    }
    println!();
    println!("{:<12} {:<6} {:<12} {:>10}  NOTE", "FORMAT", "EXT", "RESOLUTION", "SIZE");
    for format in &media.formats {
        let size = format
            .size_megabytes()
            .map_or_else(|| "-".to_string(), |mb| format!("{mb:.2} MB"));
        println!(
            "{:<12} {:<6} {:<12} {:>10}  {}",
            format.format_id, format.extension, format.resolution, size, format.note
        );
    }
}

fn print_library(library: &MediaLibrary, entries: &[LibraryEntry]) {
    if entries.is_empty() {
        println!("No media in {}", library.directory().display());
        return;
    }
    for entry in entries {
        println!("{:>10.2} MB  {}", entry.size_megabytes, entry.name);
    }
}
