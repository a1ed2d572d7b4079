//! Command line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Clone, Debug, Parser)]
#[command(
    name = "mediagrab",
    version = env!("CARGO_PKG_VERSION"),
    about = "Inspect media URLs and download a chosen format",
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the yt-dlp executable, overriding the configuration.
    #[arg(long, global = true)]
    pub ytdlp: Option<PathBuf>,

    /// Verbose console logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory for log files.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Print results and errors as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// Show metadata and available formats for a URL.
    #[command(alias = "i")]
    Info(InfoArg),
    /// Download a URL.
    #[command(alias = "dl")]
    Download(DownloadArg),
    /// Print the mediagrab and provider versions.
    Version,
    /// List or delete downloaded media.
    #[command(alias = "lib")]
    Library(LibraryArg),
    /// Show or write the configuration file.
    Config(ConfigArg),
}

#[derive(Clone, Debug, Args)]
pub struct LibraryArg {
    /// Library directory (defaults to the configured download directory).
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: LibraryCommand,
}

#[derive(Clone, Debug, Subcommand)]
pub enum LibraryCommand {
    /// List downloaded media files.
    #[command(alias = "ls")]
    List,
    /// Delete one media file by name.
    #[command(alias = "rm")]
    Delete {
        /// File name as shown by `library list`.
        name: String,
    },
    /// Delete every media file in the library.
    Clear,
}

#[derive(Clone, Debug, Args)]
pub struct ConfigArg {
    #[command(subcommand)]
    pub cmd: ConfigCommand,
}

#[derive(Clone, Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration.
    Show,
    /// Write the effective configuration to the config file.
    Save,
}

#[derive(Clone, Debug, Args)]
pub struct InfoArg {
    /// Media page URL.
    pub url: String,
}

#[derive(Clone, Debug, Args)]
pub struct DownloadArg {
    /// Media page URL.
    pub url: String,

    /// Format selector (a format id from `info`); provider default if omitted.
    #[arg(short, long, default_value = "")]
    pub format: String,

    /// Destination directory (defaults to the configured download directory).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Filename stem; looked up from the media title if omitted.
    #[arg(short, long)]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_download() {
        let cli = Cli::try_parse_from([
            "mediagrab",
            "download",
            "https://example.com/v",
            "-f",
            "22",
            "-o",
            "/tmp/out",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.cmd {
            Commands::Download(arg) => {
                assert_eq!(arg.format, "22");
                assert_eq!(arg.output, Some(PathBuf::from("/tmp/out")));
                assert_eq!(arg.title, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_info_alias_with_global_flags() {
        let cli = Cli::try_parse_from(["mediagrab", "--verbose", "i", "https://example.com/v"])
            .unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.cmd, Commands::Info(InfoArg { ref url }) if url == "https://example.com/v"));
    }

    #[test]
    fn test_parse_library_delete_with_dir() {
        let cli = Cli::try_parse_from([
            "mediagrab",
            "library",
            "--dir",
            "/media",
            "rm",
            "clip.mp4",
        ])
        .unwrap();
        let Commands::Library(arg) = cli.cmd else {
            panic!("expected library");
        };
        assert_eq!(arg.dir, Some(PathBuf::from("/media")));
        assert!(matches!(arg.cmd, LibraryCommand::Delete { ref name } if name == "clip.mp4"));
    }

    #[test]
    fn test_parse_config_save_with_ytdlp_override() {
        let cli = Cli::try_parse_from([
            "mediagrab",
            "config",
            "save",
            "--ytdlp",
            "/opt/yt-dlp",
            "--config",
            "/tmp/mediagrab.json",
        ])
        .unwrap();
        assert_eq!(cli.ytdlp, Some(PathBuf::from("/opt/yt-dlp")));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/mediagrab.json")));
        assert!(matches!(
            cli.cmd,
            Commands::Config(ConfigArg {
                cmd: ConfigCommand::Save
            })
        ));
    }

    #[test]
    fn test_download_format_defaults_to_empty() {
        let cli = Cli::try_parse_from(["mediagrab", "download", "https://example.com/v"]).unwrap();
        let Commands::Download(arg) = cli.cmd else {
            panic!("expected download");
        };
        assert_eq!(arg.format, "");
    }
}
