// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hid-monitor")]
#[command(author, version, about = "List HID devices and watch hotplug events")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Engine config file (default: $HID_MONITOR_CONFIG when set)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Print one JSON object per line instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List currently attached HID devices
    #[command(visible_aliases = ["ls", "l"])]
    List,

    /// Print present devices, then arrival/removal events until interrupted
    #[command(visible_aliases = ["w"])]
    Watch {
        /// Poll enumeration instead of subscribing to udev
        #[arg(long)]
        poll: bool,

        /// Stop after this many seconds
        #[arg(long, value_name = "N")]
        timeout_secs: Option<u64>,

        /// Stop after this many events
        #[arg(long, value_name = "N")]
        max_events: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_flags() {
        let cli = Cli::parse_from([
            "hid-monitor",
            "--log-level",
            "debug",
            "watch",
            "--poll",
            "--max-events",
            "3",
        ]);
        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Some(Commands::Watch {
                poll,
                timeout_secs,
                max_events,
            }) => {
                assert!(poll);
                assert_eq!(timeout_secs, None);
                assert_eq!(max_events, Some(3));
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn test_defaults_to_no_command() {
        let cli = Cli::parse_from(["hid-monitor", "--json"]);
        assert!(cli.json);
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_list_alias() {
        let cli = Cli::parse_from(["hid-monitor", "ls", "-c", "/tmp/monitor.toml"]);
        assert!(matches!(cli.command, Some(Commands::List)));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/monitor.toml")));
    }
}
