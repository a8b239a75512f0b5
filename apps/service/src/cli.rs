use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use crate::monitoring::types::DisplayGroup;

#[derive(Parser)]
#[command(name = "nms")]
#[command(about = "Round-robin device reachability monitor.", version)]
pub struct CommandLine {
    /// Config file (defaults to $XDG_CONFIG_HOME/nms/config.toml)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Device store, overrides `store.data_file`
    #[arg(long, short, global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start monitoring until Ctrl-C
    #[command(alias = "r")]
    Run,
    /// Add a device to the store
    #[command(alias = "a")]
    Add {
        id: String,
        address: String,
        /// Table the device is shown in (tree1 or tree2)
        #[arg(long, short, default_value = "tree1", value_parser = parse_group)]
        group: DisplayGroup,
    },
    /// Remove a device from the store
    #[command(alias = "rm")]
    Remove { id: String },
    /// Print the stored devices
    #[command(alias = "ls")]
    List,
    /// Rename a table heading
    Label {
        #[arg(value_parser = parse_group)]
        group: DisplayGroup,
        text: String,
    },
    /// Change display settings
    Settings {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        text_size: Option<u32>,
        #[arg(long, action = ArgAction::Set)]
        hide_ip: Option<bool>,
    },
    /// Probe one address with the configured prober
    Probe { address: String },
    /// Print the effective configuration
    Config,
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_group(raw: &str) -> Result<DisplayGroup, String> {
    DisplayGroup::parse_tag(raw).ok_or_else(|| format!("unknown table '{raw}', expected tree1 or tree2"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_with_group() {
        let cli = CommandLine::try_parse_from(["nms", "add", "cam", "10.0.0.9", "--group", "tree2"]).unwrap();
        match cli.command {
            Commands::Add { id, address, group } => {
                assert_eq!(id, "cam");
                assert_eq!(address, "10.0.0.9");
                assert_eq!(group, DisplayGroup::Secondary);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_unknown_group_rejected() {
        assert!(CommandLine::try_parse_from(["nms", "add", "cam", "10.0.0.9", "--group", "tree3"]).is_err());
        assert!(CommandLine::try_parse_from(["nms", "label", "tree3", "Cameras"]).is_err());
    }

    #[test]
    fn test_global_paths_after_subcommand() {
        let cli = CommandLine::try_parse_from(["nms", "list", "--data", "/tmp/d.json"]).unwrap();
        assert_eq!(cli.data, Some(PathBuf::from("/tmp/d.json")));
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn test_settings_flags() {
        let cli = CommandLine::try_parse_from(["nms", "settings", "--hide-ip", "true", "--text-size", "18"]).unwrap();
        match cli.command {
            Commands::Settings { title, text_size, hide_ip } => {
                assert_eq!(title, None);
                assert_eq!(text_size, Some(18));
                assert_eq!(hide_ip, Some(true));
            }
            _ => panic!("expected settings"),
        }
    }
}
