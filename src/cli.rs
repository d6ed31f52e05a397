//! Command Line Interface

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "hw-tagger")]
#[command(version)]
#[command(about = "hw-tagger - Publish device identifiers as Kubernetes node labels")]
#[command(long_about = "hw-tagger - Publish device identifiers as Kubernetes node labels

Watches local devices through udev and keeps one label per device
identifier (WWN, serial number, ...) on this host's Node object.

EXAMPLES:
    hw-tagger --node-name worker-1             Watch and label (default: run)
    hw-tagger run --dry-run                    Log label changes without writing
    hw-tagger scan                             Print the keys of present devices
    hw-tagger scan --subsystem block           Limit the scan to one subsystem
    hw-tagger --config /etc/hw-tagger.json     Use custom watch scopes

ENVIRONMENT VARIABLES:
    NODE_NAME              Name of the Node object to label
    HW_TAGGER_LOG=debug    Log filter (tracing EnvFilter syntax)
    KUBECONFIG             Kubeconfig used outside a cluster

FILES:
    /var/run/secrets/kubernetes.io/serviceaccount   In-cluster credentials
    ~/.kube/config                                  Fallback credentials")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Node whose labels are managed
    #[arg(long, global = true, env = "NODE_NAME")]
    pub node_name: Option<String>,

    /// Compute and log label changes without writing them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// JSON file describing the watch scopes (built-in block disk scope when absent)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Kubeconfig to use instead of in-cluster discovery
    #[arg(long, global = true, value_name = "PATH")]
    pub kubeconfig: Option<PathBuf>,

    /// Log filter directive
    #[arg(long, global = true, env = "HW_TAGGER_LOG", default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Watch devices and keep the node labels in sync (default)
    Run,

    /// Enumerate devices once and print the label keys they derive
    Scan(ScanArgs),
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanArgs {
    /// Only scan scopes of this subsystem
    #[arg(long)]
    pub subsystem: Option<String>,
}

impl Cli {
    /// The selected command, `run` when none was given
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_defaults_to_run() {
        std::env::remove_var("NODE_NAME");
        std::env::remove_var("HW_TAGGER_LOG");
        let cli = Cli::try_parse_from(["hw-tagger"]).unwrap();
        assert_eq!(cli.command(), Commands::Run);
        assert_eq!(cli.global.log_level, "info");
        assert!(cli.global.node_name.is_none());
        assert!(!cli.global.dry_run);
    }

    #[test]
    #[serial]
    fn test_run_flags_before_and_after_subcommand() {
        std::env::remove_var("NODE_NAME");
        let cli = Cli::try_parse_from([
            "hw-tagger",
            "--config",
            "/etc/hw-tagger.json",
            "run",
            "--node-name",
            "worker-1",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.command(), Commands::Run);
        assert_eq!(cli.global.config, Some(PathBuf::from("/etc/hw-tagger.json")));
        assert_eq!(cli.global.node_name.as_deref(), Some("worker-1"));
        assert!(cli.global.dry_run);

        let cli = Cli::try_parse_from(["hw-tagger", "--node-name", "worker-2"]).unwrap();
        assert_eq!(cli.global.node_name.as_deref(), Some("worker-2"));
    }

    #[test]
    #[serial]
    fn test_node_name_from_env() {
        std::env::set_var("NODE_NAME", "from-env");
        let cli = Cli::try_parse_from(["hw-tagger", "run"]).unwrap();
        std::env::remove_var("NODE_NAME");
        assert_eq!(cli.global.node_name.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_scan_subsystem() {
        let cli = Cli::try_parse_from(["hw-tagger", "scan", "--subsystem", "net"]).unwrap();
        assert_eq!(
            cli.command(),
            Commands::Scan(ScanArgs {
                subsystem: Some("net".into())
            })
        );
    }
}
