//! KI-060: CLI subcommands: init, reset, validate, completion.
//!
//! `init` and `reset` are workflows. Each builds its run data lazily from the
//! optional cluster file overlaid with command-line flags, and can run a
//! single phase (`kubei init phase kubeadm.join-worker`) or list its phases
//! (`kubei init phases`).

use crate::core::error::KubeiError;
use crate::core::parser;
use crate::core::rundata::{ClusterNodes, InitContext, ResetContext, RunData};
use crate::core::types::{ClusterConfig, JumpServer, NetworkPlugin, NodeSpec};
use crate::core::workflow::Runner;
use crate::phases;
use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "kubei",
    version,
    about = "Provision highly available Kubernetes clusters over SSH with kubeadm"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log format: text or json
    #[arg(long, global = true, default_value = "text")]
    pub log_format: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Install a Kubernetes cluster
    Init {
        #[command(flatten)]
        flags: InitFlags,

        #[command(subcommand)]
        phase: Option<PhaseCommand>,
    },

    /// Reset a Kubernetes cluster
    Reset {
        #[command(flatten)]
        flags: ClusterFlags,

        #[command(subcommand)]
        phase: Option<PhaseCommand>,
    },

    /// Validate a cluster file without connecting to nodes
    Validate {
        /// Path to kubei.yaml
        #[arg(short, long, default_value = "kubei.yaml")]
        file: PathBuf,
    },

    /// Print shell completions
    Completion {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Run or list the phases of a workflow.
#[derive(Subcommand, Debug)]
pub enum PhaseCommand {
    /// Run a single phase by its dotted path
    Phase {
        /// e.g. container-engine, kubeadm.join-worker
        path: String,
    },

    /// List the phases of this workflow
    Phases,
}

/// Node inventory and connection flags shared by every workflow.
///
/// Global so they are accepted after `phase <path>` as well.
#[derive(Args, Debug, Clone, Default)]
pub struct ClusterFlags {
    /// Cluster file; flags override its values
    #[arg(short = 'f', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Master hosts, comma separated
    #[arg(long, value_delimiter = ',', global = true)]
    pub masters: Vec<String>,

    /// Worker hosts, comma separated
    #[arg(long, value_delimiter = ',', global = true)]
    pub workers: Vec<String>,

    /// SSH user
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// SSH password
    #[arg(long, env = "KUBEI_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// SSH private key
    #[arg(long, global = true)]
    pub key: Option<String>,

    /// SSH port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Jump server as user@host:port
    #[arg(long, global = true)]
    pub jump_server: Option<String>,

    /// Private key for the jump server
    #[arg(long, global = true)]
    pub jump_key: Option<String>,

    /// Password for the jump server
    #[arg(long, env = "KUBEI_JUMP_PASSWORD", hide_env_values = true, global = true)]
    pub jump_password: Option<String>,

    /// Nodes worked on concurrently (0 = CPU count)
    #[arg(long, global = true)]
    pub max_parallel: Option<usize>,

    /// Phases to skip, comma separated dotted paths
    #[arg(long, value_delimiter = ',', global = true)]
    pub skip_phases: Vec<String>,
}

/// Flags of `kubei init`.
#[derive(Args, Debug, Clone, Default)]
pub struct InitFlags {
    #[command(flatten)]
    pub cluster: ClusterFlags,

    /// Network plugin: calico, flannel or none
    #[arg(long, global = true)]
    pub network_type: Option<String>,

    /// Kubernetes version, e.g. 1.28.2
    #[arg(long, global = true)]
    pub kubernetes_version: Option<String>,

    /// Control-plane endpoint as domain:port
    #[arg(long, global = true)]
    pub control_plane_endpoint: Option<String>,

    /// Registry to pull control-plane images from
    #[arg(long, global = true)]
    pub image_repository: Option<String>,

    /// Local offline package for air-gapped installs
    #[arg(long, global = true)]
    pub offline_package: Option<PathBuf>,
}

/// The clap command with each workflow's phase listing attached to its help.
pub fn command() -> clap::Command {
    let init_help = phases::init_workflow().help_text();
    let reset_help = phases::reset_workflow().help_text();
    Cli::command()
        .mut_subcommand("init", |c| c.after_help(init_help))
        .mut_subcommand("reset", |c| c.after_help(reset_help))
}

/// Parse the process arguments.
pub fn parse() -> Cli {
    let matches = command().get_matches();
    match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(e) => e.exit(),
    }
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { flags, phase } => cmd_init(flags, phase),
        Commands::Reset { flags, phase } => cmd_reset(flags, phase),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Completion { shell } => {
            clap_complete::generate(shell, &mut command(), "kubei", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn cmd_init(flags: InitFlags, phase: Option<PhaseCommand>) -> Result<(), String> {
    let skip = flags.cluster.skip_phases.clone();
    let mut runner = phases::init_workflow();
    runner.set_data_initializer(move || {
        let config = init_config(&flags)?;
        let nodes = ClusterNodes::from_config(&config);
        Ok(Box::new(InitContext::new(config, nodes)) as Box<dyn RunData>)
    });
    let ran = run_workflow(&mut runner, phase, &skip)?;
    if ran {
        info!("[init] Kubernetes cluster is ready");
    }
    Ok(())
}

fn cmd_reset(flags: ClusterFlags, phase: Option<PhaseCommand>) -> Result<(), String> {
    let skip = flags.skip_phases.clone();
    let mut runner = phases::reset_workflow();
    runner.set_data_initializer(move || {
        let config = cluster_config(&flags)?;
        let nodes = ClusterNodes::from_config(&config);
        Ok(Box::new(ResetContext::new(config, nodes)) as Box<dyn RunData>)
    });
    let ran = run_workflow(&mut runner, phase, &skip)?;
    if ran {
        info!("[reset] Kubernetes cluster has been reset");
    }
    Ok(())
}

/// Run the whole workflow or the requested phase. Returns false when only a
/// listing was printed.
fn run_workflow(runner: &mut Runner, phase: Option<PhaseCommand>, skip: &[String]) -> Result<bool, String> {
    let result = match phase {
        Some(PhaseCommand::Phases) => {
            for path in runner.phase_paths() {
                println!("{}", path);
            }
            return Ok(false);
        }
        Some(PhaseCommand::Phase { path }) => runner.run_phase(&path, skip),
        None => runner.run(skip),
    };
    result.map(|_| true).map_err(|e| e.to_string())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);

    if errors.is_empty() {
        println!(
            "OK: {} ({} masters, {} workers, network {})",
            file.display(),
            config.nodes.masters.len(),
            config.nodes.workers.len(),
            config.network
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Cluster file (or defaults) overlaid with the shared flags, then validated.
fn cluster_config(flags: &ClusterFlags) -> Result<ClusterConfig, KubeiError> {
    let mut config = load_base(flags)?;
    overlay_cluster(&mut config, flags)?;
    check(&config)?;
    Ok(config)
}

fn init_config(flags: &InitFlags) -> Result<ClusterConfig, KubeiError> {
    let mut config = load_base(&flags.cluster)?;
    overlay_cluster(&mut config, &flags.cluster)?;

    if let Some(ref kind) = flags.network_type {
        if kind != config.network.kind() {
            let (flannel, calico) = match config.network {
                NetworkPlugin::Flannel(ref f) => (f.clone(), Default::default()),
                NetworkPlugin::Calico(ref c) => (Default::default(), c.clone()),
                NetworkPlugin::None => (Default::default(), Default::default()),
            };
            config.network = NetworkPlugin::select(kind, flannel, calico)?;
        }
    }
    if let Some(ref version) = flags.kubernetes_version {
        config.kubernetes.version = version.clone();
    }
    if let Some(ref endpoint) = flags.control_plane_endpoint {
        config.kubeadm.control_plane_endpoint = endpoint.clone();
    }
    if let Some(ref repo) = flags.image_repository {
        config.kubernetes.image_repository = Some(repo.clone());
    }
    if let Some(ref package) = flags.offline_package {
        config.offline_package = Some(package.clone());
    }

    check(&config)?;
    Ok(config)
}

fn load_base(flags: &ClusterFlags) -> Result<ClusterConfig, KubeiError> {
    match flags.config {
        Some(ref path) => parser::parse_config_file(path).map_err(KubeiError::Config),
        None => Ok(ClusterConfig::default()),
    }
}

fn overlay_cluster(config: &mut ClusterConfig, flags: &ClusterFlags) -> Result<(), KubeiError> {
    let hosts = |list: &[String]| -> Vec<NodeSpec> {
        list.iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(NodeSpec::new)
            .collect()
    };
    if !flags.masters.is_empty() {
        config.nodes.masters = hosts(&flags.masters);
    }
    if !flags.workers.is_empty() {
        config.nodes.workers = hosts(&flags.workers);
    }
    if let Some(ref user) = flags.user {
        config.nodes.user = user.clone();
    }
    if let Some(ref password) = flags.password {
        config.nodes.password = Some(password.clone());
    }
    if let Some(ref key) = flags.key {
        config.nodes.key = Some(key.clone());
    }
    if let Some(port) = flags.port {
        config.nodes.port = port;
    }
    if let Some(ref spec) = flags.jump_server {
        config.jump_server = Some(JumpServer::parse(spec)?);
    }
    if let Some(jump) = config.jump_server.as_mut() {
        if let Some(ref key) = flags.jump_key {
            jump.key = Some(key.clone());
        }
        if let Some(ref password) = flags.jump_password {
            jump.password = Some(password.clone());
        }
    } else if flags.jump_key.is_some() || flags.jump_password.is_some() {
        return Err(KubeiError::Config(
            "--jump-key/--jump-password need --jump-server".to_string(),
        ));
    }
    if let Some(n) = flags.max_parallel {
        config.max_parallel = n;
    }
    Ok(())
}

fn check(config: &ClusterConfig) -> Result<(), KubeiError> {
    let errors = parser::validate_config(config);
    if errors.is_empty() {
        return Ok(());
    }
    Err(KubeiError::Config(
        errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::InstallType;

    fn parse_args(args: &[&str]) -> Cli {
        let matches = command().try_get_matches_from(args).unwrap();
        Cli::from_arg_matches(&matches).unwrap()
    }

    fn init_flags(args: &[&str]) -> InitFlags {
        let mut full = vec!["kubei", "init"];
        full.extend_from_slice(args);
        match parse_args(&full).command {
            Commands::Init { flags, .. } => flags,
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_ki060_parse_init_flags() {
        let flags = init_flags(&[
            "--masters",
            "10.0.0.1,10.0.0.2",
            "--workers",
            "10.0.0.11",
            "--user",
            "ubuntu",
            "--port",
            "2222",
            "--skip-phases",
            "container-engine,kubeadm.network",
            "--network-type",
            "none",
        ]);
        assert_eq!(flags.cluster.masters, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(flags.cluster.skip_phases, vec!["container-engine", "kubeadm.network"]);

        let config = init_config(&flags).unwrap();
        assert_eq!(config.nodes.masters.len(), 2);
        assert_eq!(config.nodes.user, "ubuntu");
        assert_eq!(config.nodes.port, 2222);
        assert_eq!(config.network, NetworkPlugin::None);
    }

    #[test]
    fn test_ki060_phase_subcommand() {
        let cli = parse_args(&["kubei", "init", "--masters", "10.0.0.1", "phase", "kubeadm.join-worker"]);
        match cli.command {
            Commands::Init {
                phase: Some(PhaseCommand::Phase { path }),
                ..
            } => assert_eq!(path, "kubeadm.join-worker"),
            other => panic!("unexpected command: {:?}", other),
        }
        let cli = parse_args(&["kubei", "reset", "phases"]);
        assert!(matches!(
            cli.command,
            Commands::Reset {
                phase: Some(PhaseCommand::Phases),
                ..
            }
        ));
    }

    #[test]
    fn test_ki060_flags_after_phase_path() {
        let cli = parse_args(&[
            "kubei",
            "init",
            "phase",
            "container-engine",
            "--masters",
            "10.0.0.1",
            "--workers",
            "10.0.0.11,10.0.0.12",
            "--network-type",
            "none",
        ]);
        match cli.command {
            Commands::Init {
                flags,
                phase: Some(PhaseCommand::Phase { path }),
            } => {
                assert_eq!(path, "container-engine");
                let config = init_config(&flags).unwrap();
                assert_eq!(config.nodes.masters, vec![NodeSpec::new("10.0.0.1")]);
                assert_eq!(config.nodes.workers.len(), 2);
                assert_eq!(config.network, NetworkPlugin::None);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = parse_args(&["kubei", "reset", "phase", "cluster", "--user", "ubuntu", "--port", "2222"]);
        match cli.command {
            Commands::Reset { flags, .. } => {
                assert_eq!(flags.user.as_deref(), Some("ubuntu"));
                assert_eq!(flags.port, Some(2222));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_ki060_help_lists_phases() {
        let mut cmd = command();
        let init = cmd.find_subcommand_mut("init").unwrap();
        let help = init.render_long_help().to_string();
        assert!(help.contains("kube-component"), "{}", help);
        assert!(help.contains("The workflow runs these phases in order:"));
        assert!(!help.contains("Distribute the offline package"));
    }

    #[test]
    fn test_ki060_file_overlaid_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("kubei.yaml");
        std::fs::write(
            &file,
            r#"
nodes:
  user: centos
  masters: [10.0.0.1]
  workers: [10.0.0.11, 10.0.0.12]
network:
  type: flannel
  flannel:
    backend_type: host-gw
"#,
        )
        .unwrap();
        let path = file.display().to_string();
        let flags = init_flags(&["-f", &path, "--user", "root", "--kubernetes-version", "1.29.1"]);
        let config = init_config(&flags).unwrap();
        assert_eq!(config.nodes.user, "root");
        assert_eq!(config.nodes.workers.len(), 2);
        assert_eq!(config.kubernetes.version, "1.29.1");
        match config.network {
            NetworkPlugin::Flannel(ref f) => assert_eq!(f.backend_type, "host-gw"),
            ref other => panic!("unexpected network {}", other),
        }
    }

    #[test]
    fn test_ki060_bad_network_type() {
        let flags = init_flags(&["--masters", "10.0.0.1", "--network-type", "weave"]);
        let err = init_config(&flags).unwrap_err();
        assert_eq!(
            err.to_string(),
            "[network] Unsupported network type: weave, supported type: calico, flannel, none"
        );
    }

    #[test]
    fn test_ki060_missing_masters_is_config_error() {
        let err = cluster_config(&ClusterFlags::default()).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("at least one master"));
    }

    #[test]
    fn test_ki060_jump_server_flags() {
        let flags = init_flags(&[
            "--masters",
            "10.0.0.1",
            "--jump-server",
            "ops@bastion:2200",
            "--jump-key",
            "/keys/bastion",
        ]);
        let config = init_config(&flags).unwrap();
        let jump = config.jump_server.unwrap();
        assert_eq!(jump.user, "ops");
        assert_eq!(jump.port, 2200);
        assert_eq!(jump.key.as_deref(), Some("/keys/bastion"));

        let orphan = init_flags(&["--masters", "10.0.0.1", "--jump-key", "/k"]);
        assert!(init_config(&orphan).is_err());
    }

    #[test]
    fn test_ki060_offline_package_flag() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("offline.tgz");
        std::fs::write(&pkg, "x").unwrap();
        let path = pkg.display().to_string();
        let config = init_config(&init_flags(&["--masters", "10.0.0.1", "--offline-package", &path])).unwrap();
        assert_eq!(config.install_type(), InstallType::Offline);
    }

    #[test]
    fn test_ki060_validate_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.yaml");
        std::fs::write(&good, "nodes:\n  masters: [10.0.0.1]\n").unwrap();
        cmd_validate(&good).unwrap();

        let bad = dir.path().join("bad.yaml");
        std::fs::write(&bad, "version: \"2.0\"\n").unwrap();
        let err = cmd_validate(&bad).unwrap_err();
        assert!(err.contains("validation error"));
    }

    #[test]
    fn test_ki060_unknown_skip_phase_fails_before_connecting() {
        let flags = init_flags(&["--masters", "10.0.0.1", "--skip-phases", "bogus"]);
        let err = cmd_init(flags, None).unwrap_err();
        assert!(err.contains("unknown phase 'bogus'"), "{}", err);
    }

    #[test]
    fn test_ki060_list_phases_needs_no_config() {
        assert!(cmd_reset(ClusterFlags::default(), Some(PhaseCommand::Phases)).is_ok());
    }
}
