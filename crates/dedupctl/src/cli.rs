use crate::config::CtlConfig;
use crate::error::{CtlError, Result};
use crate::feature::{Cbs, Dedup, Feature, FeatureControl};
use crate::options::{parse_cbs_options, parse_dedup_options, RawCbsOptions, RawDedupOptions};
use crate::params::{CbsConfig, DedupConfig};
use crate::protocol::{ControlCommand, CtlRecord};
use crate::status::RenderStatus;
use crate::transport::{ControlChannel, FsHandle, MockBackend};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "dedupctl", version)]
#[command(about = "Manage in-band (write time) de-duplication", long_about = None)]
pub struct Cli {
    /// Defaults for `dedup enable` (TOML or JSON)
    #[arg(short, long, global = true, env = "DEDUPCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Run against an in-memory backend instead of the filesystem
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage content-based storage
    Cbs {
        #[command(subcommand)]
        cmd: CbsCmd,
    },
    /// Manage in-band (write time) de-duplication
    Dedup {
        #[command(subcommand)]
        cmd: DedupCmd,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum CbsCmd {
    /// Enable content-based storage of a filesystem
    Enable {
        /// Hash algorithm, only 'sha256' is supported
        #[arg(short = 'a', long, value_name = "HASH")]
        hash_algorithm: Option<String>,
        path: PathBuf,
    },
    /// Disable content-based storage of a filesystem
    Disable { path: PathBuf },
    /// Show status of content-based storage
    Status { path: PathBuf },
}

#[derive(Subcommand, Debug, Clone)]
pub enum DedupCmd {
    /// Enable in-band (write time) de-duplication of a filesystem
    Enable(DedupEnableArgs),
    /// Disable in-band (write time) de-duplication of a filesystem
    Disable { path: PathBuf },
    /// Show current in-band (write time) de-duplication status
    Status { path: PathBuf },
}

#[derive(Args, Debug, Clone)]
pub struct DedupEnableArgs {
    /// Hash storage backend: 'ondisk' or 'inmemory' (default)
    #[arg(short = 's', long, value_name = "BACKEND")]
    pub storage_backend: Option<String>,

    /// Dedup block size, default 32K
    #[arg(short = 'b', long, value_name = "BLOCKSIZE")]
    pub blocksize: Option<String>,

    /// Hash algorithm, only 'sha256' is supported
    #[arg(short = 'a', long, value_name = "HASH")]
    pub hash_algorithm: Option<String>,

    /// Maximum number of hashes kept in memory, 'inmemory' backend only (default 32K)
    #[arg(short = 'l', long, value_name = "LIMIT")]
    pub limit_hash: Option<String>,

    /// Maximum memory used for hashes, 'inmemory' backend only; exclusive with -l
    #[arg(short = 'm', long, value_name = "LIMIT")]
    pub limit_memory: Option<String>,

    pub path: PathBuf,
}

impl From<&DedupEnableArgs> for RawDedupOptions {
    fn from(args: &DedupEnableArgs) -> Self {
        RawDedupOptions {
            storage_backend: args.storage_backend.clone(),
            blocksize: args.blocksize.clone(),
            hash_algorithm: args.hash_algorithm.clone(),
            limit_hash: args.limit_hash.clone(),
            limit_memory: args.limit_memory.clone(),
        }
    }
}

/// A parsed and validated request, ready to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// Content-based storage command.
    Cbs(ControlCommand<CbsConfig>),
    /// Dedup command.
    Dedup(ControlCommand<DedupConfig>),
}

impl Request {
    /// Encoded record, for dry-run reporting.
    pub fn record(&self) -> CtlRecord {
        match self {
            Request::Cbs(cmd) => CtlRecord::encode(cmd),
            Request::Dedup(cmd) => CtlRecord::encode(cmd),
        }
    }

    /// Perform the exchange and write any status report to `out`.
    pub fn send(self, channel: &mut dyn ControlChannel, out: &mut dyn Write) -> Result<()> {
        match self {
            Request::Cbs(cmd) => run_feature::<Cbs>(cmd, channel, out),
            Request::Dedup(cmd) => run_feature::<Dedup>(cmd, channel, out),
        }
    }
}

fn run_feature<F: Feature>(
    command: ControlCommand<F::Config>,
    channel: &mut dyn ControlChannel,
    out: &mut dyn Write,
) -> Result<()> {
    let mut ctl = FeatureControl::<F, _>::new(channel);
    if let Some(status) = ctl.execute(command)? {
        for line in status.render() {
            writeln!(out, "{}", line)?;
        }
    }
    Ok(())
}

impl Command {
    /// Target path of the invocation.
    pub fn path(&self) -> &Path {
        match self {
            Command::Cbs { cmd } => match cmd {
                CbsCmd::Enable { path, .. } | CbsCmd::Disable { path } | CbsCmd::Status { path } => {
                    path
                }
            },
            Command::Dedup { cmd } => match cmd {
                DedupCmd::Enable(args) => &args.path,
                DedupCmd::Disable { path } | DedupCmd::Status { path } => path,
            },
        }
    }

    /// True for commands whose options are defaulted from the config file.
    pub fn reads_config(&self) -> bool {
        matches!(
            self,
            Command::Dedup {
                cmd: DedupCmd::Enable(_)
            }
        )
    }

    /// Parse option values and validate them. No I/O besides what `config`
    /// already loaded.
    pub fn prepare(&self, config: &CtlConfig) -> Result<Request> {
        let request = match self {
            Command::Cbs { cmd } => Request::Cbs(match cmd {
                CbsCmd::Enable { hash_algorithm, .. } => {
                    let cbs = parse_cbs_options(&RawCbsOptions {
                        hash_algorithm: hash_algorithm.clone(),
                    })?;
                    cbs.validate()?;
                    ControlCommand::Enable(cbs)
                }
                CbsCmd::Disable { .. } => ControlCommand::Disable,
                CbsCmd::Status { .. } => ControlCommand::StatusQuery,
            }),
            Command::Dedup { cmd } => Request::Dedup(match cmd {
                DedupCmd::Enable(args) => {
                    let builder = parse_dedup_options(&args.into(), config.dedup_defaults()?)?;
                    ControlCommand::Enable(builder.build()?)
                }
                DedupCmd::Disable { .. } => ControlCommand::Disable,
                DedupCmd::Status { .. } => ControlCommand::StatusQuery,
            }),
        };
        Ok(request)
    }
}

/// Wrap a clap failure (bad argument shape, unknown flag, missing path) as a
/// usage error carrying the rendered synopsis.
pub fn usage_error(err: &clap::Error) -> CtlError {
    CtlError::Usage(err.render().to_string())
}

impl Cli {
    /// Default log level implied by `-v` flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Configuration for this invocation. Only `dedup enable` takes option
    /// defaults from the file; other commands fall back to built-in defaults
    /// when the file cannot be loaded.
    pub fn load_config(&self) -> Result<CtlConfig> {
        let loaded = CtlConfig::load_or_default(self.config.as_deref());
        if self.command.reads_config() {
            return loaded;
        }
        Ok(loaded.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ignoring configuration file, using defaults");
            CtlConfig::default()
        }))
    }

    /// Parse, validate, open the target and perform the single exchange.
    /// The filesystem handle is released on every path out of this call.
    pub fn run(self, out: &mut dyn Write) -> Result<()> {
        let config = self.load_config()?;
        let request = self.command.prepare(&config)?;
        let path = self.command.path();

        if self.dry_run || config.dry_run {
            tracing::info!(
                path = %path.display(),
                record = ?request.record(),
                "dry run, using in-memory backend"
            );
            let mut backend = MockBackend::new();
            return request.send(&mut backend, out);
        }

        let mut handle = FsHandle::open(path)?;
        request.send(&mut handle, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DedupBackend;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_dedup_enable_subcommand() {
        let cli = parse(&["dedupctl", "dedup", "enable", "-b", "64K", "-s", "inmemory", "-l", "1000", "/mnt"]);
        match &cli.command {
            Command::Dedup {
                cmd: DedupCmd::Enable(args),
            } => {
                assert_eq!(args.blocksize.as_deref(), Some("64K"));
                assert_eq!(args.storage_backend.as_deref(), Some("inmemory"));
                assert_eq!(args.limit_hash.as_deref(), Some("1000"));
                assert_eq!(args.path, PathBuf::from("/mnt"));
            }
            _ => panic!("Expected dedup enable command"),
        }
    }

    #[test]
    fn test_cli_long_options() {
        let cli = parse(&[
            "dedupctl",
            "dedup",
            "enable",
            "--storage-backend",
            "ondisk",
            "--blocksize",
            "1M",
            "--hash-algorithm",
            "sha256",
            "/mnt",
        ]);
        let request = cli.command.prepare(&CtlConfig::default()).unwrap();
        match request {
            Request::Dedup(ControlCommand::Enable(config)) => {
                assert_eq!(config.backend, DedupBackend::OnDisk);
                assert_eq!(config.block_size, 1 << 20);
            }
            other => panic!("Expected dedup enable, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_cbs_subcommands() {
        let cli = parse(&["dedupctl", "cbs", "status", "/mnt"]);
        assert!(matches!(
            cli.command,
            Command::Cbs {
                cmd: CbsCmd::Status { .. }
            }
        ));
        assert_eq!(cli.command.path(), Path::new("/mnt"));

        let cli = parse(&["dedupctl", "cbs", "enable", "-a", "sha256", "/mnt"]);
        assert_eq!(
            cli.command.prepare(&CtlConfig::default()).unwrap(),
            Request::Cbs(ControlCommand::Enable(CbsConfig::default()))
        );
    }

    #[test]
    fn test_cli_missing_path_is_usage_error() {
        assert!(Cli::try_parse_from(["dedupctl", "dedup", "status"]).is_err());
        assert!(Cli::try_parse_from(["dedupctl", "cbs", "enable", "-a", "sha256"]).is_err());
    }

    #[test]
    fn test_cli_extra_path_is_usage_error() {
        let err = Cli::try_parse_from(["dedupctl", "dedup", "disable", "/a", "/b"]).unwrap_err();
        let usage = usage_error(&err);
        assert!(matches!(usage, CtlError::Usage(_)));
        assert!(usage.to_string().contains("Usage:"));
        assert_eq!(usage.exit_code(), 1);
    }

    #[test]
    fn test_cli_unknown_option_is_usage_error() {
        assert!(Cli::try_parse_from(["dedupctl", "cbs", "enable", "-b", "64K", "/mnt"]).is_err());
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = parse(&["dedupctl", "-vv", "--dry-run", "dedup", "status", "/mnt"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_level(), "trace");
        assert!(cli.dry_run);

        let cli = parse(&["dedupctl", "dedup", "status", "/mnt", "--config", "/etc/d.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/d.toml")));
        assert_eq!(cli.log_level(), "warn");
    }

    #[test]
    fn test_prepare_reports_parse_and_validation_errors() {
        let cli = parse(&["dedupctl", "dedup", "enable", "-a", "md5", "/mnt"]);
        assert_eq!(
            cli.command.prepare(&CtlConfig::default()).unwrap_err().to_string(),
            "unsupported hash algorithm: md5"
        );

        let cli = parse(&["dedupctl", "dedup", "enable", "-b", "100K", "/mnt"]);
        assert!(cli
            .command
            .prepare(&CtlConfig::default())
            .unwrap_err()
            .to_string()
            .starts_with("invalid dedup blocksize: 102400"));
    }

    #[test]
    fn test_dry_run_status() {
        let cli = parse(&["dedupctl", "--dry-run", "dedup", "status", "/does/not/matter"]);
        let mut out = Vec::new();
        cli.run(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Status:\t\t\tDisabled\n");
    }

    fn config_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn prepare_with_file(file: &tempfile::NamedTempFile, args: &[&str]) -> Result<Request> {
        let path = file.path().to_str().unwrap();
        let argv: Vec<&str> = ["dedupctl", "--config", path].iter().chain(args).copied().collect();
        let cli = parse(&argv);
        let config = cli.load_config()?;
        cli.command.prepare(&config)
    }

    #[test]
    fn test_file_limit_yields_to_command_line() {
        let file = config_file("limit_hash = \"1000\"\n");

        match prepare_with_file(&file, &["dedup", "enable", "/mnt"]).unwrap() {
            Request::Dedup(ControlCommand::Enable(config)) => assert_eq!(config.limit_count, 1000),
            other => panic!("Expected dedup enable, got {:?}", other),
        }

        match prepare_with_file(&file, &["dedup", "enable", "-s", "ondisk", "/mnt"]).unwrap() {
            Request::Dedup(ControlCommand::Enable(config)) => {
                assert_eq!(config.backend, DedupBackend::OnDisk);
                assert_eq!(config.limit_count, 0);
            }
            other => panic!("Expected dedup enable, got {:?}", other),
        }

        match prepare_with_file(&file, &["dedup", "enable", "-m", "1M", "/mnt"]).unwrap() {
            Request::Dedup(ControlCommand::Enable(config)) => {
                assert_eq!(config.limit_count, 0);
                assert_eq!(config.limit_memory, 1 << 20);
            }
            other => panic!("Expected dedup enable, got {:?}", other),
        }
    }

    #[test]
    fn test_file_defaults_with_other_flags() {
        let file = config_file("blocksize = \"128K\"\nlimit_memory = \"64M\"\n");
        match prepare_with_file(&file, &["dedup", "enable", "-a", "sha256", "/mnt"]).unwrap() {
            Request::Dedup(ControlCommand::Enable(config)) => {
                assert_eq!(config.block_size, 128 * 1024);
                assert_eq!(config.limit_memory, 64 << 20);
            }
            other => panic!("Expected dedup enable, got {:?}", other),
        }
        match prepare_with_file(&file, &["dedup", "enable", "-b", "1M", "/mnt"]).unwrap() {
            Request::Dedup(ControlCommand::Enable(config)) => {
                assert_eq!(config.block_size, 1 << 20);
                assert_eq!(config.limit_memory, 64 << 20);
            }
            other => panic!("Expected dedup enable, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_file_only_breaks_dedup_enable() {
        let file = config_file("blocksize = [\n");
        let path = file.path().to_str().unwrap();

        for args in [
            ["cbs", "status", "/mnt"],
            ["dedup", "status", "/mnt"],
            ["dedup", "disable", "/mnt"],
        ] {
            let argv: Vec<&str> = ["dedupctl", "--dry-run", "--config", path]
                .iter()
                .chain(&args)
                .copied()
                .collect();
            assert!(parse(&argv).run(&mut Vec::new()).is_ok());
        }

        let err = parse(&["dedupctl", "--dry-run", "--config", path, "dedup", "enable", "/mnt"])
            .run(&mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, CtlError::Config(_)));
    }

    #[test]
    fn test_run_missing_path_is_resource_error() {
        let cli = parse(&["dedupctl", "dedup", "status", "/does/not/exist"]);
        let err = cli.run(&mut Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "failed to open file or directory: /does/not/exist");
    }

    #[test]
    fn test_validation_precedes_open() {
        let cli = parse(&["dedupctl", "dedup", "enable", "-l", "1", "-m", "1", "/does/not/exist"]);
        let err = cli.run(&mut Vec::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "limit-memory and limit-hash can't be given at the same time"
        );
    }
}
