use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
}

#[derive(Parser)]
#[command(name = "pfl")]
#[command(
    about = "Run personal builds of your local changes on a remote build server before committing"
)]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress output
    #[arg(long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Package local changes and run them as a personal build
    Run(RunArgs),

    /// List the build configurations the server offers
    List(ListArgs),

    /// Store credentials for a server
    Login(LoginArgs),

    /// Remove stored credentials for a server
    Logout(LogoutArgs),

    /// Initialize a preflight.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Files, directories, globs, or @listfile references; reads stdin when
    /// omitted, and falls back to the current directory
    #[arg(value_name = "PATHSPEC")]
    pub paths: Vec<String>,

    /// Change description shown on the server
    #[arg(short = 'm', long = "message")]
    pub message: String,

    /// Build configuration ids to run on (internal or external form,
    /// comma-separated or repeated)
    #[arg(short = 'c', long = "configuration", value_delimiter = ',')]
    pub configurations: Vec<String>,

    /// Run on every configuration of this project instead
    #[arg(short = 'p', long, conflicts_with = "configurations")]
    pub project: Option<String>,

    /// Intersect the requested configurations with the server's
    /// applicability verdict
    #[arg(long)]
    pub force_compat_check: bool,

    /// Ask the agent to check for newer commits before building
    #[arg(long)]
    pub check_early: bool,

    /// Force a clean checkout on the agent
    #[arg(long)]
    pub clean: bool,

    /// Commit the change automatically if the build succeeds
    #[arg(long)]
    pub commit: bool,

    /// Schedule the builds and exit without waiting for results
    #[arg(long)]
    pub no_wait: bool,

    /// Seconds to wait for a build verdict (default 3600)
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Seconds between status polls (default 5)
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,

    /// Mapping rule-file to use instead of the workspace scope chain
    #[arg(short = 'o', long = "mapping", value_name = "FILE")]
    pub mapping_file: Option<PathBuf>,

    /// Keep the assembled patch file for inspection
    #[arg(long)]
    pub keep_patch: bool,

    /// Server address (host:port); overrides config
    #[arg(long)]
    pub server: Option<String>,

    /// User name; overrides stored credentials
    #[arg(long)]
    pub user: Option<String>,

    /// Password; overrides stored credentials
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show only configurations of this project (internal or external id)
    #[arg(short = 'p', long)]
    pub project: Option<String>,

    /// Server address (host:port); overrides config
    #[arg(long)]
    pub server: Option<String>,

    /// User name; overrides stored credentials
    #[arg(long)]
    pub user: Option<String>,

    /// Password; overrides stored credentials
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Server address (host:port)
    pub server: String,

    /// User name
    #[arg(short, long)]
    pub user: String,

    /// Password
    #[arg(short, long)]
    pub password: String,
}

#[derive(Parser, Debug)]
pub struct LogoutArgs {
    /// Server address (host:port)
    pub server: String,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
