//! **preflight** - Run personal builds of local changes on a remote build server
//!
//! Packages uncommitted files into a deterministic patch, uploads it, schedules
//! builds on matching configurations, and polls until the server reaches a verdict.

/// Command-line interface with clap integration
pub mod cli;

/// Command entry points (run, login, logout)
pub mod commands;

/// Shell completion generation
pub mod completion;

/// Core pipeline - collection, mapping, patch assembly, orchestration
pub mod core {
    /// Resolved local-to-repository change set
    pub mod changeset;
    pub use changeset::{ChangeSet, ResolvedResource};

    /// Path specification expansion (files, dirs, globs, @listfiles, stdin)
    pub mod collect;
    pub use collect::Collector;

    /// Run and rule-file error taxonomy
    pub mod errors;
    pub use errors::{RuleError, RunError};

    /// Rule-file parsing and longest-prefix path mapping
    pub mod mapper;
    pub use mapper::{MappingResult, RuleFile, RULE_FILE_NAME};

    /// Build configuration selection against the server registry
    pub mod matcher;
    pub use matcher::ConfigurationMatcher;

    /// Deterministic binary patch assembly
    pub mod patch;
    pub use patch::{assemble, assemble_to_temp, PatchSummary};

    /// The personal-build run state machine
    pub mod remote_run;
    pub use remote_run::{RemoteRun, RunOptions, RunOutcome};

    /// Mapping scope chain: override, per-directory rule-files, global file
    pub mod workspace;
    pub use workspace::Workspace;
}

/// Infrastructure - configuration, credentials, cancellation
pub mod infra {
    /// Cooperative cancellation for the polling loop
    pub mod cancel;
    pub use cancel::CancelToken;

    /// Configuration management with TOML support
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// On-disk credential store
    pub mod creds;
    pub use creds::{CredentialStore, StoredCredential};
}

/// Server contract and transport
pub mod remote {
    /// Types and the facade trait the pipeline programs against
    pub mod api;
    pub use api::{ChangeListId, ConfigurationId, ServerFacade, TransportError};

    /// Blocking JSON-over-TCP client
    pub mod client;
    pub use client::RpcClient;
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use crate::core::{ChangeSet, RemoteRun, RunError, RunOptions, Workspace};
pub use infra::{CancelToken, Config, load_config};
pub use remote::{RpcClient, ServerFacade};
