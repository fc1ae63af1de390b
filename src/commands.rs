//! Command entry points wired from `main`.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{self, IsTerminal, Read};
use std::time::Duration;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use crate::cli::{AppContext, ListArgs, LoginArgs, LogoutArgs, RunArgs};
use crate::core::remote_run::{RemoteRun, RunOptions};
use crate::infra::cancel::CancelToken;
use crate::infra::config::load_config;
use crate::infra::creds::{CredentialStore, StoredCredential};
use crate::remote::api::{BuildConfiguration, ServerFacade};
use crate::remote::client::RpcClient;

/// Packages local changes and drives the personal build to a verdict.
pub fn run(args: RunArgs, cancel: CancelToken, ctx: &AppContext) -> Result<()> {
    let config = load_config()?;
    let default_timeout = config.timeout();
    let default_poll_interval = config.poll_interval();

    let server = args
        .server
        .or(config.server)
        .context("No server configured. Pass --server or set `server` in preflight.toml")?;
    let (user, password) = resolve_credentials(&server, args.user, args.password)?;

    let base = std::env::current_dir().context("Cannot determine working directory")?;
    let mut opts = RunOptions::new(args.message, base);
    opts.configurations = args.configurations;
    opts.project = args.project;
    opts.force_compatibility_check = args.force_compat_check;
    opts.check_for_changes_early = args.check_early;
    opts.force_clean_checkout = args.clean;
    opts.commit_on_success = args.commit;
    opts.no_wait = args.no_wait;
    opts.timeout = args.timeout.map_or(default_timeout, Duration::from_secs);
    opts.poll_interval = args
        .poll_interval
        .map_or(default_poll_interval, Duration::from_secs);
    opts.keep_patch = args.keep_patch;
    opts.mapping_file = args.mapping_file;
    opts.paths = args.paths;

    // Piped path specifications, consulted only when no positional paths
    // were given.
    let stdin = if opts.paths.is_empty() && !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read path specifications from stdin")?;
        Some(buffer)
    } else {
        None
    };

    let client = RpcClient::connect(&server, &user, &password)?;
    let runner = RemoteRun::new(&client, &user, cancel);
    let outcome = runner.execute(&opts, stdin.as_deref(), ctx)?;

    if !ctx.quiet {
        let verdict = if outcome.waited {
            format!("personal build for change {} succeeded", outcome.change_list)
        } else {
            format!(
                "scheduled change {} on {} configuration(s)",
                outcome.change_list,
                outcome.scheduled.len()
            )
        };
        if ctx.no_color {
            println!("{verdict}");
        } else {
            println!("{}", verdict.green());
        }
        if let Some(kept) = &outcome.retained_patch {
            println!("patch kept at {}", kept.display());
        }
    }
    Ok(())
}

/// Prints the build configurations the server offers, grouped by project.
pub fn list(args: ListArgs, ctx: &AppContext) -> Result<()> {
    let config = load_config()?;
    let server = args
        .server
        .or(config.server)
        .context("No server configured. Pass --server or set `server` in preflight.toml")?;
    let (user, password) = resolve_credentials(&server, args.user, args.password)?;

    let client = RpcClient::connect(&server, &user, &password)?;
    let configurations = client.list_configurations()?;
    let listing = render_configuration_listing(&configurations, args.project.as_deref());
    if listing.is_empty() {
        if !ctx.quiet {
            println!("no matching configurations");
        }
        return Ok(());
    }
    print!("{listing}");
    Ok(())
}

fn render_configuration_listing(
    configurations: &[BuildConfiguration],
    project: Option<&str>,
) -> String {
    let mut by_project: BTreeMap<&str, Vec<&BuildConfiguration>> = BTreeMap::new();
    for cfg in configurations {
        if let Some(wanted) = project
            && cfg.project_id != wanted
            && cfg.project_external_id != wanted
        {
            continue;
        }
        by_project
            .entry(cfg.project_external_id.as_str())
            .or_default()
            .push(cfg);
    }

    let mut out = String::new();
    for (project, mut configs) in by_project {
        configs.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        let _ = writeln!(out, "{project}");
        for cfg in configs {
            let _ = writeln!(out, "  {}  [{}]", cfg.external_id, cfg.internal_id);
        }
    }
    out
}

pub fn login(args: LoginArgs, ctx: &AppContext) -> Result<()> {
    let store = CredentialStore::open_default();
    store.store(StoredCredential {
        server: args.server.clone(),
        user: args.user,
        password: args.password,
    })?;
    if !ctx.quiet {
        println!("Stored credentials for {}", args.server);
    }
    Ok(())
}

pub fn logout(args: LogoutArgs, ctx: &AppContext) -> Result<()> {
    let store = CredentialStore::open_default();
    let removed = store.remove(&args.server)?;
    if !ctx.quiet {
        if removed {
            println!("Removed credentials for {}", args.server);
        } else {
            println!("No stored credentials for {}", args.server);
        }
    }
    Ok(())
}

fn resolve_credentials(
    server: &str,
    user: Option<String>,
    password: Option<String>,
) -> Result<(String, String)> {
    if let (Some(user), Some(password)) = (user.clone(), password.clone()) {
        return Ok((user, password));
    }

    let stored = CredentialStore::open_default().find(server)?;
    match stored {
        Some(credential) => Ok((
            user.unwrap_or(credential.user),
            password.unwrap_or(credential.password),
        )),
        None => anyhow::bail!(
            "No credentials for {server}. Run `pfl login {server} --user <name> --password <pass>` \
             or pass --user and --password"
        ),
    }
}
