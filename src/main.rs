use anyhow::Result;
use clap::Parser;
use preflight::cli::{AppContext, Cli, Commands};
use preflight::infra::cancel::CancelToken;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
    };

    match cli.command {
        Commands::Run(args) => preflight::commands::run(args, interrupt_token(), &ctx),
        Commands::List(args) => preflight::commands::list(args, &ctx),
        Commands::Login(args) => preflight::commands::login(args, &ctx),
        Commands::Logout(args) => preflight::commands::logout(args, &ctx),
        Commands::Init(args) => preflight::infra::config::init(args, &ctx),
        Commands::Completions(args) => preflight::completion::run(args),
    }
}

/// Token flipped by Ctrl-C so a run in the polling phase can stop cleanly.
#[cfg(unix)]
fn interrupt_token() -> CancelToken {
    use std::sync::OnceLock;

    static TOKEN: OnceLock<CancelToken> = OnceLock::new();

    extern "C" fn on_sigint(_: libc::c_int) {
        // Only the atomic store happens here; everything else runs on the
        // main thread once the token is observed.
        if let Some(token) = TOKEN.get() {
            token.cancel();
        }
    }

    let token = TOKEN.get_or_init(CancelToken::new).clone();
    let handler = on_sigint as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as usize as libc::sighandler_t);
    }
    token
}

#[cfg(not(unix))]
fn interrupt_token() -> CancelToken {
    CancelToken::new()
}
