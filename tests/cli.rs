use clap::Parser;
use preflight::cli::{Cli, Commands, ListArgs, RunArgs};

#[test]
fn run_flag_parsing() {
    // Given
    let argv = vec![
        "pfl",
        "run",
        "-m",
        "fix the widget",
        "-c",
        "bt12,MyProject_Fast",
        "--timeout",
        "120",
        "--keep-patch",
        "--no-wait",
        "src/widget.rs",
        "@changes.lst",
    ];

    // When
    let cmd = Cli::parse_from(argv);

    // Then
    match cmd.command {
        Commands::Run(RunArgs {
            message,
            configurations,
            timeout,
            keep_patch,
            no_wait,
            paths,
            project,
            ..
        }) => {
            assert_eq!(message, "fix the widget");
            assert_eq!(configurations, vec!["bt12", "MyProject_Fast"]);
            assert_eq!(timeout, Some(120));
            assert!(keep_patch);
            assert!(no_wait);
            assert_eq!(paths, vec!["src/widget.rs", "@changes.lst"]);
            assert!(project.is_none());
        }
        _ => panic!("expected Run command"),
    }
}

#[test]
fn project_conflicts_with_configurations() {
    let argv = vec![
        "pfl",
        "run",
        "-m",
        "msg",
        "-c",
        "bt1",
        "-p",
        "MyProject",
    ];
    assert!(Cli::try_parse_from(argv).is_err());
}

#[test]
fn list_flag_parsing() {
    let argv = vec!["pfl", "list", "-p", "Web", "--server", "build.example:9090"];
    let cmd = Cli::parse_from(argv);
    match cmd.command {
        Commands::List(ListArgs {
            project, server, ..
        }) => {
            assert_eq!(project.as_deref(), Some("Web"));
            assert_eq!(server.as_deref(), Some("build.example:9090"));
        }
        _ => panic!("expected List command"),
    }
}

#[test]
fn message_is_required() {
    assert!(Cli::try_parse_from(vec!["pfl", "run", "a.txt"]).is_err());
}
