use std::{collections::BTreeMap, io, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use thiserror::Error;

use warden_core::{ErrorKind, Request, Response, SessionId, WardenError};
use warden_ipc::WardenClient;

#[derive(Debug, Parser)]
#[command(name = "warden", about = "CLI client for the wardend policy mediator")]
struct Cli {
    #[arg(long, default_value = "/tmp/wardend.sock")]
    socket: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs a command under wardend's classifier and executors.
    Exec {
        #[arg(long)]
        cwd: Option<String>,
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
        #[arg(long)]
        session: Option<String>,
        #[arg(last = true, required = true, num_args = 1..)]
        argv: Vec<String>,
    },
    /// Lists currently active sessions.
    Sessions,
    /// Writes raw stdin data to a live interactive session.
    WriteInput { session_id: String, data: String },
    /// Forces an immediate anchor of a session's Merkle root.
    Anchor { session_id: String },
    /// Aborts a live interactive session.
    Abort {
        session_id: String,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Ipc(#[from] warden_ipc::IpcError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("daemon error [{kind:?}]: {message}{detail}")]
    Daemon { kind: ErrorKind, message: String, detail: String },
    #[error("invalid env var '{value}': expected KEY=VALUE")]
    InvalidEnv { value: String },
    #[error("unexpected response for {command}: {response:?}")]
    Unexpected { command: &'static str, response: Box<Response> },
}

impl From<WardenError> for CliError {
    fn from(err: WardenError) -> Self {
        CliError::Daemon { kind: err.kind, message: err.message, detail: format_detail(err.detail) }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let mut client = WardenClient::connect(&cli.socket).await?;

    match cli.command {
        Command::Exec { cwd, env, timeout_ms, session, argv } => {
            let (command, args) = argv.split_first().expect("clap enforces non-empty argv");
            let response = client
                .call(Request::Execute {
                    command: command.clone(),
                    args: args.to_vec(),
                    cwd,
                    env_overlay: Some(parse_env_pairs(env)?),
                    timeout_ms,
                    session_id: session.map(SessionId),
                    idempotency_key: None,
                })
                .await?;

            match response {
                Response::Execute { session_id, exit_code, stdout, stderr, truncated, audit_hash, input_required } => {
                    print!("{stdout}");
                    eprint!("{stderr}");
                    if truncated {
                        eprintln!("(output truncated)");
                    }
                    if input_required {
                        eprintln!("session {session_id} is awaiting input; use write-input to continue");
                    }
                    eprintln!("session {session_id} audit {audit_hash}");
                    if let Some(code) = exit_code {
                        if code != 0 {
                            std::process::exit(code);
                        }
                    }
                    Ok(())
                }
                Response::Error(err) => Err(err.into()),
                other => Err(CliError::Unexpected { command: "exec", response: Box::new(other) }),
            }
        }
        Command::Sessions => {
            let response = client.call(Request::ListSessions {}).await?;
            match response {
                Response::ListSessions { sessions } => {
                    for entry in sessions {
                        println!("{}\t{}\tactions={}\tactive={}", entry.session_id, entry.created_at, entry.action_count, entry.active);
                    }
                    Ok(())
                }
                Response::Error(err) => Err(err.into()),
                other => Err(CliError::Unexpected { command: "sessions", response: Box::new(other) }),
            }
        }
        Command::WriteInput { session_id, data } => {
            let response = client.call(Request::WriteInput { session_id: SessionId(session_id), data }).await?;
            match response {
                Response::WriteInput { ack } => {
                    println!("{ack}");
                    Ok(())
                }
                Response::Error(err) => Err(err.into()),
                other => Err(CliError::Unexpected { command: "write-input", response: Box::new(other) }),
            }
        }
        Command::Anchor { session_id } => {
            let response = client.call(Request::AnchorSession { session_id: SessionId(session_id) }).await?;
            match response {
                Response::AnchorSession { session_id, merkle_root, action_count } => {
                    println!("{session_id}\t{merkle_root}\tactions={action_count}");
                    Ok(())
                }
                Response::Error(err) => Err(err.into()),
                other => Err(CliError::Unexpected { command: "anchor", response: Box::new(other) }),
            }
        }
        Command::Abort { session_id, force } => {
            let response = client.call(Request::Abort { session_id: SessionId(session_id), force }).await?;
            match response {
                Response::Abort { ack } => {
                    println!("{ack}");
                    Ok(())
                }
                Response::Error(err) => Err(err.into()),
                other => Err(CliError::Unexpected { command: "abort", response: Box::new(other) }),
            }
        }
    }
}

fn parse_env_pairs(pairs: Vec<String>) -> Result<BTreeMap<String, String>, CliError> {
    let mut env = BTreeMap::new();

    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::InvalidEnv { value: pair });
        };

        if key.is_empty() {
            return Err(CliError::InvalidEnv { value: format!("={value}") });
        }

        env.insert(key.to_string(), value.to_string());
    }

    Ok(env)
}

fn format_detail(detail: Option<String>) -> String {
    detail.map(|value| format!(" ({value})")).unwrap_or_default()
}
