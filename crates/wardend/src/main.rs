mod broker;
mod dispatch;

use std::{
    fs, io,
    os::unix::fs::FileTypeExt,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use clap::Parser;
use tracing::info;

use warden_classify::{CommandClassifier, UnverifiedManifest};
use warden_core::{Config, PROTOCOL_VERSION};
use warden_exec::PtyManager;
use warden_ipc::serve_unix;
use warden_session::{LocalJsonlAnchorSink, SessionManager};

use broker::EscalatingBroker;
use dispatch::Dispatcher;

#[derive(Debug, Parser)]
#[command(name = "wardend", about = "Policy-enforcing mediator daemon between an agent and the host shell")]
struct Args {
    #[arg(long, default_value = "/tmp/wardend.sock")]
    socket: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("wardend error: {err}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let args = Args::parse();
    prepare_socket_path(&args.socket)?;

    let config = Config::from_env();
    info!(
        project_root = %config.project_root.display(),
        env = ?config.env,
        protocol = PROTOCOL_VERSION,
        "starting wardend"
    );

    let classifier = Arc::new(match &config.policy_manifest {
        Some(path) => CommandClassifier::with_manifest(path, &UnverifiedManifest)?,
        None => CommandClassifier::new(false),
    });

    let wal_dir = warden_core::default_wal_dir();
    fs::create_dir_all(&wal_dir)?;
    let anchor_sink = Arc::new(LocalJsonlAnchorSink::new(wal_dir.clone()));
    let sessions = Arc::new(SessionManager::new(config.project_root.to_string_lossy().into_owned(), wal_dir, anchor_sink));
    sessions.start_anchor_loop()?;

    let pty = Arc::new(PtyManager::new());
    let broker = Arc::new(EscalatingBroker);
    let dispatcher = Arc::new(Dispatcher::new(classifier, Arc::clone(&sessions), pty, broker, config)?);

    info!(socket = %args.socket.display(), "listening");
    serve_unix(&args.socket, dispatcher).await?;

    sessions.stop_anchor_loop().await;
    Ok(())
}

fn prepare_socket_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.file_type().is_socket() {
                fs::remove_file(path)
            } else {
                Err(io::Error::new(io::ErrorKind::AlreadyExists, format!("{} exists and is not a socket", path.display())))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}
