//! Command-line access to Overleaf projects.
//!
//! Usage:
//!   overleaf --cookies cookies.txt ls "My Thesis/chapters"
//!   overleaf --cookies cookies.txt write "My Thesis/notes.txt" --file notes.txt
//!
//! Remote paths start with the project name (or id), followed by the path
//! inside the project.

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use overleaflib::{ClientConfig, MkdirOptions, OverleafError, ProjectClient, ProjectIo, Session};

#[derive(Parser)]
#[command(name = "overleaf", version, about = "Unofficial Overleaf client")]
struct Cli {
    /// Cookie file (Netscape cookies.txt, JSON, or a Cookie header line)
    #[arg(long, env = "OVERLEAF_COOKIES", default_value = "cookies.txt")]
    cookies: PathBuf,

    /// Overleaf instance
    #[arg(long, env = "OVERLEAF_URL")]
    base_url: Option<String>,

    /// HTTP proxy (e.g. http://proxy:8080)
    #[arg(long, env = "OVERLEAF_PROXY")]
    proxy: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List projects
    Projects {
        /// Include archived and trashed projects
        #[arg(short, long)]
        all: bool,
    },
    /// List a folder
    Ls {
        /// PROJECT[/PATH]
        target: String,
        /// List recursively
        #[arg(short, long)]
        recursive: bool,
    },
    /// Create a folder
    Mkdir {
        /// PROJECT/PATH
        target: String,
        /// Create missing parents, accept an existing folder
        #[arg(short, long)]
        parents: bool,
    },
    /// Print a file or doc to stdout
    Read {
        /// PROJECT/PATH
        target: String,
    },
    /// Write stdin (or a local file) to a file or doc
    Write {
        /// PROJECT/PATH
        target: String,
        /// Local file to upload instead of stdin
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Delete a file, doc or folder
    Rm {
        /// PROJECT/PATH
        target: String,
        /// Do not fail if the path does not exist
        #[arg(short, long)]
        force: bool,
    },
    /// Download a project as a zip archive
    DownloadProject {
        /// Project name or id
        project: String,
        /// Output file (defaults to "<project>.zip")
        output: Option<PathBuf>,
    },
}

fn is_project_id(s: &str) -> bool {
    s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Split "PROJECT/PATH" into project and in-project path.
fn split_target(target: &str) -> (&str, &str) {
    let target = target.trim_start_matches('/');
    target.split_once('/').unwrap_or((target, ""))
}

async fn project_id(session: &Session, project: &str) -> anyhow::Result<String> {
    match session.project_by_name(project).await {
        Ok(found) => Ok(found.id),
        Err(OverleafError::NotFound { .. }) if is_project_id(project) => Ok(project.to_string()),
        Err(OverleafError::NotFound { .. }) => bail!("no project named '{}'", project),
        Err(e) => Err(e.into()),
    }
}

async fn open_project(session: &Session, target: &str) -> anyhow::Result<(ProjectIo<ProjectClient>, String)> {
    let (project, path) = split_target(target);
    if project.is_empty() {
        bail!("missing project name in '{}'", target);
    }
    let id = project_id(session, project).await?;
    Ok((session.project_io(&id), path.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("overleaflib=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(url) = &cli.base_url {
        config = config.with_base_url(url);
    }
    if let Some(proxy) = &cli.proxy {
        config = config.with_proxy(proxy);
    }

    let session = Session::load(&cli.cookies, config)?
        .with_context(|| format!("cookie file not found: {}", cli.cookies.display()))?;

    match cli.command {
        Command::Projects { all } => {
            for project in session.api().projects(all, all).await? {
                let mut flags = Vec::new();
                if project.archived {
                    flags.push("archived");
                }
                if project.trashed {
                    flags.push("trashed");
                }
                println!(
                    "{}  {}{}",
                    project.id,
                    project.name,
                    if flags.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", flags.join(", "))
                    }
                );
            }
        }
        Command::Ls { target, recursive } => {
            let (mut io, path) = open_project(&session, &target).await?;
            let entries: Vec<(String, String)> = if recursive {
                io.walk(&path)
                    .await?
                    .into_iter()
                    .map(|(p, e)| (p, e.kind().to_string()))
                    .collect()
            } else {
                io.listdir(&path)
                    .await?
                    .into_iter()
                    .map(|e| (e.name().to_string(), e.kind().to_string()))
                    .collect()
            };
            for (name, kind) in entries {
                let marker = if kind == "folder" { "/" } else { "" };
                println!("{:<6} {}{}", kind, name, marker);
            }
        }
        Command::Mkdir { target, parents } => {
            let (mut io, path) = open_project(&session, &target).await?;
            let options = MkdirOptions {
                parents,
                exist_ok: parents,
            };
            let folder = io.mkdir(&path, options).await?;
            tracing::info!(path = %path, id = folder.id(), "folder ready");
        }
        Command::Read { target } => {
            let (mut io, path) = open_project(&session, &target).await?;
            let content = io.read(&path).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content)?;
            stdout.flush()?;
        }
        Command::Write { target, file } => {
            let content = match &file {
                Some(file) => std::fs::read(file)
                    .with_context(|| format!("failed to read {}", file.display()))?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            let (mut io, path) = open_project(&session, &target).await?;
            let entity = io.write(&path, &content).await?;
            tracing::info!(path = %path, id = entity.id(), kind = %entity.kind(), bytes = content.len(), "written");
        }
        Command::Rm { target, force } => {
            let (mut io, path) = open_project(&session, &target).await?;
            if path.is_empty() {
                bail!("refusing to delete a whole project");
            }
            if !io.remove(&path, force).await? {
                tracing::info!(path = %path, "nothing to delete");
            }
        }
        Command::DownloadProject { project, output } => {
            let id = project_id(&session, &project).await?;
            let archive = session.download_project(&id).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.zip", project)));
            std::fs::write(&output, &archive)
                .with_context(|| format!("failed to write {}", output.display()))?;
            tracing::info!(path = %output.display(), bytes = archive.len(), "project downloaded");
        }
    }

    Ok(())
}
