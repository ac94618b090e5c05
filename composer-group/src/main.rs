mod config;

use clap::{Parser, Subcommand};
use config::{Config, ConfigError};
use group_aggregator::config::ValidationError;
use group_aggregator::filesystem::FilesystemHandler;
use group_aggregator::repository::RepositoryKind;
use group_aggregator::topology::Repositories;
use group_aggregator::{
    AggregateError, ComposerJsonMerger, DispatchedRepositories, NestedGroupHandler,
    RequestContext,
};
use http::StatusCode;
use http::header::LAST_MODIFIED;
use http_body_util::BodyExt;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Serve Composer metadata reads against group repositories")]
struct Cli {
    /// Path to the YAML configuration
    #[arg(long, short)]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Aggregate one metadata path across a group's members
    Get { repository: String, path: String },
    /// List configured repositories
    Repositories,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
    #[error("unknown repository: {0}")]
    UnknownRepository(String),
    #[error("invalid request path: {0}")]
    InvalidPath(#[from] http::uri::InvalidUri),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Request failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: CliCommand, config: Config) -> Result<ExitCode, CliError> {
    let repositories = Repositories::from_config(&config.group)?;

    match command {
        CliCommand::Repositories => {
            let mut stdout = std::io::stdout().lock();
            for name in repositories.names() {
                let Some(repository) = repositories.get(name) else {
                    continue;
                };
                match repository.kind() {
                    RepositoryKind::Hosted => writeln!(stdout, "{name}\thosted")?,
                    RepositoryKind::Group(facet) => {
                        let members: Vec<_> = facet.members().iter().map(|m| m.name()).collect();
                        writeln!(stdout, "{name}\tgroup\t{}", members.join(","))?
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Get { repository, path } => {
            let target = repositories
                .get(&repository)
                .ok_or(CliError::UnknownRepository(repository))?;
            let context = RequestContext::get(path.parse()?);

            let handler = NestedGroupHandler::new(
                Arc::new(FilesystemHandler::from_config(&config.group)),
                Arc::new(ComposerJsonMerger::new()),
                config.group.dispatch,
            );

            tracing::info!(repository = %target.name(), path = %context.path(), "Aggregating");
            let response = handler
                .aggregator()
                .aggregate(&context, &target, &DispatchedRepositories::new())
                .await?
                .into_http();

            let status = response.status();
            let last_modified = response
                .headers()
                .get(LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = match response.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };

            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{status}")?;
            if let Some(last_modified) = last_modified {
                writeln!(stdout, "Last-Modified: {last_modified}")?;
            }
            if !body.is_empty() {
                writeln!(stdout)?;
                stdout.write_all(&body)?;
                writeln!(stdout)?;
            }

            Ok(match status {
                StatusCode::OK => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            })
        }
    }
}
