mod config;
mod pr;
mod report;
mod server;

use clap::{Parser, Subcommand};
use rmcp::ServiceExt;
use std::path::PathBuf;
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use pr::{AdoClient, PrLocator};
use report::Report;

/// ADO PR MCP: lets an AI assistant review Azure DevOps Pull Requests
/// using the Azure CLI session. Serves MCP over stdio by default.
#[derive(Parser, Debug)]
#[command(name = "ado-pr-mcp", version, about)]
struct Cli {
    /// Config file (default: .ado-pr.toml in the current directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Optional output file path for a markdown report (one-shot commands)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the MCP server on stdin/stdout (default)
    Serve,
    /// Check the Azure CLI session
    Login {
        /// Organization to verify the credential against
        #[arg(long)]
        organization: Option<String>,
    },
    /// Show PR metadata
    Info {
        /// Azure DevOps PR URL (e.g., https://dev.azure.com/org/project/_git/repo/pullrequest/42)
        pr_url: String,
    },
    /// List files changed in the latest iteration
    Files {
        /// Azure DevOps PR URL
        pr_url: String,
    },
    /// Print a file at a commit (see `info` for the PR's source commit)
    Content {
        /// Azure DevOps PR URL
        pr_url: String,
        /// Repository path of the file
        path: String,
        /// Commit to read from
        #[arg(long)]
        commit: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the MCP transport; logs go to stderr only.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let config = config::Config::load(cli.config.as_deref())?;
    debug!(api_base = %config.azure.api_base, pat = config.pat().is_some(), "configuration loaded");
    let client = AdoClient::from_config(&config)?;

    let report = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let server =
                server::AdoPrServer::new(client, config.azure.default_target_branch.clone());
            server::log_tools(&server);
            info!("serving MCP on stdio");
            let service = server
                .serve(rmcp::transport::io::stdio())
                .await
                .inspect_err(|e| tracing::error!(error = %e, "MCP server error"))?;
            service.waiting().await?;
            info!("client disconnected");
            return Ok(());
        }
        Command::Login { organization } => {
            Report::Login(client.check_login(organization.as_deref()).await?)
        }
        Command::Info { pr_url } => {
            let _span = info_span!("info", pr_url = %pr_url).entered();
            let pr = pr::reference::resolve(&PrLocator::from_url(pr_url))?;
            Report::Info(client.get_pr_info(&pr).await?)
        }
        Command::Files { pr_url } => {
            let _span = info_span!("files", pr_url = %pr_url).entered();
            let pr = pr::reference::resolve(&PrLocator::from_url(pr_url))?;
            let files = client.list_changed_files(&pr).await?;
            info!(files = files.len(), "listed changed files");
            Report::Files { pr, files }
        }
        Command::Content {
            pr_url,
            path,
            commit,
        } => {
            let _span = info_span!("content", pr_url = %pr_url, path = %path).entered();
            let repo = pr::reference::resolve_repo(&PrLocator::from_url(pr_url))?;
            let content = client.get_file_content(&repo, &path, &commit).await?;
            Report::Content {
                path,
                commit_id: commit,
                content,
            }
        }
    };

    report::output(&report, cli.output.as_deref())?;
    info!("done");
    Ok(())
}
