pub mod types;

pub use types::Report;

use crate::pr::types::ChangeType;
use crate::pr::{FileChange, Identity, PrInfo};
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Output the report to the terminal (default) or to a markdown file.
#[instrument(skip(report), fields(title = %report.title()))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            write_markdown_report(report, path)
        }
    }
}

/// Format and print the report to the terminal with colors.
///
/// PR #42: "Add OAuth2 login flow"
/// Author: alice | Status: active | feature/login → main
/// ...
fn print_terminal_report(report: &Report) {
    println!();
    println!("{}", report.title().bold());
    match report {
        Report::Login(identity) => print_identity(identity),
        Report::Info(info) => print_info(info),
        Report::Files { files, .. } => {
            if files.is_empty() {
                println!("  No changed files.");
            }
            for file in files {
                println!("  {} {}", colorize_change(&file.change_type), describe_path(file));
            }
            println!();
            println!("Total files changed: {}", files.len());
        }
        Report::Content {
            commit_id, content, ..
        } => {
            println!("Commit: {}", commit_id.dimmed());
            println!();
            println!("{}", content);
        }
    }
    println!();
}

fn print_identity(identity: &Identity) {
    println!("{} Logged in as {}", "✓".green().bold(), identity.name.bold());
    println!("  Account type: {}", identity.kind);
    if let Some(subscription) = &identity.subscription {
        println!("  Subscription: {}", subscription);
    }
    if let Some(tenant) = &identity.tenant_id {
        println!("  Tenant: {}", tenant);
    }
}

fn print_info(info: &PrInfo) {
    println!(
        "Author: {} | Status: {} | {} → {}",
        info.author, info.status, info.source_branch, info.target_branch
    );
    println!(
        "Repository: {}/{}/{} | Created: {}",
        info.organization, info.project, info.repository, info.created_date
    );
    println!(
        "Iteration {} | source commit {} | target commit {}",
        info.latest_iteration_id,
        info.source_commit_id.cyan(),
        info.target_commit_id.dimmed()
    );
    println!();
    if info.description.trim().is_empty() {
        println!("No description provided.");
    } else {
        println!("{}", info.description);
    }
}

/// Render the report as markdown.
pub fn to_markdown(report: &Report) -> String {
    let mut md = format!("# {}\n\n", report.title());
    match report {
        Report::Login(identity) => {
            md.push_str(&format!("Logged in as **{}** ({})\n", identity.name, identity.kind));
            if let Some(subscription) = &identity.subscription {
                md.push_str(&format!("\n**Subscription:** {}\n", subscription));
            }
        }
        Report::Info(info) => {
            md.push_str(&format!(
                "**Author:** {} | **Status:** {} | **Created:** {}\n\n",
                info.author, info.status, info.created_date
            ));
            md.push_str("## Branches\n\n");
            md.push_str(&format!("- Source: `{}`\n", info.source_branch));
            md.push_str(&format!("- Target: `{}`\n\n", info.target_branch));
            md.push_str(&format!(
                "**Repository:** {}/{}/{}\n\n",
                info.organization, info.project, info.repository
            ));
            md.push_str(&format!("## Latest Iteration ({})\n\n", info.latest_iteration_id));
            md.push_str(&format!("- Source commit: `{}`\n", info.source_commit_id));
            md.push_str(&format!("- Target commit: `{}`\n\n", info.target_commit_id));
            md.push_str("## Description\n\n");
            if info.description.trim().is_empty() {
                md.push_str("No description provided.\n");
            } else {
                md.push_str(&format!("{}\n", info.description));
            }
        }
        Report::Files { files, .. } => {
            for file in files {
                md.push_str(&format!(
                    "{} `{}` ({})\n",
                    change_marker(&file.change_type),
                    describe_path(file),
                    file.change_type
                ));
            }
            md.push_str(&format!("\n**Total files changed:** {}\n", files.len()));
        }
        Report::Content {
            commit_id, content, ..
        } => {
            md.push_str(&format!("**Commit:** `{}`\n\n", commit_id));
            md.push_str(&format!("```\n{}\n```\n", content));
        }
    }
    md
}

fn write_markdown_report(report: &Report, path: &Path) -> Result<(), ReportError> {
    std::fs::write(path, to_markdown(report))?;
    Ok(())
}

fn describe_path(file: &FileChange) -> String {
    match (&file.change_type, &file.original_path) {
        (ChangeType::Rename, Some(original)) => format!("{} ← {}", file.path, original),
        _ => file.path.clone(),
    }
}

fn change_marker(change: &ChangeType) -> &'static str {
    match change {
        ChangeType::Add => "➕",
        ChangeType::Edit => "✏️",
        ChangeType::Delete => "❌",
        ChangeType::Rename | ChangeType::Other(_) => "📝",
    }
}

/// Helper to colorize a change type for terminal output.
fn colorize_change(change: &ChangeType) -> colored::ColoredString {
    let label = format!("{:<6}", change.as_str());
    match change {
        ChangeType::Add => label.green().bold(),
        ChangeType::Edit => label.yellow().bold(),
        ChangeType::Delete => label.red().bold(),
        ChangeType::Rename | ChangeType::Other(_) => label.cyan().bold(),
    }
}
