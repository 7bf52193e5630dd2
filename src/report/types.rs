use crate::pr::{FileChange, Identity, PrInfo, PrRef};

/// Result of one CLI operation, ready to be rendered.
#[derive(Debug)]
pub enum Report {
    Login(Identity),
    Info(PrInfo),
    Files { pr: PrRef, files: Vec<FileChange> },
    Content {
        path: String,
        commit_id: String,
        content: String,
    },
}

impl Report {
    /// Heading shared by the terminal and markdown renderers.
    pub fn title(&self) -> String {
        match self {
            Report::Login(_) => "Azure CLI Login Status".to_string(),
            Report::Info(info) => format!("PR #{}: \"{}\"", info.id, info.title),
            Report::Files { pr, .. } => format!("Changed Files: {}", pr),
            Report::Content { path, .. } => format!("File Content: {}", path),
        }
    }
}
