//! Built-in tool executors for twin.
//!
//! Tools give the model the ability to act on the local machine:
//! read, write and edit files, run shell commands, search the filesystem
//! and the web, and patch twin's own source tree.

pub mod args;
pub mod file_edit;
pub mod file_read;
pub mod file_write;
pub mod glob_search;
pub mod grep_search;
pub mod html;
pub mod self_patch;
pub mod shell;
pub mod web_fetch;
pub mod web_search;
pub mod workspace;

#[cfg(test)]
mod test_http;

use std::time::Duration;

use tracing::debug;
use twin_config::AppConfig;
use twin_core::tool::ToolRegistry;

pub use self_patch::{ImproveSelfTool, SelfPatcher};
pub use workspace::Workspace;

/// Create the tool registry for a session rooted at `workspace`.
///
/// `improve_self` is only registered when a source directory is configured.
/// Tools listed in `tools.disabled` are left out.
pub fn default_registry(config: &AppConfig, workspace: Workspace) -> ToolRegistry {
    let tools = &config.tools;
    let mut registry = ToolRegistry::new();

    registry.register(Box::new(file_read::FileReadTool::new(workspace.clone())));
    registry.register(Box::new(file_write::FileWriteTool::new(workspace.clone())));
    registry.register(Box::new(file_edit::FileEditTool::new(workspace.clone())));
    registry.register(Box::new(
        shell::ShellTool::new(workspace.clone(), Duration::from_secs(tools.shell_timeout_secs))
            .with_allowlist(tools.allowed_commands.clone()),
    ));
    registry.register(Box::new(glob_search::GlobTool::new(workspace.clone())));
    registry.register(Box::new(grep_search::GrepTool::new(workspace)));
    registry.register(Box::new(web_search::WebSearchTool::new(
        tools.search_endpoint.clone(),
        Duration::from_secs(tools.search_timeout_secs),
        &tools.user_agent,
    )));
    registry.register(Box::new(
        web_fetch::WebFetchTool::new(Duration::from_secs(tools.fetch_timeout_secs), &tools.user_agent)
            .with_proxy(tools.fetch_proxy_url.clone())
            .with_max_content_chars(tools.max_content_chars),
    ));

    if let Some(source_dir) = &config.paths.source_dir {
        registry.register(Box::new(ImproveSelfTool::new(SelfPatcher::git(source_dir))));
    }

    for name in &tools.disabled {
        if registry.remove(name) {
            debug!(tool = %name, "Tool disabled by configuration");
        }
    }
    registry
}
