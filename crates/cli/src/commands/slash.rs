//! Slash commands typed at the REPL prompt.
//!
//! These are handled before dispatch and never reach the model.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Mode(Option<String>),
    Agent(Option<String>),
    Model(Option<String>),
    Context,
    Tools,
    Improvements,
    Save,
    Reload,
    /// Hand off to Aider with these files
    Edit(Vec<String>),
    Exit,
    Unknown(String),
}

impl SlashCommand {
    /// `None` when `line` is not a slash command.
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix('/')?;
        let mut parts = rest.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts
            .next()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);

        Some(match name.as_str() {
            "help" | "?" => Self::Help,
            "mode" => Self::Mode(arg),
            "agent" => Self::Agent(arg),
            "model" => Self::Model(arg),
            "context" => Self::Context,
            "tools" => Self::Tools,
            "improvements" => Self::Improvements,
            "save" => Self::Save,
            "reload" => Self::Reload,
            "edit" => Self::Edit(
                arg.map(|a| a.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default(),
            ),
            "exit" | "bye" | "quit" => Self::Exit,
            _ => Self::Unknown(name),
        })
    }
}

pub const HELP: &str = "\
Commands:
  /help                    Show this help
  /mode work|personal      Switch mode
  /agent [name]            Switch agent, or list agents
  /model [name]            Switch model (aliases allowed), or list models
  /context                 Summarize this directory's session history
  /tools                   List the tools the model can call
  /improvements            Show recent self-improvements
  /save                    Save the session to history
  /reload                  Save, then restart twin with the same arguments
  /edit [files...]         Hand the plan to Aider for implementation
  /exit, /bye, /quit       Save and leave";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(SlashCommand::parse("what is /etc/hosts?"), None);
        assert_eq!(SlashCommand::parse(""), None);
    }

    #[test]
    fn commands_with_arguments() {
        assert_eq!(SlashCommand::parse("/mode work"), Some(SlashCommand::Mode(Some("work".into()))));
        assert_eq!(SlashCommand::parse("/agent"), Some(SlashCommand::Agent(None)));
        assert_eq!(
            SlashCommand::parse("  /MODEL   smart  "),
            Some(SlashCommand::Model(Some("smart".into())))
        );
        assert_eq!(
            SlashCommand::parse("/edit src/main.rs src/lib.rs"),
            Some(SlashCommand::Edit(vec!["src/main.rs".into(), "src/lib.rs".into()]))
        );
        assert_eq!(SlashCommand::parse("/edit"), Some(SlashCommand::Edit(vec![])));
    }

    #[test]
    fn exit_aliases() {
        for line in ["/exit", "/bye", "/quit"] {
            assert_eq!(SlashCommand::parse(line), Some(SlashCommand::Exit));
        }
    }

    #[test]
    fn unknown_command_keeps_name() {
        assert_eq!(SlashCommand::parse("/dance now"), Some(SlashCommand::Unknown("dance".into())));
    }
}
