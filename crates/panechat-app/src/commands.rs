//! Chat input parsing.
//!
//! A submitted line is either a slash command or a chat message. Command
//! names match case-insensitively; arguments keep their case.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Split,
    Unsplit,
    /// Keys in escaped notation, e.g. `ls -la\n`.
    Type(String),
    GetOutput,
    GetFullOutput,
    /// Show the model list, or switch to a model given by name or list number.
    Model(Option<String>),
    Help,
    Quit,
    Unknown(String),
    Chat(String),
}

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "/split",
        description: "Open the terminal pane and start a shell",
    },
    CommandSpec {
        name: "/unsplit",
        description: "Stop the shell and close the pane",
    },
    CommandSpec {
        name: "/type <keys>",
        description: "Send keys to the shell (\\n, \\t, \\e, \\xHH escapes)",
    },
    CommandSpec {
        name: "/get_output",
        description: "Show shell output since the last call",
    },
    CommandSpec {
        name: "/get_full_output",
        description: "Show all shell output of this session",
    },
    CommandSpec {
        name: "/model [name|number]",
        description: "Show or switch the model",
    },
    CommandSpec {
        name: "/help",
        description: "Show this list",
    },
    CommandSpec {
        name: "/quit, /exit",
        description: "Leave panechat",
    },
];

/// Parse a submitted line. Blank input yields `None`.
pub fn parse(input: &str) -> Option<Command> {
    let line = input.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(match line.to_ascii_lowercase().as_str() {
            "quit" | "exit" => Command::Quit,
            _ => Command::Chat(line.to_string()),
        });
    }

    let (name, rest) = match line.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest)),
        None => (line, None),
    };
    let command = match name.to_ascii_lowercase().as_str() {
        "/split" => Command::Split,
        "/unsplit" => Command::Unsplit,
        // Keys are taken verbatim; only the single separating space goes.
        "/type" => Command::Type(
            input
                .trim_start()
                .split_once(char::is_whitespace)
                .map(|(_, keys)| keys)
                .unwrap_or_default()
                .to_string(),
        ),
        "/get_output" => Command::GetOutput,
        "/get_full_output" => Command::GetFullOutput,
        "/model" => Command::Model(rest.map(str::trim).filter(|arg| !arg.is_empty()).map(str::to_string)),
        "/help" => Command::Help,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(command)
}

pub fn help_lines() -> Vec<String> {
    let mut lines = vec!["Commands:".to_string()];
    lines.extend(
        COMMANDS
            .iter()
            .map(|spec| format!("  {:<22} {}", spec.name, spec.description)),
    );
    lines.push("Ctrl+G switches focus between chat and terminal.".to_string());
    lines
}
