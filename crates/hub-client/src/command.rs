//! Interactive command line parsing for the `hub-client` binary.

use clap::{Parser, Subcommand};

use crate::api::Draft;
use crate::message::{GroupKey, Message};

pub const BROADCAST: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Act as another identity
    Switch { id: String },
    /// Replace the channel for the active identity
    Reconnect,
    /// Close the channel
    Close,
    /// List the active inbox
    Inbox,
    /// Remove an inbox entry by its listed index
    Dismiss { index: usize },
    /// Post a message through the hub (`*` broadcasts)
    Send {
        to: String,
        #[arg(value_parser = parse_group)]
        group: GroupKey,
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Show the active identity and connection state
    Status,
    /// Exit
    Quit,
}

#[derive(Debug, Parser)]
#[command(name = "hub", no_binary_name = true)]
struct CommandLine {
    #[command(subcommand)]
    command: Command,
}

fn parse_group(value: &str) -> Result<GroupKey, String> {
    value.parse().map_err(|_| {
        format!("expected one of: system, important, task (got {value})")
    })
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, clap::Error> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.is_empty() {
        return Ok(None);
    }
    CommandLine::try_parse_from(words).map(|parsed| Some(parsed.command))
}

pub fn draft_for(to: &str, group: GroupKey, text: &[String]) -> Draft {
    let draft = Draft::new(group, text.join(" "));
    if to == BROADCAST {
        draft
    } else {
        draft.addressed_to(to)
    }
}

pub fn format_inbox_row(index: usize, message: &Message) -> String {
    let group = message.group();
    format!(
        "{index:>3}  [{}] {:<9} {}",
        group.icon,
        group.label,
        message.payload_text()
    )
}
