#![expect(clippy::print_stdout, clippy::print_stderr)]

use anyhow::{Context, Result};
use clap::Parser;
use hub_client::command::{Command, draft_for, format_inbox_row, parse_command};
use hub_client::{HubConfig, Notification, Session};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "hub-client", about = "Multi-identity hub client")]
struct Args {
    /// Identity to act as on startup.
    #[arg(long, default_value = "mario")]
    identity: String,
    /// Websocket endpoint. Overrides HUB_ENDPOINT.
    #[arg(long)]
    endpoint: Option<String>,
    /// Base URL for outbound messages. Overrides HUB_API_BASE_URL.
    #[arg(long)]
    api_base_url: Option<String>,
}

enum Input {
    Line(Option<String>),
    Event(Option<Notification>),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = HubConfig::from_env().context("load configuration")?;
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(api_base_url) = args.api_base_url {
        config.api_base_url = api_base_url;
    }

    let mut session = Session::from_config(&config).context("build session")?;
    session
        .switch_identity(&args.identity)
        .with_context(|| format!("switch to {}", args.identity))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line.context("read stdin")?),
            event = session.next_event() => Input::Event(event),
        };
        match input {
            Input::Line(Some(line)) => {
                if !handle_line(&mut session, &line).await {
                    break;
                }
            }
            Input::Event(Some(notification)) => print_notification(&notification),
            Input::Line(None) | Input::Event(None) => break,
        }
    }

    session.close();
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn handle_line(session: &mut Session, line: &str) -> bool {
    let command = match parse_command(line) {
        Ok(Some(command)) => command,
        Ok(None) => return true,
        Err(error) => {
            let _ = error.print();
            return true;
        }
    };

    match command {
        Command::Switch { id } => report(session.switch_identity(&id)),
        Command::Reconnect => report(session.reconnect()),
        Command::Close => session.close(),
        Command::Inbox => print_inbox(session),
        Command::Dismiss { index } => match session.dismiss_at(index) {
            Some(_) => print_inbox(session),
            None => eprintln!("no inbox entry {index}"),
        },
        Command::Send { to, group, text } => {
            let mut draft = draft_for(&to, group, &text);
            match session.send_draft(&mut draft).await {
                Ok(()) => println!("sent"),
                Err(error) => eprintln!("{error}"),
            }
        }
        Command::Status => print_status(session),
        Command::Quit => return false,
    }
    true
}

fn report(result: hub_client::Result<()>) {
    if let Err(error) = result {
        eprintln!("{error}");
    }
}

fn print_inbox(session: &Session) {
    let inbox = session.active_inbox();
    if inbox.is_empty() {
        println!("inbox is empty");
        return;
    }
    for (index, message) in inbox.iter().enumerate() {
        println!("{}", format_inbox_row(index, message));
    }
}

fn print_status(session: &Session) {
    let identity = session
        .active_identity()
        .map_or("-", |identity| identity.display_name.as_str());
    println!(
        "identity: {identity}  state: {}  generation: {}  inbox: {}",
        session.state().as_str(),
        session.manager().generation(),
        session.active_inbox().len()
    );
    if let Some(diagnostic) = session.diagnostics().latest() {
        println!(
            "diagnostics: {} (latest: {})",
            session.diagnostics().len(),
            diagnostic.kind()
        );
    }
}

fn print_notification(notification: &Notification) {
    match notification {
        Notification::Opened { identity } => println!("connected as {identity}"),
        Notification::Message { identity, message } => {
            let group = message.group();
            println!(
                "[{}] {} for {identity}: {}",
                group.icon,
                group.label,
                message.payload_text()
            );
        }
        Notification::Closed { identity } => println!("channel for {identity} closed"),
        Notification::Failed { identity, error } => {
            println!("channel for {identity} failed: {error}");
        }
    }
}
