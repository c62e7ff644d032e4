use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};

use vetri::config::ClientConfig;
use vetri::net::api::{self, ApiError};
use vetri::net::connection::ConnectionClient;
use vetri::net::transport::WsConnector;
use vetri::state::chat::{ChatSession, ChatUpdate, SendOutcome};
use vetri::state::expenses::{ExpenseBook, LocalStore, NewExpense, StoreError};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("history request failed: {0}")]
    History(#[from] ApiError),
    #[error("expense store: {0}")]
    Store(#[from] StoreError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no expense with id {0}")]
    UnknownExpense(i64),
    #[error("cannot move {from} -> {to}: list has {len} entries")]
    OutOfRange { from: usize, to: usize, len: usize },
}

#[derive(Parser, Debug)]
#[command(name = "vetri", about = "Vetri chat and expense dashboard client")]
struct Cli {
    /// Overrides `API_BASE`.
    #[arg(long)]
    api_base: Option<String>,

    /// Overrides `WS_URL`.
    #[arg(long)]
    ws_url: Option<String>,

    #[arg(long, env = "EXPENSES_FILE", default_value = "expenses.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print recent chat history as JSON.
    History,
    /// Join the live chat; each stdin line is sent as a message.
    Chat {
        #[arg(long, default_value = "You")]
        name: String,
    },
    Expenses(ExpensesCommand),
}

#[derive(Args, Debug)]
struct ExpensesCommand {
    #[command(subcommand)]
    command: ExpensesSubcommand,
}

#[derive(Subcommand, Debug)]
enum ExpensesSubcommand {
    List,
    Add(ExpenseFields),
    /// Add a JSON array of expenses in one go, as a split bill does.
    Import {
        #[arg(long, default_value = "-", help = "Input file path, or - for stdin")]
        input: String,
    },
    Edit {
        id: i64,
        #[command(flatten)]
        fields: ExpenseFields,
    },
    Delete {
        id: i64,
    },
    /// Move the entry at index FROM to index TO.
    Move {
        from: usize,
        to: usize,
    },
    Summary,
    Trend,
}

#[derive(Args, Debug)]
struct ExpenseFields {
    #[arg(long)]
    amount: Option<f64>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long, help = "YYYY-MM-DD; defaults to today on add")]
    date: Option<String>,
    #[arg(long)]
    title: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    if let Some(api_base) = cli.api_base {
        config = config.with_api_base(api_base);
    }
    if let Some(ws_url) = cli.ws_url {
        config = config.with_ws_url(ws_url);
    }

    match cli.command {
        Command::History => run_history(&config).await,
        Command::Chat { name } => run_chat(&config, &name).await,
        Command::Expenses(expenses) => run_expenses(LocalStore::new(cli.store), expenses),
    }
}

async fn run_history(config: &ClientConfig) -> Result<(), CliError> {
    let http = reqwest::Client::new();
    let messages = api::try_fetch_history(&http, config).await?;
    print_json(&messages)
}

// =============================================================================
// CHAT
// =============================================================================

async fn run_chat(config: &ClientConfig, name: &str) -> Result<(), CliError> {
    let http = reqwest::Client::new();
    let (mut client, events) = ConnectionClient::new(config, WsConnector);
    let mut session = ChatSession::new(events);
    let mut status = client.subscribe();

    session.load_history(api::fetch_history(&http, config).await);
    for msg in &session.state().messages {
        println!("[{}] {}: {}", msg.time, msg.from_user, msg.text);
    }

    client.start();
    eprintln!("-- {}", client.status().label());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                session.send_typing(&client, name);
                if let SendOutcome::LocalOnly(msg) = session.send_message(&client, name, &line, now()) {
                    println!("[{}] {}: {} (not sent)", msg.time, msg.from_user, msg.text);
                }
            }
            update = session.next_update() => match update {
                Some(ChatUpdate::MessageAdded(msg)) => println!("[{}] {}: {}", msg.time, msg.from_user, msg.text),
                Some(ChatUpdate::TypingChanged) => eprintln!("-- {}", session.typing_label().unwrap_or_default()),
                Some(ChatUpdate::Unchanged(_)) => {}
                None => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                eprintln!("-- {}", status.borrow_and_update().label());
            }
            signal = &mut shutdown => {
                signal?;
                break;
            }
        }
    }

    client.stop();
    Ok(())
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

// =============================================================================
// EXPENSES
// =============================================================================

fn run_expenses(store: LocalStore, expenses: ExpensesCommand) -> Result<(), CliError> {
    let mut book = ExpenseBook::load(store)?;
    let today = OffsetDateTime::now_utc();

    match expenses.command {
        ExpensesSubcommand::List => print_json(book.expenses()),
        ExpensesSubcommand::Add(fields) => {
            let mut new = NewExpense::default();
            apply_fields(&mut new, fields);
            let id = book.add(new, today)?;
            print_json(&book.get(id))
        }
        ExpensesSubcommand::Import { input } => {
            let text = if input == "-" {
                std::io::read_to_string(std::io::stdin())?
            } else {
                std::fs::read_to_string(&input)?
            };
            let batch: Vec<NewExpense> = serde_json::from_str(&text)?;
            let ids = book.add_batch(batch, today)?;
            print_json(&ids)
        }
        ExpensesSubcommand::Edit { id, fields } => {
            let Some(current) = book.get(id) else {
                return Err(CliError::UnknownExpense(id));
            };
            let mut updated = current.clone();
            if let Some(amount) = fields.amount {
                updated.amount = amount;
            }
            if fields.category.is_some() {
                updated.category = fields.category;
            }
            if fields.date.is_some() {
                updated.date = fields.date;
            }
            if let Some(title) = fields.title {
                updated.extra.insert("title".to_owned(), title.into());
            }
            book.edit(updated)?;
            print_json(&book.get(id))
        }
        ExpensesSubcommand::Delete { id } => {
            if !book.delete(id)? {
                return Err(CliError::UnknownExpense(id));
            }
            print_json(book.expenses())
        }
        ExpensesSubcommand::Move { from, to } => {
            if !book.reorder(from, to)? {
                let len = book.expenses().len();
                return Err(CliError::OutOfRange { from, to, len });
            }
            print_json(book.expenses())
        }
        ExpensesSubcommand::Summary => print_json(&book.summary()),
        ExpensesSubcommand::Trend => print_json(&book.weekly_trend(today)),
    }
}

fn apply_fields(new: &mut NewExpense, fields: ExpenseFields) {
    new.amount = fields.amount.unwrap_or_default();
    new.category = fields.category;
    new.date = fields.date;
    if let Some(title) = fields.title {
        new.extra.insert("title".to_owned(), title.into());
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
