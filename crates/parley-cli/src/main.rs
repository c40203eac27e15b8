mod config;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use parley_db::Database;
use parley_service::Messenger;
use parley_types::api::{EditMessage, NewUser, PageQuery, SendMessage};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Maintenance CLI for the parley messaging store")]
struct Cli {
    /// Database file (overrides PARLEY_DB_PATH)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the schema and exit
    Migrate,

    /// Register a user
    AddUser { username: String, email: String },

    /// Send a message (user arguments accept a username or id)
    Send {
        #[arg(long = "as")]
        actor: String,
        #[arg(long)]
        to: String,
        /// Message this one replies to
        #[arg(long)]
        reply_to: Option<Uuid>,
        content: String,
    },

    /// Replace a message's content
    Edit {
        #[arg(long = "as")]
        actor: String,
        message_id: Uuid,
        content: String,
    },

    /// Show the edit history of a message
    History { message_id: Uuid },

    /// Print the reply tree rooted at a message
    Thread { message_id: Uuid },

    /// List a user's unread messages
    Unread { user: String },

    /// List a user's notifications
    Notifications {
        user: String,
        #[arg(long)]
        unread: bool,
    },

    /// Mark a notification read
    Read {
        #[arg(long = "as")]
        actor: String,
        notification_id: Uuid,
    },

    /// Page through the messages between two users, newest first
    Conversation {
        user: String,
        other: String,
        #[arg(long, short = 'n', default_value_t = parley_types::api::DEFAULT_PAGE_SIZE)]
        limit: u32,
        /// Only messages created before this RFC 3339 timestamp
        #[arg(long)]
        before: Option<DateTime<Utc>>,
        /// Id of the oldest message already seen, to break timestamp ties
        #[arg(long, requires = "before")]
        before_id: Option<Uuid>,
    },

    /// Delete a user and everything they own
    DeleteUser { user: String },

    /// Row counts per table
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(path) = cli.db {
        config.db_path = path;
    }

    let db = Database::open_with(&config.db_path, config.store.clone())
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let messenger = Messenger::new(db);

    match cli.command {
        Commands::Migrate => {
            info!("Schema is up to date at {}", config.db_path.display());
        }
        Commands::AddUser { username, email } => {
            print_json(&messenger.register_user(NewUser { username, email }).await?)?;
        }
        Commands::Send {
            actor,
            to,
            reply_to,
            content,
        } => {
            let sender = resolve_user(&messenger, &actor).await?;
            let receiver = resolve_user(&messenger, &to).await?;
            let mut req = SendMessage::new(sender, receiver, content);
            req.parent_id = reply_to;
            print_json(&messenger.send(sender, req).await?)?;
        }
        Commands::Edit {
            actor,
            message_id,
            content,
        } => {
            let editor = resolve_user(&messenger, &actor).await?;
            print_json(&messenger.edit(editor, message_id, EditMessage { content }).await?)?;
        }
        Commands::History { message_id } => {
            print_json(&messenger.history(message_id).await?)?;
        }
        Commands::Thread { message_id } => {
            print_json(messenger.thread(message_id).await?.as_ref())?;
        }
        Commands::Unread { user } => {
            let user = resolve_user(&messenger, &user).await?;
            print_json(messenger.unread(user).await?.as_ref())?;
        }
        Commands::Notifications { user, unread } => {
            let user = resolve_user(&messenger, &user).await?;
            print_json(&messenger.notifications(user, unread).await?)?;
        }
        Commands::Read {
            actor,
            notification_id,
        } => {
            let user = resolve_user(&messenger, &actor).await?;
            print_json(&messenger.mark_read(user, notification_id).await?)?;
        }
        Commands::Conversation {
            user,
            other,
            limit,
            before,
            before_id,
        } => {
            let user = resolve_user(&messenger, &user).await?;
            let other = resolve_user(&messenger, &other).await?;
            let page = PageQuery {
                limit,
                before,
                before_id,
            };
            print_json(&messenger.conversation(user, other, page).await?)?;
        }
        Commands::DeleteUser { user } => {
            let user = resolve_user(&messenger, &user).await?;
            print_json(&messenger.delete_account(user).await?)?;
        }
        Commands::Stats => {
            print_json(&messenger.stats().await?)?;
        }
    }

    Ok(())
}

/// Accept either a user id or a username.
async fn resolve_user(messenger: &Messenger, raw: &str) -> Result<Uuid> {
    if let Ok(id) = raw.parse::<Uuid>() {
        return Ok(id);
    }
    match messenger.user_by_username(raw.to_string()).await? {
        Some(user) => Ok(user.id),
        None => bail!("no user named {:?}", raw),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
