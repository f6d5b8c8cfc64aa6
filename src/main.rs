use anyhow::Result;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "maildeck", version, about = "Personal webmail dashboard backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output structured JSON
    #[arg(long, global = true)]
    json: bool,

    /// Database path override
    #[arg(long, global = true)]
    db: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Import new Gmail messages for a user
    Sync(SyncArgs),
    /// List received messages
    Inbox(ListArgs),
    /// List sent messages
    Sent(ListArgs),
    /// Show one message by Gmail id
    Show(ShowArgs),
    /// Mark a received message as read
    Read(MessageRefArgs),
    /// Hide a received message from listings (soft delete)
    Archive(MessageRefArgs),
    /// Manage local user accounts
    Users {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Show database stats
    Stats,
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Local user id to import for
    #[arg(long)]
    user: i64,

    /// Gmail OAuth access token
    #[arg(long, env = "GOOGLE_ACCESS_TOKEN", hide_env_values = true)]
    token: String,

    /// Max new messages to import per mailbox
    #[arg(long, default_value_t = maildeck::sync::DEFAULT_IMPORT_CAP)]
    cap: usize,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long)]
    user: i64,
    #[arg(long, default_value_t = false)]
    unread: bool,
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

#[derive(Debug, Args)]
struct ShowArgs {
    gmail_id: String,
    #[arg(long)]
    user: i64,
    /// Look in the sent mailbox instead of the inbox
    #[arg(long, default_value_t = false)]
    sent: bool,
}

#[derive(Debug, Args)]
struct MessageRefArgs {
    gmail_id: String,
    #[arg(long)]
    user: i64,
}

#[derive(Debug, Subcommand)]
enum UserCommands {
    /// Add or update a local user account
    Add {
        email: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        avatar_url: Option<String>,
    },
    /// List local user accounts
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::dispatch(cli).await
}

mod commands {
    use std::path::PathBuf;

    use anyhow::{anyhow, Context, Result};

    use maildeck::db::Database;
    use maildeck::gmail::GmailClient;
    use maildeck::sync;

    use super::{Cli, Commands, ListArgs, MessageRefArgs, ShowArgs, SyncArgs, UserCommands};

    pub async fn dispatch(cli: Cli) -> Result<()> {
        let db = open_database(cli.db.as_deref())?;
        match cli.command {
            Commands::Sync(args) => handle_sync(&db, args, cli.json).await,
            Commands::Inbox(args) => handle_inbox(&db, args, cli.json),
            Commands::Sent(args) => handle_sent(&db, args, cli.json),
            Commands::Show(args) => handle_show(&db, args, cli.json),
            Commands::Read(args) => handle_read(&db, args),
            Commands::Archive(args) => handle_archive(&db, args),
            Commands::Users { command } => handle_users(&db, command, cli.json),
            Commands::Stats => handle_stats(&db, cli.json),
        }
    }

    fn open_database(override_path: Option<&str>) -> Result<Database> {
        let path = match override_path {
            Some(path) => PathBuf::from(path),
            None => Database::default_db_path().context("resolve default database path")?,
        };
        Database::open(&path).with_context(|| format!("open database at {}", path.display()))
    }

    async fn handle_sync(db: &Database, args: SyncArgs, json: bool) -> Result<()> {
        db.get_user(args.user)?
            .ok_or_else(|| anyhow!("user not found: {}", args.user))?;

        let client = GmailClient::new()?;
        let report = sync::sync_account(&client, db, &args.token, args.user, args.cap).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!(
                "sync user {}: inbox imported={} skipped={}, sent imported={} skipped={}",
                args.user,
                report.inbox.imported,
                report.inbox.skipped,
                report.sent.imported,
                report.sent.skipped
            );
        }
        Ok(())
    }

    fn handle_inbox(db: &Database, args: ListArgs, json: bool) -> Result<()> {
        let mut messages = db.list_inbox(args.user, args.limit)?;
        if args.unread {
            messages.retain(|message| !message.is_read);
        }

        if json {
            println!("{}", serde_json::to_string_pretty(&messages)?);
        } else if messages.is_empty() {
            println!("No messages.");
        } else {
            for message in messages {
                let marker = if message.is_read { " " } else { "*" };
                println!(
                    "{marker} {}  {}  {} <{}>  {}",
                    message.gmail_id,
                    message.received_at,
                    message.sender_name,
                    message.sender_email,
                    message.subject
                );
            }
        }
        Ok(())
    }

    fn handle_sent(db: &Database, args: ListArgs, json: bool) -> Result<()> {
        let messages = db.list_sent(args.user, args.limit)?;

        if json {
            println!("{}", serde_json::to_string_pretty(&messages)?);
        } else if messages.is_empty() {
            println!("No messages.");
        } else {
            for message in messages {
                println!(
                    "  {}  {}  to {} <{}>  {}",
                    message.gmail_id,
                    message.sent_at,
                    message.recipient_name,
                    message.recipient_email,
                    message.subject
                );
            }
        }
        Ok(())
    }

    fn handle_show(db: &Database, args: ShowArgs, json: bool) -> Result<()> {
        if args.sent {
            let message = db
                .get_sent_message(&args.gmail_id, args.user)?
                .ok_or_else(|| anyhow!("sent message not found: {}", args.gmail_id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&message)?);
            } else {
                println!("Subject: {}", message.subject);
                println!("To: {} <{}>", message.recipient_name, message.recipient_email);
                println!("Sent: {}", message.sent_at);
                println!();
                println!("{}", message.body);
            }
        } else {
            let message = db
                .get_inbox_message(&args.gmail_id, args.user)?
                .ok_or_else(|| anyhow!("message not found: {}", args.gmail_id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&message)?);
            } else {
                println!("Subject: {}", message.subject);
                println!("From: {} <{}>", message.sender_name, message.sender_email);
                println!("Received: {}", message.received_at);
                println!();
                println!("{}", message.body);
            }
        }
        Ok(())
    }

    fn handle_read(db: &Database, args: MessageRefArgs) -> Result<()> {
        let updated = db.mark_inbox_read(&args.gmail_id, args.user)?;
        if updated == 0 {
            return Err(anyhow!("message not found: {}", args.gmail_id));
        }
        println!("Marked read: {}", args.gmail_id);
        Ok(())
    }

    fn handle_archive(db: &Database, args: MessageRefArgs) -> Result<()> {
        let updated = db.hide_inbox_message(&args.gmail_id, args.user)?;
        if updated == 0 {
            return Err(anyhow!("message not found: {}", args.gmail_id));
        }
        println!("Archived: {}", args.gmail_id);
        Ok(())
    }

    fn handle_users(db: &Database, command: UserCommands, json: bool) -> Result<()> {
        match command {
            UserCommands::Add {
                email,
                name,
                avatar_url,
            } => {
                let name = name.unwrap_or_else(|| email.clone());
                let id = db.upsert_user(&email, &name, avatar_url.as_deref())?;
                println!("User {id}: {email}");
            }
            UserCommands::List => {
                let users = db.list_users()?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&users)?);
                } else if users.is_empty() {
                    println!("No users configured.");
                } else {
                    for user in users {
                        println!("{}  {}  {}", user.id, user.email, user.name);
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_stats(db: &Database, json: bool) -> Result<()> {
        let stats = db.get_stats()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Users: {}", stats.total_users);
            println!("Inbox messages: {}", stats.total_inbox);
            println!("Sent messages: {}", stats.total_sent);
        }
        Ok(())
    }
}
