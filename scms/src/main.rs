//! Operator CLI for the content repository.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use scms_core::codec::Codec;
use scms_core::content::{ContentService, DocumentDraft, FolderDraft};
use scms_core::credentials::PasswordHasher;
use scms_core::model::{Permission, User};
use scms_core::principal::Principal;
use scms_core::repository::{FileRepository, Repository};
use scms_core::session::{resolve_request, Hs256Sessions};
use scms_core::users::UserStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "scms")]
#[command(about = "Secure content repository with leveled access and encrypted bodies")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Session {
    /// Token printed by `login`
    #[arg(long, env = "SCMS_TOKEN")]
    token: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the default administrator if missing
    SeedAdmin,

    /// Authenticate and print a session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Add or update a user (administrators only)
    User {
        #[command(flatten)]
        session: Session,
        #[arg(long)]
        id: Option<Uuid>,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value_t = 0)]
        level: i32,
        #[arg(long)]
        admin: bool,
        #[arg(long)]
        tech: bool,
        #[arg(long)]
        password: Option<String>,
    },

    /// List visible folders and documents
    Folders {
        #[command(flatten)]
        session: Session,
    },

    /// Show one folder
    Folder {
        #[command(flatten)]
        session: Session,
        #[arg(long)]
        id: Uuid,
    },

    /// Create or update a folder
    SaveFolder {
        #[command(flatten)]
        session: Session,
        #[arg(long)]
        id: Option<Uuid>,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 0)]
        level: i32,
        /// Users that may see the folder regardless of level
        #[arg(long = "user")]
        users: Vec<Uuid>,
    },

    /// Show one document
    Show {
        #[command(flatten)]
        session: Session,
        #[arg(long)]
        id: Uuid,
    },

    /// Create or update a document, reading the body from a file. When
    /// updating, omitted fields keep their stored values.
    Save {
        #[command(flatten)]
        session: Session,
        #[arg(long)]
        id: Option<Uuid>,
        #[arg(long, required_unless_present = "id")]
        title: Option<String>,
        #[arg(long, required_unless_present = "id")]
        body: Option<PathBuf>,
        #[arg(long, conflicts_with = "unfiled")]
        folder: Option<Uuid>,
        /// Move the document out of its folder
        #[arg(long)]
        unfiled: bool,
        #[arg(long)]
        level: Option<i32>,
    },

    /// Set a user's grant on a folder. Omitted flags are revoked.
    Grant {
        #[command(flatten)]
        session: Session,
        #[arg(long)]
        folder: Uuid,
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        list: bool,
        #[arg(long)]
        read: bool,
        #[arg(long)]
        update: bool,
        #[arg(long)]
        create: bool,
        #[arg(long)]
        delete: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration with secrets hidden
    Show,
}

struct App {
    config: Config,
    repo: Arc<dyn Repository>,
    sessions: Hs256Sessions,
    users: UserStore,
}

impl App {
    fn open(config: Config) -> Result<Self> {
        let repo: Arc<dyn Repository> = Arc::new(
            FileRepository::open(&config.data_dir)
                .with_context(|| format!("opening {}", config.data_dir.display()))?,
        );
        let sessions = Hs256Sessions::new(
            &config.session_secret,
            Duration::from_secs(config.session_max_age_secs),
        );
        let users = UserStore::new(repo.clone(), PasswordHasher::new(config.password_salt.clone()));
        Ok(Self {
            config,
            repo,
            sessions,
            users,
        })
    }

    async fn principal(&self, session: &Session) -> Result<Principal> {
        resolve_request(&self.sessions, Some(&session.token))
            .await
            .context("not logged in, run `scms login`")
    }

    /// Derive the document key. Slow, so only commands touching content pay it.
    async fn content(&self) -> Result<ContentService> {
        let (passphrase, salt) = (
            self.config.codec.passphrase.clone(),
            self.config.codec.salt.clone(),
        );
        let codec = tokio::task::spawn_blocking(move || Codec::derive(&passphrase, &salt))
            .await?
            .context("deriving document key")?;
        Ok(ContentService::new(self.repo.clone(), Arc::new(codec)))
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Config { action } = &cli.command {
        match action {
            ConfigAction::Show => print(&config.redacted())?,
        }
        return Ok(());
    }

    let app = App::open(config)?;
    match cli.command {
        Commands::SeedAdmin => {
            let admin = app.users.seed_admin(&app.config.admin_password).await?;
            info!(id = %admin.id, "administrator ready");
            print(&admin.summary())?;
        }
        Commands::Login { email, password } => {
            let Some(user) = app.users.authenticate(&email, &password).await? else {
                bail!("invalid email or password");
            };
            println!("{}", app.sessions.issue(&user)?);
        }
        Commands::User {
            session,
            id,
            name,
            email,
            level,
            admin,
            tech,
            password,
        } => {
            if !app.principal(&session).await?.admin {
                bail!("only administrators manage users");
            }
            let mut user = User::new(name, email, level);
            if let Some(id) = id {
                user.id = id;
            }
            user.admin = admin;
            user.tech = tech;
            let user = app.users.save(user, password.as_deref()).await?;
            print(&user.summary())?;
        }
        Commands::Folders { session } => {
            let principal = app.principal(&session).await?;
            print(&app.content().await?.index(&principal).await?)?;
        }
        Commands::Folder { session, id } => {
            let principal = app.principal(&session).await?;
            print(&app.content().await?.load_folder(&principal, id).await?)?;
        }
        Commands::SaveFolder {
            session,
            id,
            name,
            level,
            users,
        } => {
            let principal = app.principal(&session).await?;
            let folder = app
                .content()
                .await?
                .save_folder(
                    &principal,
                    FolderDraft {
                        id,
                        name,
                        level,
                        user_ids: users,
                    },
                )
                .await?;
            println!("{}", folder.id);
        }
        Commands::Show { session, id } => {
            let principal = app.principal(&session).await?;
            print(&app.content().await?.open_document(&principal, id).await?)?;
        }
        Commands::Save {
            session,
            id,
            title,
            body,
            folder,
            unfiled,
            level,
        } => {
            let principal = app.principal(&session).await?;
            let content = app.content().await?;
            let mut draft = match id {
                Some(id) => {
                    if principal.tech && body.is_none() {
                        bail!("tech accounts must pass --body when updating");
                    }
                    content.draft_for(&principal, id).await?
                }
                None => DocumentDraft::default(),
            };
            if let Some(title) = title {
                draft.title = title;
            }
            if let Some(path) = body {
                draft.body = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
            }
            if folder.is_some() || unfiled {
                draft.folder_id = folder;
            }
            if level.is_some() {
                draft.level = level;
            }
            let doc = content.save_document(&principal, draft).await?;
            println!("{}", doc.id);
        }
        Commands::Grant {
            session,
            folder,
            user,
            list,
            read,
            update,
            create,
            delete,
        } => {
            let principal = app.principal(&session).await?;
            let mut grant = Permission::new(folder, user);
            grant.list = list;
            grant.read = read;
            grant.update = update;
            grant.create = create;
            grant.delete = delete;
            let report = app.content().await?.grant(&principal, vec![grant]).await?;
            info!(inserted = report.inserted, updated = report.updated, "grant saved");
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
