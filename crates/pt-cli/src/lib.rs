use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use pt_core::{CoreError, InventoryItem, Notice, RecipeSuggestion, Severity};
use pt_fs::{load_config, resolve_pantry_path, set_config_path, FsPantry, RecipesConfig};
use pt_inventory::{Pantry, Services, Session};
use pt_recipes::{CompletionClient, CompletionSettings};

#[derive(Parser)]
#[command(name = "pantry", version, about = "Pantry inventory tracker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize the pantry data directory.
    Init {
        /// Optional path to initialize the pantry at.
        #[arg(long)]
        path: Option<String>,
    },
    /// Create an account and sign in.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign in with an existing account.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Sign out.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// List items in the pantry.
    List {
        /// Only show items whose name contains this text.
        #[arg(long)]
        search: Option<String>,
    },
    /// Add items, merging with any existing entry.
    Add {
        name: String,
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        count: i64,
    },
    /// Remove items; the entry is deleted once nothing is left.
    Remove {
        name: String,
        #[arg(long, default_value_t = 1, allow_negative_numbers = true, conflicts_with = "all")]
        count: i64,
        /// Remove the item regardless of quantity.
        #[arg(long)]
        all: bool,
    },
    /// Rename and/or recount an item.
    Edit {
        original: String,
        new_name: String,
        #[arg(allow_negative_numbers = true)]
        count: i64,
    },
    /// Suggest recipes from what is in the pantry.
    Recipes,
    /// Add an item with a photo attached.
    Capture {
        name: String,
        /// Image file to upload.
        #[arg(long)]
        image: PathBuf,
        #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
        count: i64,
    },
}

pub fn run() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to initialize runtime")?;
    runtime.block_on(dispatch(cli.command))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PANTRY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed when embedded.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn dispatch(command: Command) -> Result<()> {
    let config = load_config().map_err(surface)?;

    if let Command::Init { path } = &command {
        let path = match path {
            Some(path) => PathBuf::from(path),
            None => FsPantry::default_path().map_err(surface)?,
        };
        FsPantry::new(path.clone())
            .init()
            .map_err(surface)
            .context("failed to initialize pantry")?;
        set_config_path(&path).map_err(surface)?;
        println!("Pantry initialized at {}", path.display());
        return Ok(());
    }

    let root = FsPantry::new(resolve_pantry_path(&config).map_err(surface)?);
    if !root.exists() {
        return Err(anyhow!(
            "Pantry is not initialized. Run `pantry init` to get started."
        ));
    }
    debug!(path = %root.path().display(), "opening pantry");
    let mut pantry = Pantry::new(services(&root, &config.recipes)?);

    match command {
        Command::Register { email, password } => {
            let session = pantry.register(&email, &password).await.map_err(surface)?;
            println!("Signed in as {}", session.user().email);
        }
        Command::Login { email, password } => {
            let session = pantry.login(&email, &password).await.map_err(surface)?;
            println!("Signed in as {}", session.user().email);
        }
        Command::Logout => {
            pantry.logout().await.map_err(surface)?;
            println!("Signed out");
        }
        Command::Whoami => match pantry.resume().await.map_err(surface)? {
            Some(session) => println!("{}", session.user().email),
            None => print_notices(&[Notice::info("Not signed in")]),
        },
        Command::List { search } => {
            let session = signed_in(&mut pantry).await?;
            let items = match search {
                Some(query) => session.filtered_view(&query),
                None => session.view().to_vec(),
            };
            println!("{}", render_items(&items));
        }
        Command::Add { name, count } => {
            let session = signed_in(&mut pantry).await?;
            let view = session.add_item(&name, count).await.map_err(surface)?;
            session.settle().await;
            report(&mut pantry, &view, Notice::success(format!("Added {count} {}", name.trim())));
        }
        Command::Remove { name, count, all } => {
            let session = signed_in(&mut pantry).await?;
            let view = if all {
                session.remove_all(&name).await
            } else {
                session.remove_item(&name, count).await
            }
            .map_err(surface)?;
            session.settle().await;
            report(&mut pantry, &view, Notice::success(format!("Removed {}", name.trim())));
        }
        Command::Edit {
            original,
            new_name,
            count,
        } => {
            let session = signed_in(&mut pantry).await?;
            let view = session
                .edit_item(&original, &new_name, count)
                .await
                .map_err(surface)?;
            session.settle().await;
            report(&mut pantry, &view, Notice::success(format!("Updated {}", new_name.trim())));
        }
        Command::Recipes => {
            let session = signed_in(&mut pantry).await?;
            session.settle().await;
            let suggestions = session.suggestions();
            print_notices(&pantry.take_notices());
            if suggestions.is_empty() {
                print_notices(&[Notice::info("No recipe suggestions.")]);
            } else {
                println!("{}", render_suggestions(&suggestions));
            }
        }
        Command::Capture { name, image, count } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            let file_name = image.file_name().unwrap_or_default().to_string_lossy();
            let data = pt_utils::encode_image_data(&bytes, &file_name);
            let session = signed_in(&mut pantry).await?;
            let view = session
                .capture_item(&name, count, &data)
                .await
                .map_err(surface)?;
            session.settle().await;
            report(&mut pantry, &view, Notice::success(format!("Captured {}", name.trim())));
        }
        Command::Init { .. } => unreachable!("handled above"),
    }
    Ok(())
}

fn services(root: &FsPantry, recipes: &RecipesConfig) -> Result<Services> {
    let recommender = CompletionClient::new(CompletionSettings {
        endpoint: recipes.endpoint.clone(),
        model: recipes.model.clone(),
        api_key: recipes.api_key(),
        timeout: Duration::from_secs(recipes.timeout_secs),
    })
    .map_err(surface)?;

    Ok(Services {
        identity: Arc::new(root.identity().map_err(surface)?),
        store: Arc::new(root.store()),
        recommender: Arc::new(recommender),
        blobs: Arc::new(root.blobs()),
    })
}

async fn signed_in(pantry: &mut Pantry) -> Result<&Session> {
    pantry
        .resume()
        .await
        .map_err(surface)?
        .ok_or_else(|| anyhow!("not signed in; run `pantry login` first"))
}

/// Turn a domain error into the message a user should see.
fn surface(err: CoreError) -> anyhow::Error {
    anyhow!(Notice::from(&err).message)
}

/// Print the view, the outcome, then anything background work reported.
fn report(pantry: &mut Pantry, view: &[InventoryItem], notice: Notice) {
    println!("{}", render_items(view));
    let mut notices = vec![notice];
    notices.extend(pantry.take_notices());
    print_notices(&notices);
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        eprintln!("{}", notice_line(notice));
    }
}

fn notice_line(notice: &Notice) -> String {
    match notice.severity {
        Severity::Success => notice.message.clone(),
        Severity::Info => format!("note: {}", notice.message),
        Severity::Error => format!("warning: {}", notice.message),
    }
}

fn render_items(items: &[InventoryItem]) -> String {
    if items.is_empty() {
        return "No items.".to_string();
    }
    items
        .iter()
        .map(|item| {
            let photo = if item.image_url.is_some() { " [photo]" } else { "" };
            format!("{} ({}){photo}", item.name, item.quantity)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_suggestions(suggestions: &[RecipeSuggestion]) -> String {
    suggestions
        .iter()
        .map(|suggestion| format!("- {}", suggestion.title))
        .collect::<Vec<_>>()
        .join("\n")
}
