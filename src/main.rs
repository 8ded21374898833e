use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

use snapview::actions::{self, DeleteOutcome, DirStore};
use snapview::client::ServerClient;
use snapview::listing::{self, FileRecord};
use snapview::settings::AppSettings;
use snapview::thumbs::{EngineConfig, ListingView, ThumbnailEngine, ThumbnailState};

/// Browse and manage screenshots on a remote server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server URL, e.g. http://192.168.1.100:5000
    #[arg(short, long)]
    server: Option<String>,

    /// Username for login
    #[arg(short, long)]
    username: Option<String>,

    /// Password for login
    #[arg(short, long)]
    password: Option<String>,

    /// Save the connection details for later runs
    #[arg(long)]
    remember: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List images in a server directory
    List {
        /// Directory path (percent-encoded), empty for the root
        #[arg(default_value = "")]
        path: String,
    },
    /// Fetch every thumbnail in a directory and report per-image outcomes
    Thumbs {
        /// Directory path (percent-encoded), empty for the root
        #[arg(default_value = "")]
        path: String,

        /// Maximum concurrent fetches
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
    },
    /// Download an image to a local directory
    Download {
        /// Image path exactly as listed (percent-encoded)
        path: String,

        /// Directory to save into
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Delete an image on the server
    Delete {
        /// Image path exactly as listed (percent-encoded)
        path: String,

        /// Directory to re-list after deletion
        #[arg(long, default_value = "")]
        dir: String,
    },
}

#[tokio::main]
async fn main() {
    // Show info level by default, debug if RUST_LOG is set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let args = Args::parse();

    let mut settings = match AppSettings::load() {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("Failed to load settings: {}", e);
            AppSettings::default()
        }
    };

    if let Some(server) = args.server {
        settings.server_url = server;
    }
    if let Some(username) = args.username {
        settings.username = username;
    }
    if let Some(password) = args.password {
        settings.password = Some(password);
    }

    if settings.server_url.is_empty() || settings.username.is_empty() {
        error!("Server URL and username are required (--server/--username, or save them once with --remember)");
        std::process::exit(1);
    }
    let Some(password) = settings.password.clone() else {
        error!("Password is required (--password, or save it once with --remember)");
        std::process::exit(1);
    };

    if args.remember {
        settings.remember_password = true;
        if let Err(e) = settings.save() {
            log::warn!("Failed to save settings: {}", e);
        }
    }

    let client = match ServerClient::new(&settings.server_url) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Bad server URL {}: {}", settings.server_url, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = client.login(&settings.username, &password).await {
        error!("Login failed: {}", e);
        std::process::exit(1);
    }
    info!("Logged in to {}", settings.server_url);

    match args.command {
        Command::List { path } => {
            let records = browse_records(&client, &path).await;
            if records.is_empty() {
                println!("No images in /{}", path);
                return;
            }
            for record in &records {
                println!("{:>12}  {}", format_size(record.size), record.name);
            }
            println!("{} image(s)", records.len());
        }

        Command::Thumbs { path, concurrency } => {
            let records = browse_records(&client, &path).await;
            if records.is_empty() {
                println!("No images in /{}", path);
                return;
            }

            let config = EngineConfig {
                max_in_flight: concurrency,
                ..EngineConfig::default()
            };
            let (engine, mut events) = ThumbnailEngine::new(client.clone(), config);

            let generation = engine.next_generation();
            let mut view = ListingView::new();
            view.replace(generation, records);
            engine.fetch_all(generation, view.records());

            let mut failed = 0usize;
            while !view.is_complete() {
                let Some(event) = events.recv().await else {
                    break;
                };
                match &event.state {
                    ThumbnailState::Loaded(image) => {
                        println!("ok      {}x{}  {}", image.width(), image.height(), event.path);
                    }
                    ThumbnailState::Failed => {
                        failed += 1;
                        println!("failed  {}", event.path);
                    }
                    ThumbnailState::Pending => {}
                }
                view.apply(event);
            }

            println!(
                "{} loaded, {} failed",
                view.records().len() - failed,
                failed
            );
            if failed > 0 {
                std::process::exit(1);
            }
        }

        Command::Download { path, out_dir } => {
            let record = record_for_path(&path);
            let store = DirStore::new(out_dir);
            if actions::download_record(&client, &store, &record).await {
                println!("Saved {} to {:?}", record.name, store.root());
            } else {
                error!("Download of {} failed", path);
                std::process::exit(1);
            }
        }

        Command::Delete { path, dir } => {
            let record = record_for_path(&path);
            match actions::delete_record(&client, &record, &dir).await {
                Ok(DeleteOutcome::Deleted(records)) => {
                    println!("Deleted {}. {} image(s) remain in /{}", path, records.len(), dir);
                }
                Ok(DeleteOutcome::Refused(message)) => {
                    error!("Server refused deletion: {}", message);
                    std::process::exit(1);
                }
                Err(e) => {
                    error!("Delete failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

async fn browse_records(client: &ServerClient, path: &str) -> Vec<FileRecord> {
    match client.browse(path).await {
        Ok(body) => listing::parse_listing(&body),
        Err(e) => {
            error!("Browse failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Build a record for a bare path argument. The display name is the decoded
/// last path segment, readable for local filenames; the path itself stays
/// exactly as typed.
fn record_for_path(path: &str) -> FileRecord {
    let decoded = urlencoding::decode(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string());
    let name = decoded
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(&decoded)
        .to_string();

    FileRecord {
        name,
        is_dir: false,
        path: path.to_string(),
        file_type: Some("image".to_string()),
        size: 0,
    }
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
