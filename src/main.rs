use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use watchscout_lib::api::{ContentItem, Partition, Section};
use watchscout_lib::app::App;
use watchscout_lib::config::AppConfig;
use watchscout_lib::search::SortKey;
use watchscout_lib::state::LoadOutcome;

#[derive(Parser, Debug)]
#[command(version, about = "Browse and search a streaming availability catalog", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the home feed sections
    Home {
        /// all, movie or tv
        #[arg(short, long, default_value = "all")]
        media: Partition,

        /// Number of feed pages to load
        #[arg(short, long, default_value_t = 1)]
        pages: usize,
    },
    /// Search movies and shows
    Search {
        query: String,

        #[arg(short, long, default_value = "all")]
        media: Partition,

        /// relevance, popularity, newest or oldest
        #[arg(short, long, default_value = "relevance")]
        sort: SortKey,

        /// Number of result batches to load
        #[arg(short, long, default_value_t = 1)]
        pages: usize,
    },
    /// Show the resolved configuration
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("watchscout=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing();
    let args = Args::parse();
    let config = AppConfig::load()?;

    match args.command {
        Command::Config => {
            if let Some(path) = AppConfig::config_path() {
                println!("# {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Home { media, pages } => {
            let app = App::from_config(config)?;
            let mut outcome = app.home.switch_partition(media).await;
            for _ in 1..pages {
                if !app.home.has_more() {
                    break;
                }
                outcome = app.home.load_more(false).await;
            }
            for section in app.home.sections() {
                print_section(&section);
            }
            report(outcome, app.home.has_more());
        }
        Command::Search {
            query,
            media,
            sort,
            pages,
        } => {
            let app = App::from_config(config)?;
            // sort first so the pool fill starts from the first batch
            app.search.set_sort(sort);
            app.search.set_query(&query, media);
            let mut outcome = LoadOutcome::Skipped;
            for _ in 0..pages.max(1) {
                if !app.search.can_load_more() {
                    break;
                }
                outcome = app.search.load_more().await;
            }
            while app.search.is_filling() {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            for item in app.search.results() {
                print_item(&item);
            }
            report(outcome, app.search.can_load_more());
        }
    }

    Ok(())
}

fn print_section(section: &Section) {
    println!("== {} ({} items{})", section.title, section.items.len(), if section.has_more() { ", more" } else { "" });
    for item in &section.items {
        print!("   ");
        print_item(item);
    }
}

fn print_item(item: &ContentItem) {
    let year = item
        .release_date
        .map(|d| d.format("%Y").to_string())
        .unwrap_or_else(|| "----".to_string());
    println!("{:<5} {:>8} {} {}", item.media_type.as_str(), item.id, year, item.title);
}

fn report(outcome: LoadOutcome, has_more: bool) {
    match outcome {
        LoadOutcome::Exhausted => eprintln!("catalog request failed; showing what was loaded"),
        _ if has_more => eprintln!("more results available"),
        _ => {}
    }
}
