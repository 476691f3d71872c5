mod db;
mod error;
mod export;
mod pagination;
mod parser;
mod records;
mod render;
mod sites;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use crate::error::ScrapeError;
use crate::pagination::DriverOptions;
use crate::render::{HttpRenderer, Renderer, SpiderRenderer, WebDriverRenderer};

#[derive(Parser)]
#[command(name = "listing_scraper", about = "Paginated listing and job-board scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// How pages are fetched and rendered
    #[arg(long, value_enum, default_value_t = RendererKind::Webdriver, global = true)]
    renderer: RendererKind,

    /// WebDriver server used by `--renderer webdriver`
    #[arg(long, default_value = "http://localhost:9515", global = true)]
    webdriver_url: String,

    /// Also write records to this SQLite database
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Print the site profile as JSON and exit
    #[arg(long, global = true)]
    dump_profile: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape product cards from paginated search results
    Listings {
        /// Search term
        #[arg(default_value = "ultrawide monitor")]
        query: String,
        /// Last page to fetch (default: site profile)
        #[arg(short = 'n', long)]
        pages: Option<u32>,
        /// Seconds between page fetches (default: site profile)
        #[arg(long)]
        delay: Option<f64>,
        /// CSV output file
        #[arg(short, long, default_value = "results.csv")]
        out: PathBuf,
    },
    /// Collect job links from the directory, then visit each posting
    Jobs {
        /// Last directory page to fetch (default: site profile)
        #[arg(short = 'n', long)]
        pages: Option<u32>,
        /// Seconds between directory page fetches (default: site profile)
        #[arg(long)]
        delay: Option<f64>,
        /// CSV output file (default: timestamped)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RendererKind {
    /// spider.cloud hosted rendering (needs SPIDER_API_KEY)
    Spider,
    /// A local browser through chromedriver
    Webdriver,
    /// Plain GET without script execution
    Http,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    if cli.dump_profile {
        let json = match &cli.command {
            Commands::Listings { .. } => serde_json::to_string_pretty(&sites::amazon())?,
            Commands::Jobs { .. } => serde_json::to_string_pretty(&sites::truckerboerse())?,
        };
        println!("{}", json);
        return Ok(());
    }

    let mut renderer = build_renderer(cli.renderer, &cli.webdriver_url).await?;
    let result = run(renderer.as_mut(), &cli).await;
    if let Err(e) = renderer.close().await {
        warn!("{}", e);
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn build_renderer(kind: RendererKind, webdriver_url: &str) -> Result<Box<dyn Renderer>, ScrapeError> {
    info!("Using {:?} renderer", kind);
    let renderer: Box<dyn Renderer> = match kind {
        RendererKind::Spider => Box::new(SpiderRenderer::from_env()?),
        RendererKind::Webdriver => Box::new(WebDriverRenderer::connect(webdriver_url).await?),
        RendererKind::Http => Box::new(HttpRenderer::new()?),
    };
    Ok(renderer)
}

async fn run(renderer: &mut dyn Renderer, cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Listings {
            query,
            pages,
            delay,
            out,
        } => {
            let site = sites::amazon();
            let options = override_options(&site.options, *pages, *delay);
            println!("Searching {} for \"{}\" (up to {} pages)...", site.name, query, options.max_pages);

            let listings = pagination::scrape_listings(renderer, &site, query, &options).await?;
            let saved = export::save_csv(out, &listings.records)?;

            if let Some(path) = &cli.db {
                let conn = db::connect(path)?;
                db::init_schema(&conn)?;
                db::save_listings(&conn, query, &listings.records)?;
            }

            println!(
                "Total: {} products from {} pages ({} skipped, {}). Saved to {}",
                saved,
                listings.pages_fetched,
                listings.pages_skipped,
                listings.stop,
                out.display()
            );
            Ok(())
        }
        Commands::Jobs { pages, delay, out } => {
            let board = sites::truckerboerse();
            let options = override_options(&board.options, *pages, *delay);
            println!("Collecting job links from {} pages of {}...", options.max_pages, board.name);

            let links = pagination::collect_job_links(renderer, &board, &options).await?;
            println!(
                "Finished collecting job links. Total: {} ({} pages, {} skipped)",
                links.records.len(),
                links.pages_fetched,
                links.pages_skipped
            );

            let jobs = pagination::enrich_jobs(renderer, &board, links.records, options.render_timeout).await?;

            let out = out.clone().unwrap_or_else(|| default_jobs_file(Local::now()));
            let saved = export::save_csv(&out, &jobs.records)?;

            if let Some(path) = &cli.db {
                let conn = db::connect(path)?;
                db::init_schema(&conn)?;
                db::save_jobs(&conn, &jobs.records)?;
            }

            println!(
                "Total jobs scraped: {} ({} enriched, {} failed). Saved to {}",
                saved,
                jobs.enriched,
                jobs.failed,
                out.display()
            );
            Ok(())
        }
    }
}

fn override_options(defaults: &DriverOptions, pages: Option<u32>, delay: Option<f64>) -> DriverOptions {
    let mut options = defaults.clone();
    if let Some(p) = pages {
        options.max_pages = p;
    }
    if let Some(secs) = delay.filter(|s| s.is_finite() && *s >= 0.0) {
        options.delay = Duration::from_secs_f64(secs);
    }
    options
}

fn default_jobs_file(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("truckerboerse_jobs_{}.csv", now.format("%Y%m%d_%H%M%S")))
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

// ── Tests ──
