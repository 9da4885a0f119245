use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use rental_scout::api::{HttpApi, RentalApi};
use rental_scout::config::Config;
use rental_scout::events::{DashboardEvent, LoadOptions};
use rental_scout::filter::{parse_max_price, Disposition, FilterCriteria, SortOrder};
use rental_scout::models::Offer;
use rental_scout::scrape::StatusReport;
use rental_scout::ui::format::format_datetime;
use rental_scout::ui::{Dashboard, OfferModal, Renderer, TerminalRenderer};

#[derive(Parser)]
#[command(name = "rental-scout", version, about = "Prague rental offers from the scout backend")]
struct Cli {
    /// Config file to use instead of the default search path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend address, overrides `server.base_url`
    #[arg(long, global = true, env = "RENTAL_SCOUT_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Live dashboard: pings, scrape monitoring and updates until Ctrl-C
    Watch,
    /// Load offers once and print them
    List {
        /// Server-side district, e.g. "Praha 5"
        #[arg(long)]
        district: Option<String>,
        #[command(flatten)]
        filters: FilterArgs,
        /// Print every matching offer, not just the first page
        #[arg(long)]
        all: bool,
    },
    /// Print the map markers
    Map {
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// Fetch description and images of one offer
    Detail {
        link: String,
        #[arg(long)]
        scraper: String,
    },
    /// Start a scrape and follow it until it finishes
    Scrape,
    Status,
    Districts,
    Stats,
    Settings {
        /// JSON file to upload as the new settings
        #[arg(long)]
        set: Option<PathBuf>,
    },
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    Clear,
    Cleanup,
    Stats,
}

#[derive(Args)]
struct FilterArgs {
    /// Room layout: 1+kk ... 4+1, 5++ or others
    #[arg(long)]
    disposition: Option<Disposition>,
    #[arg(long)]
    scraper: Option<String>,
    /// Keep only offers in this part of Prague, e.g. "Praha 2"
    #[arg(long)]
    part: Option<String>,
    /// Highest monthly rent in CZK
    #[arg(long)]
    max_price: Option<String>,
    #[arg(long, default_value = "default")]
    sort: SortOrder,
}

impl FilterArgs {
    fn criteria(&self) -> Result<FilterCriteria> {
        let max_price = match &self.max_price {
            Some(input) => parse_max_price(input)?,
            None => None,
        };
        Ok(FilterCriteria {
            disposition: self.disposition,
            scraper: self.scraper.clone(),
            district: self.part.clone(),
            max_price,
            sort: self.sort,
        })
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    if let Some(base_url) = &cli.base_url {
        config.server.base_url = base_url.clone();
    }
    Ok(config)
}

fn build_dashboard(
    api: Arc<dyn RentalApi>,
    renderer: Arc<TerminalRenderer>,
    config: Config,
) -> (Dashboard, UnboundedReceiver<DashboardEvent>) {
    Dashboard::new(api, renderer.clone(), renderer, config)
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    config.logging.init();

    info!("🏠 Rental Scout");
    info!("Backend: {}", config.server.base_url);

    let api: Arc<dyn RentalApi> =
        Arc::new(HttpApi::new(&config.server).context("Failed to create backend client")?);

    match cli.command {
        Command::Watch => {
            let (dashboard, rx) = build_dashboard(api, Arc::new(TerminalRenderer::default()), config);
            dashboard.init().await;
            dashboard.start_background();

            tokio::select! {
                _ = dashboard.run(rx) => {}
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for Ctrl-C")?;
                    info!("👋 Shutting down");
                }
            }
            dashboard.shutdown();
        }

        Command::List {
            district,
            filters,
            all,
        } => {
            let criteria = filters.criteria()?;
            let (dashboard, _rx) = build_dashboard(api, Arc::new(TerminalRenderer::default()), config);
            dashboard.store().lock().set_criteria(criteria);
            dashboard
                .load_offers(
                    district,
                    LoadOptions {
                        no_scrape: true,
                        no_ping: true,
                        reset_pagination: true,
                    },
                )
                .await;
            if all {
                while dashboard.load_more() {}
            }
            dashboard.shutdown();
        }

        Command::Map { filters } => {
            let criteria = filters.criteria()?;
            let (dashboard, _rx) = build_dashboard(api, Arc::new(TerminalRenderer::new(true)), config);
            dashboard.store().lock().set_criteria(criteria);
            if dashboard.load_map_offers().await == 0 {
                dashboard.load_offers(None, LoadOptions::quiet()).await;
            } else {
                dashboard.display_offers_on_map(false);
            }
            dashboard.shutdown();
        }

        Command::Detail { link, scraper } => {
            let response = api
                .offer_detail(&link, &scraper)
                .await
                .context("Failed to fetch offer detail")?;
            let Some(detail) = response.detail.filter(|_| response.success) else {
                bail!("Nepodařilo se načíst detaily");
            };
            let offer = Offer {
                link: Some(link),
                scraper,
                ..Offer::default()
            };
            TerminalRenderer::default().show_modal(&OfferModal::new(&offer).with_detail(&detail));
        }

        Command::Scrape => {
            let (dashboard, mut rx) = build_dashboard(api, Arc::new(TerminalRenderer::default()), config);
            let started = dashboard.start_scraping().await;
            if !started && !dashboard.activity().lock().scraping_in_progress {
                dashboard.shutdown();
                bail!("Scraping could not be started");
            }

            while let Some(event) = rx.recv().await {
                let done = matches!(event, DashboardEvent::ScrapeFinished | DashboardEvent::ScrapeTimedOut);
                dashboard.handle_event(event).await;
                if done {
                    break;
                }
            }
            dashboard.shutdown();
        }

        Command::Status => {
            let status = api.status().await.context("Failed to fetch status")?;
            let report = StatusReport::from(&status);
            println!("Stav: {}", if report.text.is_empty() { "-" } else { report.text.as_str() });
            println!("Aktivita: {:?}", report.activity);
            println!("Nabídky: {}", report.offer_count);
            println!("Poslední aktualizace: {}", format_datetime(report.last_update.as_deref()));
            println!("Rychlý start: {}", if report.quick_start { "ano" } else { "ne" });
        }

        Command::Districts => {
            let districts = api.districts().await.context("Failed to fetch districts")?;
            for (name, center) in &districts {
                println!("{name:<20} {:.4}, {:.4}", center.lat, center.lng);
            }
        }

        Command::Stats => {
            let stats = api.stats().await.context("Failed to fetch stats")?;
            for (scraper, count) in &stats.by_scraper {
                println!("{scraper:<20} {count}");
            }
        }

        Command::Settings { set } => {
            let settings = match set {
                Some(path) => {
                    let content = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let settings: serde_json::Value = serde_json::from_str(&content)
                        .with_context(|| format!("{} is not valid JSON", path.display()))?;
                    api.save_settings(&settings).await.context("Failed to save settings")?
                }
                None => api.settings().await.context("Failed to fetch settings")?,
            };
            print_json(&settings)?;
        }

        Command::Cache { action } => {
            let result = match action {
                CacheAction::Clear => api.clear_cache().await,
                CacheAction::Cleanup => api.cleanup_cache().await,
                CacheAction::Stats => api.cache_stats().await,
            }
            .context("Cache request failed")?;
            print_json(&result)?;
        }
    }

    Ok(())
}
