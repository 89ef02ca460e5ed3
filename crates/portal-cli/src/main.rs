use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use portal_core::sla::{SlaCountdown, SlaTicker};
use portal_query::{federated_search, filter_cases, CaseFilter, CaseFilterParams, SearchOutcome};
use portal_store::MockStore;
use portal_web::PortalConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "portal-cli")]
#[command(about = "Partner support portal command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the web portal.
    Serve,
    /// List cases with the same filters as the case list page.
    Cases(CaseArgs),
    /// Search articles, training, videos and cases.
    Search { query: String },
    /// Show the SLA countdown for a case.
    Sla {
        case_id: String,
        /// Keep printing the countdown until interrupted.
        #[arg(long)]
        watch: bool,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

#[derive(Debug, Args)]
struct CaseArgs {
    #[arg(short, long)]
    q: Option<String>,
    #[arg(long)]
    status: Option<String>,
    #[arg(long)]
    urgency: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    source: Option<String>,
    /// all, active or resolved
    #[arg(long)]
    tab: Option<String>,
    /// Print the matching cases as JSON.
    #[arg(long)]
    json: bool,
}

impl CaseArgs {
    fn filter(&self) -> CaseFilter {
        CaseFilter::from_params(&CaseFilterParams {
            q: self.q.clone(),
            status: self.status.clone(),
            urgency: self.urgency.clone(),
            category: self.category.clone(),
            source: self.source.clone(),
            tab: self.tab.clone(),
        })
    }
}

fn load_store(config: &PortalConfig) -> Result<MockStore> {
    let mut store = MockStore::load(&config.fixtures_dir)?;
    if config.rebase_fixtures {
        store.rebase_to(Utc::now());
    }
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = PortalConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => portal_web::serve(config).await?,
        Commands::Cases(args) => {
            let store = load_store(&config)?;
            let cases = filter_cases(store.cases(), &args.filter());
            if args.json {
                println!("{}", serde_json::to_string_pretty(&cases)?);
            } else {
                let now = Utc::now();
                for case in &cases {
                    let sla = case
                        .active_sla_deadline()
                        .map(|d| SlaCountdown::compute(d, now).describe())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:<14} {:<12} {:<9} {:<22} {}",
                        case.case_number,
                        case.status.label(),
                        case.urgency.label(),
                        sla,
                        case.company
                    );
                }
                let n = cases.len();
                println!("Showing {n} case{}", if n == 1 { "" } else { "s" });
            }
        }
        Commands::Search { query } => {
            let store = load_store(&config)?;
            match federated_search(store.search_results(), &query) {
                SearchOutcome::NotSearched => {
                    println!("Try one of:");
                    for suggestion in &store.profile().search_suggestions {
                        println!("  {suggestion}");
                    }
                }
                SearchOutcome::Searched(hits) => {
                    println!(
                        "{} results (knowledge {}, training {}, video {})",
                        hits.counts.all, hits.counts.knowledge, hits.counts.training, hits.counts.video
                    );
                    for result in &hits.results {
                        println!("[{}] {}  {}", result.kind.label(), result.title, result.url);
                    }
                }
            }
        }
        Commands::Sla {
            case_id,
            watch,
            interval_secs,
        } => {
            let store = load_store(&config)?;
            let case = store
                .case(&case_id)
                .with_context(|| format!("case `{case_id}` not found"))?;
            let Some(deadline) = case.active_sla_deadline() else {
                println!("{} is {}; no SLA countdown applies", case.case_number, case.status);
                return Ok(());
            };
            if !watch {
                println!("{} {}", case.case_number, SlaCountdown::compute(deadline, Utc::now()).describe());
                return Ok(());
            }
            let period = interval_secs
                .map(Duration::from_secs)
                .unwrap_or(config.sla_refresh);
            if period.is_zero() {
                bail!("--interval-secs must be positive");
            }
            watch_sla(&case.case_number, deadline, period).await?;
        }
    }

    Ok(())
}

async fn watch_sla(
    case_number: &str,
    deadline: chrono::DateTime<Utc>,
    period: Duration,
) -> Result<()> {
    let ticker = SlaTicker::start(deadline, period);
    let mut updates = ticker.subscribe();
    println!("{case_number} {}", ticker.current().describe());
    info!(case_number, ?period, "watching sla countdown; ctrl-c to stop");
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let countdown = *updates.borrow_and_update();
                println!("{case_number} {}", countdown.describe());
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for ctrl-c")?;
                break;
            }
        }
    }
    ticker.stop();
    Ok(())
}
