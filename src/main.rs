use std::path::PathBuf;
use tracing::{info, warn};

use mapscout::{CdpSession, ConsoleGate, Orchestrator, ScoutConfig};

struct CliArgs {
    terms: Vec<String>,
    terms_file: Option<PathBuf>,
    output: Option<PathBuf>,
    headed: bool,
    profile: Option<PathBuf>,
    max_listings: Option<usize>,
    summary_json: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let mut parsed = CliArgs {
        terms: Vec::new(),
        terms_file: None,
        output: None,
        headed: false,
        profile: None,
        max_listings: None,
        summary_json: None,
    };

    let mut args = std::env::args().skip(1).peekable();
    while let Some(a) = args.next() {
        match a.as_str() {
            "--terms-file" => parsed.terms_file = args.next().map(PathBuf::from),
            "--output" | "-o" => parsed.output = args.next().map(PathBuf::from),
            "--profile" => parsed.profile = args.next().map(PathBuf::from),
            "--headed" => parsed.headed = true,
            "--max-listings" => {
                parsed.max_listings = args.next().and_then(|v| v.parse().ok());
            }
            "--summary-json" => parsed.summary_json = args.next().map(PathBuf::from),
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                if let Some(rest) = other.strip_prefix("--output=") {
                    parsed.output = Some(PathBuf::from(rest));
                } else if let Some(rest) = other.strip_prefix("--terms-file=") {
                    parsed.terms_file = Some(PathBuf::from(rest));
                } else if other.starts_with('-') {
                    eprintln!("unknown flag: {}", other);
                    print_usage();
                    std::process::exit(2);
                } else {
                    parsed.terms.push(other.to_string());
                }
            }
        }
    }
    parsed
}

fn print_usage() {
    eprintln!(
        "usage: mapscout [OPTIONS] [TERM]...\n\
         \n\
         Options:\n\
           --terms-file FILE    read search terms, one per line\n\
           -o, --output FILE    CSV destination (default listings.csv)\n\
           --profile DIR        persistent browser profile directory\n\
           --headed             run the browser with a visible window\n\
           --max-listings N     cap listings harvested per term\n\
           --summary-json FILE  write run counters as JSON after the run\n\
         \n\
         Environment: MAPSCOUT_MIN_DELAY_MS, MAPSCOUT_MAX_DELAY_MS,\n\
         MAPSCOUT_JITTER, MAPSCOUT_CHALLENGE_WAIT_SECS, MAPSCOUT_OUTPUT,\n\
         MAPSCOUT_PROGRESS_FILE, MAPSCOUT_PROFILE_DIR, CHROME_EXECUTABLE"
    );
}

fn load_terms(cli: &CliArgs) -> anyhow::Result<Vec<String>> {
    let mut terms = cli.terms.clone();
    if let Some(file) = &cli.terms_file {
        let content = std::fs::read_to_string(file)?;
        terms.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(str::to_string),
        );
    }
    Ok(terms)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = parse_args();
    let terms = load_terms(&cli)?;
    if terms.is_empty() {
        print_usage();
        anyhow::bail!("no search terms given");
    }

    let mut cfg = ScoutConfig::from_env();
    if let Some(out) = cli.output {
        cfg.output_path = out;
    }
    if let Some(profile) = cli.profile {
        cfg.user_profile_path = Some(profile);
    }
    if let Some(n) = cli.max_listings {
        cfg.max_listings_per_term = n;
    }
    if cli.headed {
        cfg.headless = false;
    }
    if cfg.headless {
        // A challenge cannot be solved in a window nobody can see.
        warn!("running headless: challenge recovery will need --headed or a remote display");
    }

    info!(
        "starting run: {} terms → {:?}",
        terms.len(),
        cfg.output_path
    );

    let session = CdpSession::launch(&cfg).await?;
    let mut orchestrator = Orchestrator::new(cfg, Box::new(session), Box::new(ConsoleGate::new()));
    let summary = orchestrator.run(&terms).await?;

    if let Some(path) = cli.summary_json {
        std::fs::write(&path, serde_json::to_string_pretty(&summary)?)?;
        info!("run summary written to {:?}", path);
    }

    println!(
        "done: {} records from {} terms ({} abandoned, {} skipped, {} challenges)",
        summary.records_exported,
        summary.terms_completed,
        summary.terms_abandoned,
        summary.terms_skipped,
        summary.challenges.len()
    );
    Ok(())
}
