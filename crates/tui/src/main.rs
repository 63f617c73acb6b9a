mod player;
mod renderer;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sensorline_core::model::{LoadTicket, Reload};
use sensorline_core::source::{NormalizedCollection, parse_rows};
use sensorline_core::{TimelineConfig, TimelineSession};
use sensorline_protocol::{CollectionKind, SiteId};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "sensorline", version, about = "Browse image and audio records on one timeline")]
struct Cli {
    /// JSON array of image rows
    #[arg(long, value_name = "FILE")]
    images: Option<PathBuf>,

    /// JSON array of audio rows
    #[arg(long, value_name = "FILE")]
    audio: Option<PathBuf>,

    /// Shared view state to open, e.g. `north,south-1685599200-1685602800-0`
    #[arg(long, value_name = "STATE")]
    state: Option<String>,

    /// Sites to select when no state is given
    #[arg(long, value_delimiter = ',', default_value = "local")]
    sites: Vec<String>,

    /// TOML config overriding the defaults
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write logs to stderr (redirect it, the viewer owns the terminal)
    #[arg(long)]
    log: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.log {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
    }

    let config = match &cli.config {
        Some(path) => TimelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TimelineConfig::default(),
    };

    let (columns, _) = crossterm::terminal::size().unwrap_or((120, 40));
    let mut session = TimelineSession::new(config);
    session.set_viewport_width(f64::from(columns));

    let reload = match &cli.state {
        Some(state) => session
            .restore(state, f64::from(columns))
            .with_context(|| format!("invalid --state {state:?}"))?,
        None => session.select_sites(cli.sites.iter().map(|s| SiteId::from(s.as_str())).collect()),
    };
    load_all(&mut session, &reload, &cli)?;

    renderer::run(session)
}

/// Serve every ticket from the files given on the command line. A collection
/// without a file loads empty.
fn load_all(session: &mut TimelineSession, reload: &Reload, cli: &Cli) -> Result<()> {
    for ticket in &reload.tickets {
        let loaded = read_collection(session, ticket, cli)?;
        let outcome = session.apply_load(ticket, loaded);
        info!(kind = %ticket.kind, ?outcome, resource = ticket.resource(), "loaded");
    }
    Ok(())
}

fn read_collection(
    session: &TimelineSession,
    ticket: &LoadTicket,
    cli: &Cli,
) -> Result<NormalizedCollection> {
    let path = match ticket.kind {
        CollectionKind::Images => cli.images.as_ref(),
        CollectionKind::Audio => cli.audio.as_ref(),
    };
    let Some(path) = path else {
        return Ok(NormalizedCollection::default());
    };
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    parse_rows(ticket.kind, &data, &session.config().source)
        .with_context(|| format!("parsing {}", path.display()))
}
