use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::data::filter::FilterState;
use crate::data::model::DataType;
use crate::export::{DownloadButton, HttpPackager, PackageRequest, UploadFile};
use crate::settings::Settings;
use crate::state::DashboardState;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "market-kpi", version, about = "Headline KPIs for market-research datasets")]
pub struct Cli {
    /// Settings file (TOML).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the KPI cards for a dataset and filter selection.
    Kpi(KpiArgs),
    /// Upload data to the packaging service and save the dashboard archive.
    Package(PackageArgs),
}

#[derive(Args, Debug)]
pub struct KpiArgs {
    /// Dataset file (.json or .csv).
    pub dataset: PathBuf,
    /// Geography to include; repeat for several. Omit for all geographies.
    #[arg(long = "geography", short = 'g')]
    pub geographies: Vec<String>,
    /// Segment type; defaults to the dataset's first one.
    #[arg(long, short = 's')]
    pub segment_type: Option<String>,
    #[arg(long, short = 'd', default_value = "value")]
    pub data_type: DataType,
    /// Aggregation level to sum at; omit to pick the best available.
    #[arg(long, short = 'l')]
    pub level: Option<u32>,
    /// Display currency override (e.g. INR).
    #[arg(long)]
    pub currency: Option<String>,
    /// Print the raw KPI result as JSON instead of cards.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PackageArgs {
    #[arg(long)]
    pub value_file: PathBuf,
    #[arg(long)]
    pub volume_file: Option<PathBuf>,
    #[arg(long)]
    pub project_name: String,
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,
    /// Packaging service base URL; overrides the settings file.
    #[arg(long)]
    pub url: Option<String>,
}

// ---------------------------------------------------------------------------
// Entry-point
// ---------------------------------------------------------------------------

pub fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load_or_default(cli.config.as_deref())?;
    match cli.command {
        Command::Kpi(args) => run_kpi(args, settings),
        Command::Package(args) => run_package(args, settings),
    }
}

fn run_kpi(args: KpiArgs, settings: Settings) -> Result<()> {
    let mut state = DashboardState::new(settings);
    if let Some(currency) = args.currency {
        state.settings.currency = Some(currency);
    }
    if !state.load_file(&args.dataset) {
        bail!(state
            .status_message
            .take()
            .unwrap_or_else(|| "failed to load dataset".to_string()));
    }

    let segment_type = args.segment_type.or_else(|| state.filters.segment_type.clone());
    state.set_filters(FilterState {
        geographies: args.geographies,
        segment_type,
        data_type: args.data_type,
        aggregation_level: args.level,
    });

    // No resolvable data is not a failure: print nothing.
    let Some(kpi) = state.kpi.as_ref() else {
        log::info!("No KPI data for the selected filters");
        return Ok(());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(kpi).context("encoding KPI result")?);
    } else if let Some(panel) = state.panel() {
        print!("{panel}");
    }
    Ok(())
}

fn run_package(args: PackageArgs, settings: Settings) -> Result<()> {
    let request = PackageRequest {
        value_file: Some(UploadFile::read(&args.value_file)?),
        volume_file: args
            .volume_file
            .as_deref()
            .map(UploadFile::read)
            .transpose()?,
        project_name: args.project_name,
    };
    let url = args.url.unwrap_or(settings.packaging_url);
    let packager = HttpPackager::new(&url)?;

    let mut button = DownloadButton::default();
    match button.download(&packager, &request, &args.out_dir) {
        Ok(Some(path)) => {
            println!("Downloaded {}", path.display());
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            let message = button.message.take().unwrap_or_else(|| err.to_string());
            bail!("An error occurred while generating the dashboard: {message}")
        }
    }
}
