use clap::Parser;

use market_kpi::app::{self, Cli};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    app::run(Cli::parse())
}
