use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use rusty_rt::app::RustyRtApp;
use rusty_rt::data::filter::PointsType;
use rusty_rt::report::SessionReport;
use rusty_rt::settings::AlignmentSettings;

#[derive(Parser)]
#[command(name = "rusty-rt")]
#[command(about = "Retention time regression with outlier refinement")]
#[command(version)]
struct Cli {
    /// Peptide document (.parquet, .json or .csv)
    file: PathBuf,

    /// JSON settings file; flags below override its values
    #[arg(long, short = 's')]
    settings: Option<PathBuf>,

    /// Calculator to regress against (automatic when omitted)
    #[arg(long, short = 'c')]
    calculator: Option<String>,

    /// Correlation the refined regression must reach
    #[arg(long, short = 't')]
    threshold: Option<f64>,

    /// Decimal digits r is rounded to before comparing
    #[arg(long)]
    precision: Option<u32>,

    /// Replicate index providing the times (averages all replicates when omitted)
    #[arg(long)]
    target: Option<usize>,

    /// Regress the target replicate against this replicate instead of scores
    #[arg(long)]
    original: Option<usize>,

    /// Use each peptide's best peak
    #[arg(long)]
    best: bool,

    /// Skip outlier refinement
    #[arg(long)]
    no_refine: bool,

    /// Peptides to plot
    #[arg(long, value_enum)]
    points: Option<PointsType>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn settings(&self) -> Result<AlignmentSettings> {
        let mut settings = match &self.settings {
            Some(path) => AlignmentSettings::load(path)?,
            None => AlignmentSettings::default(),
        };
        if let Some(name) = &self.calculator {
            settings.calculator = Some(name.clone());
        }
        if let Some(threshold) = self.threshold {
            settings.threshold = threshold;
        }
        if self.precision.is_some() {
            settings.precision = self.precision;
        }
        if let Some(points) = self.points {
            settings.points = points;
        }
        settings.best_result |= self.best;
        settings.refine &= !self.no_refine;
        Ok(settings)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let settings = cli.settings()?;
    let request = settings.to_request(cli.target, cli.original);

    let app = RustyRtApp::open(&cli.file)?;
    let session = app.align(&request)?;
    let report = SessionReport::new(&session);

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("serializing report")?;
        println!("{json}");
    } else {
        print!("{report}");
    }
    Ok(())
}
