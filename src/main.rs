use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{debug, error, info, warn};

use pigazing::calibration::{
    calibrate_lens, diagnostics, read_descriptor_list, CalibrationDescriptor, CalibrationRun,
};
use pigazing::catalogs::{HipparcosCatalogue, LensCatalogue};
use pigazing::coincidence::{search_simultaneous_detections, CoincidenceRun};
use pigazing::config::PipelineConfig;
use pigazing::constants::{ObservatoryId, UnixTime};
use pigazing::identification::{
    plane_identification, satellite_identification, AdsbRecords, IdentificationRun,
    SatelliteCatalogue,
};
use pigazing::logging::{self, OutcomeCounters};
use pigazing::orientation::{
    orientation_calculate, orientation_daily_average, solver_timeout, AstrometryNet,
    DailyAverageRun, OrientationRun,
};
use pigazing::pigazing_errors::PiGazingError;
use pigazing::store::{ArchiveStore, ObservationStore};
use pigazing::time::{now, Deadline};
use pigazing::triangulation::{triangulation, TriangulationRun};

#[derive(Parser)]
#[command(
    name = "pigazing",
    about = "Astrometry, coincidence search and trajectory fitting for Pi Gazing cameras"
)]
struct Cli {
    /// JSON configuration; defaults apply to absent fields
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Observation archive, overrides the configured one
    #[arg(long, global = true)]
    store: Option<Utf8PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Time window, observatory filter, deadline and flush switch shared by every command.
#[derive(Args, Debug, Clone)]
struct Window {
    /// Start of the window, unix seconds
    #[arg(long, default_value_t = 0.0)]
    utc_min: UnixTime,

    /// End of the window, unix seconds (default: now)
    #[arg(long)]
    utc_max: Option<UnixTime>,

    /// Only work on this observatory
    #[arg(long)]
    observatory: Option<ObservatoryId>,

    /// Stop launching new work after this unix time
    #[arg(long)]
    stop_by: Option<UnixTime>,

    /// Delete earlier results of the window before recomputing
    #[arg(long, overrides_with = "no_flush")]
    flush: bool,

    /// Keep earlier results (default)
    #[arg(long = "no-flush", overrides_with = "flush")]
    no_flush: bool,
}

impl Window {
    fn utc_max(&self) -> UnixTime {
        self.utc_max.unwrap_or_else(now)
    }

    fn deadline(&self) -> Deadline {
        Deadline::new(self.stop_by)
    }

    fn flush(&self) -> bool {
        self.flush && !self.no_flush
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Plate solve the still images of the window.
    #[command(name = "orientation_calculate")]
    OrientationCalculate(Window),

    /// Average the per-image orientations of each night.
    #[command(name = "orientation_daily_average")]
    OrientationDailyAverage(Window),

    /// Fit a lens distortion model to hand-identified stars.
    #[command(name = "calibrate_lens_from_star_list")]
    CalibrateLens {
        #[command(flatten)]
        window: Window,

        /// Calibration descriptor. Can be repeated.
        #[arg(long)]
        filename: Vec<Utf8PathBuf>,

        /// File listing descriptor paths, one per line
        #[arg(long)]
        list: Option<Utf8PathBuf>,

        /// Fit k2 and k3 as well as k1
        #[arg(long)]
        fit_all: bool,
    },

    /// Group simultaneous detections from several observatories.
    #[command(name = "search_simultaneous_detections")]
    SearchSimultaneousDetections(Window),

    /// Fit trajectories to groups of simultaneous detections.
    #[command(name = "triangulation")]
    Triangulation(Window),

    /// Identify aircraft from ADS-B records.
    #[command(name = "plane_identification")]
    PlaneIdentification(Window),

    /// Identify satellites from two-line element sets.
    #[command(name = "satellite_identification")]
    SatelliteIdentification(Window),
}

fn load_input<T>(what: &str, load: impl FnOnce() -> Result<T, PiGazingError>) -> Result<T, PiGazingError> {
    load().map_err(|e| PiGazingError::InvalidConfig(format!("{what}: {e}")))
}

fn calibrate(
    store: &mut ArchiveStore,
    config: &PipelineConfig,
    window: &Window,
    filename: &[Utf8PathBuf],
    list: Option<&Utf8PathBuf>,
    fit_all: bool,
) -> Result<(), PiGazingError> {
    let mut paths = filename.to_vec();
    if let Some(list) = list {
        paths.extend(read_descriptor_list(list)?);
    }
    if paths.is_empty() {
        return Err(PiGazingError::InvalidConfig(
            "no calibration descriptor given, use --filename or --list".into(),
        ));
    }
    let mut descriptors = Vec::with_capacity(paths.len());
    for path in &paths {
        let name = path.file_name().unwrap_or(path.as_str()).to_string();
        descriptors.push((name, CalibrationDescriptor::from_json_file(path)?));
    }

    let hipparcos = load_input("hipparcos", || HipparcosCatalogue::from_json_lines(&config.paths.hipparcos))?;
    let lenses = load_input("lenses", || LensCatalogue::from_xml(&config.paths.lenses))?;
    let run = CalibrationRun {
        all_coefficients: fit_all,
        observatory: window.observatory.clone(),
        flush: window.flush().then(|| (window.utc_min, window.utc_max())),
        diagnostics: Some(config.paths.diagnostics.clone()),
        deadline: window.deadline(),
    };
    let calibration = match calibrate_lens(store, &descriptors, &hipparcos, &lenses, &config.calibration, &run) {
        Ok(calibration) => calibration,
        Err(PiGazingError::DeadlineExceeded) => {
            info!("deadline passed before the lens fit, nothing done");
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    println!("{}", diagnostics::summary_table(&calibration.fit, &calibration.images));
    Ok(())
}

fn dispatch(command: &Commands, config: &PipelineConfig, store: &mut ArchiveStore) -> Result<(), PiGazingError> {
    let counters: OutcomeCounters = match command {
        Commands::OrientationCalculate(w) => {
            let hipparcos =
                load_input("hipparcos", || HipparcosCatalogue::from_json_lines(&config.paths.hipparcos))?;
            let lenses = load_input("lenses", || LensCatalogue::from_xml(&config.paths.lenses))?;
            let solver = AstrometryNet::new(
                config.orientation.solver_command.as_str(),
                solver_timeout(&config.orientation),
            );
            let run = OrientationRun {
                utc_min: w.utc_min,
                utc_max: w.utc_max(),
                observatory: w.observatory.clone(),
                flush: w.flush(),
                deadline: w.deadline(),
            };
            orientation_calculate(
                store,
                &solver,
                &hipparcos,
                &lenses,
                &config.orientation,
                &config.paths.scratch,
                &run,
            )?
        }
        Commands::OrientationDailyAverage(w) => {
            let run = DailyAverageRun {
                utc_min: w.utc_min,
                utc_max: w.utc_max(),
                observatory: w.observatory.clone(),
                flush: w.flush(),
                deadline: w.deadline(),
            };
            orientation_daily_average(store, &config.orientation, &run)?
        }
        Commands::CalibrateLens {
            window,
            filename,
            list,
            fit_all,
        } => return calibrate(store, config, window, filename, list.as_ref(), *fit_all),
        Commands::SearchSimultaneousDetections(w) => {
            let run = CoincidenceRun {
                utc_min: w.utc_min,
                utc_max: w.utc_max(),
                observatory: w.observatory.clone(),
                flush: w.flush(),
                deadline: w.deadline(),
            };
            search_simultaneous_detections(store, &config.coincidence, &run)?
        }
        Commands::Triangulation(w) => {
            let lenses = load_input("lenses", || LensCatalogue::from_xml(&config.paths.lenses))?;
            let run = TriangulationRun {
                utc_min: w.utc_min,
                utc_max: w.utc_max(),
                observatory: w.observatory.clone(),
                flush: w.flush(),
                deadline: w.deadline(),
            };
            triangulation(store, &lenses, &config.triangulation, &run)?
        }
        Commands::PlaneIdentification(w) | Commands::SatelliteIdentification(w) => {
            let lenses = load_input("lenses", || LensCatalogue::from_xml(&config.paths.lenses))?;
            let run = IdentificationRun {
                utc_min: w.utc_min,
                utc_max: w.utc_max(),
                observatory: w.observatory.clone(),
                flush: w.flush(),
                deadline: w.deadline(),
            };
            if matches!(command, Commands::PlaneIdentification(_)) {
                let adsb = load_input("adsb", || AdsbRecords::from_csv(&config.paths.adsb))?;
                plane_identification(store, &adsb, &lenses, &config.identification, &run)?
            } else {
                let satellites = load_input("tle", || {
                    SatelliteCatalogue::from_tle_file(&config.paths.tle, config.identification.satellite_step)
                })?;
                satellite_identification(store, &satellites, &lenses, &config.identification, &run)?
            }
        }
    };
    println!("{counters}");
    Ok(())
}

fn run(cli: &Cli) -> Result<(), PiGazingError> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::new(),
    };
    if let Some(store) = &cli.store {
        config.paths.archive = store.clone();
    }
    debug!("{config}");

    let mut store = ArchiveStore::open(&config.paths.archive)?;
    let result = dispatch(&cli.command, &config, &mut store);
    match result {
        Ok(()) => store.commit(),
        Err(e) => {
            if let Err(rollback) = store.rollback() {
                warn!("rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("pigazing: {e}");
            match e {
                PiGazingError::InvalidConfig(_) => ExitCode::from(1),
                _ => ExitCode::from(2),
            }
        }
    }
}
