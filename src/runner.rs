//! Command-line driver: builds a [`Simulation`] from a scenario and optional config file, wires
//! the CSV reports, applies the scenario's intervention and runs until the outbreak burns out.
use std::cell::RefCell;
use std::fmt::{self, Display};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use clap::Parser;
use serde_derive::Serialize;
use serde_json::Value;

use crate::agent::InfectionStatus;
use crate::define_report;
use crate::error::{invalid_parameter, OutbreakError};
use crate::events::{AgentStatusChangeEvent, StatsSampledEvent};
use crate::log::{configure_logging, error, info};
use crate::parameters::{Intervention, InterventionTrigger, Parameters, Scenario};
use crate::report::{ReportOptions, ReportWriter};
use crate::simulation::Simulation;
use crate::stats::{StatSnapshot, StatusCounts, TIME_TOLERANCE};

/// How often the runner looks at the infected count.
pub const CHECK_INTERVAL: f64 = 5.0;
/// How long the runner keeps going once nobody is infected.
pub const BURNOUT_GRACE: f64 = 5.0;

/// Default cli arguments for the outbreak runner
#[derive(Parser, Debug, Clone)]
#[command(name = "ixa-outbreak", version, about)]
pub struct Args {
    /// Random seed. Overrides the seed in the config file
    #[arg(short, long)]
    pub random_seed: Option<u64>,

    /// Optional path to a JSON file whose fields override the scenario's parameters
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Named scenario the parameters start from
    #[arg(short, long, value_enum, default_value_t = Scenario::Simple)]
    pub scenario: Scenario,

    /// Directory for stats.csv and transitions.csv. No reports are written without it
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Replace existing report files
    #[arg(long)]
    pub overwrite: bool,

    /// Global level (off, error, warn, info, debug, trace), optionally followed by module
    /// filters, e.g. `info,simulation=debug`
    #[arg(long)]
    pub log_level: Option<String>,

    /// Stop at this simulated time even if agents are still infected
    #[arg(long)]
    pub max_time: Option<f64>,
}

#[derive(Serialize)]
struct StatsReportItem {
    time: f64,
    susceptible: usize,
    infected: usize,
    recovered: usize,
}

define_report!(StatsReportItem);

impl From<StatSnapshot> for StatsReportItem {
    fn from(snapshot: StatSnapshot) -> Self {
        StatsReportItem {
            time: snapshot.time,
            susceptible: snapshot.susceptible_count,
            infected: snapshot.infected_count,
            recovered: snapshot.recovered_count,
        }
    }
}

#[derive(Serialize)]
struct TransitionReportItem {
    time: f64,
    agent_id: usize,
    arena_id: usize,
    previous: InfectionStatus,
    current: InfectionStatus,
}

define_report!(TransitionReportItem);

/// Why a run ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// Nobody was infected at a check and the grace period has passed.
    Burnout,
    /// `max_time` was reached first.
    MaxTime,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub time: f64,
    pub counts: StatusCounts,
    pub stop_reason: StopReason,
    pub wall_time: Duration,
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let reason = match self.stop_reason {
            StopReason::Burnout => "burned out",
            StopReason::MaxTime => "reached max time",
        };
        write!(
            f,
            "{reason} at t={:.2}: S={} I={} R={} ({} wall time)",
            self.time,
            self.counts.susceptible,
            self.counts.infected,
            self.counts.recovered,
            humantime::format_duration(Duration::from_millis(
                u64::try_from(self.wall_time.as_millis()).unwrap_or(u64::MAX)
            ))
        )
    }
}

/// Parses the process arguments and runs the simulation they describe.
///
/// # Errors
/// Returns an error if the parameters are invalid, a report cannot be created or the
/// simulation fails
pub fn run_with_args() -> Result<RunSummary, OutbreakError> {
    run(Args::parse())
}

pub fn run(args: Args) -> Result<RunSummary, OutbreakError> {
    if let Some(directives) = &args.log_level {
        configure_logging(directives)?;
    }

    let parameters = load_parameters(&args)?;
    let max_time = parameters.max_time;
    let intervention = parameters.intervention;
    let configured_infections = parameters.initial_infections;
    // Seeding waits until the reports are attached so the transition log sees it.
    let mut simulation = Simulation::new(Parameters {
        initial_infections: 0,
        ..parameters
    })?;

    let reports = match &args.output_dir {
        Some(directory) => {
            let mut options = ReportOptions::new();
            options.directory(directory).overwrite(args.overwrite);
            Some(attach_reports(&mut simulation, options)?)
        }
        None => None,
    };

    // Without anyone infected the burnout check would never see an outbreak end.
    for _ in 0..configured_infections.max(1) {
        let seeded = simulation.infect_random_agent()?;
        if configured_infections == 0 {
            if let Some(agent) = seeded {
                info!("no initial infections configured; infected agent {agent}");
            }
        }
    }

    let summary = run_until_burnout(&mut simulation, intervention, max_time)?;
    if let Some(reports) = reports {
        reports.borrow_mut().flush()?;
    }
    info!("{summary}");
    Ok(summary)
}

/// Starts from the scenario preset, overlays the fields of the config file, then applies the
/// command-line overrides.
pub fn load_parameters(args: &Args) -> Result<Parameters, OutbreakError> {
    let mut parameters = Parameters::preset(args.scenario);
    if let Some(config) = &args.config {
        info!("loading parameters from {}", config.display());
        parameters = overlay_config(&parameters, config)?;
    }
    if let Some(seed) = args.random_seed {
        parameters.seed = seed;
    }
    if args.max_time.is_some() {
        parameters.max_time = args.max_time;
    }
    parameters.validate()?;
    Ok(parameters)
}

fn overlay_config(base: &Parameters, path: &Path) -> Result<Parameters, OutbreakError> {
    let overrides: Value = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    let Value::Object(overrides) = overrides else {
        return Err(invalid_parameter("config", "must contain a JSON object"));
    };
    let mut merged = serde_json::to_value(base)?;
    if let Value::Object(fields) = &mut merged {
        fields.extend(overrides);
    }
    Ok(serde_json::from_value(merged)?)
}

/// Creates `stats.csv` and `transitions.csv` and subscribes writers for them.
pub fn attach_reports(
    simulation: &mut Simulation,
    options: ReportOptions,
) -> Result<Rc<RefCell<ReportWriter>>, OutbreakError> {
    let mut writer = ReportWriter::new(options);
    let stats_path = writer.add_report::<StatsReportItem>("stats")?;
    let transitions_path = writer.add_report::<TransitionReportItem>("transitions")?;
    info!(
        "writing reports to {} and {}",
        stats_path.display(),
        transitions_path.display()
    );
    let writer = Rc::new(RefCell::new(writer));

    let stats_writer = Rc::clone(&writer);
    simulation.subscribe_to_event(move |event: &StatsSampledEvent| {
        if let Err(e) = stats_writer
            .borrow_mut()
            .send_report(&StatsReportItem::from(event.0))
        {
            error!("failed to write stats row: {e}");
        }
    });

    let transitions_writer = Rc::clone(&writer);
    simulation.subscribe_to_event(move |event: &AgentStatusChangeEvent| {
        let item = TransitionReportItem {
            time: event.time,
            agent_id: event.agent.0,
            arena_id: event.arena.0,
            previous: event.previous,
            current: event.current,
        };
        if let Err(e) = transitions_writer.borrow_mut().send_report(&item) {
            error!("failed to write transition row: {e}");
        }
    });

    Ok(writer)
}

fn apply_intervention(simulation: &mut Simulation, intervention: Intervention) {
    info!(
        "t={:.3}: social distance factor {} with probability {}",
        simulation.time(),
        intervention.social_distance_factor,
        intervention.probability
    );
    if let Err(e) = simulation
        .change_social_distance_factor(intervention.social_distance_factor, intervention.probability)
    {
        error!("intervention failed: {e}");
    }
}

/// Steps the simulation until its time reaches `target`, firing a threshold intervention the
/// first time the infected count exceeds it.
fn advance_to(
    simulation: &mut Simulation,
    target: f64,
    pending: &mut Option<Intervention>,
) -> Result<(), OutbreakError> {
    while simulation.time() + TIME_TOLERANCE < target {
        simulation.step()?;
        if let Some(intervention) = *pending {
            if let InterventionTrigger::InfectedAbove { count } = intervention.trigger {
                if simulation.current_counts().infected > count {
                    *pending = None;
                    apply_intervention(simulation, intervention);
                }
            }
        }
    }
    Ok(())
}

/// Runs until a check finds nobody infected, then for [`BURNOUT_GRACE`] more, or until
/// `max_time`.
pub fn run_until_burnout(
    simulation: &mut Simulation,
    intervention: Option<Intervention>,
    max_time: Option<f64>,
) -> Result<RunSummary, OutbreakError> {
    let started = Instant::now();
    let mut pending = None;
    if let Some(intervention) = intervention {
        match intervention.trigger {
            InterventionTrigger::AtTime { time } => {
                simulation.add_plan(time.max(simulation.time()), move |simulation| {
                    apply_intervention(simulation, intervention);
                })?;
            }
            InterventionTrigger::InfectedAbove { .. } => pending = Some(intervention),
        }
    }
    let cap = max_time.unwrap_or(f64::INFINITY);

    let stop_reason = loop {
        let checkpoint = simulation.time() + CHECK_INTERVAL;
        if checkpoint >= cap {
            advance_to(simulation, cap, &mut pending)?;
            break StopReason::MaxTime;
        }
        advance_to(simulation, checkpoint, &mut pending)?;
        if simulation.current_counts().infected == 0 {
            let end = simulation.time() + BURNOUT_GRACE;
            if end > cap {
                advance_to(simulation, cap, &mut pending)?;
                break StopReason::MaxTime;
            }
            advance_to(simulation, end, &mut pending)?;
            break StopReason::Burnout;
        }
    };

    Ok(RunSummary {
        time: simulation.time(),
        counts: simulation.current_counts(),
        stop_reason,
        wall_time: started.elapsed(),
    })
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn args(extra: &[&str]) -> Args {
        Args::parse_from(std::iter::once("ixa-outbreak").chain(extra.iter().copied()))
    }

    #[test]
    fn parses_flags() {
        let args = args(&[
            "--random-seed",
            "42",
            "--scenario",
            "large-city",
            "--max-time",
            "3.5",
            "--overwrite",
        ]);
        assert_eq!(args.random_seed, Some(42));
        assert_eq!(args.scenario, Scenario::LargeCity);
        assert_eq!(args.max_time, Some(3.5));
        assert!(args.overwrite);
        assert!(args.config.is_none());
    }

    #[test]
    fn config_overrides_preset_and_flags_override_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "population": 40, "seed": 7 }}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let parameters = load_parameters(&args(&[
            "--scenario",
            "large-city",
            "--config",
            &path,
        ]))
        .unwrap();
        assert_eq!(parameters.population, 40);
        assert_eq!(parameters.seed, 7);
        assert!((parameters.infection_radius - 0.25).abs() < 1e-12);

        let parameters = load_parameters(&args(&["--config", &path, "-r", "9"])).unwrap();
        assert_eq!(parameters.seed, 9);
    }

    #[test]
    fn unknown_config_fields_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "populaton": 40 }}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();
        assert!(matches!(
            load_parameters(&args(&["--config", &path])),
            Err(OutbreakError::JsonError(_))
        ));
    }

    #[test]
    fn bad_log_level_fails() {
        assert!(matches!(
            run(args(&["--log-level", "loud", "--max-time", "0.1"])),
            Err(OutbreakError::InvalidParameter {
                name: "log_level",
                ..
            })
        ));
        assert!(matches!(
            run(args(&["--log-level", "off,simulation=loud", "--max-time", "0.1"])),
            Err(OutbreakError::InvalidParameter {
                name: "log_level",
                ..
            })
        ));
    }

    #[test]
    fn lone_agent_burns_out_after_grace() {
        let mut simulation = Simulation::new(Parameters {
            population: 1,
            infection_duration: 4.0,
            ..Parameters::default()
        })
        .unwrap();
        let summary = run_until_burnout(&mut simulation, None, None).unwrap();
        // Recovers just after t=4, is seen at the t=5 check, then runs the grace period.
        assert_eq!(summary.stop_reason, StopReason::Burnout);
        assert!((summary.time - 10.0).abs() < 0.1);
        assert_eq!(summary.counts.recovered, 1);
    }

    #[test]
    fn max_time_caps_run() {
        let mut simulation = Simulation::new(Parameters::default()).unwrap();
        let summary = run_until_burnout(&mut simulation, None, Some(2.0)).unwrap();
        assert_eq!(summary.stop_reason, StopReason::MaxTime);
        assert!((summary.time - 2.0).abs() < 0.1);
        assert_eq!(summary.counts.total(), 100);
    }

    #[test]
    fn timed_intervention_runs_as_plan() {
        let mut simulation = Simulation::new(Parameters::default()).unwrap();
        let intervention = Intervention {
            trigger: InterventionTrigger::AtTime { time: 1.0 },
            social_distance_factor: 2.0,
            probability: 1.0,
        };
        run_until_burnout(&mut simulation, Some(intervention), Some(0.5)).unwrap();
        assert_eq!(simulation.social_distance_factor(), 0.0);
        run_until_burnout(&mut simulation, None, Some(1.5)).unwrap();
        assert_eq!(simulation.social_distance_factor(), 2.0);
    }

    #[test]
    fn threshold_intervention_fires_once_exceeded() {
        let mut simulation = Simulation::new(Parameters {
            population: 10,
            initial_infections: 3,
            ..Parameters::default()
        })
        .unwrap();
        let intervention = Intervention {
            trigger: InterventionTrigger::InfectedAbove { count: 2 },
            social_distance_factor: 1.5,
            probability: 1.0,
        };
        run_until_burnout(&mut simulation, Some(intervention), Some(0.2)).unwrap();
        assert_eq!(simulation.social_distance_factor(), 1.5);
    }

    #[test]
    fn writes_reports() {
        let temp_dir = tempdir().unwrap();
        let output = temp_dir.path().to_str().unwrap().to_string();
        let summary = run(args(&["--output-dir", &output, "--max-time", "1"])).unwrap();
        assert_eq!(summary.stop_reason, StopReason::MaxTime);

        let mut stats = csv::Reader::from_path(temp_dir.path().join("stats.csv")).unwrap();
        let headers: Vec<String> = stats
            .headers()
            .unwrap()
            .iter()
            .map(str::to_string)
            .collect();
        assert_eq!(headers, ["time", "susceptible", "infected", "recovered"]);
        assert!(stats.records().count() >= 14);
        assert!(temp_dir.path().join("transitions.csv").exists());

        // A second run into the same directory needs --overwrite.
        assert!(matches!(
            run(args(&["--output-dir", &output, "--max-time", "1"])),
            Err(OutbreakError::ReportError(_))
        ));
        assert!(run(args(&["--output-dir", &output, "--max-time", "1", "--overwrite"])).is_ok());
    }

    #[test]
    fn transitions_include_initial_infections() {
        let temp_dir = tempdir().unwrap();
        let output = temp_dir.path().to_str().unwrap().to_string();
        run(args(&["--output-dir", &output, "--max-time", "30", "-r", "3"])).unwrap();

        let mut transitions =
            csv::Reader::from_path(temp_dir.path().join("transitions.csv")).unwrap();
        let headers = transitions.headers().unwrap().clone();
        let column = |name: &str| headers.iter().position(|header| header == name).unwrap();
        let (previous, current) = (column("previous"), column("current"));

        let mut infections = 0;
        let mut recoveries = 0;
        for record in transitions.records() {
            let record = record.unwrap();
            match (&record[previous], &record[current]) {
                ("Susceptible", "Infected" | "AsymptomaticInfected") => infections += 1,
                (_, "Recovered") => recoveries += 1,
                _ => {}
            }
        }
        assert!(infections >= 1);
        assert!(recoveries <= infections);
        assert!(recoveries >= 1);
    }
}
