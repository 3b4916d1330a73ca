mod logic;
mod util;

use anyhow::{Context, Result, bail};
use clap::Parser;
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use logic::{
    BalanceAggregate, BalanceRecord, FarmTester, GameplayStrategy, LogicTester, ScenarioOutcome,
    ScenarioResult, TesterAssets, aggregate_balance, all_scenario_keys, get_scenario,
    list_scenarios, resolve_seed_inputs,
};
use util::{report_timestamp, split_csv};

#[derive(Debug, Parser)]
#[command(name = "farmstead-tester", version)]
#[command(about = "Deterministic balance testing for the Farmstead process engine")]
struct Args {
    /// Scenarios to run (comma-separated, `all` for the full catalog)
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated; decimal, 0x-hex, or `a..b` ranges)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Override the tick count of every scenario
    #[arg(long)]
    ticks: Option<u32>,

    /// Override the simulated seconds per tick
    #[arg(long)]
    dt: Option<f64>,

    /// Override the player policy of every scenario
    #[arg(long)]
    strategy: Option<GameplayStrategy>,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console", "csv"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Game data JSON to use instead of the bundled data
    #[arg(long)]
    data: Option<PathBuf>,

    /// Manager configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    if let Some(dt) = args.dt
        && !(dt.is_finite() && dt > 0.0)
    {
        bail!("--dt must be a positive number of seconds, got {dt}");
    }

    announce_banner();

    let start_time = Instant::now();
    let scenarios = expand_scenarios(&args.scenarios);
    let seeds = resolve_seed_inputs(&split_csv(&args.seeds)).context("invalid --seeds")?;
    let assets = Arc::new(
        TesterAssets::load(args.data.as_deref(), args.config.as_deref())
            .context("failed to load tester assets")?,
    );
    let farm_tester = FarmTester::new(assets, args.verbose);

    let outcome = run_scenarios(&args, &scenarios, &seeds, farm_tester);
    let aggregates = aggregate_balance(&outcome.records);

    write_reports(
        &args,
        &outcome.results,
        &outcome.records,
        &aggregates,
        start_time,
    )?;

    if outcome.results.iter().any(|r| !r.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:25} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🌾 Farmstead Balance Tester".bright_cyan().bold());
    println!("{}", "================================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for key in all_scenario_keys() {
            if !scenarios.contains(&key) {
                scenarios.push(key);
            }
        }
    }
    scenarios
}

fn run_scenarios(
    args: &Args,
    scenarios: &[String],
    seeds: &[u64],
    farm_tester: FarmTester,
) -> ScenarioOutcome {
    println!("{}", "🧠 Running Simulations".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let logic_tester = LogicTester::new(farm_tester);
    let mut outcome = ScenarioOutcome::default();

    for scenario_name in scenarios {
        let Some(mut scenario) = get_scenario(scenario_name) else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
            continue;
        };
        if let Some(ticks) = args.ticks {
            scenario.plan.ticks = ticks;
        }
        if let Some(dt) = args.dt {
            scenario.plan.dt = dt;
        }
        if let Some(strategy) = args.strategy {
            scenario.plan.strategy = strategy;
        }
        log::info!(
            "running {} with {} seed(s) x {} iteration(s)",
            scenario.key,
            seeds.len(),
            args.iterations
        );
        outcome.extend(logic_tester.run_scenario(&scenario, seeds, args.iterations));
    }

    outcome
}

fn write_reports(
    args: &Args,
    results: &[ScenarioResult],
    records: &[BalanceRecord],
    aggregates: &[BalanceAggregate],
    start_time: Instant,
) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;
    let generated_at = report_timestamp();

    match args.report.as_str() {
        "json" => {
            logic::reports::generate_json_report(
                &mut output_target,
                &generated_at,
                results,
                aggregates,
            )?;
        }
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Farmstead Balance Test Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(
                    &mut output_target,
                    &generated_at,
                    results,
                    aggregates,
                )?;
            }
        }
        "csv" => {
            logic::reports::generate_csv_report(&mut output_target, records)?;
        }
        _ => {
            let duration = start_time.elapsed();
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(
                    &mut output_target,
                    results,
                    aggregates,
                    duration,
                )?;
            }
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
        }
    }

    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn base_args() -> Args {
        Args {
            scenarios: "smoke".to_string(),
            list_scenarios: false,
            seeds: "1337".to_string(),
            iterations: 1,
            ticks: None,
            dt: None,
            strategy: None,
            report: "json".to_string(),
            verbose: false,
            output: None,
            data: None,
            config: None,
        }
    }

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("farmstead-{}-{name}", std::process::id()))
    }

    fn sample_result(passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: "Smoke Test".to_string(),
            strategy: "Balanced".to_string(),
            seed: 1337,
            passed,
            iterations_run: 3,
            successful_iterations: if passed { 3 } else { 2 },
            failures: if passed {
                Vec::new()
            } else {
                vec!["failure".to_string()]
            },
            average_duration: Duration::from_millis(10),
            performance_data: vec![Duration::from_millis(10)],
        }
    }

    #[test]
    fn args_parse_overrides() {
        let args = Args::try_parse_from([
            "farmstead-tester",
            "--scenarios",
            "crafting",
            "--ticks",
            "30",
            "--dt",
            "2.5",
            "--strategy",
            "adventurer",
            "--report",
            "csv",
        ])
        .unwrap();
        assert_eq!(args.ticks, Some(30));
        assert_eq!(args.dt, Some(2.5));
        assert_eq!(args.strategy, Some(GameplayStrategy::Adventurer));
        assert!(Args::try_parse_from(["farmstead-tester", "--report", "pdf"]).is_err());
        assert!(Args::try_parse_from(["farmstead-tester", "--strategy", "lazy"]).is_err());
    }

    #[test]
    fn expands_all_scenarios_keyword() {
        let expanded = expand_scenarios("smoke,all");
        assert_eq!(expanded[0], "smoke");
        assert_eq!(expanded.len(), all_scenario_keys().len());
        assert!(expanded.contains(&"crafting-chain".to_string()));
    }

    #[test]
    fn expand_scenarios_without_all_preserves_order() {
        let expanded = expand_scenarios("invariants,smoke");
        assert_eq!(
            expanded,
            vec!["invariants".to_string(), "smoke".to_string()]
        );
    }

    #[test]
    fn run_scenarios_applies_overrides_and_skips_unknown() {
        let assets = Arc::new(TesterAssets::load_default().unwrap());
        let args = Args {
            ticks: Some(12),
            strategy: Some(GameplayStrategy::Farmer),
            ..base_args()
        };
        let outcome = run_scenarios(
            &args,
            &["smoke".to_string(), "weather".to_string()],
            &[3],
            FarmTester::new(assets, false),
        );
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].strategy, "Farmer");
        assert_eq!(outcome.records[0].metrics.ticks, 12);
    }

    #[test]
    fn maybe_list_scenarios_writes_output() {
        let temp = temp_file("scenarios.txt");
        let args = Args {
            list_scenarios: true,
            output: Some(temp.clone()),
            ..base_args()
        };
        assert!(maybe_list_scenarios(&args).unwrap());
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("Available scenarios"));
        assert!(content.contains("crop-economy"));
    }

    #[test]
    fn maybe_list_scenarios_returns_false_when_disabled() {
        assert!(!maybe_list_scenarios(&base_args()).unwrap());
    }

    #[test]
    fn write_reports_markdown_empty_results() {
        let temp = temp_file("report.md");
        let args = Args {
            report: "markdown".to_string(),
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[], &[], &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("No scenarios executed"));
    }

    #[test]
    fn write_reports_emits_json_for_results() {
        let temp = temp_file("report.json");
        let args = Args {
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_result(true)], &[], &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["results"][0]["scenario_name"], "Smoke Test");
    }

    #[test]
    fn write_reports_console_includes_total_time() {
        let temp = temp_file("report.txt");
        let args = Args {
            report: "console".to_string(),
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_result(false)], &[], &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("FAIL"));
        assert!(content.contains("Total time"));
    }

    #[test]
    fn output_target_stdout_writes() {
        let mut target = OutputTarget::new(None).unwrap();
        target.write_all(b"ok").unwrap();
        target.flush().unwrap();
    }
}
