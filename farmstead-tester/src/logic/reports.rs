use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

use farmstead_game::ProcessType;

use super::ScenarioResult;
use super::balance::{BalanceAggregate, BalanceRecord};

#[allow(clippy::cast_precision_loss)]
fn success_rate(results: &[ScenarioResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let passed = results.iter().filter(|r| r.passed).count();
    passed as f64 / results.len() as f64 * 100.0
}

/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn generate_console_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    aggregates: &[BalanceAggregate],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Balance Test Results Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "================================".cyan())?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();
    let failed_tests = total_tests - passed_tests;

    writeln!(out, "Total scenario runs: {total_tests}")?;
    writeln!(out, "Passed: {}", passed_tests.to_string().green())?;
    writeln!(out, "Failed: {}", failed_tests.to_string().red())?;
    writeln!(out, "Success rate: {:.1}%", success_rate(results))?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for result in results {
        let status = if result.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };

        writeln!(
            out,
            "{} {} [{} seed {}]",
            status,
            result.scenario_name.bold(),
            result.strategy,
            result.seed
        )?;
        writeln!(
            out,
            "   Iterations: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "   Average time: {:?}", result.average_duration)?;

        if !result.failures.is_empty() {
            writeln!(out, "   Failures:")?;
            for failure in &result.failures {
                writeln!(out, "     • {}", failure.red())?;
            }
        }
        writeln!(out)?;
    }

    if !aggregates.is_empty() {
        writeln!(out, "{}", "🌾 Balance Summary".bright_green().bold())?;
        writeln!(out, "{}", "==================".green())?;
        for aggregate in aggregates {
            writeln!(
                out,
                "{} ({}, {} runs)",
                aggregate.scenario_name.bold(),
                aggregate.strategy,
                aggregate.iterations
            )?;
            writeln!(
                out,
                "   Gold/h: {:.1} ± {:.1} | XP/h: {:.1} ± {:.1} | Level: {:.2}",
                aggregate.mean_gold_per_hour,
                aggregate.std_gold_per_hour,
                aggregate.mean_xp_per_hour,
                aggregate.std_xp_per_hour,
                aggregate.mean_final_level
            )?;
            writeln!(
                out,
                "   Completed: {:.1} | Failure rate: {:.1}% | Rejections: {:.1}% | Conflicts: {:.1}",
                aggregate.mean_completed,
                aggregate.failure_rate * 100.0,
                aggregate.rejection_rate * 100.0,
                aggregate.mean_conflicts
            )?;
            let mix: Vec<String> = aggregate
                .mean_completed_by_type
                .iter()
                .map(|(kind, mean)| format!("{kind} {mean:.1}"))
                .collect();
            if !mix.is_empty() {
                writeln!(out, "   Mix: {}", mix.join(", "))?;
            }
            if aggregate.mean_wasted_pool > 0.0 {
                writeln!(
                    out,
                    "   Wasted energy+water: {:.1}",
                    aggregate.mean_wasted_pool
                )?;
            }
            if aggregate.invariant_breaches > 0 {
                writeln!(
                    out,
                    "   {}",
                    format!("Invariant breaches: {}", aggregate.invariant_breaches).red()
                )?;
            }
        }
        writeln!(out)?;
    }

    let fastest = results.iter().min_by_key(|r| r.average_duration);
    let slowest = results.iter().max_by_key(|r| r.average_duration);
    if let (Some(fastest), Some(slowest)) = (fastest, slowest) {
        writeln!(out, "{}", "⚡ Performance Summary".bright_yellow().bold())?;
        writeln!(out, "{}", "=====================".yellow())?;
        writeln!(
            out,
            "Fastest: {} ({:?})",
            fastest.scenario_name.green(),
            fastest.average_duration
        )?;
        writeln!(
            out,
            "Slowest: {} ({:?})",
            slowest.scenario_name.yellow(),
            slowest.average_duration
        )?;
    }
    Ok(())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: &'a str,
    results: &'a [ScenarioResult],
    balance: &'a [BalanceAggregate],
}

/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn generate_json_report(
    out: &mut dyn Write,
    generated_at: &str,
    results: &[ScenarioResult],
    aggregates: &[BalanceAggregate],
) -> Result<()> {
    let report = JsonReport {
        generated_at,
        results,
        balance: aggregates,
    };
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn generate_markdown_report(
    out: &mut dyn Write,
    generated_at: &str,
    results: &[ScenarioResult],
    aggregates: &[BalanceAggregate],
) -> Result<()> {
    writeln!(out, "# Farmstead Balance Test Results\n")?;
    writeln!(out, "_Generated {generated_at}_\n")?;

    let total_tests = results.len();
    let passed_tests = results.iter().filter(|r| r.passed).count();

    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total scenario runs**: {total_tests}")?;
    writeln!(out, "- **Passed**: {passed_tests}")?;
    writeln!(out, "- **Failed**: {}", total_tests - passed_tests)?;
    writeln!(out, "- **Success rate**: {:.1}%\n", success_rate(results))?;

    if !aggregates.is_empty() {
        writeln!(out, "## Balance\n")?;
        writeln!(
            out,
            "| Scenario | Strategy | Runs | Gold/h | XP/h | Completed | Failure rate | Level |"
        )?;
        writeln!(out, "|---|---|---|---|---|---|---|---|")?;
        for a in aggregates {
            writeln!(
                out,
                "| {} | {} | {} | {:.1} | {:.1} | {:.1} | {:.1}% | {:.2} |",
                a.scenario_name,
                a.strategy,
                a.iterations,
                a.mean_gold_per_hour,
                a.mean_xp_per_hour,
                a.mean_completed,
                a.failure_rate * 100.0,
                a.mean_final_level
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## Detailed Results\n")?;
    for result in results {
        let status = if result.passed { "✅" } else { "❌" };

        writeln!(
            out,
            "### {} {} (seed {})\n",
            status, result.scenario_name, result.seed
        )?;
        writeln!(out, "- **Strategy**: {}", result.strategy)?;
        writeln!(
            out,
            "- **Iterations**: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "- **Average time**: {:?}", result.average_duration)?;

        if !result.failures.is_empty() {
            writeln!(out, "- **Failures**:")?;
            for failure in &result.failures {
                writeln!(out, "  - {failure}")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

/// One row per recorded iteration.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub fn generate_csv_report(out: &mut dyn Write, records: &[BalanceRecord]) -> Result<()> {
    write!(
        out,
        "scenario,strategy,seed,ticks,simulated_seconds,gold_earned,experience_earned,\
         gold_per_hour,xp_per_hour,completed,failed,faulted,rejected,conflicts,\
         wasted_pool,final_gold,final_level,invariant_breaches"
    )?;
    for kind in ProcessType::ALL {
        write!(out, ",completed_{}", kind.as_str())?;
    }
    writeln!(out)?;

    for record in records {
        let m = &record.metrics;
        write!(
            out,
            "{},{},{},{},{:.1},{},{},{:.3},{:.3},{},{},{},{},{},{:.3},{},{},{}",
            csv_field(&record.scenario_name),
            record.strategy.key(),
            record.seed,
            m.ticks,
            m.simulated_seconds,
            m.gold_earned,
            m.experience_earned,
            m.gold_per_hour(),
            m.experience_per_hour(),
            m.completed,
            m.failed,
            m.faulted,
            m.starts_rejected,
            m.conflicts,
            m.wasted_pool(),
            m.final_gold,
            m.final_hero_level,
            m.invariant_violations.len()
        )?;
        for kind in ProcessType::ALL {
            write!(out, ",{}", m.completions(kind))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::policy::GameplayStrategy;
    use crate::logic::simulation::RunMetrics;

    fn result(passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: "Crop Economy".to_string(),
            strategy: "Farmer".to_string(),
            seed: 7,
            passed,
            iterations_run: 2,
            successful_iterations: if passed { 2 } else { 1 },
            failures: if passed {
                Vec::new()
            } else {
                vec!["Iteration 2 (strategy farmer, seed 8): no crops".to_string()]
            },
            average_duration: Duration::from_millis(4),
            performance_data: vec![Duration::from_millis(4)],
        }
    }

    fn record() -> BalanceRecord {
        let mut metrics = RunMetrics {
            ticks: 720,
            simulated_seconds: 3600.0,
            gold_earned: 90,
            completed: 3,
            ..RunMetrics::default()
        };
        metrics.completed_by_type.insert(ProcessType::CropGrowth, 3);
        BalanceRecord {
            scenario_name: "Crop, Economy".to_string(),
            strategy: GameplayStrategy::Farmer,
            seed: 7,
            metrics,
        }
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buffer = Vec::new();
        f(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn console_report_lists_failures_and_balance() {
        let aggregates = super::super::balance::aggregate_balance(&[record()]);
        let text = render(|out| {
            generate_console_report(out, &[result(false)], &aggregates, Duration::from_secs(1))
        });
        assert!(text.contains("Balance Summary"));
        assert!(text.contains("no crops"));
        assert!(text.contains("Gold/h: 90.0"));
    }

    #[test]
    fn json_report_nests_results_and_balance() {
        let text = render(|out| {
            generate_json_report(out, "2026-01-01T00:00:00Z", &[result(true)], &[])
        });
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["generated_at"], "2026-01-01T00:00:00Z");
        assert_eq!(value["results"][0]["scenario_name"], "Crop Economy");
        assert!(value["balance"].as_array().unwrap().is_empty());
    }

    #[test]
    fn markdown_report_has_summary() {
        let text = render(|out| generate_markdown_report(out, "now", &[result(true)], &[]));
        assert!(text.starts_with("# Farmstead Balance Test Results"));
        assert!(text.contains("- **Passed**: 1"));
        assert!(!text.contains("## Balance"));
    }

    #[test]
    fn csv_report_quotes_names_and_adds_type_columns() {
        let text = render(|out| generate_csv_report(out, &[record()]));
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("scenario,strategy,seed"));
        assert!(header.ends_with("completed_helper_training"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("\"Crop, Economy\",farmer,7,720"));
        assert_eq!(
            header.split(',').count(),
            row.split(',').count() - 1,
            "quoted comma adds exactly one split"
        );
    }
}
