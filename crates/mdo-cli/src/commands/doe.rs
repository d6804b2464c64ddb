use anyhow::{bail, Context, Result};
use mdo_batch::{load_generator_config, run_sweep, SweepRunnerConfig, SweepSummary};
use mdo_cli::cli::Commands;
use mdo_core::{load_problem_spec, LinearProblem};
use tracing::info;

fn print_sweep_summary(summary: &SweepSummary) {
    println!(
        "Sweep ({} generator, {} workers): {} cases, {} succeeded, {} failed",
        summary.generator,
        summary.workers.len(),
        summary.records.len(),
        summary.success(),
        summary.failure()
    );
    for report in &summary.workers {
        if let Some(error) = &report.error {
            println!(
                "  worker {} stopped after {} cases: {error}",
                report.rank, report.cases_run
            );
        }
    }
    for record in summary.records.iter().filter(|r| !r.metadata.msg.is_empty()) {
        println!("  case {}: {}", record.case_index, record.metadata.msg);
    }
    if let Some(path) = &summary.manifest_path {
        println!("Manifest: {}", path.display());
    }
}

pub fn handle(command: &Commands) -> Result<()> {
    let Commands::Doe {
        file,
        generator,
        workers,
        threads,
        out,
    } = command
    else {
        unreachable!();
    };
    let spec =
        load_problem_spec(file).with_context(|| format!("loading model '{}'", file.display()))?;
    let generator = load_generator_config(generator)
        .and_then(|config| config.build())
        .with_context(|| format!("loading case generator '{}'", generator.display()))?;

    let config = SweepRunnerConfig {
        workers: *workers,
        threads: *threads,
        manifest_path: out.clone(),
    };
    info!(model = %file.display(), workers = config.workers, "starting sweep");
    let summary = run_sweep(&config, generator, |_| {
        LinearProblem::from_spec(spec.clone())
    })?;
    print_sweep_summary(&summary);

    if summary.terminated() {
        bail!("sweep stopped early after an unexpected case failure");
    }
    Ok(())
}
