use std::fs::File;
use std::io::{self, BufWriter, IsTerminal, Write};

use anyhow::{Context, Result};
use mdo_algo::coloring::{get_simul_meta, simul_coloring_summary, ColoringOptions};
use mdo_cli::cli::Commands;
use mdo_core::{LinearProblem, Problem};
use tracing::info;

pub fn handle(command: &Commands) -> Result<()> {
    let Commands::SimulColoring {
        file,
        out,
        num_jacs,
        tol,
        seed,
        mode,
    } = command
    else {
        unreachable!();
    };
    let options = ColoringOptions {
        mode: *mode,
        repeats: *num_jacs,
        tol: *tol,
        seed: *seed,
    };
    // Reject bad options before an output file is created.
    options.validate()?;

    let mut problem = LinearProblem::from_path(file)
        .with_context(|| format!("loading model '{}'", file.display()))?;
    info!(
        model = %file.display(),
        repeats = options.repeats,
        tol = options.tol,
        "computing simultaneous derivative coloring"
    );

    let coloring = match out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("creating coloring file '{}'", path.display()))?;
            let mut writer = BufWriter::new(file);
            let coloring = get_simul_meta(&mut problem, &options, Some(&mut writer))?;
            writer
                .flush()
                .with_context(|| format!("writing coloring file '{}'", path.display()))?;
            info!("wrote coloring to {}", path.display());
            coloring
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            get_simul_meta(&mut problem, &options, Some(&mut lock))?
        }
    };

    if io::stdout().is_terminal() {
        simul_coloring_summary(
            problem.design_vars(),
            options.mode,
            &coloring,
            &mut io::stdout().lock(),
        )?;
    }
    Ok(())
}
