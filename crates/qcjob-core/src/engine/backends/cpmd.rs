//! CPMD: plane-wave Car-Parrinello code driven by a keyword input deck.
//!
//! Run-time switches (scratch path, restart mode, memory mode) are written into
//! the working copy of the deck under its `&CPMD` section before launch. A
//! finished run leaves `RESTART*` wavefunction files that a later job can
//! resume from.

use super::{Backend, CheckpointRule, JobContext};
use crate::core::deck::Deck;
use crate::core::job::JobOptions;
use crate::core::launcher::LaunchRequest;
use crate::engine::error::EngineError;
use tracing::{debug, info, warn};

const SECTION: &str = "&CPMD";
const DENSITY_FILE: &str = "DENSITY";
const DENSITY_LOG: &str = "DENSITY.log";

pub struct Cpmd;

/// Rewrites run-time directives in `deck`. Returns the number of directives
/// that could not be placed because the deck has no `&CPMD` section.
pub fn apply_directives(deck: &mut Deck, options: &JobOptions, bigmem: bool) -> usize {
    let mut wanted = 0;
    let mut placed = 0;

    if let Some(scratch) = &options.scratch {
        wanted += 1;
        placed += deck
            .replace(
                "FILEPATH",
                2,
                SECTION,
                &format!(" FILEPATH\n  {}", scratch.display()),
            )
            .min(1);
    }
    if options.debug {
        wanted += 1;
        placed += deck
            .replace(" BENCHMARK", 2, SECTION, " BENCHMARK\n  1 0 0 0 0 0 0 0 0 0")
            .min(1);
    }
    if let Some(steps) = options.max_steps {
        wanted += 1;
        placed += deck
            .replace(" MAXITER", 2, SECTION, &format!(" MAXITER\n  {}", steps))
            .min(1);
    }
    if options.restart {
        while deck.remove("RESTART", 1) {}
        while deck.remove("INITIALIZE WAVEFUNCTION", 1) {}
        wanted += 1;
        placed += deck.insert_after(SECTION, " RESTART WAVEFUNCTION").min(1);
    }
    while deck.remove("MEMORY BIG", 1) {}
    if bigmem {
        wanted += 1;
        placed += deck.insert_after(SECTION, " MEMORY BIG").min(1);
    }

    wanted - placed
}

impl Backend for Cpmd {
    fn name(&self) -> &'static str {
        "cpmd"
    }

    fn transient_files(&self) -> &'static [&'static str] {
        &["LATEST", "GEOMETRY", "GEOMETRY.scale", "KPTS_GENERATION"]
    }

    fn checkpoint_files(&self) -> &'static [&'static str] {
        &["RESTART*"]
    }

    fn checkpoint_rule(&self) -> CheckpointRule {
        CheckpointRule::File("RESTART")
    }

    fn prepare(&self, ctx: &JobContext) -> Result<(), EngineError> {
        if !ctx.workdir.new_run {
            return Ok(());
        }
        let path = &ctx.workdir.input;
        let mut deck = Deck::load(path).map_err(|e| EngineError::io(path, e))?;
        let bigmem = ctx.config.wants_bigmem(ctx.options.bigmem);
        let unplaced = apply_directives(&mut deck, ctx.options, bigmem);
        if unplaced > 0 {
            return Err(ctx.precondition(format!(
                "input deck '{}' has no {} section to hold run-time directives",
                path.display(),
                SECTION
            )));
        }
        deck.save(path).map_err(|e| EngineError::io(path, e))?;
        debug!(job = ctx.job, bigmem, "Input deck directives applied.");

        self.verify_restart(ctx)
    }

    fn invoke(&self, ctx: &JobContext) -> Result<(), EngineError> {
        let deck_name = ctx
            .workdir
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ctx.precondition("input deck path has no file name"))?;

        let request = LaunchRequest::new(ctx.executable()?, &ctx.workdir.root, ctx.output_path())
            .arg(deck_name)
            .ranks(ctx.options.threads)
            .timeout(ctx.config.job_timeout());
        ctx.run(&request)?;

        convert_density(ctx);
        Ok(())
    }
}

/// Runs `cpmd2cube -fullmesh DENSITY` when the run left a density file.
/// Failures here never fail the job.
fn convert_density(ctx: &JobContext) {
    let root = &ctx.workdir.root;
    if !root.join(DENSITY_FILE).is_file() {
        return;
    }
    let Some(converter) = &ctx.config.density_converter else {
        debug!(job = ctx.job, "No density converter configured; leaving DENSITY as is.");
        return;
    };
    let request = LaunchRequest::new(converter, root, root.join(DENSITY_LOG))
        .arg("-fullmesh")
        .arg(DENSITY_FILE)
        .timeout(ctx.config.job_timeout());
    match ctx.launcher.launch(&request) {
        Ok(outcome) if outcome.success() => {
            info!(job = ctx.job, "Density converted to cube format.")
        }
        Ok(outcome) => warn!(
            job = ctx.job,
            exit_code = ?outcome.exit_code,
            "Density conversion failed."
        ),
        Err(e) => warn!(job = ctx.job, error = %e, "Density converter could not be launched."),
    }
}
