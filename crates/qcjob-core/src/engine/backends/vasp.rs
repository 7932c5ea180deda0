//! VASP: the input is a directory (INCAR, POSCAR, KPOINTS, POTCAR) that is run
//! in place. Results are read from `vasprun.xml`.

use super::{Backend, CheckpointRule, InputLayout, JobContext};
use crate::core::job::JobOptions;
use crate::core::launcher::LaunchRequest;
use crate::engine::error::EngineError;
use std::path::{Path, PathBuf};

const RESULT_FILE: &str = "vasprun.xml";

pub struct Vasp;

impl Backend for Vasp {
    fn name(&self) -> &'static str {
        "vasp"
    }

    fn input_layout(&self) -> InputLayout {
        InputLayout::Directory
    }

    fn transient_files(&self) -> &'static [&'static str] {
        &["POTCAR"]
    }

    fn checkpoint_files(&self) -> &'static [&'static str] {
        &["WAVECAR", "CHGCAR"]
    }

    fn checkpoint_rule(&self) -> CheckpointRule {
        CheckpointRule::Glob(&["WAVECAR*", "CHGCAR*"])
    }

    // VASP reads WAVECAR/CHGCAR from its own directory; a scratch override
    // does not move them.
    fn checkpoint_dir(&self, root: &Path, _options: &JobOptions) -> PathBuf {
        root.to_path_buf()
    }

    fn result_artifact(&self, ctx: &JobContext) -> PathBuf {
        ctx.workdir.root.join(RESULT_FILE)
    }

    fn invoke(&self, ctx: &JobContext) -> Result<(), EngineError> {
        let request = LaunchRequest::new(ctx.executable()?, &ctx.workdir.root, ctx.output_path())
            .ranks(ctx.options.threads)
            .timeout(ctx.config.job_timeout());
        ctx.run(&request)?;
        Ok(())
    }
}
