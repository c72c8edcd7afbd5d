use super::{CommandLine, PipeRunner, ProcessError, ProcessOutput, ProcessRunner};
use std::cell::OnceCell;
use std::env;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the executable looked up on `PATH`.
pub const PATCH_TOOL: &str = "patch";

/// The external `patch` program and the runner used to invoke it.
///
/// The program is located on first use and remembered for the lifetime of
/// this value.
pub struct PatchTool {
    runner: Box<dyn ProcessRunner>,
    program: OnceCell<PathBuf>,
}

impl PatchTool {
    /// Real processes, `patch` found on `PATH`.
    pub fn new() -> Self {
        Self::with_runner(PipeRunner)
    }

    pub fn with_runner(runner: impl ProcessRunner + 'static) -> Self {
        Self {
            runner: Box::new(runner),
            program: OnceCell::new(),
        }
    }

    /// Use `program` instead of searching `PATH`.
    pub fn with_program(self, program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        Self {
            runner: self.runner,
            program: OnceCell::from(program),
        }
    }

    /// Path of the patch program, searching `PATH` the first time.
    pub fn program(&self) -> Result<&Path, ProcessError> {
        if let Some(program) = self.program.get() {
            return Ok(program);
        }
        let found = which(PATCH_TOOL)?;
        debug!(program = %found.display(), "located patch tool");
        Ok(self.program.get_or_init(|| found))
    }

    /// Run the tool with `args` in `working_dir`, feeding it `stdin`.
    pub fn run(
        &self,
        args: &[String],
        working_dir: &Path,
        stdin: &[u8],
    ) -> Result<(CommandLine, ProcessOutput), ProcessError> {
        let command = CommandLine::new(self.program()?, args.to_vec());
        let output = self.runner.run(&command, working_dir, stdin)?;
        Ok((command, output))
    }
}

impl Default for PatchTool {
    fn default() -> Self {
        Self::new()
    }
}

/// First executable file called `name` in a `PATH` directory.
fn which(name: &str) -> Result<PathBuf, ProcessError> {
    let not_found = || ProcessError::ToolNotFound {
        tool: name.to_string(),
    };
    let paths = env::var_os("PATH").ok_or_else(not_found)?;

    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(not_found)
}

fn is_executable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}
