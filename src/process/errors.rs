use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(
        "cannot find the '{tool}' executable - install it with your OS package manager \
         (e.g. 'sudo apt-get install {tool}' or 'sudo yum install {tool}')"
    )]
    ToolNotFound { tool: String },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error talking to child process: {0}")]
    Io(#[from] std::io::Error),

    #[error("waiting for child process I/O failed: {0}")]
    Os(#[from] nix::errno::Errno),
}
