//! Shell process collaborator

use std::io;
use std::path::Path;
use std::process::{Command, Output};

use log::debug;

/// Exit status and combined output of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub success: bool,
    /// stdout followed by stderr
    pub output: String,
}

impl From<Output> for CommandOutput {
    fn from(out: Output) -> Self {
        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        Self {
            code: out.status.code(),
            success: out.status.success(),
            output,
        }
    }
}

/// Runs commands through the platform shell and waits for them.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Run a complete command line as written (e.g. a registry uninstall string).
    fn run_line(&self, line: &str) -> io::Result<CommandOutput>;

    /// Run `program` with `args` passed through unchanged and in order.
    fn run_program(&self, program: &Path, args: &[String]) -> io::Result<CommandOutput>;
}

/// `cmd /C` on Windows, `sh -c` elsewhere
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run_line(&self, line: &str) -> io::Result<CommandOutput> {
        debug!("running: {line}");
        let mut cmd = line_command(line);
        Ok(cmd.output()?.into())
    }

    fn run_program(&self, program: &Path, args: &[String]) -> io::Result<CommandOutput> {
        debug!("running: {} {}", program.display(), args.join(" "));
        let mut cmd = program_command(program, args);
        Ok(cmd.output()?.into())
    }
}

#[cfg(windows)]
fn line_command(line: &str) -> Command {
    use std::os::windows::process::CommandExt;

    // Uninstall strings carry their own quoting
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").raw_arg(line);
    cmd
}

#[cfg(windows)]
fn program_command(program: &Path, args: &[String]) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(program).args(args);
    cmd
}

#[cfg(not(windows))]
fn line_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}

#[cfg(not(windows))]
fn program_command(program: &Path, args: &[String]) -> Command {
    // "$0" is the program, "$@" the arguments, each kept as one word
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(r#""$0" "$@""#).arg(program).args(args);
    cmd
}
