use std::{
    ffi::{OsStr, OsString},
    fmt::Display,
    path::Path,
    process::{Command, Output, Stdio},
};

use bitflags::bitflags;
use miette::{Context, IntoDiagnostic};
use tracing::{debug, enabled, trace, Level};

use crate::result::{bail, Result};

pub const DIGEST_USER: &str = "tivo";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capture: u8 {
        const STDIN = 0b0000001;
        const STDOUT = 0b0000010;
        const STDERR = 0b0000100;
    }
}

/// A single command line argument.
///
/// Secret arguments are passed as-is to the program but masked
/// whenever the command line is printed or logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Plain(OsString),
    Secret { value: String, shown: String },
}

impl Arg {
    pub fn secret(value: impl Into<String>, shown: impl Into<String>) -> Self {
        Arg::Secret {
            value: value.into(),
            shown: shown.into(),
        }
    }

    fn value(&self) -> &OsStr {
        match self {
            Arg::Plain(value) => value,
            Arg::Secret { value, .. } => OsStr::new(value),
        }
    }
}

impl From<&OsStr> for Arg {
    fn from(value: &OsStr) -> Self {
        Arg::Plain(value.to_os_string())
    }
}

impl From<&Path> for Arg {
    fn from(value: &Path) -> Self {
        Arg::Plain(value.as_os_str().to_os_string())
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Plain(value.into())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Plain(value.into())
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = match self {
            Arg::Plain(value) => value.to_string_lossy(),
            Arg::Secret { shown, .. } => shown.as_str().into(),
        };

        if shown.is_empty() || shown.contains(|c: char| c.is_whitespace() || "'\"&|;<>()$`".contains(c)) {
            write!(f, "\"{}\"", shown.replace('"', "\\\""))
        } else {
            f.write_str(&shown)
        }
    }
}

/// Description of one external program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    program: String,
    args: Vec<Arg>,
}

impl Stage {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build the [`Command`] running this stage, with the real secret values
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(Arg::value));
        cmd
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Run a command, returning its raw output handle.
///
/// IO handles will be captured only if the caller required it or if the log level is Debug.
/// In that last case, `stdout` and `stderr` will be logged.
///
/// The function returns an error only if the command failed to execute.
/// If the program runs but returns a non-0 status code, it will not trigger an error.
pub fn run_command(stage: &Stage, capture: Capture) -> Result<Output> {
    let is_debug = enabled!(Level::DEBUG);
    let get_io = |capture| {
        if capture {
            Stdio::piped()
        } else {
            Stdio::null()
        }
    };

    let mut cmd = stage.command();
    cmd.stdin(get_io(capture.contains(Capture::STDIN)))
        .stdout(get_io(is_debug || capture.contains(Capture::STDOUT)))
        .stderr(get_io(is_debug || capture.contains(Capture::STDERR)));

    debug!("Executing command: {stage}");
    let res = cmd
        .output()
        .into_diagnostic()
        .wrap_err_with(|| format!("Could not run {} command", stage.program()))?;

    if is_debug {
        debug!("status: {}", res.status);
        debug!("stdout: {} bytes long", res.stdout.len());
        trace!("stdout: {:?}", String::from_utf8_lossy(&res.stdout));
        debug!("stderr: {} bytes long", res.stderr.len());
        trace!("stderr: {:?}", String::from_utf8_lossy(&res.stderr));
    }

    Ok(res)
}

/// Run the command and verify that it has returned a success status code.
pub fn assert_success_command(stage: &Stage) -> Result<()> {
    let res = run_command(stage, Capture::empty())?;
    if res.status.success() {
        Ok(())
    } else {
        bail(format!("`{stage}` did run but was not successful"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_masked_when_displayed() {
        let stage = Stage::new("curl")
            .arg("--digest")
            .arg("--user")
            .arg(Arg::secret("tivo:0123456789", "tivo:****"))
            .arg("http://tivo.local/download/Lost.TiVo?Container=%2FNowPlaying&id=42");

        assert_eq!(
            stage.to_string(),
            "curl --digest --user tivo:**** \"http://tivo.local/download/Lost.TiVo?Container=%2FNowPlaying&id=42\""
        );
    }

    #[test]
    fn secrets_are_passed_unmasked() {
        let stage = Stage::new("tivodecode").arg("--mak").arg(Arg::secret("0123456789", "****"));
        let cmd = stage.command();
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, [OsStr::new("--mak"), OsStr::new("0123456789")]);
    }

    #[test]
    fn arguments_with_spaces_are_quoted() {
        let stage = Stage::new("ffmpeg").args(["-i", "my file.mpg", ""]);
        assert_eq!(stage.to_string(), "ffmpeg -i \"my file.mpg\" \"\"");
    }

    #[cfg(unix)]
    #[test]
    fn run_command_captures_stdout() {
        let res = run_command(&Stage::new("sh").args(["-c", "printf hello"]), Capture::STDOUT).unwrap();
        assert!(res.status.success());
        assert_eq!(res.stdout, b"hello");
    }

    #[cfg(unix)]
    #[test]
    fn assert_success_command_reports_failure() {
        assert!(assert_success_command(&Stage::new("sh").args(["-c", "exit 0"])).is_ok());
        assert!(assert_success_command(&Stage::new("sh").args(["-c", "exit 3"])).is_err());
    }
}
