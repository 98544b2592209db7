use crate::backup::function_path;
use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use bon::Builder;
use function_name::named;
use getset::Getters;
use itertools::Itertools;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// One positional argument handed to the dump script.
///
/// Sensitive arguments are passed verbatim to the child but masked when the
/// command line is logged.
#[derive(Clone, Debug)]
pub enum ScriptArg {
    Plain(String),
    Sensitive(RedactedString),
}

impl ScriptArg {
    fn value(&self) -> &str {
        match self {
            ScriptArg::Plain(v) => v.as_str(),
            ScriptArg::Sensitive(v) => v.inner().as_str(),
        }
    }

    fn loggable(&self) -> &str {
        match self {
            ScriptArg::Plain(v) => v,
            ScriptArg::Sensitive(_) => "****",
        }
    }
}

impl AsRef<OsStr> for ScriptArg {
    fn as_ref(&self) -> &OsStr {
        self.value().as_ref()
    }
}

/// Runs an external script and captures its standard output.
#[derive(Clone, Debug, Builder, Getters)]
#[getset(get = "pub")]
pub struct ProcessRunner {
    /// Program the script is handed to, e.g. `bash`. `None` executes the
    /// script directly.
    #[builder(into)]
    interpreter: Option<PathBuf>,
}

impl ProcessRunner {
    fn command<P: AsRef<Path>>(&self, script: P, args: &[ScriptArg]) -> Command {
        let mut command = match &self.interpreter {
            Some(interpreter) => {
                let mut c = Command::new(interpreter);
                c.arg(script.as_ref());
                c
            }
            None => Command::new(script.as_ref()),
        };
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }

    /// Runs the script to completion, returning its trimmed standard output.
    ///
    /// Spawn failures and non-zero exits are errors.
    #[named]
    pub fn try_run<P: AsRef<Path>>(&self, script: P, args: &[ScriptArg]) -> Result<String> {
        let script = script.as_ref();
        tracing::info!(
            "Running {}{:?} {}",
            self.interpreter
                .as_ref()
                .map(|i| format!("{:?} ", i))
                .unwrap_or_default(),
            script,
            args.iter().map(ScriptArg::loggable).join(" ")
        );

        let output = self
            .command(script, args)
            .output()
            .map_err(Error::from)
            .add_msg(format!("Failed to start {:?}", script))
            .add_fn_name(function_path!())?;

        if !output.status.success() {
            return Err(Error::script_failed(
                script,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim(),
            )
            .add_fn_name(function_path!()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        tracing::debug!("Script {:?} wrote {} bytes to stdout", script, stdout.len());
        Ok(stdout)
    }

    /// Runs the script, logging any failure and returning `None` for it.
    pub fn run<P: AsRef<Path>>(&self, script: P, args: &[ScriptArg]) -> Option<String> {
        match self.try_run(script, args) {
            Ok(stdout) => Some(stdout),
            Err(e) => {
                tracing::error!("Error executing script: {e}");
                None
            }
        }
    }
}
