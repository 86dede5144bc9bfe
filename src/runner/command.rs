//! Command line construction for `ansible-playbook`.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Everything needed to launch one playbook run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybookInvocation {
    /// Binary to execute.
    pub binary: PathBuf,
    /// Playbook path, passed positionally.
    pub playbook: String,
    /// Value for `-i`: a file path or the stdin marker.
    pub inventory: OsString,
    /// Document written to standard input, when the inventory is streamed.
    pub stdin: Option<String>,
    /// Raw JSON passed to `--extra-vars`.
    pub extra_vars: Option<String>,
    /// Number of `v`s in the verbosity flag; 0 omits it.
    pub verbosity: u8,
    /// Adds `--check` (dry run).
    pub check: bool,
    /// Kill the process after this long.
    pub timeout: Option<Duration>,
    /// Working directory of the process.
    pub working_dir: Option<PathBuf>,
}

impl PlaybookInvocation {
    /// Creates an invocation with no optional flags.
    #[must_use]
    pub fn new(
        binary: impl Into<PathBuf>,
        playbook: impl Into<String>,
        inventory: impl Into<OsString>,
    ) -> Self {
        Self {
            binary: binary.into(),
            playbook: playbook.into(),
            inventory: inventory.into(),
            stdin: None,
            extra_vars: None,
            verbosity: 0,
            check: false,
            timeout: None,
            working_dir: None,
        }
    }

    /// Sets the standard input payload.
    #[must_use]
    pub fn with_stdin(mut self, stdin: Option<String>) -> Self {
        self.stdin = stdin;
        self
    }

    /// Sets the extra variables.
    #[must_use]
    pub fn with_extra_vars(mut self, extra_vars: Option<String>) -> Self {
        self.extra_vars = extra_vars;
        self
    }

    /// Sets the verbosity level.
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Enables or disables check mode.
    #[must_use]
    pub const fn with_check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    /// Sets the time limit.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, working_dir: Option<PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    /// Builds the argument list, excluding the binary.
    #[must_use]
    pub fn args(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from(&self.playbook),
            OsString::from("-i"),
            self.inventory.clone(),
        ];

        if let Some(extra_vars) = &self.extra_vars {
            args.push(OsString::from("--extra-vars"));
            args.push(OsString::from(extra_vars));
        }

        if self.verbosity > 0 {
            args.push(OsString::from(format!("-{}", "v".repeat(usize::from(self.verbosity)))));
        }

        if self.check {
            args.push(OsString::from("--check"));
        }

        args
    }

    /// Renders the command for log output.
    #[must_use]
    pub fn display(&self) -> String {
        let mut parts = vec![self.binary.display().to_string()];
        parts.extend(self.args().iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(invocation: &PlaybookInvocation) -> Vec<String> {
        invocation
            .args()
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_minimal_args() {
        let invocation = PlaybookInvocation::new("ansible-playbook", "site.yml", "/tmp/inv.yml");
        assert_eq!(args_of(&invocation), ["site.yml", "-i", "/tmp/inv.yml"]);
    }

    #[test]
    fn test_all_flags() {
        let invocation = PlaybookInvocation::new("ansible-playbook", "site.yml", "-")
            .with_extra_vars(Some(String::from(r#"{"a":"b"}"#)))
            .with_verbosity(3)
            .with_check(true);

        assert_eq!(
            args_of(&invocation),
            ["site.yml", "-i", "-", "--extra-vars", r#"{"a":"b"}"#, "-vvv", "--check"]
        );
    }

    #[test]
    fn test_single_verbosity() {
        let invocation =
            PlaybookInvocation::new("ansible-playbook", "p.yml", "inv").with_verbosity(1);
        assert_eq!(args_of(&invocation).last().map(String::as_str), Some("-v"));
    }

    #[test]
    fn test_display() {
        let invocation = PlaybookInvocation::new("/usr/bin/ansible-playbook", "p.yml", "inv");
        assert_eq!(invocation.display(), "/usr/bin/ansible-playbook p.yml -i inv");
    }
}
