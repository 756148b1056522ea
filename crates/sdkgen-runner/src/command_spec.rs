//! Argv-style command description.

use camino::Utf8PathBuf;
use std::fmt;

/// A command to execute, built argv-style.
///
/// Arguments are discrete elements; nothing is ever passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    current_dir: Option<Utf8PathBuf>,
}

impl CommandSpec {
    /// Start building a command for `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            current_dir: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set one environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the child's working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Build the tokio command.
    #[must_use]
    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir.as_std_path());
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    /// Human-readable rendering for error messages and logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates() {
        let spec = CommandSpec::new("tar")
            .arg("-xzf")
            .arg("archive.tar.gz")
            .args(["--strip-components", "1"])
            .env("LC_ALL", "C")
            .current_dir("/tmp/extract");
        assert_eq!(spec.program(), "tar");
        assert_eq!(
            spec.get_args(),
            &["-xzf", "archive.tar.gz", "--strip-components", "1"]
        );
        assert_eq!(spec.to_string(), "tar -xzf archive.tar.gz --strip-components 1");
    }
}
