use std::io;
use std::process::{Command, Stdio};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("couldn't run `{command_line}`: {source}")]
    Spawn {
        command_line: String,
        #[source]
        source: io::Error,
    },
    #[error("`{command_line}` exited with {code:?} (expected {expected}): {output}")]
    UnexpectedExitCode {
        command_line: String,
        code: Option<i32>,
        expected: i32,
        /// Everything the program printed, stdout then stderr.
        output: String,
    },
}

/// An external program invocation with captured output.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    expected_code: i32,
}

impl Cmd {
    pub fn new(program: &str) -> Self {
        Cmd {
            program: program.to_owned(),
            args: Vec::new(),
            expected_code: 0,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The exit code that counts as success (0 unless told otherwise).
    pub fn expect_code(mut self, code: i32) -> Self {
        self.expected_code = code;
        self
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Runs the program to completion and returns its standard output.
    pub fn run(&self) -> Result<String, CommandError> {
        debug!("Running {}", self.command_line());
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| CommandError::Spawn {
                command_line: self.command_line(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.code() != Some(self.expected_code) {
            let mut captured = stdout;
            captured.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(CommandError::UnexpectedExitCode {
                command_line: self.command_line(),
                code: output.status.code(),
                expected: self.expected_code,
                output: captured.trim().to_owned(),
            });
        }
        trace!("{} printed {} bytes", self.program, stdout.len());
        Ok(stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let out = Cmd::new("echo").arg("hello").arg("world").run().unwrap();
        assert_eq!(out, "hello world\n");
    }

    #[test]
    fn unexpected_exit_code_includes_output() {
        let err = Cmd::new("sh")
            .arg("-c")
            .arg("echo oops; exit 3")
            .run()
            .unwrap_err();
        match err {
            CommandError::UnexpectedExitCode { code, output, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(output, "oops");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn expected_non_zero_code_is_success() {
        let out = Cmd::new("sh").arg("-c").arg("exit 1").expect_code(1).run();
        assert!(out.is_ok());
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let err = Cmd::new("definitely-not-a-real-program-4711").run().unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
