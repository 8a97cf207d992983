use std::io::{self, BufRead, Write};

/// Asks the user a question and returns the line they typed.
pub trait LinePrompt {
    fn ask(&mut self, question: &str) -> io::Result<String>;
}

/// Prompts on the terminal.
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl LinePrompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> io::Result<String> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        out.write_all(question.as_bytes())?;
        out.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(answer.trim().to_owned())
    }
}
