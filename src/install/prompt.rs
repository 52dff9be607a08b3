// src/install/prompt.rs

//! Operator confirmation before dependencies are installed

use crate::error::Result;
use std::io::{self, BufRead, Write};

/// Asks the operator a yes/no question
pub trait Confirm {
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Answers yes without asking (`--yes`)
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _question: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Reads one line of input per question
///
/// Only `y`/`yes` (any case) confirm. Anything else, including end of
/// input, declines.
pub struct LineConfirm<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> LineConfirm<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }
}

impl<R: BufRead, W: Write> Confirm for LineConfirm<R, W> {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        write!(self.writer, "{} [y/N] ", question)?;
        self.writer.flush()?;

        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        Ok(is_yes(&line))
    }
}

/// Prompts on stdout and reads the answer from stdin
///
/// Stdin is locked only while a question is waiting for its answer, so any
/// number of these may exist at once.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioConfirm;

impl Confirm for StdioConfirm {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        LineConfirm::new(io::stdin().lock(), io::stdout()).confirm(question)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ask(input: &str) -> (bool, String) {
        let mut out = Vec::new();
        let answer = LineConfirm::new(input.as_bytes(), &mut out)
            .confirm("Install 2 dependencies?")
            .unwrap();
        (answer, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_yes_answers() {
        assert!(ask("y\n").0);
        assert!(ask("YES\n").0);
        assert!(ask("  yes  \n").0);
    }

    #[test]
    fn test_everything_else_declines() {
        assert!(!ask("n\n").0);
        assert!(!ask("sure\n").0);
        assert!(!ask("\n").0);
        assert!(!ask("").0);
    }

    #[test]
    fn test_prompt_written() {
        let (_, prompt) = ask("y\n");
        assert_eq!(prompt, "Install 2 dependencies? [y/N] ");
    }

    #[test]
    fn test_assume_yes() {
        assert!(AssumeYes.confirm("anything").unwrap());
    }

    #[test]
    fn test_stdio_confirm_leaves_stdin_unlocked() {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let confirmers = [StdioConfirm, StdioConfirm];
            let lock = io::stdin().lock();
            drop(lock);
            tx.send(confirmers.len()).unwrap();
        });
        assert_eq!(rx.recv_timeout(std::time::Duration::from_secs(5)), Ok(2));
    }
}
