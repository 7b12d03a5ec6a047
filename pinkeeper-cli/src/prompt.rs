//! Terminal confirmation for interactive runs
//!
//! [`Prompter`] asks about each security pin and echoes orphan removals.
//! End of input counts as a rejection so piped runs never hang.

use std::io::{BufRead, BufReader, Stderr, Stdin, Write};

use colored::Colorize;

use pinkeeper_manifest::OrphanNotice;
use pinkeeper_security::{Decision, DecisionSource, PatchCandidate};

/// Line-oriented decision source over any reader/writer pair.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<BufReader<Stdin>, Stderr> {
    /// Read answers from stdin, write prompts to stderr.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stderr())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Returns `None` on end of input or a read error.
    fn ask(&mut self, question: &str) -> Option<String> {
        let _ = write!(self.output, "{question}");
        let _ = self.output.flush();
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_owned()),
        }
    }
}

impl<R, W> DecisionSource for Prompter<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn decide(&mut self, candidate: &PatchCandidate) -> Decision {
        let _ = writeln!(self.output, "{} {}", "?".yellow().bold(), candidate);
        loop {
            let Some(answer) = self.ask("  apply? [y]es / [N]o / [e]dit reason / [a]bort: ") else {
                return Decision::Reject;
            };
            match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" => return Decision::Accept,
                "" | "n" | "no" => return Decision::Reject,
                "a" | "abort" | "q" | "quit" => return Decision::Abort,
                "e" | "edit" => {
                    let reason = self.ask("  reason: ").unwrap_or_default();
                    return Decision::Edit(reason);
                }
                other => {
                    let _ = writeln!(self.output, "  unrecognized answer '{other}'");
                }
            }
        }
    }

    fn notify_orphan(&mut self, notice: &OrphanNotice) {
        let _ = writeln!(self.output, "{} {}", "-".red(), notice);
    }
}
