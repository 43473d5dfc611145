//! Operator interaction: menus and confirmations.

use std::io::{self, BufRead, BufReader, Stdout, Write};
use std::sync::Mutex;

use crate::terminal::{LineReader, TerminalInput};
use crate::{AppError, Result};

/// Interactive choices made by the operator.
pub trait Prompter: Send + Sync {
    /// Choose one of `options`; returns its index in `options`.
    ///
    /// A single option is chosen without asking.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NoTaskSelected` when `options` is empty and
    /// `AppError::Aborted` when input ends.
    fn pick(&self, title: &str, options: &[String]) -> Result<usize>;

    /// Yes/no question.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Aborted` when input ends.
    fn confirm(&self, question: &str) -> Result<bool>;

    /// Ask the operator to type `phrase`; matching ignores case.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Aborted` when input ends.
    fn confirm_phrase(&self, phrase: &str) -> Result<bool>;
}

/// [`Prompter`] over a line-oriented reader and a writer.
pub struct LinePrompter<R, W> {
    io: Mutex<(R, W)>,
}

/// Prompter bound to the process terminal.
pub type TerminalPrompter = LinePrompter<BufReader<LineReader>, Stdout>;

impl TerminalPrompter {
    /// Prompt on stdout and read answers from the shared terminal input.
    #[must_use]
    pub fn terminal(input: &TerminalInput) -> Self {
        Self::new(BufReader::new(input.lines()), io::stdout())
    }
}

impl<R: BufRead, W: Write> LinePrompter<R, W> {
    /// Wrap a reader and writer.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
        }
    }

    fn ask(&self, prompt: &str) -> Result<String> {
        let mut guard = self
            .io
            .lock()
            .map_err(|_| AppError::Io("prompt lock poisoned".into()))?;
        let (reader, writer) = &mut *guard;

        write!(writer, "{prompt}")?;
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(AppError::Aborted("input closed".into()));
        }
        Ok(line.trim().to_owned())
    }

    fn say(&self, text: &str) -> Result<()> {
        let mut guard = self
            .io
            .lock()
            .map_err(|_| AppError::Io("prompt lock poisoned".into()))?;
        writeln!(guard.1, "{text}")?;
        Ok(())
    }
}

impl<R: BufRead + Send, W: Write + Send> Prompter for LinePrompter<R, W> {
    fn pick(&self, title: &str, options: &[String]) -> Result<usize> {
        match options.len() {
            0 => return Err(AppError::NoTaskSelected(format!("no {title} to choose from"))),
            1 => return Ok(0),
            _ => {}
        }

        let mut order: Vec<usize> = (0..options.len()).collect();
        order.sort_by(|a, b| options[*a].cmp(&options[*b]));

        let mut menu = format!("Select {title}:");
        for (shown, index) in order.iter().enumerate() {
            menu.push_str(&format!("\n  [{}] {}", shown + 1, options[*index]));
        }
        self.say(&menu)?;

        loop {
            let answer = self.ask(&format!("{title} [1-{}]: ", options.len()))?;
            match answer.parse::<usize>() {
                Ok(choice) if (1..=order.len()).contains(&choice) => return Ok(order[choice - 1]),
                _ => self.say(&format!("'{answer}' is not a valid choice"))?,
            }
        }
    }

    fn confirm(&self, question: &str) -> Result<bool> {
        loop {
            let answer = self.ask(&format!("{question} [y/n]: "))?;
            match answer.to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("please answer y or n")?,
            }
        }
    }

    fn confirm_phrase(&self, phrase: &str) -> Result<bool> {
        let answer = self.ask(&format!("Type '{phrase}' to continue: "))?;
        Ok(answer.eq_ignore_ascii_case(phrase))
    }
}
