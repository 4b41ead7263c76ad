use std::io::{self, BufRead, Write};

use thiserror::Error;

/// The user answered "no" to a consent prompt.
///
/// Not a fault: callers stop cleanly and the process exits non-zero without
/// an "error" banner.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UserDeclined(pub String);

pub trait Prompt {
    /// Ask a yes/no question. An empty answer (or end of input) picks `default_yes`.
    fn confirm(&mut self, question: &str, default_yes: bool) -> io::Result<bool>;
}

/// Prompts on stdout, reads the answer from stdin.
pub struct Terminal;

impl Prompt for Terminal {
    fn confirm(&mut self, question: &str, default_yes: bool) -> io::Result<bool> {
        let mut stdout = io::stdout();
        ask(&mut io::stdin().lock(), &mut stdout, question, default_yes)
    }
}

/// Answers yes without asking (`--yes`).
pub struct AssumeYes;

impl Prompt for AssumeYes {
    fn confirm(&mut self, question: &str, _default_yes: bool) -> io::Result<bool> {
        println!("{question} {} y", hint(true));
        Ok(true)
    }
}

pub fn ask<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    question: &str,
    default_yes: bool,
) -> io::Result<bool> {
    write!(writer, "{question} {} ", hint(default_yes))?;
    writer.flush()?;

    let mut answer = String::new();
    reader.read_line(&mut answer)?;
    Ok(parse_answer(&answer, default_yes))
}

fn hint(default_yes: bool) -> &'static str {
    if default_yes {
        "(Y/n):"
    } else {
        "(y/N):"
    }
}

fn parse_answer(answer: &str, default_yes: bool) -> bool {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default_yes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(input: &str, default_yes: bool) -> (bool, String) {
        let mut reader = io::Cursor::new(input.as_bytes().to_vec());
        let mut out = Vec::new();
        let result = ask(&mut reader, &mut out, "Install?", default_yes).unwrap();
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn empty_answer_uses_default() {
        assert!(answer("\n", true).0);
        assert!(!answer("\n", false).0);
    }

    #[test]
    fn end_of_input_uses_default() {
        assert!(answer("", true).0);
    }

    #[test]
    fn explicit_answers() {
        assert!(!answer("n\n", true).0);
        assert!(!answer("No\n", true).0);
        assert!(answer("Y\n", false).0);
        assert!(answer("  yes \n", false).0);
    }

    #[test]
    fn unclear_answer_uses_default() {
        assert!(answer("maybe\n", true).0);
        assert!(!answer("maybe\n", false).0);
    }

    #[test]
    fn hint_matches_default() {
        assert_eq!(answer("\n", true).1, "Install? (Y/n): ");
        assert_eq!(answer("\n", false).1, "Install? (y/N): ");
    }
}
