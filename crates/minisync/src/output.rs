//! Terminal output for the CLI. All of it goes to stderr.

use console::{Style, Term};

/// How a status line is colored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Tone {
    Plain,
    Good,
    Warn,
    Bad,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Self::Plain => Style::new(),
            Self::Good => Style::new().green(),
            Self::Warn => Style::new().yellow(),
            Self::Bad => Style::new().red(),
        }
    }
}

pub(crate) struct Output {
    term: Term,
}

impl Output {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }

    /// Print one status line.
    pub(crate) fn line(&self, tone: Tone, msg: &str) {
        let _ = self.term.write_line(&tone.style().apply_to(msg).to_string());
    }

    /// Print a `label: value` line with the label dimmed.
    pub(crate) fn field(&self, label: &str, value: &str) {
        let label = Style::new().dim().apply_to(format!("{label}:"));
        let _ = self.term.write_line(&format!("{label} {value}"));
    }

    /// Report a file change pushed to connected pages.
    pub(crate) fn reloaded(&self, path: &str, clients: usize) {
        let count = Style::new().dim().apply_to(format!("({})", clients_label(clients)));
        let _ = self.term.write_line(&format!("Changed {path} {count}"));
    }
}

fn clients_label(clients: usize) -> String {
    match clients {
        1 => "1 client".to_owned(),
        n => format!("{n} clients"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clients_label() {
        assert_eq!(clients_label(0), "0 clients");
        assert_eq!(clients_label(1), "1 client");
        assert_eq!(clients_label(3), "3 clients");
    }

    #[test]
    fn test_plain_tone_leaves_text_alone() {
        assert_eq!(Tone::Plain.style().apply_to("Shutting down").to_string(), "Shutting down");
    }
}
