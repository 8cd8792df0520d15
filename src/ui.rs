use anyhow::{Context, Result};
use console::Style;
use dialoguer::Confirm;

/// Terminal output for operators. Diagnostics go through `tracing`; this is
/// the narrative of what the workflow is doing.
pub struct UX {
    heading: Style,
    good: Style,
    caution: Style,
    dim: Style,
}

impl UX {
    pub fn new() -> Self {
        Self {
            heading: Style::new().bold().cyan(),
            good: Style::new().bold().green(),
            caution: Style::new().bold().yellow(),
            dim: Style::new().dim(),
        }
    }

    pub fn banner(&self, title: &str) {
        println!("\n{}", self.heading.apply_to(format!("== {title} ==")));
    }

    /// Prints a workflow step line.
    pub fn phase(&self, msg: &str) {
        println!("\n{}", self.heading.apply_to(format!("▸ {msg}")));
    }

    pub fn info(&self, msg: &str) {
        println!("  {msg}");
    }

    pub fn note(&self, msg: &str) {
        println!("  {}", self.dim.apply_to(msg));
    }

    pub fn warn(&self, msg: &str) {
        eprintln!("{}", self.caution.apply_to(format!("⚠️  {msg}")));
    }

    pub fn success(&self, msg: &str) {
        println!("{}", self.good.apply_to(format!("✅ {msg}")));
    }

    /// Two-column summary table.
    pub fn data_panel(&self, title: &str, rows: &[(&str, String)]) {
        println!("\n{}", self.heading.apply_to(title));
        let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in rows {
            println!("  {:<width$}  {}", key, value, width = width);
        }
    }
}

impl Default for UX {
    fn default() -> Self {
        Self::new()
    }
}

/// Yes/no questions put to the operator.
pub trait Prompter {
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Asks on the controlling terminal. Without a terminal the answer is no.
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        if !atty::is(atty::Stream::Stdin) {
            tracing::warn!("stdin is not a terminal; treating confirmation as declined");
            return Ok(false);
        }
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("read confirmation")
    }
}
