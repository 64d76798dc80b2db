use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::controller::{Action, AttemptObserver, AttemptRecord, GenerationOutcome};
use crate::wire::{Completion, Conversation};

/// Spinner shown while a stream is in flight; forwards to an inner observer.
pub struct Progress<'a> {
    bar: Option<ProgressBar>,
    total: u32,
    inner: &'a mut dyn AttemptObserver,
}

impl<'a> Progress<'a> {
    pub fn new(show: bool, total: u32, inner: &'a mut dyn AttemptObserver) -> Self {
        let bar = show.then(|| {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        });
        Self { bar, total, inner }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.bar {
            pb.finish_and_clear();
        }
    }
}

impl AttemptObserver for Progress<'_> {
    fn on_request(&mut self, index: u32, conversation: &Conversation) {
        if let Some(pb) = &self.bar {
            pb.set_message(format!("attempt {}/{}: streaming ({} messages)", index, self.total, conversation.len()));
        }
        self.inner.on_request(index, conversation);
    }

    fn on_attempt(&mut self, record: &AttemptRecord, received: Option<&Completion>) {
        if let Some(pb) = &self.bar {
            pb.println(attempt_line(record));
        }
        self.inner.on_attempt(record, received);
    }
}

fn action_label(action: Action) -> String {
    match action {
        Action::Accept => "[ACCEPT]".green().bold().to_string(),
        Action::Continue => "[CONTINUE]".yellow().bold().to_string(),
        Action::Rewrite => "[REWRITE]".magenta().bold().to_string(),
        Action::RetrySame => "[RETRY]".cyan().bold().to_string(),
        Action::GiveUp => "[GIVE UP]".red().bold().to_string(),
    }
}

pub fn attempt_line(r: &AttemptRecord) -> String {
    let detail = match (&r.transport_error, &r.verdict) {
        (Some(e), _) => format!("transport error: {e}"),
        (None, Some(v)) => v.describe(),
        (None, None) => String::new(),
    };
    format!(
        "{}. {}  {} chars{}  {}",
        r.index,
        action_label(r.action),
        r.received_len,
        r.finish_reason.map(|f| format!(" ({})", f.as_str())).unwrap_or_default(),
        detail.dimmed()
    )
}

pub fn print_outcome(outcome: &GenerationOutcome) {
    let status = outcome.status();
    let status = if outcome.is_complete() { status.green().bold() } else { status.red().bold() };
    println!(
        "\n{}",
        "┏━━━━━━━━━━━━━━━━━━━━━━━━ Result ━━━━━━━━━━━━━━━━━━━━━━━━━┓".bold()
    );
    println!(
        "  {}: {}   {}: {}   {}: {}",
        "Status".bold(), status,
        "Attempts".bold(), outcome.attempts.len(),
        "Chars".bold(), outcome.code.len()
    );
    println!("{}", "┗━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━┛".bold());
    for r in &outcome.attempts {
        println!("{}", attempt_line(r));
    }
    if !outcome.is_complete() {
        println!("\n{}", "Returned text is best-effort and may be incomplete.".yellow());
    }
}
