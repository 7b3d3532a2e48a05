use colored::{ColoredString, Colorize};
use provision::{Disposition, LinkPhase, RunStatus};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Status marker for a resource's disposition
pub fn marker(disposition: &Disposition) -> ColoredString {
    match disposition {
        Disposition::Created | Disposition::Replaced => "+".green(),
        Disposition::Destroyed => "-".red(),
        Disposition::Unchanged | Disposition::Absent => "=".dimmed(),
        Disposition::Failed { .. } => "✗".red(),
        Disposition::Blocked { .. } => "⊘".yellow(),
        Disposition::Cancelled => "…".yellow(),
    }
}

pub fn run_status(status: RunStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        RunStatus::Complete => label.green().bold(),
        RunStatus::Partial | RunStatus::PartialLink => label.yellow().bold(),
        RunStatus::Cancelled | RunStatus::Aborted => label.red().bold(),
    }
}

pub fn link_phase(phase: LinkPhase) -> ColoredString {
    let label = phase.to_string();
    match phase {
        LinkPhase::BidirectionalEstablished => label.green(),
        LinkPhase::ForwardEstablished => label.yellow(),
        LinkPhase::Unstarted => label.dimmed(),
    }
}
