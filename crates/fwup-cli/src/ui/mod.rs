//! Terminal output for the device agent.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use crossterm::style::Stylize;
use fwup_core::Reporter;
use fwup_schema::{BranchName, RevisionId, VariantName};

/// Human readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

/// Progress on stdout, problems on stderr.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    quiet: bool,
    /// Last download quarter printed, so progress lines stay sparse.
    last_quarter: AtomicU64,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            last_quarter: AtomicU64::new(0),
        }
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        if !self.quiet {
            println!("{}", title.dark_grey());
        }
    }

    fn downloading(&self, revision: &RevisionId, current: u64, total: Option<u64>) {
        if self.quiet {
            return;
        }
        let Some(total) = total.filter(|t| *t > 0) else {
            return;
        };
        let quarter = current.saturating_mul(4) / total;
        if current == 0 {
            self.last_quarter.store(0, Ordering::Relaxed);
        }
        if quarter > self.last_quarter.swap(quarter, Ordering::Relaxed) {
            println!(
                "  {} {revision} {} / {}",
                "downloading".cyan(),
                format_size(current),
                format_size(total)
            );
        }
    }

    fn extracting(&self, _: &RevisionId, _: u64) {}

    fn built(&self, app: &str, variant: &VariantName, revision: &RevisionId, size: u64) {
        if !self.quiet {
            println!("  {} {app} {variant} {revision} ({})", "built".green(), format_size(size));
        }
    }

    fn published(&self, app: &str, branch: &BranchName, revision: &RevisionId) {
        if !self.quiet {
            println!("  {} {app} latest/{branch} -> {revision}", "published".green());
        }
    }

    fn done(&self, subject: &str, detail: &str) {
        if !self.quiet {
            println!("  {} {subject} {}", "✓".green(), detail.dark_grey());
        }
    }

    fn failed(&self, subject: &str, reason: &str) {
        eprintln!("  {} {subject} {}", "✗".red(), reason.red());
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            println!("  {msg}");
        }
    }

    fn warning(&self, msg: &str) {
        eprintln!("  {} {msg}", "warning:".yellow().bold());
    }

    fn error(&self, msg: &str) {
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{} {}", "error:".red().bold(), msg.red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
    }
}
