//! Console reporter for builds. Errors go to stderr in red so they stand
//! out from the progress lines on stdout.

use crossterm::style::Stylize;
use fwup_core::Reporter;
use fwup_schema::{BranchName, RevisionId, VariantName};

#[derive(Debug, Default)]
pub struct BuildReporter;

impl Reporter for BuildReporter {
    fn section(&self, title: &str) {
        println!("{}", title.dark_grey());
    }

    fn downloading(&self, _: &RevisionId, _: u64, _: Option<u64>) {}

    fn extracting(&self, _: &RevisionId, _: u64) {}

    fn built(&self, app: &str, variant: &VariantName, revision: &RevisionId, size: u64) {
        println!("  {} {app} {variant} {revision} {size} B", "built".green());
    }

    fn published(&self, app: &str, branch: &BranchName, revision: &RevisionId) {
        println!("  {} {app} latest/{branch} -> {revision}", "published".green());
    }

    fn done(&self, subject: &str, detail: &str) {
        println!("  {} {subject} {detail}", "✓".green());
    }

    fn failed(&self, subject: &str, reason: &str) {
        eprintln!("  {} {subject} {}", "✗".red(), reason.red());
    }

    fn info(&self, msg: &str) {
        println!("  {msg}");
    }

    fn warning(&self, msg: &str) {
        eprintln!("  {} {msg}", "warning:".yellow().bold());
    }

    fn error(&self, msg: &str) {
        eprintln!("{} {}", "error:".red().bold(), msg.red());
    }
}
