//! Build command

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use fwup_core::packager::app::discover;
use fwup_core::packager::compiler::CommandCompiler;
use fwup_core::packager::variant::{PRECOMPILED_VARIANT, PrecompiledVariant, SourceVariant, Variant};
use fwup_core::packager::{Packager, PackagerOptions};
use fwup_core::revision::GitSource;

use crate::ui::BuildReporter;

#[derive(Debug)]
pub struct BuildArgs {
    pub repo: PathBuf,
    pub output: PathBuf,
    pub no_checkout: bool,
    pub clean: bool,
    pub jobs: usize,
    /// Compiler program and its extra arguments; `None` builds sources only.
    pub compiler: Option<(String, Vec<String>)>,
}

pub async fn build(args: BuildArgs) -> Result<()> {
    let start = Instant::now();
    let repo = args
        .repo
        .canonicalize()
        .with_context(|| format!("Repository {} not found", args.repo.display()))?;
    let output = std::path::absolute(&args.output)
        .with_context(|| format!("Invalid output path {}", args.output.display()))?;

    let apps = discover(&repo, &[output.clone()])
        .with_context(|| format!("Failed to discover apps in {}", repo.display()))?;
    if apps.is_empty() {
        bail!("No app_package.toml found under {}", repo.display());
    }

    let mut variants: Vec<Arc<dyn Variant>> = vec![Arc::new(SourceVariant)];
    if let Some((program, extra)) = args.compiler {
        let compiler = CommandCompiler::locate(&program)
            .context("Pass --no-precompiled to build source packages only")?
            .with_args(extra);
        tracing::debug!(compiler = %compiler.program().display(), "using bytecode compiler");
        variants.push(Arc::new(PrecompiledVariant::new(
            PRECOMPILED_VARIANT,
            Arc::new(compiler),
        )));
    }

    let source = GitSource::new(&repo)?.no_checkout(args.no_checkout);
    let reporter = Arc::new(BuildReporter::default());
    let packager = Packager::new(
        apps,
        Arc::new(source),
        variants,
        PackagerOptions {
            output: output.clone(),
            jobs: args.jobs,
            clean: args.clean,
        },
    )
    .with_reporter(reporter);

    let summary = packager.run().await?;
    println!(
        "\n  {} packages, {} pointers published to {} in {:.1}s",
        summary.packages.len(),
        summary.published.len(),
        output.display(),
        start.elapsed().as_secs_f64()
    );

    if !summary.is_success() {
        bail!("{} build step(s) failed", summary.failures.len());
    }
    Ok(())
}
