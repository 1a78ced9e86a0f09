//! Human-browsable index pages. Presentation only; devices never read them.

use std::fmt::Write as _;
use std::path::Path;

use fwup_schema::{BranchName, LATEST_DIR, PublishedManifest, Revision};
use walkdir::WalkDir;

/// File name of every index page.
pub const INDEX_FILE: &str = "index.html";

/// One artifact link on an app page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLink {
    /// Relative to the app directory.
    pub link: String,
    /// Archive size.
    pub size_bytes: u64,
}

/// What an app page shows for one branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchListing {
    /// Branch name.
    pub branch: BranchName,
    /// Revision the branch's pointer names.
    pub revision: Revision,
    /// Pointer path relative to the app directory, `latest/<branch>`.
    pub latest_link: String,
    /// Pointer file size.
    pub latest_size: u64,
    /// Archives the pointer references.
    pub artifacts: Vec<ArtifactLink>,
}

/// Everything published for one app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppListing {
    /// App name.
    pub app: String,
    /// Branches with a latest pointer, by name.
    pub branches: Vec<BranchListing>,
}

/// Minimal HTML escaping for text and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n{body}</body>\n</html>\n",
        title = escape(title),
    )
}

/// The top-level page linking every app.
pub fn render_top(apps: &[AppListing]) -> String {
    let mut body = String::new();
    for app in apps {
        let name = escape(&app.app);
        let _ = writeln!(
            body,
            "<p><code>{name}</code> <a href=\"{name}/{INDEX_FILE}\">Application: {name}</a></p>"
        );
    }
    page("Downloads", &body)
}

/// One app's page: each branch's archives and latest pointer.
pub fn render_app(app: &AppListing) -> String {
    let mut body = String::new();
    for branch in &app.branches {
        for artifact in &branch.artifacts {
            let link = escape(&artifact.link);
            let _ = writeln!(
                body,
                "<p>{link} (<a href=\"{link}\">{} Bytes</a>)</p>",
                artifact.size_bytes
            );
        }
        let latest = escape(&branch.latest_link);
        let _ = writeln!(
            body,
            "<h2>{latest} (<a href=\"{latest}\">{} Bytes</a>)</h2>",
            branch.latest_size
        );
        let _ = writeln!(body, "<p><i>{}</i></p>", escape(&branch.revision.summary));
    }
    page(&format!("Application: {}", app.app), &body)
}

/// Build listings from the latest pointers present under `out`.
///
/// Unreadable pointers are logged and left out of the pages.
pub fn scan<'a>(
    out: &Path,
    apps: impl IntoIterator<Item = &'a str>,
) -> std::io::Result<Vec<AppListing>> {
    let mut listings = Vec::new();
    for app in apps {
        let latest = out.join(app).join(LATEST_DIR);
        let mut branches = Vec::new();
        if latest.is_dir() {
            for entry in WalkDir::new(&latest).sort_by_file_name() {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&latest) else {
                    continue;
                };
                let branch = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let bytes = std::fs::read(entry.path())?;
                let manifest = match PublishedManifest::from_json(&bytes) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(path = %entry.path().display(), "skipping pointer: {e}");
                        continue;
                    }
                };
                branches.push(BranchListing {
                    latest_link: format!("{LATEST_DIR}/{branch}"),
                    latest_size: bytes.len() as u64,
                    artifacts: manifest
                        .dict_tars
                        .values()
                        .map(|t| ArtifactLink {
                            link: t.link.clone(),
                            size_bytes: t.size_bytes,
                        })
                        .collect(),
                    revision: Revision::new(
                        manifest.commit_sha,
                        manifest.commit_pretty,
                        branch.as_str(),
                    ),
                    branch: BranchName::new(branch),
                });
            }
        }
        listings.push(AppListing {
            app: app.to_string(),
            branches,
        });
    }
    Ok(listings)
}

/// Write `index.html` at `out` and one per app.
pub fn write_indexes(out: &Path, apps: &[AppListing]) -> std::io::Result<()> {
    std::fs::create_dir_all(out)?;
    std::fs::write(out.join(INDEX_FILE), render_top(apps))?;
    for app in apps {
        let dir = out.join(&app.app);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(INDEX_FILE), render_app(app))?;
    }
    Ok(())
}
