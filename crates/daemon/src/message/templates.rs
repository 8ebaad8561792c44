// Deterministic fallback commit messages.
//
// Used whenever the AI backend is disabled or fails. Templates carry a
// `{files}` placeholder: interpolated with the actual file names when
// few files changed, otherwise with the count.

use rand::seq::SliceRandom;

/// Interpolate file names verbatim up to this many changed files.
const NAMED_FILES_LIMIT: usize = 3;

/// General-purpose pool, always available.
pub const GENERAL_TEMPLATES: &[&str] = &[
    "chore: update {files}",
    "chore: routine maintenance on {files}",
    "chore: sync changes to {files}",
    "fix: small corrections in {files}",
    "refactor: tidy up {files}",
    "docs: update notes for {files}",
];

/// Theme-specific pools, merged into the general pool when the
/// configured theme matches.
pub const THEME_TEMPLATES: &[(&str, &[&str])] = &[
    (
        "kubernetes",
        &[
            "chore: reconcile manifests in {files}",
            "fix: adjust resource settings in {files}",
            "chore: roll cluster config forward in {files}",
        ],
    ),
    (
        "docker",
        &[
            "chore: rebuild image layers touching {files}",
            "fix: tune container setup in {files}",
        ],
    ),
    (
        "web",
        &[
            "style: polish frontend assets in {files}",
            "chore: refresh static content in {files}",
        ],
    ),
];

/// The template pool for a given theme: general templates, extended
/// with the theme pool when the theme is recognized. Unrecognized
/// themes fall back to the general pool alone.
pub fn template_pool(theme: Option<&str>) -> Vec<&'static str> {
    let mut pool: Vec<&'static str> = GENERAL_TEMPLATES.to_vec();
    if let Some(theme) = theme {
        let theme = theme.to_lowercase();
        if let Some((_, extra)) = THEME_TEMPLATES.iter().find(|(name, _)| *name == theme) {
            pool.extend_from_slice(extra);
        }
    }
    pool
}

/// Render the `{files}` placeholder value: file names when the change
/// is small enough to name, the count otherwise.
pub fn render_files(files: &[String]) -> String {
    if files.is_empty() {
        "recent changes".to_string()
    } else if files.len() <= NAMED_FILES_LIMIT {
        files.join(", ")
    } else {
        format!("{} files", files.len())
    }
}

/// Pick a template from the pool and interpolate.
pub fn fallback_message(files: &[String], theme: Option<&str>) -> String {
    let pool = template_pool(theme);
    let template = pool
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("chore: update {files}");
    template.replace("{files}", &render_files(files))
}

/// Every message `fallback_message` could produce for this input. Used
/// by tests to assert membership without pinning the random pick.
pub fn rendered_pool(files: &[String], theme: Option<&str>) -> Vec<String> {
    let rendered = render_files(files);
    template_pool(theme).iter().map(|t| t.replace("{files}", &rendered)).collect()
}
