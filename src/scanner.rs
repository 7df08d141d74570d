//! NFO file discovery
//!
//! Walks directories with `walkdir`, keeping files whose name matches the
//! inclusion glob and pruning anything matching an ignore glob. Traversal
//! order is sorted by file name so repeated runs see files in the same order.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use glob::{MatchOptions, Pattern};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Inclusion pattern used when none is given
pub const DEFAULT_PATTERN: &str = "*.nfo";

/// Entry names skipped unless the caller replaces the list
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[".*", "*.tmp", "*.bak", "*.swp", "*.backup", "*.backup.[0-9]*"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// What to look for and where to stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOptions {
    /// Glob matched against file names
    pub pattern: String,
    /// Descend into subdirectories
    pub recursive: bool,
    /// Deepest subdirectory level to visit, 0 being the directory itself
    pub max_depth: Option<usize>,
    /// Globs matched against every entry name; matching directories are pruned
    pub ignore_patterns: Vec<String>,
    /// Stop after this many files
    pub max_files: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.to_string(),
            recursive: true,
            max_depth: None,
            ignore_patterns: DEFAULT_IGNORE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            max_files: None,
        }
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Replace the ignore list
    pub fn with_ignore_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Add one pattern to the ignore list
    pub fn with_ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_patterns.push(pattern.into());
        self
    }

    pub fn with_max_files(mut self, max_files: Option<usize>) -> Self {
        self.max_files = max_files;
        self
    }

    /// Depth limit in walkdir terms, where files directly inside a root are
    /// at depth 1
    fn walk_depth(&self) -> usize {
        if !self.recursive {
            return 1;
        }
        self.max_depth.map_or(usize::MAX, |depth| depth.saturating_add(1))
    }
}

/// A directory or entry that could not be scanned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanError {
    pub path: PathBuf,
    pub message: String,
}

/// Counters collected during a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub directories_scanned: usize,
    pub files_seen: usize,
    pub files_matched: usize,
    pub entries_ignored: usize,
    pub duplicates: usize,
    /// Non-fatal errors, one per entry in the result's `errors`
    pub errors: usize,
    pub duration_ms: u64,
}

/// Files found by a scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    /// Matching files in discovery order
    pub files: Vec<PathBuf>,
    pub errors: Vec<ScanError>,
    pub stats: ScanStats,
    /// The file cap stopped discovery early
    pub truncated: bool,
}

/// Compile a glob, treating a malformed one as a literal name
fn compile(raw: &str) -> Pattern {
    Pattern::new(raw).unwrap_or_else(|err| {
        warn!(pattern = raw, error = %err, "Invalid glob pattern, matching it literally");
        Pattern::new(&Pattern::escape(raw)).unwrap_or_default()
    })
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Find NFO files under the given directories
///
/// A path that names a file rather than a directory is included as is.
/// Missing or unreadable directories are recorded in the result's errors and
/// scanning continues with the next one.
pub fn scan_files<P: AsRef<Path>>(directories: &[P], options: &ScanOptions) -> ScanResult {
    let include = compile(&options.pattern);
    let ignore: Vec<Pattern> = options.ignore_patterns.iter().map(|p| compile(p)).collect();
    let is_ignored = |name: &str| ignore.iter().any(|p| p.matches_with(name, MATCH_OPTIONS));

    let start = Instant::now();
    let mut result = ScanResult::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for root in directories {
        let root = root.as_ref();
        if !root.exists() {
            warn!(path = %root.display(), "Directory does not exist");
            result.errors.push(ScanError {
                path: root.to_path_buf(),
                message: "directory does not exist".to_string(),
            });
            continue;
        }

        let mut ignored = 0usize;
        let walker = WalkDir::new(root)
            .max_depth(options.walk_depth())
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                // The roots themselves were named explicitly
                if entry.depth() == 0 {
                    return true;
                }
                let keep = !is_ignored(&entry.file_name().to_string_lossy());
                if !keep {
                    debug!(path = %entry.path().display(), "Ignored");
                    ignored += 1;
                }
                keep
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    warn!(path = %path.display(), error = %err, "Cannot scan entry");
                    result.errors.push(ScanError {
                        path,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                result.stats.directories_scanned += 1;
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }

            result.stats.files_seen += 1;
            let explicit = entry.depth() == 0;
            if !explicit && !include.matches_with(&entry_name(entry.path()), MATCH_OPTIONS) {
                continue;
            }

            let path = entry.into_path();
            let key = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
            if !seen.insert(key) {
                result.stats.duplicates += 1;
                continue;
            }

            if options.max_files.is_some_and(|max| result.files.len() >= max) {
                result.truncated = true;
                break;
            }
            debug!(path = %path.display(), "Found file");
            result.files.push(path);
            result.stats.files_matched += 1;
        }

        result.stats.entries_ignored += ignored;
        if result.truncated {
            break;
        }
    }

    result.stats.errors = result.errors.len();
    result.stats.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
    info!(
        files = result.files.len(),
        errors = result.stats.errors,
        truncated = result.truncated,
        duration_ms = result.stats.duration_ms,
        "Scan finished"
    );
    result
}
