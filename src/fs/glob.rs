// src/fs/glob.rs

//! Expansion of file-dependency patterns into concrete files.
//!
//! Patterns use `globset` syntax with `*` confined to a single path segment
//! and `**` crossing directories. Only the part of the tree below the
//! pattern's literal prefix is walked.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

use crate::errors::{BuildError, Result};
use crate::fs::FileSystem;

const GLOB_META: &[char] = &['*', '?', '[', '{'];

/// Expand `pattern` into the sorted list of regular files it matches.
///
/// A pattern without glob metacharacters matches itself if it names an
/// existing file. Directories are never returned.
pub fn expand(fs: &dyn FileSystem, pattern: &str) -> Result<Vec<PathBuf>> {
    let split = split_pattern(pattern);

    let Some(depth) = split.depth else {
        let path = PathBuf::from(pattern);
        return Ok(if fs.is_file(&path) { vec![path] } else { Vec::new() });
    };

    let matcher = compile(pattern, &split.normalised)?;
    let relative_root = split.root.as_os_str().is_empty();
    let walk_root = if relative_root {
        PathBuf::from(".")
    } else {
        split.root
    };

    if !fs.is_dir(&walk_root) {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    // Canonical directories already walked, so symlink loops end.
    let mut visited = HashSet::new();
    let mut stack = vec![(walk_root, 0usize)];

    while let Some((dir, level)) = stack.pop() {
        if !visited.insert(fs.canonicalize(&dir)?) {
            debug!(dir = ?dir, "directory already walked; skipping");
            continue;
        }

        for path in fs.read_dir(&dir)? {
            let path = if relative_root {
                path.strip_prefix(".").map(Path::to_path_buf).unwrap_or(path)
            } else {
                path
            };

            if fs.is_dir(&path) {
                if depth.is_none_or(|max| level + 1 < max) {
                    stack.push((path, level + 1));
                }
            } else if fs.is_file(&path) && matcher.is_match(normalise(&path)) {
                files.push(path);
            }
        }
    }

    files.sort();
    debug!(pattern = %pattern, count = files.len(), "expanded file pattern");
    Ok(files)
}

/// Returns true if `pattern` contains glob metacharacters.
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(GLOB_META)
}

struct SplitPattern {
    /// Directory holding every possible match.
    root: PathBuf,
    /// `None` for a literal pattern; `Some(None)` when the walk is unbounded
    /// (`**`); `Some(Some(n))` when matches live exactly `n` levels down.
    depth: Option<Option<usize>>,
    /// The pattern rebuilt from the same components as `root`, so walked
    /// paths and the matcher agree on `./` and `//` segments.
    normalised: PathBuf,
}

fn split_pattern(pattern: &str) -> SplitPattern {
    let mut root = PathBuf::new();
    let mut rest: Vec<String> = Vec::new();

    for component in Path::new(pattern).components() {
        let text = component.as_os_str().to_string_lossy();
        if rest.is_empty() && !(matches!(component, Component::Normal(_)) && is_glob(&text)) {
            root.push(component.as_os_str());
        } else {
            rest.push(text.into_owned());
        }
    }

    let depth = if rest.is_empty() {
        None
    } else if rest.iter().any(|part| part.contains("**")) {
        Some(None)
    } else {
        Some(Some(rest.len()))
    };

    let normalised = rest.iter().fold(root.clone(), |acc, part| acc.join(part));

    SplitPattern {
        root,
        depth,
        normalised,
    }
}

fn compile(pattern: &str, normalised: &Path) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(&normalise(normalised))
        .literal_separator(true)
        .build()
        .map_err(|source| BuildError::Glob {
            pattern: pattern.to_string(),
            source,
        })?;
    Ok(glob.compile_matcher())
}

fn normalise(path: &Path) -> String {
    let text = path.to_string_lossy();
    if cfg!(windows) {
        text.replace('\\', "/")
    } else {
        text.into_owned()
    }
}
