//! Adapter identifiers and module paths.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Identifier a supervisor uses to track one adapter process.
///
/// START allocates sequential identifiers; ENSURE derives a named one from
/// the module path so repeated calls resolve to the same process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AdapterId {
    Sequential(u64),
    Named(String),
}

impl fmt::Display for AdapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential(n) => write!(f, "{n}"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

impl FromStr for AdapterId {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.contains(char::is_whitespace) {
            return Err(ModuleError::InvalidIdentifier(s.to_string()));
        }
        if s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse()
                .map(Self::Sequential)
                .map_err(|_| ModuleError::InvalidIdentifier(s.to_string()));
        }
        Ok(Self::Named(s.to_string()))
    }
}

/// Errors from parsing module paths and identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    #[error("Module path is empty")]
    Empty,

    #[error("Module path segment {0:?} is not allowed")]
    InvalidSegment(String),

    #[error("Cannot derive an identifier from {0:?}")]
    Underivable(String),

    #[error("Invalid adapter identifier {0:?}")]
    InvalidIdentifier(String),
}

/// Relative path segments naming an adapter module, as sent in START/ENSURE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePath {
    segments: Vec<String>,
}

impl ModulePath {
    /// Build from explicit segments.
    ///
    /// # Errors
    ///
    /// Rejects empty lists and any segment that is empty, `.`, `..`, or
    /// contains a path separator.
    pub fn new<I, S>(segments: I) -> Result<Self, ModuleError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(ModuleError::Empty);
        }
        for segment in &segments {
            let mut components = Path::new(segment).components();
            let single_normal = matches!(components.next(), Some(Component::Normal(_)))
                && components.next().is_none();
            if !single_normal || segment.contains(['/', '\\']) {
                return Err(ModuleError::InvalidSegment(segment.clone()));
            }
        }
        Ok(Self { segments })
    }

    /// Parse the space-separated argument of START/ENSURE.
    ///
    /// # Errors
    ///
    /// See [`ModulePath::new`].
    pub fn parse(args: &str) -> Result<Self, ModuleError> {
        Self::new(args.split_whitespace())
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Join onto `root`.
    #[must_use]
    pub fn resolve(&self, root: &Path) -> PathBuf {
        self.segments
            .iter()
            .fold(root.to_path_buf(), |path, segment| path.join(segment))
    }

    /// Final segment with its extension stripped, e.g. `test_psu` for
    /// `devs test_psu.py`.
    #[must_use]
    pub fn stem(&self) -> &str {
        let last = self.segments.last().map_or("", String::as_str);
        Path::new(last)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(last)
    }

    /// Stable identifier used by ENSURE.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::Underivable`] when the stem is all digits, which
    /// would collide with sequential identifiers.
    pub fn derive_id(&self) -> Result<AdapterId, ModuleError> {
        let stem = self.stem();
        match stem.parse::<AdapterId>() {
            Ok(AdapterId::Named(name)) => Ok(AdapterId::Named(name)),
            _ => Err(ModuleError::Underivable(stem.to_string())),
        }
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(" "))
    }
}
