use std::{fmt, path::PathBuf, str::FromStr};

/// A `--file` argument: a TOML path with an optional `@level` suffix.
///
/// ```
/// use confstack::cli::FileArg;
///
/// let arg: FileArg = "conf/user.toml@10".parse().unwrap();
/// assert_eq!(arg.level, Some(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArg {
    /// Path of the TOML file
    pub path: PathBuf,
    /// Explicit level, if given
    pub level: Option<i32>,
}

impl FromStr for FileArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // A suffix that is not an integer is part of the file name.
        let (path, level) = match s.rsplit_once('@') {
            Some((path, level)) => match level.parse::<i32>() {
                Ok(level) => (path, Some(level)),
                Err(_) => (s, None),
            },
            None => (s, None),
        };

        if path.is_empty() {
            return Err(format!("missing path in '{s}'"));
        }

        Ok(Self {
            path: PathBuf::from(path),
            level,
        })
    }
}

impl fmt::Display for FileArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            Some(level) => write!(f, "{}@{level}", self.path.display()),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

impl FileArg {
    /// Level of the `index`-th file: the explicit level, otherwise `index * 10`.
    pub fn level_or_position(&self, index: usize) -> i32 {
        self.level
            .unwrap_or_else(|| i32::try_from(index).unwrap_or(i32::MAX / 10) * 10)
    }
}
