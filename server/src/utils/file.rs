//! File utility functions

use std::path::PathBuf;

/// Resolve a user-supplied path to an absolute path
///
/// `~` and `~/...` expand to the home directory. Relative paths, including
/// bare names, are joined onto the current directory. Nothing is
/// canonicalized, so `..` components are kept as written.
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();
    let cwd = || std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    if path.is_empty() {
        return cwd();
    }

    let expanded = match (path, dirs::home_dir()) {
        ("~", Some(home)) => home,
        (p, Some(home)) if p.starts_with("~/") => home.join(&p[2..]),
        (p, _) => PathBuf::from(p),
    };

    if expanded.is_relative() {
        cwd().join(expanded)
    } else {
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_path_unchanged() {
        assert_eq!(expand_path("/etc/pendo.json"), PathBuf::from("/etc/pendo.json"));
        assert_eq!(expand_path("  /srv/config  "), PathBuf::from("/srv/config"));
    }

    #[test]
    fn test_relative_paths_become_absolute() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(expand_path("pendo-insights.json"), cwd.join("pendo-insights.json"));
        assert_eq!(expand_path(".."), cwd.join(".."));
        assert!(expand_path("./conf/app.json").ends_with("conf/app.json"));
    }

    #[test]
    fn test_tilde_expands_to_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_path("~"), home);
        assert_eq!(expand_path("~/.pendo-insights"), home.join(".pendo-insights"));
    }

    #[test]
    fn test_blank_is_current_dir() {
        assert_eq!(expand_path("   "), std::env::current_dir().unwrap());
    }
}
