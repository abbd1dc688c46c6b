//! Host services used by the directive resolver
//!
//! The resolver runs commands, expands globs and reads files through the
//! [`Host`] trait, so it can be driven by the real system or by an in-memory
//! host in tests. Both implementations keep their own working directory:
//! relative paths and commands are resolved against it, the process working
//! directory is never changed.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use tracing::trace;

/// Abstract system interface
pub trait Host {
    /// Run a command line with `sh -c`, returns its stdout and exit code
    fn run(&mut self, command: &str) -> Result<(String, i32)>;

    /// Paths matching a glob pattern, sorted. Relative patterns give relative paths.
    fn glob(&self, pattern: &str) -> Result<Vec<String>>;

    fn read_file(&self, path: &str) -> Result<String>;

    /// Absolute path with `.`, `..` and symlinks resolved
    fn canonical_path(&self, path: &str) -> Result<String>;

    fn chdir(&mut self, dir: &str) -> Result<()>;

    fn getcwd(&self) -> String;
}

// ============================================================================
// Path utilities
// ============================================================================

/// Lexically normalized absolute path
pub fn normalize_path(path: &str) -> String {
    let mut resolved: Vec<&str> = Vec::new();
    for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
        if part == ".." {
            resolved.pop();
        } else {
            resolved.push(part);
        }
    }
    format!("/{}", resolved.join("/"))
}

/// Resolve a relative path against a base directory
pub fn resolve_path(base: &str, path: &str) -> String {
    if path.starts_with('/') {
        normalize_path(path)
    } else {
        normalize_path(&format!("{}/{}", base, path))
    }
}

/// Directory part of a path, `.` when there is none
pub fn dirname(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(pos) => path[..pos].to_string(),
        None => ".".to_string(),
    }
}

// ============================================================================
// System host
// ============================================================================

/// Host backed by the real system
pub struct SystemHost {
    cwd: String,
}

impl SystemHost {
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;
        Ok(SystemHost {
            cwd: cwd.display().to_string(),
        })
    }

    fn resolve(&self, path: &str) -> String {
        resolve_path(&self.cwd, path)
    }
}

impl Host for SystemHost {
    fn run(&mut self, command: &str) -> Result<(String, i32)> {
        trace!(command, cwd = %self.cwd, "running command");
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.cwd)
            .output()
            .map_err(|e| Error::io("sh", e))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        // killed by a signal
        let code = output.status.code().unwrap_or(-1);
        Ok((stdout, code))
    }

    fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let relative = !pattern.starts_with('/');
        let full_pattern = if relative {
            format!("{}/{}", self.cwd, pattern)
        } else {
            pattern.to_string()
        };
        let paths = glob::glob(&full_pattern)
            .map_err(|e| Error::Option(format!("invalid glob pattern '{}': {}", pattern, e)))?;
        let mut matches = Vec::new();
        for path in paths.flatten() {
            let shown = if relative {
                path.strip_prefix(&self.cwd)
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| path.display().to_string())
            } else {
                path.display().to_string()
            };
            matches.push(shown);
        }
        matches.sort();
        Ok(matches)
    }

    fn read_file(&self, path: &str) -> Result<String> {
        std::fs::read_to_string(self.resolve(path)).map_err(|e| Error::io(path, e))
    }

    fn canonical_path(&self, path: &str) -> Result<String> {
        std::fs::canonicalize(self.resolve(path))
            .map(|p| p.display().to_string())
            .map_err(|e| Error::io(path, e))
    }

    fn chdir(&mut self, dir: &str) -> Result<()> {
        let target = self.resolve(dir);
        if !Path::new(&target).is_dir() {
            return Err(Error::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        self.cwd = target;
        Ok(())
    }

    fn getcwd(&self) -> String {
        self.cwd.clone()
    }
}

// ============================================================================
// In-memory host
// ============================================================================

/// Host over a virtual file tree and canned command outputs
#[derive(Debug, Clone)]
pub struct MemoryHost {
    files: HashMap<String, String>,
    commands: HashMap<String, (String, i32)>,
    cwd: String,
    /// Every command run, with the directory it ran in
    pub history: Vec<(String, String)>,
}

impl MemoryHost {
    pub fn new() -> Self {
        MemoryHost {
            files: HashMap::new(),
            commands: HashMap::new(),
            cwd: "/".to_string(),
            history: Vec::new(),
        }
    }

    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(normalize_path(path), content.to_string());
        self
    }

    pub fn with_command(mut self, command: &str, stdout: &str, code: i32) -> Self {
        self.commands
            .insert(command.to_string(), (stdout.to_string(), code));
        self
    }

    fn is_dir(&self, path: &str) -> bool {
        path == "/" || {
            let prefix = format!("{}/", path);
            self.files.keys().any(|f| f.starts_with(&prefix))
        }
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for MemoryHost {
    fn run(&mut self, command: &str) -> Result<(String, i32)> {
        self.history.push((command.to_string(), self.cwd.clone()));
        Ok(self
            .commands
            .get(command)
            .cloned()
            .unwrap_or_else(|| (String::new(), 127)))
    }

    fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let relative = !pattern.starts_with('/');
        let full_pattern = resolve_path(&self.cwd, pattern);
        let matcher = glob::Pattern::new(&full_pattern)
            .map_err(|e| Error::Option(format!("invalid glob pattern '{}': {}", pattern, e)))?;
        let mut matches: Vec<String> = self
            .files
            .keys()
            .filter(|p| matcher.matches(p))
            .map(|p| {
                if relative {
                    let base = format!("{}/", self.cwd.trim_end_matches('/'));
                    p.strip_prefix(&base).unwrap_or(p).to_string()
                } else {
                    p.clone()
                }
            })
            .collect();
        matches.sort();
        Ok(matches)
    }

    fn read_file(&self, path: &str) -> Result<String> {
        self.files
            .get(&resolve_path(&self.cwd, path))
            .cloned()
            .ok_or_else(|| {
                Error::io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                )
            })
    }

    fn canonical_path(&self, path: &str) -> Result<String> {
        let full = resolve_path(&self.cwd, path);
        if self.files.contains_key(&full) || self.is_dir(&full) {
            Ok(full)
        } else {
            Err(Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            ))
        }
    }

    fn chdir(&mut self, dir: &str) -> Result<()> {
        let target = resolve_path(&self.cwd, dir);
        if !self.is_dir(&target) {
            return Err(Error::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        self.cwd = target;
        Ok(())
    }

    fn getcwd(&self) -> String {
        self.cwd.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/foo/./bar/"), "/foo/bar");
        assert_eq!(normalize_path("/foo/../bar"), "/bar");
        assert_eq!(resolve_path("/a/b", "../c"), "/a/c");
        assert_eq!(resolve_path("/a", "/c"), "/c");
    }

    #[test]
    fn test_dirname() {
        assert_eq!(dirname("lib/a.sh"), "lib");
        assert_eq!(dirname("/a.sh"), "/");
        assert_eq!(dirname("a.sh"), ".");
    }

    #[test]
    fn test_memory_host() {
        let mut host = MemoryHost::new()
            .with_file("/src/lib/a.sh", "a")
            .with_file("/src/lib/b.sh", "b")
            .with_command("date", "today\n", 0);
        host.chdir("/src").unwrap();
        assert_eq!(host.glob("lib/*.sh").unwrap(), vec!["lib/a.sh", "lib/b.sh"]);
        assert_eq!(host.read_file("lib/b.sh").unwrap(), "b");
        assert_eq!(host.canonical_path("lib/../lib/a.sh").unwrap(), "/src/lib/a.sh");
        assert_eq!(host.run("date").unwrap(), ("today\n".to_string(), 0));
        assert_eq!(host.run("nope").unwrap().1, 127);
        assert!(host.chdir("/missing").is_err());
        assert_eq!(host.history[0], ("date".to_string(), "/src".to_string()));
    }

    #[test]
    fn test_system_host_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/one.sh"), "echo one\n").unwrap();
        fs::write(dir.path().join("lib/two.sh"), "echo two\n").unwrap();

        let mut host = SystemHost::new().unwrap();
        host.chdir(&dir.path().display().to_string()).unwrap();
        assert_eq!(host.glob("lib/*.sh").unwrap(), vec!["lib/one.sh", "lib/two.sh"]);
        assert_eq!(host.read_file("lib/one.sh").unwrap(), "echo one\n");
        let canonical = host.canonical_path("lib/./two.sh").unwrap();
        assert!(canonical.ends_with("lib/two.sh"));
        assert!(host.read_file("lib/missing.sh").is_err());
    }

    #[test]
    fn test_system_host_run() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("marker"), "").unwrap();
        let mut host = SystemHost::new().unwrap();
        host.chdir(&dir.path().display().to_string()).unwrap();
        assert_eq!(host.run("ls").unwrap(), ("marker\n".to_string(), 0));
        assert_eq!(host.run("exit 3").unwrap().1, 3);
    }
}
