use std::path::{Component, Path, PathBuf};

use sandbox::SandboxError;

/// Factory-level paths derived from the base directory.
pub struct FactoryPaths {
    base_dir: PathBuf,
}

impl FactoryPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn workspaces(&self) -> PathBuf {
        self.base_dir.join("workspaces")
    }

    pub fn workspace(&self, id: &str) -> PathBuf {
        self.workspaces().join(id)
    }
}

/// Per-sandbox workspace paths.
pub struct SandboxPaths {
    workspace: PathBuf,
}

impl SandboxPaths {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Resolve a file name inside the workspace.
    ///
    /// Only a single normal path component is accepted, so nothing written
    /// through a sandbox can land outside its workspace.
    pub fn file(&self, name: &str) -> Result<PathBuf, SandboxError> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.workspace.join(name)),
            _ => Err(SandboxError::InvalidPath(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_is_nested_under_base_dir() {
        let paths = FactoryPaths::new(PathBuf::from("/srv/runner"));
        assert_eq!(paths.workspaces(), PathBuf::from("/srv/runner/workspaces"));
        assert_eq!(
            paths.workspace("abc"),
            PathBuf::from("/srv/runner/workspaces/abc")
        );
    }

    #[test]
    fn file_accepts_plain_names() {
        let paths = SandboxPaths::new(PathBuf::from("/w/1"));
        assert_eq!(paths.file("code.cpp").unwrap(), PathBuf::from("/w/1/code.cpp"));
        assert_eq!(paths.file("Main.java").unwrap(), PathBuf::from("/w/1/Main.java"));
    }

    #[test]
    fn file_rejects_anything_but_a_single_component() {
        let paths = SandboxPaths::new(PathBuf::from("/w/1"));
        for name in ["", ".", "..", "../escape", "/etc/passwd", "dir/file"] {
            let err = paths.file(name).unwrap_err();
            assert!(
                matches!(err, SandboxError::InvalidPath(_)),
                "{name:?} should be rejected, got {err}"
            );
        }
    }
}
