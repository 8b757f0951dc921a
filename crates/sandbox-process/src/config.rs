use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Base directory for runtime data. Sandbox workspaces are created under
    /// `<base_dir>/workspaces/<id>` and the whole tree is owned by one factory.
    pub base_dir: PathBuf,
}
