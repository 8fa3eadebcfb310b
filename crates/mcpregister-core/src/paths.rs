use directories::ProjectDirs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct RegisterPaths {
    pub runtime_directory: PathBuf,
    pub audit_log_path: PathBuf,
}

impl RegisterPaths {
    pub fn detect() -> Self {
        if let Ok(override_dir) = std::env::var("MCP_REGISTER_RUNTIME_DIR") {
            if !override_dir.trim().is_empty() {
                return Self::from_runtime(PathBuf::from(override_dir));
            }
        }

        if let Some(project_dirs) = ProjectDirs::from("dev", "mcpregister", "McpRegister") {
            return Self::from_runtime(project_dirs.data_dir().to_path_buf());
        }

        if let Some(home) = home_dir() {
            return Self::from_runtime(home.join(".mcpregister"));
        }

        Self::from_runtime(PathBuf::from(".mcpregister"))
    }

    pub fn from_runtime(runtime_directory: PathBuf) -> Self {
        let audit_log_path = runtime_directory.join("audit-log.json");
        Self {
            runtime_directory,
            audit_log_path,
        }
    }

    pub fn ensure_runtime_dir(&self) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(&self.runtime_directory)
    }
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(|| directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()))
}

pub fn config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf())
}
