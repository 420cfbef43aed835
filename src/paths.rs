use std::path::PathBuf;

pub fn default_data_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => {
            let base = PathBuf::from(home);
            let path = if cfg!(target_os = "macos") {
                base.join("Library")
                    .join("Application Support")
                    .join("video-edit-assistant")
            } else {
                base.join(".config").join("video-edit-assistant")
            };
            let _ = std::fs::create_dir_all(&path);
            path
        }
        None => PathBuf::from("."),
    }
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}
