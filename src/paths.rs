use std::path::PathBuf;

const LEDGER_FILENAME: &str = "wallpapers";
const CONFIG_FILENAME: &str = "dailywall.json";
const RUN_LOG_FILENAME: &str = "sync.jsonl";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_dir: PathBuf,
}

impl AppPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Downloaded images live directly in the base dir, next to the ledger.
    pub fn images_dir(&self) -> PathBuf {
        self.base_dir.clone()
    }

    pub fn image_path(&self, filename: &str) -> PathBuf {
        self.images_dir().join(filename)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.base_dir.join(LEDGER_FILENAME)
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILENAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn run_log_path(&self) -> PathBuf {
        self.logs_dir().join(RUN_LOG_FILENAME)
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.images_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

/// `DAILYWALL_DIR` wins, otherwise `$HOME/Images/bing-wallpapers`.
pub fn default_base_dir() -> Option<PathBuf> {
    if let Ok(v) = std::env::var("DAILYWALL_DIR") {
        let t = v.trim();
        if !t.is_empty() {
            return Some(PathBuf::from(t));
        }
    }

    let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE"));
    if let Ok(home) = home {
        let t = home.trim();
        if !t.is_empty() {
            return Some(PathBuf::from(t).join("Images").join("bing-wallpapers"));
        }
    }

    None
}
