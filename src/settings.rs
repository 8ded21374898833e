use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub server_url: String,
    pub username: String,
    pub password: Option<String>,
    pub remember_password: bool,
    pub auto_login: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: String::new(), // Empty by default - user must configure
            username: String::new(),
            password: None,
            remember_password: true,
            auto_login: false,
        }
    }
}

impl AppSettings {
    fn config_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_dir = dirs::config_dir()
            .ok_or("Could not determine config directory")?
            .join("snapview");

        fs::create_dir_all(&config_dir)?;
        Ok(config_dir.join("settings.json"))
    }

    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_file = Self::config_path()?;

        log::debug!("Loading settings from: {:?}", config_file);

        if config_file.exists() {
            let contents = fs::read_to_string(&config_file)?;
            let settings: AppSettings = serde_json::from_str(&contents)?;
            log::info!("Settings loaded successfully");
            Ok(settings)
        } else {
            log::info!("No settings file found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let config_file = Self::config_path()?;

        log::debug!("Saving settings to: {:?}", config_file);

        // The password only reaches disk when the user asked to keep it
        let mut on_disk = self.clone();
        if !on_disk.remember_password {
            on_disk.password = None;
        }

        let contents = serde_json::to_string_pretty(&on_disk)?;
        fs::write(&config_file, contents)?;

        log::info!("Settings saved successfully");
        Ok(())
    }
}
