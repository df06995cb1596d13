use std::path::PathBuf;

/// Editor settings that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct EditorSettings {
    /// Maximum number of document history snapshots
    pub history_cap: usize,
    /// Maximum number of snapshots in a text-only sub-history
    pub text_history_cap: usize,
    /// Largest accepted upload, in bytes
    pub max_upload_bytes: usize,
    /// Largest accepted width/height for a resize target
    pub max_dimension: u32,
    /// Default quality for lossy exports (1-100)
    pub default_quality: u8,
    /// Surface size used when a collage is created
    pub collage_width: u32,
    pub collage_height: u32,
    /// Fill painted under collage layers
    pub collage_background: [u8; 4],
    /// Click-area side length for text handles
    pub handle_hit_size: f32,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            history_cap: 50,
            text_history_cap: 30,
            max_upload_bytes: 25 * 1024 * 1024,
            max_dimension: 10_000,
            default_quality: 90,
            collage_width: 1200,
            collage_height: 800,
            collage_background: [255, 255, 255, 255],
            handle_hit_size: 24.0,
        }
    }
}

impl EditorSettings {
    /// Path to the settings file.
    /// On Linux:   ~/.config/layerforge/layerforge_settings.cfg  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\LayerForge\layerforge_settings.cfg
    /// On macOS:   ~/Library/Application Support/LayerForge/layerforge_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("layerforge");
            return Some(config_dir.join("layerforge_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("LayerForge").join("layerforge_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").ok()?;
            return Some(
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("LayerForge")
                    .join("layerforge_settings.cfg"),
            );
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(|d| d.join("layerforge_settings.cfg")))
        }
    }

    /// Serialize a colour as "r,g,b,a"
    fn color_to_str(c: [u8; 4]) -> String {
        format!("{},{},{},{}", c[0], c[1], c[2], c[3])
    }

    /// Parse a colour from "r,g,b,a"
    pub(crate) fn str_to_color(s: &str) -> Option<[u8; 4]> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() == 4 {
            Some([
                parts[0].trim().parse::<u8>().ok()?,
                parts[1].trim().parse::<u8>().ok()?,
                parts[2].trim().parse::<u8>().ok()?,
                parts[3].trim().parse::<u8>().ok()?,
            ])
        } else {
            None
        }
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "history_cap={}\n\
             text_history_cap={}\n\
             max_upload_bytes={}\n\
             max_dimension={}\n\
             default_quality={}\n\
             collage_width={}\n\
             collage_height={}\n\
             collage_background={}\n\
             handle_hit_size={}\n",
            self.history_cap,
            self.text_history_cap,
            self.max_upload_bytes,
            self.max_dimension,
            self.default_quality,
            self.collage_width,
            self.collage_height,
            Self::color_to_str(self.collage_background),
            self.handle_hit_size,
        )
    }

    /// Save settings to disk
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let _ = std::fs::write(path, self.to_config_string());
    }

    /// Load settings from disk (returns default if file missing or corrupt)
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else { return Self::default() };
        let Ok(content) = std::fs::read_to_string(&path) else { return Self::default() };
        Self::parse(&content)
    }

    /// Parse `key=value` lines over the defaults. Unknown keys and
    /// malformed values leave the default in place.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "history_cap" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.history_cap = v.max(1);
                    }
                }
                "text_history_cap" => {
                    if let Ok(v) = val.parse::<usize>() {
                        s.text_history_cap = v.max(1);
                    }
                }
                "max_upload_bytes" => {
                    if let Ok(v) = val.parse() {
                        s.max_upload_bytes = v;
                    }
                }
                "max_dimension" => {
                    if let Ok(v) = val.parse::<u32>() {
                        s.max_dimension = v.max(1);
                    }
                }
                "default_quality" => {
                    if let Ok(v) = val.parse::<u8>() {
                        s.default_quality = v.clamp(1, 100);
                    }
                }
                "collage_width" => {
                    if let Ok(v) = val.parse::<u32>() {
                        s.collage_width = v.max(1);
                    }
                }
                "collage_height" => {
                    if let Ok(v) = val.parse::<u32>() {
                        s.collage_height = v.max(1);
                    }
                }
                "collage_background" => {
                    if let Some(c) = Self::str_to_color(val) {
                        s.collage_background = c;
                    }
                }
                "handle_hit_size" => {
                    if let Ok(v) = val.parse::<f32>() {
                        s.handle_hit_size = v.max(1.0);
                    }
                }
                _ => {}
            }
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_config_string() {
        let mut s = EditorSettings::default();
        s.history_cap = 12;
        s.collage_background = [10, 20, 30, 255];
        assert_eq!(EditorSettings::parse(&s.to_config_string()), s);
    }

    #[test]
    fn malformed_lines_keep_defaults() {
        let s = EditorSettings::parse("history_cap=lots\nnonsense\ndefault_quality=250\n");
        assert_eq!(s.history_cap, 50);
        assert_eq!(s.default_quality, 100);
    }
}
