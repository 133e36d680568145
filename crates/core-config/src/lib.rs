//! Configuration loading and parsing.
//!
//! Parses `marklight.toml` (or an override path provided by the binary).
//! Every section is optional and every missing field takes its default, so an
//! absent or unreadable file behaves like an empty one. Unknown fields are
//! ignored to allow forward evolution without warnings.
//!
//! ```toml
//! [highlight]
//! enabled = true
//! [changes]
//! enabled = true
//! [preview]
//! interval_ms = 250
//! [images]
//! enabled = true
//! [palette]
//! heading = "#1e90ff"
//! changed-since-save = "#ffee62"
//! ```

use std::collections::BTreeMap;
use std::time::Duration;
use std::{fs, path::PathBuf};

use anyhow::Result;
use core_render::{Palette, Rgb, StyleColor};
use serde::Deserialize;
use tracing::{info, warn};

pub const CONFIG_FILE_NAME: &str = "marklight.toml";
/// Refresh intervals below this are raised to it.
pub const MIN_PREVIEW_INTERVAL_MS: u64 = 10;

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HighlightConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ChangesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ChangesConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PreviewConfig {
    #[serde(default = "PreviewConfig::default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            interval_ms: Self::default_interval_ms(),
        }
    }
}

impl PreviewConfig {
    const fn default_interval_ms() -> u64 {
        250
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ImagesConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    #[serde(default)]
    pub highlight: HighlightConfig,
    #[serde(default)]
    pub changes: ChangesConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub images: ImagesConfig,
    /// Role name → `#rrggbb`.
    #[serde(default)]
    pub palette: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// File contents as read, when a file was loaded.
    pub raw: Option<String>,
    pub path: Option<PathBuf>,
    /// Parsed values, or defaults.
    pub file: ConfigFile,
}

/// Best-effort config path: `marklight.toml` in the working directory, then
/// the platform config dir (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("marklight").join(CONFIG_FILE_NAME);
    }
    local
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        info!(target: "config", path = %path.display(), "config_not_found_using_defaults");
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            info!(target: "config", path = %path.display(), "config_loaded");
            Ok(Config {
                raw: Some(content),
                path: Some(path),
                file,
            })
        }
        Err(err) => {
            warn!(
                target: "config",
                path = %path.display(),
                error = %err,
                "config_parse_failed_using_defaults"
            );
            Ok(Config::default())
        }
    }
}

impl Config {
    pub fn highlight_enabled(&self) -> bool {
        self.file.highlight.enabled
    }

    pub fn changes_enabled(&self) -> bool {
        self.file.changes.enabled
    }

    pub fn images_enabled(&self) -> bool {
        self.file.images.enabled
    }

    pub fn preview_interval(&self) -> Duration {
        Duration::from_millis(self.file.preview.interval_ms.max(MIN_PREVIEW_INTERVAL_MS))
    }

    /// Default palette with the `[palette]` overrides applied. Unknown roles
    /// and malformed colors are logged and skipped.
    pub fn palette(&self) -> Palette {
        let mut palette = Palette::new();
        for (name, value) in &self.file.palette {
            let Some(rgb) = Rgb::parse_hex(value) else {
                warn!(target: "config", role = %name, value = %value, "palette_color_invalid");
                continue;
            };
            match name.as_str() {
                "changed-since-save" | "changed_since_save" => palette.changed_since_save = rgb,
                "changed-since-original" | "changed_since_original" => {
                    palette.changed_since_original = rgb
                }
                other => match StyleColor::from_name(other) {
                    Some(role) => palette.set(role, rgb),
                    None => {
                        warn!(target: "config", role = %name, "palette_role_unknown");
                    }
                },
            }
        }
        palette
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex, MutexGuard};
    use tracing::Level;
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct BufferWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferWriter {
        fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let buf = Arc::new(Mutex::new(Vec::new()));
            (Self { inner: buf.clone() }, buf)
        }
    }

    struct LockedWriter<'a> {
        guard: MutexGuard<'a, Vec<u8>>,
    }

    impl<'a> Write for LockedWriter<'a> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.guard.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = LockedWriter<'a>;

        fn make_writer(&'a self) -> Self::Writer {
            LockedWriter {
                guard: self.inner.lock().expect("log buffer poisoned"),
            }
        }
    }

    fn capture<F: FnOnce()>(f: F) -> String {
        let (writer, buffer) = BufferWriter::new();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .with_writer(writer)
            .finish();
        with_default(subscriber, f);
        let out = buffer.lock().unwrap().clone();
        String::from_utf8(out).unwrap()
    }

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), body).unwrap();
        tmp
    }

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert!(cfg.raw.is_none());
        assert!(cfg.highlight_enabled());
        assert!(cfg.changes_enabled());
        assert!(cfg.images_enabled());
        assert_eq!(cfg.preview_interval(), Duration::from_millis(250));
    }

    #[test]
    fn parses_all_sections() {
        let tmp = write_config(
            "[highlight]\nenabled = false\n[changes]\nenabled = false\n\
             [preview]\ninterval_ms = 100\n[images]\nenabled = false\n",
        );
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert!(!cfg.highlight_enabled());
        assert!(!cfg.changes_enabled());
        assert!(!cfg.images_enabled());
        assert_eq!(cfg.preview_interval(), Duration::from_millis(100));
        assert_eq!(cfg.path.as_deref(), Some(tmp.path()));
    }

    #[test]
    fn partial_sections_keep_field_defaults() {
        let tmp = write_config("[preview]\n[highlight]\n");
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.preview.interval_ms, 250);
        assert!(cfg.highlight_enabled());
    }

    #[test]
    fn tiny_interval_is_raised() {
        let tmp = write_config("[preview]\ninterval_ms = 0\n");
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(
            cfg.preview_interval(),
            Duration::from_millis(MIN_PREVIEW_INTERVAL_MS)
        );
    }

    #[test]
    fn parse_error_falls_back_to_defaults_and_warns() {
        let tmp = write_config("[highlight\nenabled = nope");
        let mut cfg = None;
        let log = capture(|| {
            cfg = Some(load_from(Some(tmp.path().to_path_buf())).unwrap());
        });
        let cfg = cfg.unwrap();
        assert!(cfg.raw.is_none());
        assert!(cfg.highlight_enabled());
        assert!(log.contains("WARN config:"));
        assert!(log.contains("config_parse_failed_using_defaults"));
    }

    #[test]
    fn palette_overrides_apply() {
        let tmp = write_config(
            "[palette]\nheading = \"#010203\"\ntask_completed = \"#0a0b0c\"\n\
             changed-since-save = \"#111111\"\n",
        );
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        let palette = cfg.palette();
        assert_eq!(palette.rgb(StyleColor::Heading), Rgb::new(1, 2, 3));
        assert_eq!(palette.rgb(StyleColor::TaskCompleted), Rgb::new(10, 11, 12));
        assert_eq!(palette.changed_since_save, Rgb::new(0x11, 0x11, 0x11));
        assert_eq!(
            palette.rgb(StyleColor::Quote),
            StyleColor::Quote.default_rgb()
        );
    }

    #[test]
    fn invalid_palette_entries_are_logged_and_skipped() {
        let tmp = write_config("[palette]\nheading = \"blue\"\nsparkle = \"#ffffff\"\n");
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        let mut palette = None;
        let log = capture(|| palette = Some(cfg.palette()));
        let palette = palette.unwrap();
        assert_eq!(
            palette.rgb(StyleColor::Heading),
            StyleColor::Heading.default_rgb()
        );
        assert!(log.contains("palette_color_invalid"));
        assert!(log.contains("palette_role_unknown"));
    }
}
