//! Per-device INI configuration, mirroring `daemon/config.cpp`: scan a
//! directory of `.ini` files, keep the ones whose `[Device]` section matches
//! the probed vendor/product, and apply their option sections on top of the
//! built-in defaults.

use std::path::Path;

use ini::Ini;
use thiserror::Error;
use tracing::{debug, warn};

/// Default search directory for per-device config files.
pub const DEFAULT_CONFIG_DIR: &str = "/usr/local/ipts_config";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("panel size is zero; Config.Width and Config.Height must be set")]
    ZeroPanelSize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub invert_x: bool,
    pub invert_y: bool,

    pub width: i32,
    pub height: i32,

    pub stylus_cone: bool,
    pub stylus_disable_touch: bool,

    pub touch_stability: bool,
    pub touch_advanced: bool,
    pub touch_disable_on_palm: bool,

    pub basic_pressure: f32,

    pub cone_angle: f32,
    pub cone_distance: f32,

    pub stability_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            invert_x: false,
            invert_y: false,
            width: 0,
            height: 0,
            stylus_cone: true,
            stylus_disable_touch: false,
            touch_stability: true,
            touch_advanced: false,
            touch_disable_on_palm: false,
            basic_pressure: 0.04,
            cone_angle: 30.0,
            cone_distance: 1600.0,
            stability_threshold: 0.1,
        }
    }
}

impl Config {
    /// Load config for `info`, scanning every regular file in `dir` and
    /// applying any whose `[Device]` section names this vendor/product.
    /// Missing/unreadable files are skipped, not fatal: absence of config
    /// means "use built-in defaults" (per the error handling design), but a
    /// zero panel size after loading is fatal since nothing downstream can
    /// normalize coordinates without it.
    pub fn load(info: DeviceInfo, dir: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if dir.exists() {
            match std::fs::read_dir(dir) {
                Ok(entries) => {
                    for entry in entries.flatten() {
                        let path = entry.path();
                        if !path.is_file() {
                            continue;
                        }
                        config.apply_file(&path, info);
                    }
                }
                Err(err) => warn!(target: "config", ?dir, %err, "failed to scan config directory"),
            }
        } else {
            debug!(target: "config", ?dir, "config directory absent, using defaults");
        }

        if config.width == 0 || config.height == 0 {
            return Err(ConfigError::ZeroPanelSize);
        }

        Ok(config)
    }

    fn apply_file(&mut self, path: &Path, info: DeviceInfo) {
        let ini = match Ini::load_from_file(path) {
            Ok(ini) => ini,
            Err(err) => {
                warn!(target: "config", ?path, %err, "failed to parse config file");
                return;
            }
        };

        if !matches_device(&ini, info) {
            return;
        }

        debug!(target: "config", ?path, "applying device config");
        self.apply(&ini);
    }

    fn apply(&mut self, ini: &Ini) {
        if let Some(section) = ini.section(Some("Config")) {
            if let Some(v) = section.get("InvertX") {
                self.invert_x = to_bool(v);
            }
            if let Some(v) = section.get("InvertY") {
                self.invert_y = to_bool(v);
            }
            if let Some(v) = section.get("Width").and_then(|v| v.parse().ok()) {
                self.width = v;
            }
            if let Some(v) = section.get("Height").and_then(|v| v.parse().ok()) {
                self.height = v;
            }
        }

        if let Some(section) = ini.section(Some("Stylus")) {
            if let Some(v) = section.get("Cone") {
                self.stylus_cone = to_bool(v);
            }
            if let Some(v) = section.get("DisableTouch") {
                self.stylus_disable_touch = to_bool(v);
            }
        }

        if let Some(section) = ini.section(Some("Touch")) {
            if let Some(v) = section.get("Stability") {
                self.touch_stability = to_bool(v);
            }
            if let Some(v) = section.get("Processing") {
                self.touch_advanced = v.eq_ignore_ascii_case("advanced");
            }
            if let Some(v) = section.get("DisableOnPalm") {
                self.touch_disable_on_palm = to_bool(v);
            }
        }

        if let Some(section) = ini.section(Some("Basic")) {
            if let Some(v) = section.get("Pressure").and_then(|v| v.parse().ok()) {
                self.basic_pressure = v;
            }
        }

        if let Some(section) = ini.section(Some("Cone")) {
            if let Some(v) = section.get("Angle").and_then(|v| v.parse().ok()) {
                self.cone_angle = v;
            }
            if let Some(v) = section.get("Distance").and_then(|v| v.parse().ok()) {
                self.cone_distance = v;
            }
        }

        if let Some(section) = ini.section(Some("Stability")) {
            if let Some(v) = section.get("Threshold").and_then(|v| v.parse().ok()) {
                self.stability_threshold = v;
            }
        }
    }
}

fn to_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "yes" | "on" | "1")
}

fn matches_device(ini: &Ini, info: DeviceInfo) -> bool {
    let Some(section) = ini.section(Some("Device")) else {
        return false;
    };
    let vendor = section.get("Vendor").and_then(parse_hex);
    let product = section.get("Product").and_then(parse_hex);
    vendor == Some(info.vendor_id) && product == Some(info.product_id)
}

fn parse_hex(value: &str) -> Option<u16> {
    u16::from_str_radix(value.trim_start_matches("0x").trim_start_matches("0X"), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_ini(dir: &Path, name: &str, contents: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn missing_directory_yields_zero_panel_size_error() {
        let info = DeviceInfo {
            vendor_id: 0x04f3,
            product_id: 0x0c00,
        };
        let err = Config::load(info, Path::new("/nonexistent/ipts_config")).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroPanelSize));
    }

    #[test]
    fn matching_device_file_applies_options() {
        let dir = tempfile::tempdir().unwrap();
        write_ini(
            dir.path(),
            "device.ini",
            "[Device]\nVendor = 04F3\nProduct = 0C00\n\n[Config]\nWidth = 9600\nHeight = 7200\nInvertX = yes\n\n[Touch]\nProcessing = Advanced\n",
        );

        let info = DeviceInfo {
            vendor_id: 0x04f3,
            product_id: 0x0c00,
        };
        let config = Config::load(info, dir.path()).unwrap();
        assert_eq!(config.width, 9600);
        assert_eq!(config.height, 7200);
        assert!(config.invert_x);
        assert!(config.touch_advanced);
    }

    #[test]
    fn non_matching_device_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write_ini(
            dir.path(),
            "device.ini",
            "[Device]\nVendor = 1111\nProduct = 2222\n\n[Config]\nWidth = 9600\nHeight = 7200\n",
        );

        let info = DeviceInfo {
            vendor_id: 0x04f3,
            product_id: 0x0c00,
        };
        let err = Config::load(info, dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroPanelSize));
    }

    #[test]
    fn boolean_parsing_is_case_insensitive() {
        assert!(to_bool("TRUE"));
        assert!(to_bool("Yes"));
        assert!(to_bool("oN"));
        assert!(to_bool("1"));
        assert!(!to_bool("0"));
        assert!(!to_bool("false"));
    }
}
