use std::{fs, path::{Path, PathBuf}};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use can_core::{utils::{decode_hex_payload, parse_can_id}, DEFAULT_CAN_ID};
use crate::{command::Command, error::SettingsError};

pub const DEFAULT_INTERFACE: &str = "can0";
pub const DEFAULT_BITRATE: u32 = 250_000;
pub const SETTINGS_VAR: &str = "CANPANEL_SETTINGS";
const SETTINGS_DIR: &str = "canpanel";
const SETTINGS_FILE: &str = "settings.json";

/// On-disk layout. Every field is optional so a partial file only overrides
/// what it names.
#[derive(Debug, Default, Deserialize, Serialize)]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interface: Option<String>,
    #[serde(default)]
    can_id: Option<String>,
    #[serde(default)]
    bitrate: Option<u32>,
    #[serde(default)]
    forward: Option<String>,
    #[serde(default)]
    backward: Option<String>,
    #[serde(default)]
    left: Option<String>,
    #[serde(default)]
    right: Option<String>,
    #[serde(default)]
    stop: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct Settings {
    interface_name: String,
    #[getter(copy)]
    can_id: u32,
    #[getter(copy)]
    bitrate: u32,
    forward: Vec<u8>,
    backward: Vec<u8>,
    left: Vec<u8>,
    right: Vec<u8>,
    stop: Vec<u8>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            interface_name: DEFAULT_INTERFACE.into(),
            can_id: DEFAULT_CAN_ID,
            bitrate: DEFAULT_BITRATE,
            forward: vec![],
            backward: vec![],
            left: vec![],
            right: vec![],
            stop: vec![],
        }
    }
}

impl Settings {
    pub fn set_interface_name<S: Into<String>>(&mut self, name: S) -> &mut Self {
        self.interface_name = name.into();
        self
    }

    pub fn set_can_id(&mut self, can_id: u32) -> &mut Self {
        self.can_id = can_id;
        self
    }

    pub fn set_bitrate(&mut self, bitrate: u32) -> &mut Self {
        self.bitrate = bitrate;
        self
    }

    #[inline]
    pub fn payload(&self, command: Command) -> &[u8] {
        match command {
            Command::Forward => &self.forward,
            Command::Backward => &self.backward,
            Command::Left => &self.left,
            Command::Right => &self.right,
            Command::Stop => &self.stop,
        }
    }

    pub fn set_payload(&mut self, command: Command, payload: Vec<u8>) -> &mut Self {
        *self.payload_mut(command) = payload;
        self
    }

    fn payload_mut(&mut self, command: Command) -> &mut Vec<u8> {
        match command {
            Command::Forward => &mut self.forward,
            Command::Backward => &mut self.backward,
            Command::Left => &mut self.left,
            Command::Right => &mut self.right,
            Command::Stop => &mut self.stop,
        }
    }

    /// Defaults overridden by whatever `text` carries.
    pub fn from_json(text: &str) -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        settings.apply_json(text)?;
        Ok(settings)
    }

    /// Override fields present in `text`. Fields that do not parse are
    /// reported in the log and keep their current value.
    pub fn apply_json(&mut self, text: &str) -> Result<(), SettingsError> {
        let file: SettingsFile = serde_json::from_str(text)
            .map_err(|e| SettingsError::Json(e.to_string()))?;

        if let Some(name) = file.interface {
            let name = name.trim();
            if !name.is_empty() {
                self.interface_name = name.to_owned();
            }
        }
        if let Some(can_id) = file.can_id {
            match parse_can_id(&can_id) {
                Some(v) => self.can_id = v,
                None => log::warn!("CAN-PANEL - ignoring invalid can_id `{}`", can_id),
            }
        }
        if let Some(bitrate) = file.bitrate {
            self.bitrate = bitrate;
        }

        let payloads = [
            (Command::Forward, file.forward),
            (Command::Backward, file.backward),
            (Command::Left, file.left),
            (Command::Right, file.right),
            (Command::Stop, file.stop),
        ];
        for (command, text) in payloads {
            let Some(text) = text else { continue };
            match parse_payload(command, &text) {
                Ok(payload) => *self.payload_mut(command) = payload,
                Err(e) => log::warn!("{}", e),
            }
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        let file = SettingsFile {
            interface: Some(self.interface_name.clone()),
            can_id: Some(format!("{:08X}", self.can_id)),
            bitrate: Some(self.bitrate),
            forward: Some(hex::encode_upper(&self.forward)),
            backward: Some(hex::encode_upper(&self.backward)),
            left: Some(hex::encode_upper(&self.left)),
            right: Some(hex::encode_upper(&self.right)),
            stop: Some(hex::encode_upper(&self.stop)),
        };

        serde_json::to_string_pretty(&file)
            .map_err(|e| SettingsError::Json(e.to_string()))
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("CAN-PANEL - no settings at `{}`, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)
            .map_err(|e| io_error(path, e))?;
        log::debug!("CAN-PANEL - settings loaded from `{}`", path.display());
        Self::from_json(&text)
    }

    /// Like [`Settings::load`], but a file that is not valid JSON is renamed
    /// to `<path>.bak` and the defaults are returned.
    pub fn load_or_backup<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        match Self::load(path) {
            Err(SettingsError::Json(reason)) => {
                let backup = backup_path(path);
                fs::rename(path, &backup)
                    .map_err(|e| io_error(path, e))?;
                log::warn!(
                    "CAN-PANEL - invalid settings `{}` ({}), moved to `{}`, using defaults",
                    path.display(), reason, backup.display(),
                );
                Ok(Self::default())
            },
            other => other,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| io_error(parent, e))?;
        }

        fs::write(path, self.to_json()?)
            .map_err(|e| io_error(path, e))?;
        log::debug!("CAN-PANEL - settings saved to `{}`", path.display());
        Ok(())
    }
}

/// Settings location: `CANPANEL_SETTINGS` (a `.env` file is honoured), then the
/// XDG config directory, then `~/.config`, then the working directory.
pub fn default_path() -> PathBuf {
    if let Err(e) = dotenvy::dotenv() {
        log::trace!("CAN-PANEL - no .env loaded: {}", e);
    }

    if let Ok(v) = std::env::var(SETTINGS_VAR) {
        if !v.is_empty() {
            return PathBuf::from(v);
        }
    }

    let config_dir = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var("HOME")
            .ok()
            .filter(|v| !v.is_empty())
            .map(|home| Path::new(&home).join(".config")));

    match config_dir {
        Some(dir) => dir.join(SETTINGS_DIR).join(SETTINGS_FILE),
        None => PathBuf::from(SETTINGS_FILE),
    }
}

fn parse_payload(command: Command, text: &str) -> Result<Vec<u8>, SettingsError> {
    decode_hex_payload(text)
        .map_err(|e| SettingsError::InvalidHex { field: command.key(), reason: e.to_string() })
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

fn io_error(path: &Path, e: std::io::Error) -> SettingsError {
    SettingsError::Io { path: path.display().to_string(), reason: e.to_string() }
}
