//! Type definitions and aliases

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

// Re-export commonly used types
pub use crate::error::{AppError, Result};
pub use crate::utils::MacAddr;

/// Station endpoint reference (`shelf.resource.port`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationId {
    pub shelf: u16,
    pub resource: u16,
    pub port: String,
}

impl StationId {
    pub fn new(shelf: u16, resource: u16, port: impl Into<String>) -> Self {
        Self { shelf, resource, port: port.into() }
    }
}

impl FromStr for StationId {
    type Err = AppError;

    /// Accepts `shelf.resource.port` or a bare port name on `1.1`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AppError::validation("Station id cannot be empty"));
        }

        let parts: Vec<&str> = s.splitn(3, '.').collect();
        match parts.as_slice() {
            [port] => Ok(Self::new(1, 1, *port)),
            [shelf, resource, port] if !port.is_empty() => {
                let shelf = shelf.parse().map_err(|_| {
                    AppError::validation(format!("Invalid shelf in station id '{}'", s))
                })?;
                let resource = resource.parse().map_err(|_| {
                    AppError::validation(format!("Invalid resource in station id '{}'", s))
                })?;
                Ok(Self::new(shelf, resource, *port))
            }
            _ => Err(AppError::validation(format!(
                "Invalid station id '{}': expected shelf.resource.port",
                s
            ))),
        }
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shelf, self.resource, self.port)
    }
}

impl Serialize for StationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One attenuator module: controller serial (entity id) plus module index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    pub serial: String,
    pub index: u8,
}

impl ModuleId {
    pub fn new(serial: impl Into<String>, index: u8) -> Self {
        Self { serial: serial.into(), index }
    }
}

impl FromStr for ModuleId {
    type Err = AppError;

    /// `<serial>.<index>`, where the serial may itself contain dots (`1.1.3034.2`)
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (serial, index) = s.rsplit_once('.').ok_or_else(|| {
            AppError::validation(format!("Invalid attenuator module '{}': expected serial.module", s))
        })?;
        if serial.is_empty() {
            return Err(AppError::validation(format!("Invalid attenuator module '{}': empty serial", s)));
        }
        let index = index.parse::<u8>().map_err(|_| {
            AppError::validation(format!("Invalid attenuator module index in '{}'", s))
        })?;
        Ok(Self::new(serial, index))
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.serial, self.index)
    }
}

impl Serialize for ModuleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModuleId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Enterprise (802.1X) credentials, only present for [`SecurityMode::Enterprise`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterpriseAuth {
    pub eap_method: String,
    pub identity: String,
    #[serde(skip_serializing, default)]
    pub password: String,
}

/// Station security configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SecurityMode {
    Open,
    Wpa2Personal,
    Wpa3Sae,
    Enterprise(EnterpriseAuth),
}

impl SecurityMode {
    /// Build a security mode from its CLI/env name and optional EAP parameters
    pub fn from_parts(kind: &str, enterprise: Option<EnterpriseAuth>) -> Result<Self> {
        match kind.trim().to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "wpa2" | "wpa2-personal" | "wpa2_personal" => Ok(Self::Wpa2Personal),
            "wpa3" | "sae" | "wpa3-sae" | "wpa3_sae" => Ok(Self::Wpa3Sae),
            "enterprise" | "wpa2-enterprise" | "wpa3-enterprise" | "eap" => enterprise
                .map(Self::Enterprise)
                .ok_or_else(|| AppError::config("Enterprise security requires EAP method and identity")),
            other => Err(AppError::config(format!("Unknown security mode '{}'", other))),
        }
    }

    /// Short name used in reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Wpa2Personal => "wpa2",
            Self::Wpa3Sae => "wpa3",
            Self::Enterprise(_) => "enterprise",
        }
    }

    pub fn enterprise(&self) -> Option<&EnterpriseAuth> {
        match self {
            Self::Enterprise(auth) => Some(auth),
            _ => None,
        }
    }
}

impl Default for SecurityMode {
    fn default() -> Self {
        Self::Wpa2Personal
    }
}

/// 802.11 authentication algorithm numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthAlgorithm {
    Open,
    SharedKey,
    FastTransition,
    Sae,
    Other(u16),
}

impl AuthAlgorithm {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Self::Open,
            1 => Self::SharedKey,
            2 => Self::FastTransition,
            3 => Self::Sae,
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            Self::Open => 0,
            Self::SharedKey => 1,
            Self::FastTransition => 2,
            Self::Sae => 3,
            Self::Other(code) => *code,
        }
    }

    /// Algorithm expected in the roam's authentication exchange
    pub fn for_roam(security: &SecurityMode, fast_transition: bool) -> Self {
        if fast_transition {
            Self::FastTransition
        } else if matches!(security, SecurityMode::Wpa3Sae) {
            Self::Sae
        } else {
            Self::Open
        }
    }
}

/// How the roam-assist command asks the driver to move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoamMethod {
    /// Over the air reassociation (`roam <bssid>`)
    OverTheAir,
    /// FT over the distribution system (`ft_ds <bssid>`)
    OverTheDs,
}

impl RoamMethod {
    pub fn command(&self, bssid: &MacAddr) -> String {
        match self {
            Self::OverTheAir => format!("roam {}", bssid),
            Self::OverTheDs => format!("ft_ds {}", bssid),
        }
    }
}

impl FromStr for RoamMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ota" | "roam" | "over-the-air" => Ok(Self::OverTheAir),
            "otds" | "ft_ds" | "over-the-ds" => Ok(Self::OverTheDs),
            other => Err(AppError::config(format!("Unknown roam method '{}' (expected ota or otds)", other))),
        }
    }
}

impl fmt::Display for RoamMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OverTheAir => write!(f, "ota"),
            Self::OverTheDs => write!(f, "otds"),
        }
    }
}

/// Monitor channel, given either as a channel number or a frequency in MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelSpec {
    Channel(u16),
    FrequencyMhz(u32),
}

impl FromStr for ChannelSpec {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|_| AppError::config(format!("Invalid channel or frequency '{}'", s)))?;
        match value {
            0 => Err(AppError::config("Channel cannot be 0")),
            1..=233 => Ok(Self::Channel(value as u16)),
            2400..=7125 => Ok(Self::FrequencyMhz(value)),
            _ => Err(AppError::config(format!("'{}' is neither a channel nor a Wi-Fi frequency", s))),
        }
    }
}

impl fmt::Display for ChannelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(c) => write!(f, "{}", c),
            Self::FrequencyMhz(mhz) => write!(f, "{}", mhz),
        }
    }
}
