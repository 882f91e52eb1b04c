//! One-shot light commands sent to the backend (color, off, brightness, animation).
//! Unlike poll cycles these report failures to the caller.

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::polling::transport::HttpTransport;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid color '{0}', expected #rrggbb")]
    InvalidColor(String),
    #[error("brightness must be a finite non-negative number, got {0}")]
    InvalidBrightness(f64),
    #[error("animation name must not be empty")]
    EmptyAnimation,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend rejected command with HTTP status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Parses `#rrggbb` (leading `#` optional).
    pub fn parse_hex(raw: &str) -> Result<Self, CommandError> {
        let hex = raw.strip_prefix('#').unwrap_or(raw);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(CommandError::InvalidColor(raw.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| CommandError::InvalidColor(raw.to_string()))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LightCommand {
    Color(Rgb),
    Off,
    Brightness(f64),
    Animation(String),
}

impl LightCommand {
    pub fn color(hex: &str) -> Result<Self, CommandError> {
        Ok(LightCommand::Color(Rgb::parse_hex(hex)?))
    }

    pub fn brightness(value: f64) -> Result<Self, CommandError> {
        if !value.is_finite() || value < 0.0 {
            return Err(CommandError::InvalidBrightness(value));
        }
        Ok(LightCommand::Brightness(value))
    }

    pub fn animation(name: &str) -> Result<Self, CommandError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CommandError::EmptyAnimation);
        }
        Ok(LightCommand::Animation(name.to_string()))
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            LightCommand::Color(_) => "/api/color",
            LightCommand::Off => "/api/off",
            LightCommand::Brightness(_) => "/api/brightness",
            LightCommand::Animation(_) => "/api/animation",
        }
    }

    /// JSON body, `None` for bodiless commands.
    pub fn body(&self) -> Option<Value> {
        match self {
            LightCommand::Color(rgb) => Some(json!(rgb)),
            LightCommand::Off => None,
            LightCommand::Brightness(value) => Some(json!({ "value": value })),
            LightCommand::Animation(name) => Some(json!({ "name": name })),
        }
    }

    /// POSTs the command; returns the backend's JSON reply (`Null` if it sent none).
    pub async fn send(&self, transport: &HttpTransport) -> Result<Value, CommandError> {
        let mut req = transport.client().post(transport.url(self.endpoint()));
        if let Some(body) = self.body() {
            req = req.json(&body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CommandError::Status(status.as_u16()));
        }
        let bytes = resp.bytes().await?;
        log::info!("sent {:?} to {}", self, self.endpoint());
        Ok(serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_colors() {
        assert_eq!(Rgb::parse_hex("#ff8000").unwrap(), Rgb { r: 255, g: 128, b: 0 });
        assert_eq!(Rgb::parse_hex("00FF10").unwrap(), Rgb { r: 0, g: 255, b: 16 });
        assert!(Rgb::parse_hex("#fff").is_err());
        assert!(Rgb::parse_hex("#gg0000").is_err());
        assert!(Rgb::parse_hex("#ff00é").is_err());
    }

    #[test]
    fn bodies_match_backend_routes() {
        let color = LightCommand::color("#010203").unwrap();
        assert_eq!(color.endpoint(), "/api/color");
        assert_eq!(color.body(), Some(json!({"r": 1, "g": 2, "b": 3})));

        assert_eq!(LightCommand::Off.body(), None);
        assert_eq!(
            LightCommand::brightness(0.5).unwrap().body(),
            Some(json!({"value": 0.5}))
        );
        assert_eq!(
            LightCommand::animation(" rainbow ").unwrap().body(),
            Some(json!({"name": "rainbow"}))
        );
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(matches!(LightCommand::brightness(-1.0), Err(CommandError::InvalidBrightness(_))));
        assert!(matches!(LightCommand::brightness(f64::NAN), Err(CommandError::InvalidBrightness(_))));
        assert!(matches!(LightCommand::animation("  "), Err(CommandError::EmptyAnimation)));
    }
}
