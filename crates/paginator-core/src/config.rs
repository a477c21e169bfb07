// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration: asset locations, page layout (typography), and
// agent settings. Persisted as pretty-printed JSON; every field has a default
// so a partial file is valid.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PaginatorError, Result};

/// Vertical shift, in pixels, applied to page content to clear the header band.
pub const CONTENT_OFFSET: u32 = 34;

/// Default port for the job agent.
pub const DEFAULT_PORT: u16 = 3838;

/// Top-level persisted settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginatorConfig {
    pub assets: AssetPaths,
    pub layout: PageLayout,
    pub server: ServerConfig,
    /// File name of the PDF written by local batch runs.
    pub output_file_name: String,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            assets: AssetPaths::default(),
            layout: PageLayout::default(),
            server: ServerConfig::default(),
            output_file_name: "final_document.pdf".into(),
        }
    }
}

impl PaginatorConfig {
    /// Read a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Read `path` if given, otherwise return the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Write the config as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

/// Where the template and the two fonts live. Relative paths are resolved
/// against the job's base directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetPaths {
    pub template: PathBuf,
    pub title_font: PathBuf,
    pub page_number_font: PathBuf,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            template: PathBuf::from("Header and Footer Template.png"),
            title_font: PathBuf::from("fonts/Roboto-Regular.ttf"),
            page_number_font: PathBuf::from("fonts/SourceSansPro-Regular.ttf"),
        }
    }
}

/// Agent settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Directory receiving one `<job-id>.pdf` per remote job.
    pub output_dir: PathBuf,
    /// Fixed API key. When absent a random key is generated at startup.
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            output_dir: PathBuf::from("output"),
            api_key: None,
        }
    }
}

/// Everything the compositor needs to place content and text on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLayout {
    /// Pixels between the canvas top and the top of the page content.
    pub content_offset: u32,
    pub title: TextStyle,
    pub page_number: TextStyle,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            content_offset: CONTENT_OFFSET,
            title: TextStyle::title(),
            page_number: TextStyle::page_number(),
        }
    }
}

/// Placement and look of one line of overlay text.
///
/// `x` is the left edge and `y` the baseline, both in canvas pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub x: i32,
    pub y: i32,
    /// Em size in pixels.
    pub font_size: f32,
    #[serde(default)]
    pub weight: FontWeight,
    pub color: Color,
}

impl TextStyle {
    /// Title role, positioned for 2400x3392 templates (right of the header pipe).
    pub fn title() -> Self {
        Self {
            x: 636,
            y: 80,
            font_size: 32.0,
            weight: FontWeight::Bold,
            color: Color::rgb(0x00, 0x00, 0x00),
        }
    }

    /// Page-number role, bottom right of the footer band.
    pub fn page_number() -> Self {
        Self {
            x: 2120,
            y: 3325,
            font_size: 28.0,
            weight: FontWeight::Normal,
            color: Color::rgb(0xF5, 0xC8, 0x42),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

/// RGBA colour, written in config files as `#RRGGBB` or `#RRGGBBAA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 0xFF])
    }

    /// Parse `#RRGGBB` / `#RRGGBBAA` (the leading `#` is optional).
    pub fn parse(text: &str) -> Result<Self> {
        let digits = text.trim().trim_start_matches('#');
        let bytes = hex::decode(digits)
            .map_err(|e| PaginatorError::InvalidRequest(format!("colour {text:?}: {e}")))?;
        match bytes.as_slice() {
            [r, g, b] => Ok(Self([*r, *g, *b, 0xFF])),
            [r, g, b, a] => Ok(Self([*r, *g, *b, *a])),
            _ => Err(PaginatorError::InvalidRequest(format!(
                "colour {text:?}: expected 6 or 8 hex digits"
            ))),
        }
    }

    pub fn alpha(&self) -> u8 {
        self.0[3]
    }
}

impl TryFrom<String> for Color {
    type Error = PaginatorError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        let [r, g, b, a] = color.0;
        if a == 0xFF {
            format!("#{}", hex::encode_upper([r, g, b]))
        } else {
            format!("#{}", hex::encode_upper([r, g, b, a]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_layout() {
        let layout = PageLayout::default();
        assert_eq!(layout.content_offset, 34);
        assert_eq!((layout.title.x, layout.title.y), (636, 80));
        assert_eq!(layout.title.weight, FontWeight::Bold);
        assert_eq!((layout.page_number.x, layout.page_number.y), (2120, 3325));
        assert_eq!(layout.page_number.color, Color::rgb(0xF5, 0xC8, 0x42));
    }

    #[test]
    fn colour_parses_with_and_without_alpha() {
        assert_eq!(Color::parse("#F5C842").expect("rgb"), Color::rgb(245, 200, 66));
        assert_eq!(
            Color::parse("00000080").expect("rgba"),
            Color([0, 0, 0, 0x80])
        );
        assert!(Color::parse("#FFF").is_err());
        assert!(Color::parse("#GGGGGG").is_err());
    }

    #[test]
    fn colour_serialises_as_hex_string() {
        let json = serde_json::to_string(&Color::rgb(0xF5, 0xC8, 0x42)).expect("serialise");
        assert_eq!(json, "\"#F5C842\"");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: PaginatorConfig =
            serde_json::from_str(r#"{ "server": { "port": 9000 } }"#).expect("parse");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.output_dir, PathBuf::from("output"));
        assert_eq!(config.layout, PageLayout::default());
        assert_eq!(config.output_file_name, "final_document.pdf");
    }

    #[test]
    fn save_then_load_preserves_custom_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");

        let mut config = PaginatorConfig::default();
        config.layout.title.font_size = 40.0;
        config.layout.page_number.color = Color::rgb(1, 2, 3);
        config.save(&path).expect("save");

        let loaded = PaginatorConfig::load(&path).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_or_default_without_path() {
        let config = PaginatorConfig::load_or_default(None).expect("defaults");
        assert_eq!(config.server.port, DEFAULT_PORT);
    }
}
