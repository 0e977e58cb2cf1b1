//! Colorscheme file support.
//!
//! The colorscheme is a small JSON document of named `#rrggbb` colors kept
//! next to the feed cache. It can also be imported from a pywal
//! `colors.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::cache::store;

/// Get the default location of the colorscheme file.
pub fn default_colorscheme_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tabfeed")
        .join("colorscheme.json")
}

/// Get the default location of the pywal color export.
pub fn default_pywal_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wal")
        .join("colors.json")
}

/// Every color slot of a [`Colorscheme`], in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorField {
    BgDark,
    BgDarker,
    Text,
    TextDark,
    Color1,
    Color2,
    Color3,
    Color4,
    Color5,
    Color6,
    Color7,
}

impl ColorField {
    pub const ALL: [ColorField; 11] = [
        ColorField::BgDark,
        ColorField::BgDarker,
        ColorField::Text,
        ColorField::TextDark,
        ColorField::Color1,
        ColorField::Color2,
        ColorField::Color3,
        ColorField::Color4,
        ColorField::Color5,
        ColorField::Color6,
        ColorField::Color7,
    ];

    /// The key used for this slot in the JSON file.
    pub fn name(self) -> &'static str {
        match self {
            ColorField::BgDark => "bg_dark",
            ColorField::BgDarker => "bg_darker",
            ColorField::Text => "text",
            ColorField::TextDark => "text_dark",
            ColorField::Color1 => "color1",
            ColorField::Color2 => "color2",
            ColorField::Color3 => "color3",
            ColorField::Color4 => "color4",
            ColorField::Color5 => "color5",
            ColorField::Color6 => "color6",
            ColorField::Color7 => "color7",
        }
    }
}

/// The colors the terminal UI draws with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Colorscheme {
    pub bg_dark: String,
    pub bg_darker: String,
    pub text: String,
    pub text_dark: String,
    pub color1: String,
    pub color2: String,
    pub color3: String,
    pub color4: String,
    pub color5: String,
    pub color6: String,
    pub color7: String,
}

impl Default for Colorscheme {
    fn default() -> Self {
        Self {
            bg_dark: "#161622".into(),
            bg_darker: "#11111a".into(),
            text: "#FFFFFF".into(),
            text_dark: "#47485b".into(),
            color1: "#c29fec".into(),
            color2: "#ddbec0".into(),
            color3: "#89b4fa".into(),
            color4: "#e06c75".into(),
            color5: "#98c379".into(),
            color6: "#fab387".into(),
            color7: "#f1c1e4".into(),
        }
    }
}

impl Colorscheme {
    pub fn get(&self, field: ColorField) -> &str {
        match field {
            ColorField::BgDark => &self.bg_dark,
            ColorField::BgDarker => &self.bg_darker,
            ColorField::Text => &self.text,
            ColorField::TextDark => &self.text_dark,
            ColorField::Color1 => &self.color1,
            ColorField::Color2 => &self.color2,
            ColorField::Color3 => &self.color3,
            ColorField::Color4 => &self.color4,
            ColorField::Color5 => &self.color5,
            ColorField::Color6 => &self.color6,
            ColorField::Color7 => &self.color7,
        }
    }

    /// `(name, color)` pairs for every slot, in display order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        ColorField::ALL.into_iter().map(move |field| (field.name(), self.get(field)))
    }

    /// Read a colorscheme written by [`Colorscheme::save`].
    pub async fn load(path: &Path) -> Result<Self, Error> {
        let bytes = store::read_bytes(path).await?;
        let colors: Self = serde_json::from_slice(&bytes).map_err(|e| Error::decode(path, e))?;
        colors.check(path)?;
        Ok(colors)
    }

    /// Like [`Colorscheme::load`], falling back to the default palette.
    pub async fn load_or_default(path: &Path) -> Self {
        match Self::load(path).await {
            Ok(colors) => colors,
            Err(e) => {
                if !e.is_not_found() {
                    tracing::warn!("ignoring colorscheme: {}", e);
                }
                Self::default()
            }
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        store::write_private(path, json.as_bytes()).await
    }

    /// Build a colorscheme from a pywal `colors.json`.
    ///
    /// Both background slots take `special.background`, both text slots take
    /// `special.foreground`, and the accents take `colors.color1..color7`.
    pub async fn from_pywal(path: &Path) -> Result<Self, Error> {
        let bytes = store::read_bytes(path).await?;
        let wal: PywalColors = serde_json::from_slice(&bytes).map_err(|e| Error::decode(path, e))?;

        let colors = Self {
            bg_dark: wal.special.background.clone(),
            bg_darker: wal.special.background,
            text: wal.special.foreground.clone(),
            text_dark: wal.special.foreground,
            color1: wal.colors.color1,
            color2: wal.colors.color2,
            color3: wal.colors.color3,
            color4: wal.colors.color4,
            color5: wal.colors.color5,
            color6: wal.colors.color6,
            color7: wal.colors.color7,
        };
        colors.check(path)?;
        Ok(colors)
    }

    fn check(&self, path: &Path) -> Result<(), Error> {
        for (name, color) in self.fields() {
            if !is_hex_color(color) {
                return Err(Error::decode(path, format!("{name} is not a #rrggbb color: {color:?}")));
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct PywalColors {
    special: PywalSpecial,
    colors: PywalAccents,
}

#[derive(Deserialize)]
struct PywalSpecial {
    background: String,
    foreground: String,
}

#[derive(Deserialize)]
struct PywalAccents {
    color1: String,
    color2: String,
    color3: String,
    color4: String,
    color5: String,
    color6: String,
    color7: String,
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}
