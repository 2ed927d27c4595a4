//! On-disk formats for persisted applications.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Encoding of an application file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    /// bincode, `.tap`. The default.
    Binary,
    /// JSON, `.tax`.
    Json,
    /// RON source text, `.tas`.
    Source,
    /// TOML application definition, `.tac`. Can be loaded, never saved.
    Definition,
}

impl Style {
    pub const ALL: [Style; 4] = [Style::Binary, Style::Json, Style::Source, Style::Definition];

    pub fn extension(self) -> &'static str {
        match self {
            Style::Binary => "tap",
            Style::Json => "tax",
            Style::Source => "tas",
            Style::Definition => "tac",
        }
    }

    pub fn is_saveable(self) -> bool {
        self != Style::Definition
    }

    /// Guess the style from a file extension.
    pub fn from_extension(path: &Path) -> Option<Style> {
        let ext = path.extension()?.to_str()?;
        Style::ALL.into_iter().find(|s| s.extension() == ext)
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Style::Binary => "binary",
            Style::Json => "json",
            Style::Source => "source",
            Style::Definition => "definition",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStyle(pub String);

impl fmt::Display for UnknownStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown application style '{}' (expected binary, json, source or definition)",
            self.0
        )
    }
}

impl std::error::Error for UnknownStyle {}

impl FromStr for Style {
    type Err = UnknownStyle;

    /// Accepts the style name or its file extension.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" | "tap" => Ok(Style::Binary),
            "json" | "tax" => Ok(Style::Json),
            "source" | "tas" => Ok(Style::Source),
            "definition" | "tac" => Ok(Style::Definition),
            _ => Err(UnknownStyle(s.to_string())),
        }
    }
}
