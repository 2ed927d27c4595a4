//! Application persistence.
//!
//! # Responsibilities
//! - Encode and decode [`ApplicationDescriptor`]s in the supported [`Style`]s
//! - Optionally seal the encoded bytes with a passphrase
//! - Save atomically and load back, rebuilding services through plugins
//!
//! # Data Flow
//! ```text
//! save: Application → descriptor → encode(style) → [seal] → {path}new → rename
//! load: read → [open] → decode(style) → descriptor → Application::from_descriptor
//! ```

pub mod crypto;
pub mod definition;
pub mod style;

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use style::{Style, UnknownStyle};

use crate::plugin::{PluginError, PluginRegistry};
use crate::service::{Application, ApplicationDescriptor, ServiceError};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not encode application as {style}: {message}")]
    Encode { style: Style, message: String },

    #[error("could not decode {style} application: {message}")]
    Decode { style: Style, message: String },

    #[error("no top-level application value was defined")]
    MissingApplication,

    #[error("applications cannot be saved in {0} style")]
    NotSaveable(Style),

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed (wrong passphrase or corrupt file)")]
    Decrypt,

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Where and how an application is stored.
#[derive(Debug, Clone)]
pub struct Persistable {
    path: PathBuf,
    style: Style,
    passphrase: Option<String>,
}

impl Persistable {
    pub fn new(path: impl Into<PathBuf>, style: Style) -> Self {
        Self {
            path: path.into(),
            style,
            passphrase: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: Option<String>) -> Self {
        self.passphrase = passphrase;
        self
    }

    pub fn set_style(&mut self, style: Style) {
        self.style = style;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn is_encrypted(&self) -> bool {
        self.passphrase.is_some()
    }

    /// Write `descriptor` to a temporary sibling, then rename it over the target.
    pub fn save(&self, descriptor: &ApplicationDescriptor) -> Result<(), PersistError> {
        if !self.style.is_saveable() {
            return Err(PersistError::NotSaveable(self.style));
        }

        let mut bytes = encode(descriptor, self.style)?;
        if let Some(passphrase) = &self.passphrase {
            bytes = crypto::seal(&bytes, passphrase)?;
        }

        let temp = temp_path(&self.path);
        fs::write(&temp, &bytes).map_err(|source| PersistError::Io {
            path: temp.clone(),
            source,
        })?;
        fs::rename(&temp, &self.path).map_err(|source| PersistError::Io {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!(
            path = %self.path.display(),
            style = %self.style,
            encrypted = self.is_encrypted(),
            "Saved application"
        );
        Ok(())
    }

    pub fn load(&self, plugins: &PluginRegistry) -> Result<ApplicationDescriptor, PersistError> {
        let mut bytes = fs::read(&self.path).map_err(|source| PersistError::Io {
            path: self.path.clone(),
            source,
        })?;
        if let Some(passphrase) = &self.passphrase {
            bytes = crypto::open(&bytes, passphrase)?;
        }
        decode(&bytes, self.style, plugins)
    }
}

/// Load an application file and rebuild its services.
pub fn load_application(
    path: &Path,
    style: Style,
    passphrase: Option<String>,
    plugins: &PluginRegistry,
) -> Result<Application, PersistError> {
    let descriptor = Persistable::new(path, style)
        .with_passphrase(passphrase)
        .load(plugins)?;
    Ok(Application::from_descriptor(&descriptor, plugins)?)
}

/// Re-encode an application file in another style.
pub fn convert_style(
    input: &Persistable,
    output: &Persistable,
    plugins: &PluginRegistry,
) -> Result<ApplicationDescriptor, PersistError> {
    let descriptor = input.load(plugins)?;
    output.save(&descriptor)?;
    Ok(descriptor)
}

fn encode(descriptor: &ApplicationDescriptor, style: Style) -> Result<Vec<u8>, PersistError> {
    let encoded = match style {
        Style::Binary => bincode::serialize(descriptor).map_err(|e| e.to_string()),
        Style::Json => serde_json::to_vec_pretty(descriptor).map_err(|e| e.to_string()),
        Style::Source => ron::ser::to_string_pretty(descriptor, ron::ser::PrettyConfig::default())
            .map(String::into_bytes)
            .map_err(|e| e.to_string()),
        Style::Definition => return Err(PersistError::NotSaveable(style)),
    };
    encoded.map_err(|message| PersistError::Encode { style, message })
}

fn decode(
    bytes: &[u8],
    style: Style,
    plugins: &PluginRegistry,
) -> Result<ApplicationDescriptor, PersistError> {
    let decode_error = |message: String| PersistError::Decode { style, message };

    match style {
        Style::Binary => bincode::deserialize(bytes).map_err(|e| decode_error(e.to_string())),
        Style::Json => serde_json::from_slice(bytes).map_err(|e| decode_error(e.to_string())),
        Style::Source => {
            let text = std::str::from_utf8(bytes).map_err(|e| decode_error(e.to_string()))?;
            ron::from_str(text).map_err(|e| decode_error(e.to_string()))
        }
        Style::Definition => {
            let text = std::str::from_utf8(bytes).map_err(|e| decode_error(e.to_string()))?;
            definition::parse(text, plugins)
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("new");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::ServiceOptions;
    use crate::service::ServiceDescriptor;

    fn sample() -> ApplicationDescriptor {
        ApplicationDescriptor {
            name: "edge".to_string(),
            services: vec![ServiceDescriptor {
                name: "echo".to_string(),
                maker: "echo".to_string(),
                options: ServiceOptions::new().with("port", "7007"),
            }],
        }
    }

    #[test]
    fn every_saveable_style_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = PluginRegistry::builtin();

        for style in Style::ALL.into_iter().filter(|s| s.is_saveable()) {
            let path = dir.path().join(format!("app.{}", style.extension()));
            let store = Persistable::new(&path, style);
            store.save(&sample()).unwrap();

            assert_eq!(store.load(&plugins).unwrap(), sample(), "style {style}");
            assert!(!temp_path(&path).exists());
        }
    }

    #[test]
    fn encrypted_file_needs_the_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.tap");
        let plugins = PluginRegistry::builtin();

        Persistable::new(&path, Style::Binary)
            .with_passphrase(Some("secret".to_string()))
            .save(&sample())
            .unwrap();

        let wrong = Persistable::new(&path, Style::Binary).with_passphrase(Some("nope".to_string()));
        assert!(matches!(wrong.load(&plugins), Err(PersistError::Decrypt)));

        let plain = Persistable::new(&path, Style::Binary);
        assert!(plain.load(&plugins).is_err());

        let right = Persistable::new(&path, Style::Binary).with_passphrase(Some("secret".to_string()));
        assert_eq!(right.load(&plugins).unwrap(), sample());
    }

    #[test]
    fn definitions_cannot_be_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = Persistable::new(dir.path().join("app.tac"), Style::Definition);
        assert!(matches!(
            store.save(&sample()),
            Err(PersistError::NotSaveable(Style::Definition))
        ));
    }

    #[test]
    fn convert_between_styles() {
        let dir = tempfile::tempdir().unwrap();
        let plugins = PluginRegistry::builtin();
        let source = Persistable::new(dir.path().join("app.tap"), Style::Binary);
        source.save(&sample()).unwrap();

        let mut target = Persistable::new(dir.path().join("app.tas"), Style::Binary);
        target.set_style(Style::Source);
        convert_style(&source, &target, &plugins).unwrap();

        let text = fs::read_to_string(target.path()).unwrap();
        assert!(text.contains("edge"));
        assert_eq!(target.load(&plugins).unwrap(), sample());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_application(
            Path::new("/nonexistent/servd.tap"),
            Style::Binary,
            None,
            &PluginRegistry::builtin(),
        )
        .unwrap_err();
        assert!(matches!(err, PersistError::Io { .. }));
    }
}
