//! Runtime options of a [`Satchel`](crate::Satchel) context.
//!
//! `Options` derives `Deserialize` so a host can embed it in its own configuration file:
//!
//! ```rust
//! let options: satchel::Options = serde_json::from_str(r#"{ "save_dir": "data/saves" }"#).unwrap();
//! assert_eq!(options.explicit_dir, "explicits");
//! assert_eq!(options.default_version, 1);
//! ```

use crate::error::{Result, SatchelError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Directory layout and versioning defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Base directory of bulk saves.
    pub save_dir: PathBuf,
    /// Sub-directory of `save_dir` holding explicit saves.
    pub explicit_dir: String,
    /// Version stamped on documents when no migration is registered.
    pub default_version: u32,
    /// Pretty-print text codecs.
    pub pretty: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            save_dir: PathBuf::from("./saves"),
            explicit_dir: "explicits".to_string(),
            default_version: 1,
            pretty: true,
        }
    }
}

impl Options {
    /// Options rooted at `save_dir`.
    pub fn at(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
            ..Self::default()
        }
    }

    /// Directory holding explicit saves.
    #[must_use]
    pub fn explicit_path(&self) -> PathBuf {
        self.save_dir.join(&self.explicit_dir)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.explicit_dir.is_empty() || self.explicit_dir.contains(['/', '\\']) {
            return Err(SatchelError::Config(format!(
                "explicit_dir must be a single directory name, got `{}`",
                self.explicit_dir
            )));
        }
        if self.default_version == 0 {
            return Err(SatchelError::Config("default_version must be at least 1".into()));
        }
        Ok(())
    }
}
