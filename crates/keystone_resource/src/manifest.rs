//! Resource manifests.
//!
//! A manifest is what an external loader produces after reading a resource
//! directory: the name, where it lives, which file to run first, which
//! script runtime runs it, and what it depends on. Manifests are plain serde
//! structs so loaders can deserialize them straight from JSON.
//!
//! ```
//! use keystone_resource::manifest::ResourceManifest;
//!
//! let manifest = ResourceManifest::from_json(
//!     r#"{ "name": "game", "path": "resources/game", "main": "server.js", "deps": ["auth"] }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(manifest.kind, "js");
//! assert_eq!(manifest.dependencies, vec!["auth"]);
//! ```

use std::path::{Component, Path, PathBuf};

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};

use crate::error::ResourceError;

fn default_kind() -> String {
    "js".to_string()
}

/// Pre-parsed description of a resource, ready for registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceManifest {
    /// Unique resource name.
    pub name: String,
    /// Directory the resource was loaded from.
    pub path: PathBuf,
    /// Entry point, relative to `path`.
    pub main: String,
    /// Script runtime that executes the resource.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// Names of resources that must be started first, in declaration order.
    #[serde(default, rename = "deps", alias = "dependencies")]
    pub dependencies: Vec<String>,
}

impl ResourceManifest {
    /// Creates a manifest for a `js` resource with no dependencies.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, main: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            main: main.into(),
            kind: default_kind(),
            dependencies: Vec::new(),
        }
    }

    /// Sets the script runtime tag.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Appends a dependency.
    #[must_use]
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Parses a manifest from JSON and validates it.
    ///
    /// # Errors
    ///
    /// [`ResourceError::InvalidManifest`] if the document does not parse or
    /// fails [`validate`](Self::validate).
    pub fn from_json(json: &str) -> Result<Self, ResourceError> {
        let manifest: Self = serde_json::from_str(json)
            .map_err(|err| ResourceError::invalid_manifest("<unparsed>", err.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks the manifest for malformed fields.
    ///
    /// # Errors
    ///
    /// [`ResourceError::InvalidManifest`] when the name is empty or contains
    /// path separators or whitespace, the path is empty, `main` is empty or
    /// escapes the resource directory, the type is empty, or a dependency is
    /// empty, repeated, or the resource itself.
    pub fn validate(&self) -> Result<(), ResourceError> {
        let invalid = |reason: String| ResourceError::invalid_manifest(&self.name, reason);

        if !is_valid_name(&self.name) {
            return Err(invalid(format!("malformed name '{}'", self.name)));
        }
        if self.path.as_os_str().is_empty() {
            return Err(invalid("path is empty".to_string()));
        }
        if !is_contained(Path::new(&self.main)) {
            return Err(invalid(format!("malformed main '{}'", self.main)));
        }
        if self.kind.trim().is_empty() {
            return Err(invalid("type is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for dependency in &self.dependencies {
            if !is_valid_name(dependency) {
                return Err(invalid(format!("malformed dependency '{dependency}'")));
            }
            if *dependency == self.name {
                return Err(invalid("resource depends on itself".to_string()));
            }
            if !seen.insert(dependency.as_str()) {
                return Err(invalid(format!("dependency '{dependency}' listed twice")));
            }
        }

        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c == '/' || c == '\\' || c.is_control())
}

/// `main` must name a file inside the resource directory.
fn is_contained(main: &Path) -> bool {
    let mut components = main.components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
