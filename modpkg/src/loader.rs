//! modulemd document schemas and parsing.
//!
//! Repositories ship module metadata as multi-document YAML streams. Three
//! document types are understood: `modulemd` (a module build),
//! `modulemd-defaults` (distribution defaults for a module) and
//! `modulemd-obsoletes` (stream end-of-life markers). Unknown or malformed
//! documents are skipped with a warning; loading only fails on I/O errors.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Formatter;

use log::warn;
use serde::Deserialize;
use serde::Serialize;

/// A YAML scalar coerced to its string form.
///
/// Stream names are frequently written unquoted in modulemd documents
/// (`stream: 2.4`), which YAML types as a number. Accepting any scalar and
/// keeping its textual form sidesteps the problem.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct Scalar(pub(crate) String);

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            String(String),
            Unsigned(u64),
            Signed(i64),
            Float(f64),
            Bool(bool),
        }

        Ok(Scalar(match Raw::deserialize(deserializer)? {
            Raw::String(value) => value,
            Raw::Unsigned(value) => value.to_string(),
            Raw::Signed(value) => value.to_string(),
            Raw::Float(value) => value.to_string(),
            Raw::Bool(value) => value.to_string(),
        }))
    }
}

impl Serialize for Scalar {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single document of a modulemd stream.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "document")]
pub(crate) enum ModuleDocument {
    /// A module build description.
    #[serde(rename = "modulemd")]
    Module {
        /// The schema version of the document.
        version: u64,
        /// The document payload.
        data: ModuleDoc,
    },
    /// Distribution defaults for a module.
    #[serde(rename = "modulemd-defaults")]
    Defaults {
        /// The schema version of the document.
        version: u64,
        /// The document payload.
        data: DefaultsDoc,
    },
    /// A stream end-of-life marker.
    #[serde(rename = "modulemd-obsoletes")]
    Obsoletes {
        /// The schema version of the document.
        version: u64,
        /// The document payload.
        data: ObsoletesDoc,
    },
}

/// The payload of a `modulemd` document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub(crate) struct ModuleDoc {
    pub(crate) name: String,
    pub(crate) stream: Scalar,
    pub(crate) version: u64,
    pub(crate) context: String,
    pub(crate) arch: String,
    pub(crate) static_context: bool,
    pub(crate) summary: String,
    pub(crate) description: String,
    pub(crate) dependencies: Vec<DependencyBlock>,
    pub(crate) profiles: BTreeMap<String, ProfileDoc>,
    pub(crate) artifacts: ArtifactsDoc,
}

/// One dependency block of a `modulemd` document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub(crate) struct DependencyBlock {
    /// Runtime requirements: module name to acceptable streams.
    pub(crate) requires: BTreeMap<String, Vec<Scalar>>,
    /// Build time requirements. Carried for round-trips, ignored otherwise.
    pub(crate) buildrequires: BTreeMap<String, Vec<Scalar>>,
}

/// One profile of a `modulemd` document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub(crate) struct ProfileDoc {
    pub(crate) description: String,
    pub(crate) rpms: Vec<String>,
}

/// The artifacts of a `modulemd` document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub(crate) struct ArtifactsDoc {
    pub(crate) rpms: Vec<String>,
}

/// The payload of a `modulemd-defaults` document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub(crate) struct DefaultsDoc {
    pub(crate) module: String,
    pub(crate) stream: Option<Scalar>,
    /// Default profiles per stream.
    pub(crate) profiles: BTreeMap<Scalar, Vec<String>>,
    /// Per-intent overrides.
    pub(crate) intents: BTreeMap<String, IntentDoc>,
}

/// One intent override of a `modulemd-defaults` document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub(crate) struct IntentDoc {
    pub(crate) stream: Option<Scalar>,
    pub(crate) profiles: BTreeMap<Scalar, Vec<String>>,
}

/// The payload of a `modulemd-obsoletes` document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub(crate) struct ObsoletesDoc {
    pub(crate) module: String,
    pub(crate) stream: Scalar,
    pub(crate) message: String,
    pub(crate) obsoleted_by: Option<ObsoletedByDoc>,
    /// Whether the obsolete resets the module instead of switching it.
    pub(crate) reset: bool,
}

/// The successor named by a `modulemd-obsoletes` document.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub(crate) struct ObsoletedByDoc {
    pub(crate) module: String,
    pub(crate) stream: Scalar,
}

/// Parses all documents of a multi-document modulemd stream.
///
/// Malformed documents are skipped with a warning.
pub(crate) fn parse_documents(input: &str) -> Vec<ModuleDocument> {
    let mut documents = Vec::new();
    for deserializer in serde_norway::Deserializer::from_str(input) {
        match ModuleDocument::deserialize(deserializer) {
            Ok(document) => documents.push(document),
            Err(error) => warn!("Skipping malformed modulemd document: {error}"),
        }
    }
    documents
}

/// Serializes a document back to YAML, without a document separator.
pub(crate) fn to_yaml(document: &ModuleDocument) -> String {
    serde_norway::to_string(document).unwrap_or_else(|error| {
        warn!("Failed to serialize a modulemd document: {error}");
        String::new()
    })
}
