//! Module defaults and their merging.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::loader::DefaultsDoc;

/// Resolved module defaults.
///
/// Built by folding all collected `modulemd-defaults` documents with
/// [`merge_defaults`]. A default names the stream a module follows when the
/// user has not decided on one, and the profiles installed by default per
/// stream.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Defaults {
    /// The resolved default stream per module.
    streams: BTreeMap<String, String>,
    /// Default profiles per `(module, stream)`.
    profiles: BTreeMap<(String, String), BTreeSet<String>>,
    /// Per-intent default streams: `(module, intent)` to stream.
    intent_streams: BTreeMap<(String, String), String>,
}

impl Defaults {
    /// Returns the default stream of `module`, if one is configured.
    pub fn stream(&self, module: &str) -> Option<&str> {
        self.streams.get(module).map(String::as_str)
    }

    /// Returns the default profiles of `module` for `stream`.
    pub fn profiles(&self, module: &str, stream: &str) -> Vec<String> {
        self.profiles
            .get(&(module.to_string(), stream.to_string()))
            .map(|profiles| profiles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the default stream of `module` under `intent`, if configured.
    ///
    /// An intent stream overrides the plain default stream for installations
    /// that declare the intent.
    pub fn intent_stream(&self, module: &str, intent: &str) -> Option<&str> {
        self.intent_streams
            .get(&(module.to_string(), intent.to_string()))
            .map(String::as_str)
    }

    /// Returns whether no defaults are configured at all.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty() && self.profiles.is_empty() && self.intent_streams.is_empty()
    }
}

/// Merges all collected default documents into resolved [`Defaults`].
///
/// This is a pure fold: per `(module, stream)` profile sets union without
/// conflict; if two documents disagree on the default stream of a module
/// (or of a `(module, intent)` pair), the stream default is dropped entirely
/// and a problem line is recorded. The same rule is applied per intent.
pub(crate) fn merge_defaults(documents: &[DefaultsDoc]) -> (Defaults, Vec<String>) {
    let mut streams: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut intent_streams: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();
    let mut profiles: BTreeMap<(String, String), BTreeSet<String>> = BTreeMap::new();

    for document in documents {
        if document.module.is_empty() {
            continue;
        }
        if let Some(stream) = &document.stream
            && !stream.0.is_empty()
        {
            streams
                .entry(document.module.clone())
                .or_default()
                .insert(stream.0.clone());
        }
        for (stream, stream_profiles) in &document.profiles {
            profiles
                .entry((document.module.clone(), stream.0.clone()))
                .or_default()
                .extend(stream_profiles.iter().cloned());
        }
        for (intent, intent_doc) in &document.intents {
            if let Some(stream) = &intent_doc.stream
                && !stream.0.is_empty()
            {
                intent_streams
                    .entry((document.module.clone(), intent.clone()))
                    .or_default()
                    .insert(stream.0.clone());
            }
            for (stream, stream_profiles) in &intent_doc.profiles {
                profiles
                    .entry((document.module.clone(), stream.0.clone()))
                    .or_default()
                    .extend(stream_profiles.iter().cloned());
            }
        }
    }

    let mut problems = Vec::new();

    let streams = streams
        .into_iter()
        .filter_map(|(module, candidates)| {
            if candidates.len() == 1 {
                return candidates
                    .into_iter()
                    .next()
                    .map(|stream| (module, stream));
            }
            let candidates: Vec<String> = candidates.into_iter().collect();
            problems.push(format!(
                "Conflicting default stream for module '{module}': {}",
                candidates.join(", ")
            ));
            None
        })
        .collect();

    let intent_streams = intent_streams
        .into_iter()
        .filter_map(|((module, intent), candidates)| {
            if candidates.len() == 1 {
                return candidates
                    .into_iter()
                    .next()
                    .map(|stream| ((module, intent), stream));
            }
            let candidates: Vec<String> = candidates.into_iter().collect();
            problems.push(format!(
                "Conflicting default stream for module '{module}' under intent '{intent}': {}",
                candidates.join(", ")
            ));
            None
        })
        .collect();

    (
        Defaults {
            streams,
            profiles,
            intent_streams,
        },
        problems,
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::loader::IntentDoc;
    use crate::loader::Scalar;

    fn document(module: &str, stream: Option<&str>, profiles: &[(&str, &[&str])]) -> DefaultsDoc {
        DefaultsDoc {
            module: module.to_string(),
            stream: stream.map(|stream| Scalar(stream.to_string())),
            profiles: profiles
                .iter()
                .map(|(stream, names)| {
                    (
                        Scalar((*stream).to_string()),
                        names.iter().map(|name| (*name).to_string()).collect(),
                    )
                })
                .collect(),
            intents: BTreeMap::new(),
        }
    }

    #[test]
    fn profiles_union_across_documents() {
        let (defaults, problems) = merge_defaults(&[
            document("httpd", Some("2.4"), &[("2.4", &["default"])]),
            document("httpd", Some("2.4"), &[("2.4", &["doc"])]),
        ]);
        assert!(problems.is_empty());
        assert_eq!(defaults.stream("httpd"), Some("2.4"));
        assert_eq!(
            defaults.profiles("httpd", "2.4"),
            vec!["default".to_string(), "doc".to_string()]
        );
    }

    #[test]
    fn conflicting_default_streams_are_dropped() {
        let (defaults, problems) = merge_defaults(&[
            document("httpd", Some("2.4"), &[]),
            document("httpd", Some("2.2"), &[]),
            document("nodejs", Some("8"), &[]),
        ]);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("httpd"));
        assert_eq!(defaults.stream("httpd"), None);
        assert_eq!(defaults.stream("nodejs"), Some("8"));
    }

    #[test]
    fn intent_streams_override_per_intent() {
        let mut doc = document("postgresql", Some("10"), &[]);
        doc.intents.insert(
            "server".to_string(),
            IntentDoc {
                stream: Some(Scalar("12".to_string())),
                profiles: BTreeMap::new(),
            },
        );
        let (defaults, problems) = merge_defaults(&[doc]);
        assert!(problems.is_empty());
        assert_eq!(defaults.stream("postgresql"), Some("10"));
        assert_eq!(defaults.intent_stream("postgresql", "server"), Some("12"));
        assert_eq!(defaults.intent_stream("postgresql", "desktop"), None);
    }
}
