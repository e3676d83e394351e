//! Platform module detection.

use std::collections::BTreeMap;
use std::fs::read_to_string;
use std::path::PathBuf;

use crate::Error;

/// The module name of the synthesized platform module.
pub(crate) const PLATFORM_NAME: &str = "platform";

/// Reads the platform stream from the first parseable os-release file.
///
/// Missing files are skipped; only a read failure of an existing file is an
/// error. Returns `None` if no file yields a stream.
pub(crate) fn platform_stream(os_release_paths: &[PathBuf]) -> Result<Option<String>, Error> {
    for path in os_release_paths {
        if !path.is_file() {
            continue;
        }
        let content = read_to_string(path).map_err(|source| Error::IoPath {
            path: path.clone(),
            context: "reading an os-release file",
            source,
        })?;
        if let Some(stream) = stream_from_os_release(&content) {
            return Ok(Some(stream));
        }
    }
    Ok(None)
}

/// Extracts the platform stream from os-release data.
///
/// os-release files are `KEY=VALUE` lines with optional single or double
/// quoting. The stream is the `VERSION_ID` value; the `ID` key is parsed but
/// carries no stream information.
fn stream_from_os_release(content: &str) -> Option<String> {
    let mut values: BTreeMap<&str, &str> = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').trim_matches('\'');
        values.insert(key.trim(), value);
    }

    values
        .get("VERSION_ID")
        .filter(|version| !version.is_empty())
        .map(|version| (*version).to_string())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("ID=fedora\nVERSION_ID=26\n", Some("26"))]
    #[case("ID=\"centos\"\nVERSION_ID=\"8\"\n", Some("8"))]
    #[case("# a comment\n\nVERSION_ID='31'\n", Some("31"))]
    #[case("ID=fedora\n", None)]
    #[case("", None)]
    fn stream_extraction(#[case] content: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            stream_from_os_release(content),
            expected.map(str::to_string)
        );
    }

    #[test]
    fn missing_files_are_skipped() {
        let stream = platform_stream(&[PathBuf::from("/does/not/exist")]).unwrap();
        assert_eq!(stream, None);
    }
}
