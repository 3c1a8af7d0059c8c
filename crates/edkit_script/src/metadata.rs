//! Script metadata headers
//!
//! ```text
//! /// @name Create circle
//! /// @by someone
//! /// @version 1.2.0
//! ```
//!
//! Header lines may appear anywhere in the file. Problems are collected
//! rather than returned early so every bad line gets reported.

use semver::Version;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptMetadata {
    pub title: String,
    pub author: String,
    pub version: Version,
}

impl ScriptMetadata {
    /// Metadata of a script without any header lines.
    pub fn defaults(file_name: &str) -> Self {
        Self {
            title: file_name.to_owned(),
            author: "[Unknown]".to_owned(),
            version: Version::new(1, 0, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("Script metadata `@{0}` requires a value")]
    MissingValue(&'static str),

    #[error("Script metadata `@version` has invalid value: {0}")]
    InvalidVersion(String),

    #[error("Invalid metadata tag '{0}'")]
    UnknownTag(String),
}

/// Parse the metadata header lines of `source`.
pub fn parse(source: &str, file_name: &str) -> (ScriptMetadata, Vec<MetadataError>) {
    let mut metadata = ScriptMetadata::defaults(file_name);
    let mut errors = Vec::new();

    for (tag, value) in source.lines().filter_map(header_line) {
        match tag {
            "name" => match non_empty(value, "name") {
                Ok(title) => metadata.title = title,
                Err(err) => errors.push(err),
            },
            "by" => match non_empty(value, "by") {
                Ok(author) => metadata.author = author,
                Err(err) => errors.push(err),
            },
            "version" => match parse_version(value) {
                Ok(version) => metadata.version = version,
                Err(err) => errors.push(err),
            },
            other => errors.push(MetadataError::UnknownTag(other.to_owned())),
        }
    }
    (metadata, errors)
}

/// `/// @tag value` -> `(tag, value)`.
fn header_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix("///")?.trim_start();
    let rest = rest.strip_prefix('@')?;
    let tag_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    let (tag, value) = rest.split_at(tag_len);
    Some((tag, value.trim()))
}

fn non_empty(value: &str, tag: &'static str) -> Result<String, MetadataError> {
    if value.is_empty() {
        return Err(MetadataError::MissingValue(tag));
    }
    Ok(value.to_owned())
}

fn parse_version(value: &str) -> Result<Version, MetadataError> {
    let text = value.strip_prefix('v').unwrap_or(value);
    if text.is_empty() {
        return Err(MetadataError::MissingValue("version"));
    }
    Version::parse(text).map_err(|err| MetadataError::InvalidVersion(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_tags() {
        let source = "/// @name Foo\n/// @by Bar\n/// @version 1.2.3\nprint('hi');\n";
        let (metadata, errors) = parse(source, "foo.js");

        assert!(errors.is_empty());
        assert_eq!(metadata.title, "Foo");
        assert_eq!(metadata.author, "Bar");
        assert_eq!(metadata.version, Version::new(1, 2, 3));
    }

    #[test]
    fn missing_tags_use_defaults() {
        let (metadata, errors) = parse("print('no header');", "plain.mjs");
        assert!(errors.is_empty());
        assert_eq!(metadata, ScriptMetadata::defaults("plain.mjs"));
        assert_eq!(metadata.author, "[Unknown]");
    }

    #[test]
    fn accepts_leading_v_and_loose_spacing() {
        let (metadata, errors) = parse("///@version   v2.0.1  \n///    @name   Spaced out  ", "a.js");
        assert!(errors.is_empty());
        assert_eq!(metadata.version, Version::new(2, 0, 1));
        assert_eq!(metadata.title, "Spaced out");
    }

    #[test]
    fn reports_every_problem() {
        let source = "/// @name\n/// @version one\n/// @license MIT\n/// @by Someone\n";
        let (metadata, errors) = parse(source, "bad.js");

        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].to_string(), "Script metadata `@name` requires a value");
        assert!(errors[1]
            .to_string()
            .starts_with("Script metadata `@version` has invalid value: "));
        assert_eq!(errors[2].to_string(), "Invalid metadata tag 'license'");
        assert_eq!(metadata.title, "bad.js");
        assert_eq!(metadata.author, "Someone");
    }

    #[test]
    fn ignores_ordinary_comments() {
        let source = "// @ts-check\n//// not a header\n/// plain doc comment\nconst x = 1; /// @name Late\n";
        let (metadata, errors) = parse(source, "c.js");
        assert!(errors.is_empty());
        assert_eq!(metadata.title, "c.js");
    }
}
