//! Stream name parsing
//!
//! Producers and consumers address streams as `base[.ext][?query]`. Only the
//! base keys the registry; the extension picks a recording format and the
//! query becomes publication or subscription parameters.

use crate::error::{Error, Result};
use crate::media::Properties;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamName {
    pub base: String,
    /// Without the leading dot
    pub extension: Option<String>,
    pub query: Properties,
}

impl StreamName {
    pub fn parse(name: &str) -> Result<Self> {
        let (path, query) = match name.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (name, None),
        };
        let path = path.trim();

        let segment_start = path.rfind('/').map_or(0, |i| i + 1);
        let (base, extension) = match path[segment_start..].rfind('.') {
            Some(dot) if dot > 0 => {
                let dot = segment_start + dot;
                (&path[..dot], Some(&path[dot + 1..]))
            }
            _ => (path, None),
        };
        if base.is_empty() {
            return Err(Error::InvalidStreamName(name.to_string()));
        }

        let mut params = Properties::new();
        if let Some(query) = query {
            params.set_all(url::form_urlencoded::parse(query.as_bytes()).into_owned());
        }

        Ok(Self {
            base: base.to_string(),
            extension: extension.filter(|e| !e.is_empty()).map(str::to_string),
            query: params,
        })
    }
}

impl std::fmt::Display for StreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.extension {
            Some(ext) => write!(f, "{}.{}", self.base, ext),
            None => f.write_str(&self.base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name() {
        let name = StreamName::parse("live").unwrap();
        assert_eq!(name.base, "live");
        assert_eq!(name.extension, None);
        assert!(name.query.is_empty());
    }

    #[test]
    fn test_extension_and_query() {
        let name = StreamName::parse("show.flv?segments=5&title=My%20Show").unwrap();
        assert_eq!(name.base, "show");
        assert_eq!(name.extension.as_deref(), Some("flv"));
        assert_eq!(name.query.get("segments"), Some("5"));
        assert_eq!(name.query.get("title"), Some("My Show"));
        assert_eq!(name.to_string(), "show.flv");
    }

    #[test]
    fn test_dots_in_path_are_not_extensions() {
        let name = StreamName::parse("app.v2/cam").unwrap();
        assert_eq!(name.base, "app.v2/cam");
        assert_eq!(name.extension, None);

        let hidden = StreamName::parse(".ts").unwrap();
        assert_eq!(hidden.base, ".ts");
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            StreamName::parse("?timeout=0"),
            Err(Error::InvalidStreamName(_))
        ));
        assert!(StreamName::parse("  ").is_err());
    }
}
