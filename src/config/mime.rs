//! Extension → content-type lookup for static files.
//!
//! User entries win; anything else is guessed from the extension with
//! `mime_guess`, ending at `application/octet-stream`.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

/// Case-insensitive extension overrides.
#[derive(Debug, Clone, Default)]
pub struct MimeTable {
    overrides: HashMap<String, String>,
}

impl MimeTable {
    /// Build from `(extension, content type)` pairs.
    ///
    /// Extensions may carry a leading dot and any case.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let overrides = entries
            .into_iter()
            .map(|(ext, ty)| (normalize(&ext), ty))
            .collect();
        Self { overrides }
    }

    /// Content type for `path`.
    pub fn content_type(&self, path: &Path) -> Cow<'_, str> {
        let custom = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.overrides.get(&normalize(ext)));

        match custom {
            Some(ty) => Cow::Borrowed(ty.as_str()),
            None => Cow::Owned(mime_guess::from_path(path).first_or_octet_stream().to_string()),
        }
    }

    /// Number of user overrides.
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

fn normalize(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let table = MimeTable::default();
        assert_eq!(table.content_type(Path::new("/site/index.HTML")), "text/html");
        assert_eq!(table.content_type(Path::new("style.Css")), "text/css");
    }

    #[test]
    fn unknown_extension_falls_back() {
        let table = MimeTable::default();
        assert_eq!(table.content_type(Path::new("archive.zzqx")), "application/octet-stream");
        assert_eq!(table.content_type(Path::new("Makefile")), "application/octet-stream");
    }

    #[test]
    fn overrides_win_over_guess() {
        let table = MimeTable::from_entries(vec![(".Foo".to_string(), "application/x-foo".to_string())]);
        assert_eq!(table.content_type(Path::new("a.foo")), "application/x-foo");
        assert_eq!(table.content_type(Path::new("a.png")), "image/png");
    }
}
