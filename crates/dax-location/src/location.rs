use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Backend scheme a location belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Local filesystem; the root is a directory.
    File,
    /// Object store; the root is a bucket plus key prefix.
    #[serde(rename = "s3")]
    ObjectStore,
}

impl Scheme {
    /// URI scheme name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::ObjectStore => "s3",
        }
    }

    /// Parse a URI scheme name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "file" => Some(Self::File),
            "s3" => Some(Self::ObjectStore),
            _ => None,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join two `/`-separated path fragments, ignoring empty sides.
pub fn join_path(base: &str, rest: &str) -> String {
    let rest = rest.trim_start_matches('/');
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base.trim_end_matches('/'), rest),
    }
}

/// A resolved, backend-specific address of one dataset artifact.
///
/// Created by a [`LocationFactory`](crate::LocationFactory). Object-store
/// locations also carry the bucket name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    scheme: Scheme,
    root: String,
    bucket: Option<String>,
    path_in_store: String,
    url: Url,
}

impl Location {
    pub(crate) fn new(
        scheme: Scheme,
        root: String,
        bucket: Option<String>,
        path_in_store: String,
        mut url: Url,
    ) -> Self {
        url.set_path(&format!("/{}", join_path(&root, &path_in_store).trim_start_matches('/')));
        Self {
            scheme,
            root,
            bucket,
            path_in_store,
            url,
        }
    }

    pub(crate) fn with_query_and_fragment(mut self, query: Option<&str>, fragment: Option<&str>) -> Self {
        self.url.set_query(query);
        self.url.set_fragment(fragment);
        self
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.url.fragment()
    }

    /// Canonical URI of the location.
    pub fn uri(&self) -> &str {
        self.url.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The datastore root this location was resolved against.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Physical path including the datastore root.
    ///
    /// For the filesystem this is an absolute path; for an object store it
    /// is the object key within the bucket.
    pub fn path(&self) -> String {
        join_path(&self.root, &self.path_in_store)
    }

    /// Path relative to the datastore root.
    pub fn path_in_store(&self) -> &str {
        &self.path_in_store
    }

    /// Bucket name for object-store locations.
    pub fn bucket_name(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// The file extension of the final path segment, including the dot.
    pub fn extension(&self) -> Option<&str> {
        let (_, ext) = split_extension(&self.path_in_store);
        (!ext.is_empty()).then_some(ext)
    }

    /// Replace the file extension in place.
    ///
    /// `None` leaves the location unchanged; an empty string removes any
    /// extension. A leading `.` is added when missing. Only the path
    /// changes: scheme, host, query and fragment are preserved.
    pub fn update_extension(&mut self, ext: Option<&str>) {
        let Some(ext) = ext else {
            return;
        };
        let (stem, _) = split_extension(&self.path_in_store);
        let mut updated = stem.to_string();
        if !ext.is_empty() {
            if !ext.starts_with('.') {
                updated.push('.');
            }
            updated.push_str(ext);
        }
        tracing::trace!(from = %self.path_in_store, to = %updated, "updated extension");
        self.path_in_store = updated;
        let full = join_path(&self.root, &self.path_in_store);
        self.url.set_path(&format!("/{}", full.trim_start_matches('/')));
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uri())
    }
}

/// Split the final segment of `path` into stem and extension (with dot).
/// A leading dot in the file name does not start an extension.
fn split_extension(path: &str) -> (&str, &str) {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    let name = &path[name_start..];
    match name.rfind('.') {
        Some(dot) if dot > 0 => path.split_at(name_start + dot),
        _ => (path, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_ignores_empty_sides() {
        assert_eq!(join_path("/data", "a/b"), "/data/a/b");
        assert_eq!(join_path("/data/", "/a"), "/data/a");
        assert_eq!(join_path("", "a"), "a");
        assert_eq!(join_path("root", ""), "root");
    }

    #[test]
    fn split_extension_handles_hidden_files_and_dirs() {
        assert_eq!(split_extension("a/b.json"), ("a/b", ".json"));
        assert_eq!(split_extension("a.d/b"), ("a.d/b", ""));
        assert_eq!(split_extension("a/.hidden"), ("a/.hidden", ""));
        assert_eq!(split_extension("a/b.tar.gz"), ("a/b.tar", ".gz"));
    }

    #[test]
    fn scheme_names_round_trip() {
        for scheme in [Scheme::File, Scheme::ObjectStore] {
            assert_eq!(Scheme::from_name(scheme.as_str()), Some(scheme));
        }
        assert_eq!(Scheme::from_name("http"), None);
    }
}
