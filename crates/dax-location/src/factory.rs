//! [`LocationFactory`]: resolves URIs and root-relative paths for one
//! datastore root.

use std::borrow::Cow;

use url::{ParseError, Url};

use crate::error::{LocationError, LocationResult};
use crate::location::{Location, Scheme};

fn decode(raw: &str) -> LocationResult<Cow<'_, str>> {
    urlencoding::decode(raw).map_err(|e| LocationError::InvalidUri {
        uri: raw.to_string(),
        reason: e.to_string(),
    })
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Factory for [`Location`]s under one datastore root.
///
/// The backend scheme is fixed by the root at construction: `s3://bucket/prefix`
/// selects the object store, anything else (a `file://` URI or a plain
/// path) the local filesystem.
#[derive(Clone, Debug)]
pub struct LocationFactory {
    scheme: Scheme,
    root: String,
    bucket: Option<String>,
    base: Url,
}

impl LocationFactory {
    /// Create a factory for the given datastore root.
    ///
    /// Relative filesystem roots are made absolute against the current
    /// directory.
    pub fn new(datastore_root: &str) -> LocationResult<Self> {
        let trimmed = datastore_root.trim();
        if trimmed.is_empty() {
            return Err(LocationError::InvalidArgument(
                "datastore root must not be empty".into(),
            ));
        }
        match Url::parse(trimmed) {
            // Single-letter schemes are Windows drive letters, i.e. paths.
            Ok(url) if url.scheme().len() > 1 => match Scheme::from_name(url.scheme()) {
                Some(Scheme::ObjectStore) => Self::object_store(&url),
                Some(Scheme::File) => Self::filesystem(&decode(url.path())?),
                None => Err(LocationError::UnsupportedScheme(url.scheme().to_string())),
            },
            Ok(_) | Err(ParseError::RelativeUrlWithoutBase) => Self::filesystem(trimmed),
            Err(e) => Err(LocationError::InvalidUri {
                uri: trimmed.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn object_store(url: &Url) -> LocationResult<Self> {
        let bucket = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| {
                LocationError::InvalidArgument(format!("object store root {url} names no bucket"))
            })?
            .to_string();
        let root = segments(&decode(url.path())?).join("/");
        let base = Url::parse(&format!("s3://{bucket}/")).map_err(|e| LocationError::InvalidUri {
            uri: url.to_string(),
            reason: e.to_string(),
        })?;
        tracing::debug!(%bucket, %root, "object store location factory");
        Ok(Self {
            scheme: Scheme::ObjectStore,
            root,
            bucket: Some(bucket),
            base,
        })
    }

    fn filesystem(path: &str) -> LocationResult<Self> {
        let absolute = std::path::absolute(path).map_err(|e| {
            LocationError::InvalidArgument(format!("cannot resolve root {path:?}: {e}"))
        })?;
        let mut root = absolute.to_string_lossy().into_owned();
        while root.len() > 1 && root.ends_with('/') {
            root.pop();
        }
        let base = Url::parse("file:///").map_err(|e| LocationError::InvalidUri {
            uri: "file:///".into(),
            reason: e.to_string(),
        })?;
        tracing::debug!(%root, "filesystem location factory");
        Ok(Self {
            scheme: Scheme::File,
            root,
            bucket: None,
            base,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The datastore root: an absolute directory, or the key prefix inside
    /// the bucket.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    /// URI of the datastore root itself.
    pub fn root_uri(&self) -> String {
        self.build(String::new()).uri().to_string()
    }

    fn build(&self, path_in_store: String) -> Location {
        Location::new(
            self.scheme,
            self.root.clone(),
            self.bucket.clone(),
            path_in_store,
            self.base.clone(),
        )
    }

    /// Path relative to a filesystem root; paths outside the root are
    /// taken as already relative.
    fn relative_to_root<'a>(&self, path: &'a str) -> &'a str {
        if path == self.root {
            return "";
        }
        let under_root = if self.root == "/" {
            Some(path)
        } else {
            path.strip_prefix(self.root.as_str())
                .filter(|rest| rest.starts_with('/'))
        };
        under_root.unwrap_or(path).trim_start_matches('/')
    }

    /// Drop leading repetitions of the object-store root from a key path so
    /// the root is never doubled.
    fn strip_duplicate_root(&self, path: &str) -> String {
        let parts = segments(path);
        let root = segments(&self.root);
        let mut rest = parts.as_slice();
        if !root.is_empty() {
            while rest.starts_with(root.as_slice()) {
                rest = &rest[root.len()..];
            }
        }
        rest.join("/")
    }

    /// Resolve a URI (or a plain path) to a location.
    ///
    /// Fails with [`LocationError::InvalidArgument`] for an empty string and
    /// [`LocationError::SchemeMismatch`] when the URI belongs to another
    /// backend scheme. Object-store URIs are always resolved into the
    /// factory's bucket, and a root prefix already present in the URI path
    /// is collapsed rather than doubled. Query and fragment are kept.
    pub fn from_uri(&self, uri: &str) -> LocationResult<Location> {
        if uri.trim().is_empty() {
            return Err(LocationError::InvalidArgument(
                "URI must be a non-empty string".into(),
            ));
        }
        match Url::parse(uri) {
            Ok(url) if url.scheme().len() > 1 => {
                let scheme = Scheme::from_name(url.scheme())
                    .ok_or_else(|| LocationError::UnsupportedScheme(url.scheme().to_string()))?;
                if scheme != self.scheme {
                    return Err(LocationError::SchemeMismatch {
                        uri: uri.to_string(),
                        expected: self.scheme.to_string(),
                    });
                }
                let path = decode(url.path())?;
                let relative = match scheme {
                    Scheme::File => self.relative_to_root(&path).to_string(),
                    Scheme::ObjectStore => {
                        if url.host_str() != self.bucket.as_deref() {
                            tracing::debug!(
                                uri,
                                bucket = ?self.bucket,
                                "resolving foreign bucket into configured bucket"
                            );
                        }
                        self.strip_duplicate_root(&path)
                    }
                };
                Ok(self
                    .build(relative)
                    .with_query_and_fragment(url.query(), url.fragment()))
            }
            Ok(_) | Err(ParseError::RelativeUrlWithoutBase) => match self.scheme {
                Scheme::File => Ok(self.build(self.relative_to_root(uri).to_string())),
                Scheme::ObjectStore => self.from_path(uri),
            },
            Err(e) => Err(LocationError::InvalidUri {
                uri: uri.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Resolve a root-relative path to a location.
    ///
    /// For an object store, a leading segment equal to the bucket name is
    /// taken as the bucket rather than part of the key.
    pub fn from_path(&self, path: &str) -> LocationResult<Location> {
        match self.scheme {
            Scheme::File => Ok(self.build(path.trim_start_matches('/').to_string())),
            Scheme::ObjectStore => {
                if path.starts_with("s3://") {
                    return self.from_uri(path);
                }
                let trimmed = path.trim_start_matches('/');
                let key = match (trimmed.split_once('/'), self.bucket.as_deref()) {
                    (Some((first, rest)), Some(bucket)) if first == bucket => rest,
                    _ => trimmed,
                };
                Ok(self.build(self.strip_duplicate_root(key)))
            }
        }
    }
}
