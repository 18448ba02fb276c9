//! File templates: root-relative artifact paths built from dataset refs.
//!
//! A template is literal text with `{field}` placeholders. Recognised
//! fields are `datasetType`, `component`, `run`, `id` and any data-id key.
//! Writing `{field:?}` marks a field optional: when the dataset has no value
//! for it the field is dropped together with the literal text in front of it,
//! unless that text ends in `/`.

use std::collections::HashMap;

use dax_config::ConfigTree;
use dax_types::DatasetRef;

use crate::error::{StoreError, StoreResult};

/// Template used when configuration supplies none.
pub const DEFAULT_TEMPLATE: &str = "{run}/{datasetType}/{datasetType}_{component:?}_{id}";

#[derive(Clone, Debug, PartialEq, Eq)]
enum Part {
    Literal(String),
    Field { name: String, optional: bool },
}

/// A parsed path template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileTemplate {
    source: String,
    parts: Vec<Part>,
}

impl FileTemplate {
    /// Parse a template.
    ///
    /// Fails with [`StoreError::InvalidArgument`] for unbalanced braces, an
    /// empty field, or a template that cannot distinguish datasets (it must
    /// use `run` or `id`).
    pub fn parse(source: &str) -> StoreResult<Self> {
        let invalid = |reason: &str| {
            StoreError::InvalidArgument(format!("file template {source:?}: {reason}"))
        };
        let mut parts = Vec::new();
        let mut rest = source;
        while !rest.is_empty() {
            match rest.find(['{', '}']) {
                None => {
                    parts.push(Part::Literal(rest.to_string()));
                    break;
                }
                Some(i) if rest[i..].starts_with('}') => return Err(invalid("unmatched '}'")),
                Some(i) => {
                    if i > 0 {
                        parts.push(Part::Literal(rest[..i].to_string()));
                    }
                    let close = rest[i..].find('}').ok_or_else(|| invalid("unclosed '{'"))? + i;
                    let spec = &rest[i + 1..close];
                    let (name, optional) = match spec.strip_suffix('?') {
                        Some(name) => (name.strip_suffix(':').unwrap_or(name), true),
                        None => (spec, false),
                    };
                    if name.is_empty() || name.contains('{') {
                        return Err(invalid("empty or malformed field"));
                    }
                    parts.push(Part::Field {
                        name: name.to_string(),
                        optional,
                    });
                    rest = &rest[close + 1..];
                }
            }
        }

        let fields: Vec<&str> = parts
            .iter()
            .filter_map(|part| match part {
                Part::Field { name, .. } => Some(name.as_str()),
                Part::Literal(_) => None,
            })
            .collect();
        if fields.is_empty() {
            return Err(invalid("no fields"));
        }
        if !fields.iter().any(|f| *f == "run" || *f == "id") {
            return Err(invalid("must use {run} or {id}"));
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the template names `field`.
    pub fn uses(&self, field: &str) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, Part::Field { name, .. } if name == field))
    }

    fn value(dataset: &DatasetRef, field: &str) -> Option<String> {
        let dataset_type = dataset.dataset_type();
        match field {
            "datasetType" => Some(dataset_type.parent_name().to_string()),
            "component" => dataset_type.component().map(str::to_string),
            "run" => Some(dataset.run().to_string()),
            "id" => Some(dataset.id().to_string()),
            key => dataset.data_id().get(key).cloned(),
        }
        .filter(|v: &String| !v.is_empty())
        .map(|v| v.replace([' ', '/'], "_"))
    }

    /// Root-relative path for `dataset`.
    ///
    /// A component dataset gets `_{component}` appended when the template
    /// does not place the component itself, so components never collide
    /// with their parent. A path with a `.` or `..` segment is rejected, so
    /// every artifact stays under the datastore root.
    pub fn format(&self, dataset: &DatasetRef) -> StoreResult<String> {
        let mut out = String::new();
        // Start of the most recent literal in `out`, if it was the last part.
        let mut last_literal: Option<usize> = None;
        for part in &self.parts {
            match part {
                Part::Literal(text) => {
                    last_literal = Some(out.len());
                    out.push_str(text);
                }
                Part::Field { name, optional } => {
                    match Self::value(dataset, name) {
                        Some(value) => out.push_str(&value),
                        None if *optional => {
                            if let Some(start) = last_literal {
                                if !out.ends_with('/') {
                                    out.truncate(start);
                                }
                            }
                        }
                        None => {
                            return Err(StoreError::InvalidArgument(format!(
                                "template {:?} needs field {name:?}, which {dataset} lacks",
                                self.source
                            )))
                        }
                    }
                    last_literal = None;
                }
            }
        }
        if let (Some(component), false) = (dataset.dataset_type().component(), self.uses("component"))
        {
            out.push('_');
            out.push_str(component);
        }
        if out.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(StoreError::InvalidArgument(format!(
                "path {out:?} for {dataset} has a relative segment"
            )));
        }
        Ok(out)
    }
}

/// Templates per dataset type or storage class, with a default.
#[derive(Clone, Debug)]
pub struct FileTemplates {
    default: FileTemplate,
    by_name: HashMap<String, FileTemplate>,
}

impl FileTemplates {
    pub fn new(default: FileTemplate) -> Self {
        Self {
            default,
            by_name: HashMap::new(),
        }
    }

    /// Read a `templates` node: names map to template strings and the key
    /// `default` sets the fallback.
    pub fn from_config(config: Option<&ConfigTree>) -> StoreResult<Self> {
        let mut templates = Self::new(FileTemplate::parse(DEFAULT_TEMPLATE)?);
        let Some(config) = config else {
            return Ok(templates);
        };
        for (key, value) in config.as_map() {
            let source = value.as_str().ok_or_else(|| {
                StoreError::InvalidArgument(format!("template for {key:?} must be a string"))
            })?;
            let template = FileTemplate::parse(source)?;
            if key == "default" {
                templates.default = template;
            } else {
                templates.by_name.insert(key.clone(), template);
            }
        }
        Ok(templates)
    }

    /// Template for `dataset`: by dataset type name, parent type name,
    /// storage class name, then the default.
    pub fn for_dataset(&self, dataset: &DatasetRef) -> &FileTemplate {
        let dataset_type = dataset.dataset_type();
        [
            dataset_type.name(),
            dataset_type.parent_name(),
            dataset.storage_class().name(),
        ]
        .into_iter()
        .find_map(|key| self.by_name.get(key))
        .unwrap_or(&self.default)
    }
}
