//! Per-kind field schema: reference paths, list comparison modes, defaults
//!
//! Paths use a small dotted syntax over the field map. `[]` after a segment
//! visits every element of a list:
//!
//! ```text
//! tags[]                 every element of the `tags` list
//! formatItems[].format   the `format` entry of every `formatItems` element
//! appProfileId           a scalar field
//! ```

use std::collections::BTreeMap;

use crate::kind::ResourceKind;
use crate::value::FieldValue;

/// A field whose values name another resource by natural key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceField {
    pub path: &'static str,
    pub target: ResourceKind,
}

/// How two lists are compared and merged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    /// Same length, element-wise comparison
    Exact,
    /// Order-insensitive comparison of scalar elements
    Set,
    /// Elements are maps identified by the given field; desired elements must
    /// be present, extra live elements are left alone
    Keyed(&'static str),
}

/// One step of a parsed field path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Field(&'a str),
    Each,
}

/// Split a dotted path into segments.
pub fn segments(path: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    for part in path.split('.') {
        match part.strip_suffix("[]") {
            Some(name) => {
                out.push(Segment::Field(name));
                out.push(Segment::Each);
            }
            None => out.push(Segment::Field(part)),
        }
    }
    out
}

const TAGS: ReferenceField = ReferenceField {
    path: "tags[]",
    target: ResourceKind::Tag,
};

impl ResourceKind {
    /// Reference fields declared for this kind
    pub fn reference_fields(&self) -> &'static [ReferenceField] {
        use ResourceKind::*;
        match self {
            Tag | QualityDefinition | MetadataProfile | CustomFormat | AppProfile | Config => &[],
            DownloadClient | IndexerProxy | Application | Notification | ReleaseProfile => {
                &[TAGS]
            }
            Indexer => &[
                TAGS,
                ReferenceField {
                    path: "appProfileId",
                    target: AppProfile,
                },
            ],
            QualityProfile => &[ReferenceField {
                path: "formatItems[].format",
                target: CustomFormat,
            }],
            RootFolder => &[
                ReferenceField {
                    path: "defaultTags[]",
                    target: Tag,
                },
                ReferenceField {
                    path: "defaultQualityProfileId",
                    target: QualityProfile,
                },
                ReferenceField {
                    path: "defaultMetadataProfileId",
                    target: MetadataProfile,
                },
            ],
        }
    }

    /// List comparison mode for the list found at `path`
    ///
    /// `path` uses the same syntax as reference paths, e.g. `formatItems` or
    /// `specifications[].fields`.
    pub fn list_mode(&self, path: &str) -> ListMode {
        use ResourceKind::*;
        match (self, path) {
            (_, "tags") | (RootFolder, "defaultTags") => ListMode::Set,
            (QualityProfile, "formatItems") => ListMode::Keyed("format"),
            _ => ListMode::Exact,
        }
    }

    /// Values applied to every desired declaration that does not set them
    pub fn defaults(&self) -> BTreeMap<String, FieldValue> {
        use ResourceKind::*;
        let mut out = BTreeMap::new();
        match self {
            k if k.is_contract() => {
                out.insert("enable".to_string(), FieldValue::Bool(true));
            }
            AppProfile => {
                for flag in [
                    "enableRss",
                    "enableAutomaticSearch",
                    "enableInteractiveSearch",
                ] {
                    out.insert(flag.to_string(), FieldValue::Bool(true));
                }
                out.insert("minimumSeeders".to_string(), FieldValue::from(1i64));
            }
            _ => {}
        }
        out
    }
}

/// Visit every value found at `path` inside `fields`.
///
/// Missing intermediate fields and type mismatches are skipped silently: a
/// declaration is free to omit optional reference fields.
pub fn visit_path_mut<F>(fields: &mut BTreeMap<String, FieldValue>, path: &str, f: &mut F)
where
    F: FnMut(&mut FieldValue),
{
    let segs = segments(path);
    let Some((Segment::Field(first), rest)) = segs.split_first() else {
        return;
    };
    if let Some(value) = fields.get_mut(*first) {
        visit_value_mut(value, rest, f);
    }
}

fn visit_value_mut<F>(value: &mut FieldValue, segs: &[Segment<'_>], f: &mut F)
where
    F: FnMut(&mut FieldValue),
{
    match segs.split_first() {
        None => f(value),
        Some((Segment::Each, rest)) => {
            if let FieldValue::List(items) = value {
                for item in items {
                    visit_value_mut(item, rest, f);
                }
            }
        }
        Some((Segment::Field(name), rest)) => {
            if let FieldValue::Map(map) = value
                && let Some(inner) = map.get_mut(*name)
            {
                visit_value_mut(inner, rest, f);
            }
        }
    }
}
