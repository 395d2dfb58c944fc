//! Resource identity
//!
//! A [`ResourceName`] is `name[.variant]` plus an optional extension. The
//! extension describes how the file is stored, not which resource it is, so
//! equality, ordering and hashing only consider name and variant. Two
//! manifests that disagree on an extension still talk about the same
//! resource.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of a resource across all manifests
#[derive(Debug, Clone)]
pub struct ResourceName {
    name: String,
    variant: Option<String>,
    extension: Option<String>,
}

impl ResourceName {
    /// Create a resource name
    ///
    /// Empty variant or extension strings are treated as absent.
    pub fn new(
        name: impl Into<String>,
        variant: Option<impl Into<String>>,
        extension: Option<impl Into<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            variant: variant.map(Into::into).filter(|v: &String| !v.is_empty()),
            extension: extension.map(Into::into).filter(|e: &String| !e.is_empty()),
        }
    }

    /// Name without variant or extension
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variant: None,
            extension: None,
        }
    }

    /// Base name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variant, if any
    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    /// Extension, if any
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// `name[.variant]`
    pub fn full_name(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{}.{}", self.name, variant),
            None => self.name.clone(),
        }
    }

    /// `name[.variant][.extension]`, the on-disk file name
    pub fn file_name(&self) -> String {
        let full = self.full_name();
        match &self.extension {
            Some(extension) => format!("{full}.{extension}"),
            None => full,
        }
    }

    /// Copy of this name carrying a different extension
    #[must_use]
    pub fn with_extension(&self, extension: Option<&str>) -> Self {
        Self::new(self.name.clone(), self.variant.clone(), extension)
    }

    /// Whether this resource is usable under `current_variant`
    ///
    /// Resources without a variant are usable everywhere.
    pub fn matches_variant(&self, current_variant: Option<&str>) -> bool {
        match &self.variant {
            None => true,
            Some(variant) => current_variant == Some(variant.as_str()),
        }
    }
}

impl PartialEq for ResourceName {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.variant == other.variant
    }
}

impl Eq for ResourceName {}

impl Hash for ResourceName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.variant.hash(state);
    }
}

impl PartialOrd for ResourceName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ResourceName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(&other.name)
            .then_with(|| self.variant.cmp(&other.variant))
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}
