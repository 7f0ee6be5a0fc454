//! Item model and per-kind attribute validation.
//!
//! An item is one unit of declarative configuration (a service, a file, ...)
//! identified by `kind:name`. Item kinds are open-ended: instead of a closed
//! enum, each kind carries an opaque attribute map that is checked by a
//! validator registered in a [`TypeRegistry`]. Validators may also contribute
//! dynamically resolved dependencies (e.g. a service item depending on the
//! file item that holds its init script) via [`AttrValidator::auto_deps`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ErrorCode;

/// Kind used for bookkeeping placeholder items that group bundles together.
///
/// Placeholders participate in ordering like any other item but are excluded
/// from cascade-skip reporting and from attribute validation.
pub const PLACEHOLDER_KIND: &str = "bundle";

// ---------------------------------------------------------------------------
// ItemId
// ---------------------------------------------------------------------------

/// Identity of an item: `kind:name`, unique per node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId {
    pub kind: String,
    pub name: String,
}

impl ItemId {
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Error parsing a `kind:name` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid item ID {input:?}: expected `kind:name`")]
pub struct ParseItemIdError {
    pub input: String,
}

impl FromStr for ItemId {
    type Err = ParseItemIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, name)) if !kind.is_empty() && !name.is_empty() => {
                Ok(Self::new(kind, name))
            }
            _ => Err(ParseItemIdError {
                input: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// One unit of declarative configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    /// Statically declared dependency IDs.
    pub needs: Vec<ItemId>,
    /// Dependencies resolved dynamically by the kind's validator.
    pub resolved_needs: Vec<ItemId>,
    /// Per-kind attribute map; validated by the registered [`AttrValidator`].
    pub attrs: BTreeMap<String, serde_json::Value>,
    /// When this item is skipped, also skip every transitive dependent.
    pub cascade_skip: bool,
    /// IDs whose `triggered` flag is set when this item is fixed.
    pub triggers: Vec<ItemId>,
}

impl Item {
    #[must_use]
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(kind, name),
            needs: Vec::new(),
            resolved_needs: Vec::new(),
            attrs: BTreeMap::new(),
            cascade_skip: true,
            triggers: Vec::new(),
        }
    }

    /// Placeholder item used to anchor bundle-level ordering.
    #[must_use]
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self::new(PLACEHOLDER_KIND, name)
    }

    #[must_use]
    pub fn needs(mut self, deps: impl IntoIterator<Item = ItemId>) -> Self {
        self.needs.extend(deps);
        self
    }

    #[must_use]
    pub fn triggers(mut self, targets: impl IntoIterator<Item = ItemId>) -> Self {
        self.triggers.extend(targets);
        self
    }

    #[must_use]
    pub fn cascade_skip(mut self, cascade: bool) -> Self {
        self.cascade_skip = cascade;
        self
    }

    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// All dependency IDs, static and dynamically resolved.
    #[must_use]
    pub fn deps(&self) -> impl Iterator<Item = &ItemId> {
        self.needs.iter().chain(self.resolved_needs.iter())
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.id.kind == PLACEHOLDER_KIND
    }
}

// ---------------------------------------------------------------------------
// Attribute validation
// ---------------------------------------------------------------------------

/// Attribute validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttrError {
    /// No validator is registered for the item's kind.
    #[error("item {item}: no validator registered for kind {kind:?}")]
    UnknownKind { item: String, kind: String },

    /// A required attribute is missing.
    #[error("item {item}: missing required attribute {key:?}")]
    MissingAttr { item: String, key: String },

    /// An attribute not accepted by the kind was supplied.
    #[error("item {item}: unexpected attribute {key:?}")]
    UnexpectedAttr { item: String, key: String },

    /// The validator rejected an attribute value.
    #[error("item {item}: invalid value for {key:?}: {reason}")]
    InvalidValue {
        item: String,
        key: String,
        reason: String,
    },
}

impl AttrError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownKind { .. } => ErrorCode::UnknownItemKind,
            Self::MissingAttr { .. } | Self::UnexpectedAttr { .. } | Self::InvalidValue { .. } => {
                ErrorCode::AttrValidation
            }
        }
    }
}

/// Per-kind attribute validator and dynamic-dependency resolver.
pub trait AttrValidator: Send + Sync {
    /// Check the item's attribute map against this kind's contract.
    ///
    /// # Errors
    ///
    /// Returns an [`AttrError`] describing the first violation found.
    fn validate(&self, item: &Item) -> Result<(), AttrError>;

    /// Dependencies this item implies beyond its static `needs`.
    ///
    /// Called with the full item set before the graph is built; results land
    /// in [`Item::resolved_needs`]. The default implementation resolves none.
    fn auto_deps(&self, _item: &Item, _all_items: &[Item]) -> Vec<ItemId> {
        Vec::new()
    }
}

/// Validator that checks attribute keys against required/optional sets.
///
/// Required keys must be present; keys outside both sets are rejected.
#[derive(Debug, Default)]
pub struct KeySetValidator {
    required: BTreeSet<String>,
    optional: BTreeSet<String>,
}

impl KeySetValidator {
    #[must_use]
    pub fn new(
        required: impl IntoIterator<Item = &'static str>,
        optional: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            required: required.into_iter().map(str::to_string).collect(),
            optional: optional.into_iter().map(str::to_string).collect(),
        }
    }
}

impl AttrValidator for KeySetValidator {
    fn validate(&self, item: &Item) -> Result<(), AttrError> {
        for key in &self.required {
            if !item.attrs.contains_key(key) {
                return Err(AttrError::MissingAttr {
                    item: item.id.to_string(),
                    key: key.clone(),
                });
            }
        }
        for key in item.attrs.keys() {
            if !self.required.contains(key) && !self.optional.contains(key) {
                return Err(AttrError::UnexpectedAttr {
                    item: item.id.to_string(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Registry of attribute validators, keyed by item kind.
#[derive(Default)]
pub struct TypeRegistry {
    validators: HashMap<String, Box<dyn AttrValidator>>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, validator: Box<dyn AttrValidator>) {
        self.validators.insert(kind.into(), validator);
    }

    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.validators.contains_key(kind)
    }

    /// Validate every item's attributes against its kind's validator.
    ///
    /// Placeholder items are exempt; any other kind without a registered
    /// validator is an error.
    ///
    /// # Errors
    ///
    /// Returns the first [`AttrError`] encountered.
    pub fn validate_items(&self, items: &[Item]) -> Result<(), AttrError> {
        for item in items {
            if item.is_placeholder() {
                continue;
            }
            let validator =
                self.validators
                    .get(&item.id.kind)
                    .ok_or_else(|| AttrError::UnknownKind {
                        item: item.id.to_string(),
                        kind: item.id.kind.clone(),
                    })?;
            validator.validate(item)?;
        }
        Ok(())
    }

    /// Run every kind's `auto_deps` hook and record the results.
    ///
    /// Deduplicates against the item's own ID and its static `needs`, so a
    /// validator may return overlapping sets without inflating the graph.
    pub fn resolve_auto_deps(&self, items: &mut [Item]) {
        let snapshot = items.to_vec();
        for item in &mut *items {
            let Some(validator) = self.validators.get(&item.id.kind) else {
                continue;
            };
            let mut resolved = validator.auto_deps(item, &snapshot);
            resolved.retain(|dep| *dep != item.id && !item.needs.contains(dep));
            resolved.sort();
            resolved.dedup();
            if !resolved.is_empty() {
                debug!(item = %item.id, deps = resolved.len(), "resolved auto deps");
            }
            item.resolved_needs = resolved;
        }
    }
}
