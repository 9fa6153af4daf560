//! The compiled schema model ("application profile").
//!
//! A [`SchemaModel`] maps class ids to [`TypeDef`]s; each type owns the
//! [`AttributeDef`]s declared on it. Inherited attributes are found by
//! hierarchy lookup at read time ([`SchemaModel::find_attribute`]) unless a
//! restriction forced a copy onto the subtype during resolution.
//!
//! Downstream layers (JSON conversion, editing, indexing, permissions) read
//! the model through `has_type`, `get_type`, `TypeDef::get_attribute`,
//! `AttributeDef::get_rule` and the hierarchy queries.

pub mod hierarchy;
pub mod range;
pub mod rules;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

pub use hierarchy::ClassHierarchy;
pub use range::RangeExpr;
pub use rules::{AttributeRule, AttributeRuleKind, TypeRule, TypeRuleKind};

/// Whether a property relates resources to literals or to other resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Datatype,
    Object,
    Unknown,
}

impl std::fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Datatype => write!(f, "datatype"),
            Self::Object => write!(f, "object"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Annotation values keyed by predicate IRI.
pub type Annotations = BTreeMap<String, BTreeSet<String>>;

// ---------------------------------------------------------------------------
// Attribute definition
// ---------------------------------------------------------------------------

/// A property as declared on one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub uri: String,
    pub attribute_id: String,
    /// Class id of the owning type (a back-reference, not ownership).
    pub owner: String,
    pub kind: PropertyKind,
    rules: BTreeMap<AttributeRuleKind, AttributeRule>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
}

impl AttributeDef {
    pub fn new(
        uri: impl Into<String>,
        attribute_id: impl Into<String>,
        owner: impl Into<String>,
        kind: PropertyKind,
    ) -> Self {
        Self {
            uri: uri.into(),
            attribute_id: attribute_id.into(),
            owner: owner.into(),
            kind,
            rules: BTreeMap::new(),
            annotations: Annotations::new(),
        }
    }

    pub fn get_rule(&self, kind: AttributeRuleKind) -> Option<&AttributeRule> {
        self.rules.get(&kind)
    }

    pub fn has_rule(&self, kind: AttributeRuleKind) -> bool {
        self.rules.contains_key(&kind)
    }

    /// All rules in kind order.
    pub fn rules(&self) -> impl Iterator<Item = &AttributeRule> {
        self.rules.values()
    }

    /// Insert a rule, replacing any rule of the same kind.
    pub fn set_rule(&mut self, rule: AttributeRule) -> Option<AttributeRule> {
        self.rules.insert(rule.kind(), rule)
    }

    pub fn remove_rule(&mut self, kind: AttributeRuleKind) -> Option<AttributeRule> {
        self.rules.remove(&kind)
    }

    pub fn range(&self) -> Option<&RangeExpr> {
        match self.rules.get(&AttributeRuleKind::Range) {
            Some(AttributeRule::Range(expr)) => Some(expr),
            _ => None,
        }
    }

    pub fn min_cardinality(&self) -> Option<u32> {
        match self.rules.get(&AttributeRuleKind::MinCardinality) {
            Some(AttributeRule::MinCardinality(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn max_cardinality(&self) -> Option<u32> {
        match self.rules.get(&AttributeRuleKind::MaxCardinality) {
            Some(AttributeRule::MaxCardinality(n)) => Some(*n),
            _ => None,
        }
    }

    /// Raise the lower bound to at least `n`.
    pub fn tighten_min(&mut self, n: u32) {
        let min = self.min_cardinality().map_or(n, |existing| existing.max(n));
        self.set_rule(AttributeRule::MinCardinality(min));
    }

    /// Lower the upper bound to at most `n`.
    pub fn tighten_max(&mut self, n: u32) {
        let max = self.max_cardinality().map_or(n, |existing| existing.min(n));
        self.set_rule(AttributeRule::MaxCardinality(max));
    }

    /// Add super-property IRIs to the `SubPropertyOf` rule.
    pub fn add_super_properties<I: IntoIterator<Item = String>>(&mut self, uris: I) {
        let mut supers = match self.remove_rule(AttributeRuleKind::SubPropertyOf) {
            Some(AttributeRule::SubPropertyOf(set)) => set,
            _ => BTreeSet::new(),
        };
        supers.extend(uris);
        self.set_rule(AttributeRule::SubPropertyOf(supers));
    }

    /// Add equivalent-property IRIs to the `EquivalentProperty` rule.
    pub fn add_equivalent_properties<I: IntoIterator<Item = String>>(&mut self, uris: I) {
        let mut equivalents = match self.remove_rule(AttributeRuleKind::EquivalentProperty) {
            Some(AttributeRule::EquivalentProperty(set)) => set,
            _ => BTreeSet::new(),
        };
        equivalents.extend(uris);
        self.set_rule(AttributeRule::EquivalentProperty(equivalents));
    }

    /// Direct super-property IRIs.
    pub fn super_properties(&self) -> BTreeSet<String> {
        match self.rules.get(&AttributeRuleKind::SubPropertyOf) {
            Some(AttributeRule::SubPropertyOf(set)) => set.clone(),
            _ => BTreeSet::new(),
        }
    }

    /// A copy of this attribute owned by another type, all rules included.
    pub fn clone_onto(&self, owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Type definition
// ---------------------------------------------------------------------------

/// A class of the schema model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub class_id: String,
    pub uri: String,
    rules: BTreeMap<TypeRuleKind, TypeRule>,
    attributes: BTreeMap<String, AttributeDef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
}

impl TypeDef {
    pub fn new(class_id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            class_id: class_id.into(),
            uri: uri.into(),
            rules: BTreeMap::new(),
            attributes: BTreeMap::new(),
            annotations: Annotations::new(),
        }
    }

    pub fn rule(&self, kind: TypeRuleKind) -> Option<&TypeRule> {
        self.rules.get(&kind)
    }

    pub fn rules(&self) -> impl Iterator<Item = &TypeRule> {
        self.rules.values()
    }

    /// Union the rule's ids into the existing rule of the same kind.
    pub fn merge_rule(&mut self, rule: TypeRule) {
        let kind = rule.kind();
        let entry = self
            .rules
            .entry(kind)
            .or_insert_with(|| TypeRule::empty(kind));
        entry.ids_mut().extend(rule.ids().iter().cloned());
    }

    /// Direct superclass ids.
    pub fn super_class_ids(&self) -> BTreeSet<String> {
        self.rule(TypeRuleKind::SubClassOf)
            .map(|r| r.ids().clone())
            .unwrap_or_default()
    }

    /// An attribute declared directly on this type.
    pub fn get_attribute(&self, attribute_id: &str) -> Option<&AttributeDef> {
        self.attributes.get(attribute_id)
    }

    pub fn get_attribute_mut(&mut self, attribute_id: &str) -> Option<&mut AttributeDef> {
        self.attributes.get_mut(attribute_id)
    }

    pub fn has_attribute(&self, attribute_id: &str) -> bool {
        self.attributes.contains_key(attribute_id)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributeDef> {
        self.attributes.values()
    }

    pub fn attributes_mut(&mut self) -> impl Iterator<Item = &mut AttributeDef> {
        self.attributes.values_mut()
    }

    /// Declare an attribute. Returns `false` (and keeps the existing one) if
    /// the id is already taken.
    pub fn add_attribute(&mut self, attribute: AttributeDef) -> bool {
        if self.attributes.contains_key(&attribute.attribute_id) {
            return false;
        }
        self.attributes
            .insert(attribute.attribute_id.clone(), attribute);
        true
    }
}

// ---------------------------------------------------------------------------
// Schema model
// ---------------------------------------------------------------------------

/// The schema compiled from one ontology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaModel {
    pub uri: String,
    type_defs: BTreeMap<String, TypeDef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
    /// Built on the first hierarchy query, dropped by every mutable accessor.
    #[serde(skip)]
    hierarchy_cache: OnceLock<ClassHierarchy>,
}

impl PartialEq for SchemaModel {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
            && self.type_defs == other.type_defs
            && self.annotations == other.annotations
    }
}

impl Eq for SchemaModel {}

impl SchemaModel {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            type_defs: BTreeMap::new(),
            annotations: Annotations::new(),
            hierarchy_cache: OnceLock::new(),
        }
    }

    pub fn has_type(&self, class_id: &str) -> bool {
        self.type_defs.contains_key(class_id)
    }

    pub fn get_type(&self, class_id: &str) -> Option<&TypeDef> {
        self.type_defs.get(class_id)
    }

    pub fn get_type_mut(&mut self, class_id: &str) -> Option<&mut TypeDef> {
        self.hierarchy_cache.take();
        self.type_defs.get_mut(class_id)
    }

    /// Get or create the type with this id. An existing type keeps its uri.
    pub fn ensure_type(&mut self, class_id: &str, uri: &str) -> &mut TypeDef {
        self.hierarchy_cache.take();
        self.type_defs
            .entry(class_id.to_string())
            .or_insert_with(|| TypeDef::new(class_id, uri))
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.type_defs.values()
    }

    pub fn types_mut(&mut self) -> impl Iterator<Item = &mut TypeDef> {
        self.hierarchy_cache.take();
        self.type_defs.values_mut()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = &str> {
        self.type_defs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.type_defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.type_defs.is_empty()
    }

    /// Class id of the type declared with this uri.
    pub fn class_id_for_uri(&self, uri: &str) -> Option<&str> {
        self.type_defs
            .values()
            .find(|t| t.uri == uri)
            .map(|t| t.class_id.as_str())
    }

    /// A fresh hierarchy snapshot, independent of later changes to the model.
    pub fn hierarchy(&self) -> ClassHierarchy {
        self.class_hierarchy().clone()
    }

    /// The hierarchy of the model as it is now, built once until the next
    /// mutable access.
    pub fn class_hierarchy(&self) -> &ClassHierarchy {
        self.hierarchy_cache.get_or_init(|| ClassHierarchy::from_model(self))
    }

    /// Transitive superclass ids of a type.
    pub fn get_super_class_ids(&self, class_id: &str) -> BTreeSet<String> {
        self.class_hierarchy().ancestors(class_id)
    }

    /// Whether `class_id` is `target` or one of its subclasses.
    pub fn conforms_to(&self, class_id: &str, target: &str) -> bool {
        self.class_hierarchy().conforms_to(class_id, target)
    }

    /// An attribute of a type, declared directly or inherited from the
    /// nearest ancestor that declares it.
    pub fn find_attribute(&self, class_id: &str, attribute_id: &str) -> Option<&AttributeDef> {
        let own = self.get_type(class_id)?.get_attribute(attribute_id);
        if own.is_some() {
            return own;
        }
        self.class_hierarchy()
            .ancestors_nearest_first(class_id)
            .iter()
            .filter_map(|ancestor| self.get_type(ancestor))
            .find_map(|t| t.get_attribute(attribute_id))
    }

    /// Every attribute declared with this property uri, in type order.
    pub fn attributes_with_uri<'a>(&'a self, uri: &str) -> impl Iterator<Item = &'a AttributeDef> + use<'a> {
        let uri = uri.to_string();
        self.type_defs
            .values()
            .flat_map(|t| t.attributes())
            .filter(move |a| a.uri == uri)
    }
}
