//! Resolver: builds the schema model from the fact store.
//!
//! Resolution runs in fixed stages, each consuming one family of facts:
//!
//! 1. the ontology declaration (exactly one, else fatal)
//! 2. classes, promoting unmatched candidates
//! 3. `subClassOf` / `equivalentClass` / `disjointWith` type rules
//! 4. property stubs, promoting unmatched candidates
//! 5. ranges, property relations and annotations folded into the stubs
//! 6. domain reduction and attachment
//! 7. restrictions, supertypes first, cloning inherited attributes on demand
//! 8. ontology and class annotations
//! 9. stubs that never attached
//!
//! A consumed fact is retired and its source triples are marked processed.
//! A fact that cannot be represented is retired with its reason and recorded
//! in the diagnostics ledger.

use std::collections::{BTreeMap, BTreeSet};

use crate::diagnostics::Diagnostics;
use crate::error::{CompileError, CompileResult};
use crate::classify::is_top;
use crate::facts::{
    ClassExpression, Fact, FactKind, FactRecord, FactStore, Restriction, RestrictionShape,
};
use crate::graph::vocab::{self, rdf};
use crate::graph::{local_name, Node, Triple};
use crate::schema::{
    AttributeDef, AttributeRule, AttributeRuleKind, ClassHierarchy, PropertyKind, RangeExpr,
    SchemaModel, TypeRule,
};

const RESOLVED: &str = "resolved";

/// Resolve a fact store into a schema model.
pub fn resolve(facts: &mut FactStore, diagnostics: &mut Diagnostics) -> CompileResult<SchemaModel> {
    Resolver::new(facts, diagnostics).run()
}

/// A property before it is attached to a type.
#[derive(Debug, Clone)]
struct Stub {
    attribute: AttributeDef,
    /// Source triples of every fact folded into the stub.
    sources: BTreeSet<Triple>,
    /// Named classes mentioned by the property's domain facts.
    domain_candidates: BTreeSet<String>,
    attached: bool,
    reported: bool,
}

/// Single-use resolver state.
pub struct Resolver<'a> {
    facts: &'a mut FactStore,
    diagnostics: &'a mut Diagnostics,
    model: SchemaModel,
    /// Class IRI → class id.
    class_ids: BTreeMap<String, String>,
    /// Property IRI → stub.
    stubs: BTreeMap<String, Stub>,
}

impl<'a> Resolver<'a> {
    pub fn new(facts: &'a mut FactStore, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            facts,
            diagnostics,
            model: SchemaModel::new(""),
            class_ids: BTreeMap::new(),
            stubs: BTreeMap::new(),
        }
    }

    pub fn run(mut self) -> CompileResult<SchemaModel> {
        self.ontology()?;
        self.classes()?;
        self.type_rules()?;
        self.property_stubs()?;
        self.fold_property_facts()?;
        self.attach_domains()?;
        self.restrictions()?;
        self.annotations()?;
        self.unattached()?;
        self.leftovers()?;
        tracing::info!(
            types = self.model.len(),
            attributes = self.model.types().map(|t| t.attributes().count()).sum::<usize>(),
            retired = self.facts.retired_count(),
            "resolution complete"
        );
        Ok(self.model)
    }

    // -- bookkeeping ----------------------------------------------------------

    fn records(&self, kind: FactKind) -> Vec<FactRecord> {
        self.facts.of_kind(kind).into_iter().cloned().collect()
    }

    /// Consume a fact into the model.
    fn consume(&mut self, record: &FactRecord) -> CompileResult<()> {
        self.diagnostics.mark_processed(&record.sources);
        self.facts.retire(record.id, RESOLVED)
    }

    /// Reject a fact: record it as unresolved and retire it with the reason.
    fn reject(&mut self, record: &FactRecord, reason: String) -> CompileResult<()> {
        self.diagnostics
            .unresolved(reason.clone(), record.sources.iter().cloned());
        self.facts.retire(record.id, reason)
    }

    /// Consume a fact into a property stub; its triples are only marked
    /// processed once the stub attaches.
    fn fold(&mut self, record: &FactRecord) -> CompileResult<()> {
        if let Some(stub) = record.fact.property().and_then(|p| self.stubs.get_mut(p)) {
            stub.sources.extend(record.sources.iter().cloned());
        }
        self.facts.retire(record.id, "folded into property")
    }

    // -- 1. ontology ----------------------------------------------------------

    fn ontology(&mut self) -> CompileResult<()> {
        let declarations = self.records(FactKind::OntologyDeclaration);
        let record = match declarations.as_slice() {
            [] => return Err(CompileError::MissingOntology),
            [one] => one.clone(),
            many => {
                let uris: Vec<String> = many
                    .iter()
                    .filter_map(|r| match &r.fact {
                        Fact::OntologyDeclaration { uri } => Some(format!("<{uri}>")),
                        _ => None,
                    })
                    .collect();
                return Err(CompileError::MultipleOntologies {
                    count: many.len(),
                    uris: uris.join(", "),
                });
            }
        };
        if let Fact::OntologyDeclaration { uri } = &record.fact {
            self.model.uri = uri.clone();
        }
        self.consume(&record)
    }

    // -- 2. classes -----------------------------------------------------------

    fn classes(&mut self) -> CompileResult<()> {
        let strong: BTreeSet<String> = self
            .records(FactKind::ClassReference)
            .into_iter()
            .filter_map(|r| match r.fact {
                Fact::ClassReference { uri } => Some(uri),
                _ => None,
            })
            .collect();
        for record in self.records(FactKind::ClassReferenceCandidate) {
            let Fact::ClassReferenceCandidate { uri } = &record.fact else {
                continue;
            };
            if strong.contains(uri) {
                self.facts.retire(record.id, "superseded by class reference")?;
            } else {
                self.facts
                    .derive(Fact::ClassReference { uri: uri.clone() }, &[record.id])?;
                self.facts.retire(record.id, "promoted to class reference")?;
            }
        }

        for record in self.records(FactKind::ClassReference) {
            let Fact::ClassReference { uri } = &record.fact else {
                continue;
            };
            match self.ensure_class(uri) {
                Ok(id) => {
                    let markers: BTreeSet<String> = record
                        .sources
                        .iter()
                        .filter(|t| t.predicate == rdf::TYPE)
                        .filter_map(|t| t.object.as_iri().map(str::to_string))
                        .collect();
                    if let Some(type_def) = self.model.get_type_mut(&id).filter(|_| !markers.is_empty()) {
                        type_def.merge_rule(TypeRule::OntologyType(markers));
                    }
                    self.consume(&record)?;
                }
                Err(reason) => self.reject(&record, reason)?,
            }
        }
        Ok(())
    }

    /// The class id for a class IRI, creating the type on first reference.
    fn ensure_class(&mut self, uri: &str) -> Result<String, String> {
        if let Some(id) = self.class_ids.get(uri) {
            return Ok(id.clone());
        }
        let id = local_name(uri).to_string();
        if id.is_empty() {
            return Err(format!("class <{uri}> has no local name"));
        }
        if let Some(existing) = self.model.get_type(&id) {
            return Err(format!(
                "class id collision: {id} is both <{}> and <{uri}>",
                existing.uri
            ));
        }
        tracing::debug!(%id, %uri, "type created");
        self.model.ensure_type(&id, uri);
        self.class_ids.insert(uri.to_string(), id.clone());
        Ok(id)
    }

    // -- 3. type rules --------------------------------------------------------

    fn type_rules(&mut self) -> CompileResult<()> {
        for kind in [FactKind::SubClassOf, FactKind::EquivalentClass, FactKind::DisjointWith] {
            for record in self.records(kind) {
                let (class, other) = match &record.fact {
                    Fact::SubClassOf { class, super_class } => (class, super_class),
                    Fact::EquivalentClass { class, other } | Fact::DisjointWith { class, other } => {
                        (class, other)
                    }
                    _ => continue,
                };
                if vocab::is_top_class(other) {
                    self.consume(&record)?;
                    continue;
                }
                let ids = self.ensure_class(class).and_then(|sub| {
                    self.ensure_class(other).map(|sup| (sub, sup))
                });
                let (sub, sup) = match ids {
                    Ok(ids) => ids,
                    Err(reason) => {
                        self.reject(&record, reason)?;
                        continue;
                    }
                };
                let rule_ids = BTreeSet::from([sup]);
                let rule = match kind {
                    FactKind::SubClassOf => TypeRule::SubClassOf(rule_ids),
                    FactKind::EquivalentClass => TypeRule::EquivalentClass(rule_ids),
                    _ => TypeRule::DisjointWith(rule_ids),
                };
                if let Some(type_def) = self.model.get_type_mut(&sub) {
                    type_def.merge_rule(rule);
                }
                self.consume(&record)?;
            }
        }
        Ok(())
    }

    // -- 4. property stubs ----------------------------------------------------

    fn property_stubs(&mut self) -> CompileResult<()> {
        let strong: BTreeSet<String> = self
            .records(FactKind::PropertyReference)
            .into_iter()
            .filter_map(|r| r.fact.property().map(str::to_string))
            .collect();
        for record in self.records(FactKind::PropertyReferenceCandidate) {
            let Fact::PropertyReferenceCandidate { uri } = &record.fact else {
                continue;
            };
            if strong.contains(uri) {
                self.facts.retire(record.id, "superseded by property reference")?;
            } else {
                self.facts.derive(
                    Fact::PropertyReference {
                        uri: uri.clone(),
                        kind: PropertyKind::Unknown,
                    },
                    &[record.id],
                )?;
                self.facts.retire(record.id, "promoted to property reference")?;
            }
        }

        for record in self.records(FactKind::PropertyReference) {
            let Fact::PropertyReference { uri, kind } = &record.fact else {
                continue;
            };
            let id = local_name(uri);
            if id.is_empty() {
                self.reject(&record, format!("property <{uri}> has no local name"))?;
                continue;
            }
            self.stubs.insert(
                uri.clone(),
                Stub {
                    attribute: AttributeDef::new(uri.as_str(), id, "", *kind),
                    sources: BTreeSet::new(),
                    domain_candidates: BTreeSet::new(),
                    attached: false,
                    reported: false,
                },
            );
            self.fold(&record)?;
        }
        Ok(())
    }

    // -- 5. ranges and property relations ---------------------------------------

    fn fold_property_facts(&mut self) -> CompileResult<()> {
        let hierarchy = self.model.hierarchy();

        let mut ranges: BTreeMap<String, Vec<FactRecord>> = BTreeMap::new();
        for record in self.records(FactKind::PropertyRange) {
            if let Some(property) = record.fact.property() {
                ranges.entry(property.to_string()).or_default().push(record);
            }
        }
        for (property, records) in ranges {
            self.fold_ranges(&property, &records, &hierarchy)?;
        }

        for kind in [
            FactKind::SubPropertyOf,
            FactKind::InverseOf,
            FactKind::EquivalentProperty,
            FactKind::Functional,
        ] {
            for record in self.records(kind) {
                let Some(stub) = record.fact.property().and_then(|p| self.stubs.get_mut(p)) else {
                    self.reject(&record, format!("{} on an undeclared property", record.fact))?;
                    continue;
                };
                let attribute = &mut stub.attribute;
                match &record.fact {
                    Fact::SubPropertyOf { super_property, .. } => {
                        attribute.add_super_properties([super_property.clone()]);
                    }
                    Fact::EquivalentProperty { other, .. } => {
                        attribute.add_equivalent_properties([other.clone()]);
                    }
                    Fact::Functional { .. } => attribute.tighten_max(1),
                    Fact::InverseOf { inverse, .. } => {
                        let conflict = match attribute.get_rule(AttributeRuleKind::InverseOf) {
                            Some(AttributeRule::InverseOf(existing)) if existing != inverse => {
                                Some(existing.clone())
                            }
                            _ => None,
                        };
                        match conflict {
                            Some(existing) => {
                                let reason = format!(
                                    "conflicting inverseOf for {}: keeping <{existing}>, ignoring <{inverse}>",
                                    attribute.attribute_id
                                );
                                self.diagnostics
                                    .warning(reason, record.sources.iter().cloned());
                            }
                            None => {
                                attribute.set_rule(AttributeRule::InverseOf(inverse.clone()));
                            }
                        }
                    }
                    _ => {}
                }
                self.fold(&record)?;
            }
        }

        // Annotations on properties travel with the attribute.
        for record in self.records(FactKind::Extra) {
            let Fact::Extra {
                subject: Node::Named(subject),
                predicate,
                value,
            } = &record.fact
            else {
                continue;
            };
            if !vocab::is_annotation_predicate(predicate) {
                continue;
            }
            let Some(stub) = self.stubs.get_mut(subject) else {
                continue;
            };
            stub.attribute
                .annotations
                .entry(predicate.clone())
                .or_default()
                .insert(annotation_value(value));
            stub.sources.extend(record.sources.iter().cloned());
            self.facts.retire(record.id, "folded into property")?;
        }
        Ok(())
    }

    fn fold_ranges(
        &mut self,
        property: &str,
        records: &[FactRecord],
        hierarchy: &ClassHierarchy,
    ) -> CompileResult<()> {
        if !self.stubs.contains_key(property) {
            for record in records {
                self.reject(record, format!("range of undeclared property <{property}>"))?;
            }
            return Ok(());
        }
        let mut resolved: Vec<RangeExpr> = Vec::new();
        for record in records {
            let Fact::PropertyRange { range, .. } = &record.fact else {
                continue;
            };
            match self.resolve_range(range) {
                Ok(Some(expr)) => {
                    if !resolved.contains(&expr) {
                        resolved.push(expr);
                    }
                }
                Ok(None) => {}
                Err(reason) => {
                    let reason = format!("unconvertible range for {}: {reason}", local_name(property));
                    self.reject(record, reason)?;
                    continue;
                }
            }
            self.fold(record)?;
        }

        let range = match resolved.len() {
            0 => return Ok(()),
            1 => resolved.pop(),
            _ => most_specific_class(&resolved, hierarchy).map(RangeExpr::class),
        };
        let Some(stub) = self.stubs.get_mut(property) else {
            return Ok(());
        };
        match range {
            Some(range) => {
                if stub.attribute.kind == PropertyKind::Unknown {
                    stub.attribute.kind = kind_from_range(&range);
                }
                stub.attribute.set_rule(AttributeRule::Range(range));
            }
            None => {
                let listed: Vec<String> = resolved.iter().map(ToString::to_string).collect();
                let reason = format!(
                    "ambiguous range for {}: {}",
                    stub.attribute.attribute_id,
                    listed.join(", ")
                );
                let sources: Vec<Triple> = records
                    .iter()
                    .flat_map(|r| r.sources.iter().cloned())
                    .collect();
                // The folded range triples must not count as processed.
                for triple in &sources {
                    stub.sources.remove(triple);
                }
                self.diagnostics.unresolved(reason, sources);
            }
        }
        Ok(())
    }

    /// Resolve a class expression into a range. `None` means no constraint.
    fn resolve_range(&self, expr: &ClassExpression) -> Result<Option<RangeExpr>, String> {
        Ok(match expr {
            top if is_top(top) => None,
            ClassExpression::Named(iri) if vocab::is_datatype_iri(iri) => {
                Some(RangeExpr::datatype(iri.as_str()))
            }
            ClassExpression::Named(iri) => Some(match self.class_ids.get(iri) {
                Some(id) => RangeExpr::class(id.as_str()),
                None => RangeExpr::resource(iri.as_str()),
            }),
            ClassExpression::Union(ops) => {
                let mut out = Vec::with_capacity(ops.len());
                for op in ops {
                    match self.resolve_range(op)? {
                        Some(expr) => out.push(expr),
                        // A union with the top class is the top class.
                        None => return Ok(None),
                    }
                }
                Some(RangeExpr::Or(out))
            }
            ClassExpression::Intersection(ops) => {
                let mut out = Vec::with_capacity(ops.len());
                for op in ops {
                    if let Some(expr) = self.resolve_range(op)? {
                        out.push(expr);
                    }
                }
                match out.len() {
                    0 => None,
                    1 => out.pop(),
                    _ => Some(RangeExpr::And(out)),
                }
            }
            ClassExpression::Complement(inner) => match self.resolve_range(inner)? {
                Some(expr) => Some(RangeExpr::Not(Box::new(expr))),
                None => return Err("complement of the top class".into()),
            },
            ClassExpression::OneOf(nodes) => {
                let mut out = Vec::with_capacity(nodes.len());
                for node in nodes {
                    match node.as_iri() {
                        Some(iri) => out.push(RangeExpr::resource(iri)),
                        None => return Err(format!("enumeration member {node} is not a resource")),
                    }
                }
                Some(RangeExpr::Or(out))
            }
            ClassExpression::Unsupported { node, reason } => {
                return Err(format!("{node}: {reason}"));
            }
        })
    }

    // -- 6. domains -----------------------------------------------------------

    fn attach_domains(&mut self) -> CompileResult<()> {
        let hierarchy = self.model.hierarchy();
        let mut domains: BTreeMap<String, Vec<FactRecord>> = BTreeMap::new();
        for record in self.records(FactKind::PropertyDomain) {
            if let Some(property) = record.fact.property() {
                domains.entry(property.to_string()).or_default().push(record);
            }
        }

        for (property, records) in domains {
            if !self.stubs.contains_key(&property) {
                for record in &records {
                    self.reject(record, format!("domain of undeclared property <{property}>"))?;
                }
                continue;
            }
            let mut reduced: Vec<String> = Vec::new();
            let mut failure: Option<String> = None;
            let mut candidates = BTreeSet::new();
            for record in &records {
                let Fact::PropertyDomain { domain, .. } = &record.fact else {
                    continue;
                };
                collect_named(domain, &mut candidates);
                match self.reduce_domain(domain, &hierarchy) {
                    Ok(Some(id)) => reduced.push(id),
                    Ok(None) => {}
                    Err(reason) => failure = failure.or(Some(reason)),
                }
                self.fold(record)?;
            }
            if let Some(stub) = self.stubs.get_mut(&property) {
                stub.domain_candidates = candidates
                    .iter()
                    .map(|iri| local_name(iri).to_string())
                    .collect();
            }

            let target = match failure {
                Some(reason) => Err(reason),
                None if reduced.is_empty() => Ok(None),
                None => match most_specific(&reduced, &hierarchy) {
                    Some(id) => Ok(Some(id)),
                    None => Err(format!(
                        "several domains with no common subclass ({})",
                        reduced.join(", ")
                    )),
                },
            };
            match target {
                Ok(Some(owner)) => self.attach(&property, &owner)?,
                Ok(None) => {}
                Err(reason) => self.report_stub(&property, "ambiguous domain", &reason),
            }
        }
        Ok(())
    }

    /// Reduce a domain expression to one class id. `None` means no constraint.
    fn reduce_domain(
        &mut self,
        expr: &ClassExpression,
        hierarchy: &ClassHierarchy,
    ) -> Result<Option<String>, String> {
        match expr {
            top if is_top(top) => Ok(None),
            ClassExpression::Named(iri) => self.ensure_class(iri).map(Some),
            ClassExpression::Union(ops) => {
                let mut ids = Vec::new();
                for op in ops {
                    match self.reduce_domain(op, hierarchy)? {
                        Some(id) => ids.push(id),
                        None => return Ok(None),
                    }
                }
                most_general(&ids, hierarchy).map(Some).ok_or_else(|| {
                    format!("union of unrelated classes ({})", ids.join(", "))
                })
            }
            ClassExpression::Intersection(ops) => {
                let mut ids = Vec::new();
                for op in ops {
                    if let Some(id) = self.reduce_domain(op, hierarchy)? {
                        ids.push(id);
                    }
                }
                if ids.is_empty() {
                    return Ok(None);
                }
                most_specific(&ids, hierarchy).map(Some).ok_or_else(|| {
                    format!("intersection of unrelated classes ({})", ids.join(", "))
                })
            }
            other => Err(format!("unsupported domain expression {other}")),
        }
    }

    fn attach(&mut self, property: &str, owner: &str) -> CompileResult<()> {
        let Some(stub) = self.stubs.get(property) else {
            return Ok(());
        };
        let attribute = stub.attribute.clone_onto(owner);
        let attribute_id = attribute.attribute_id.clone();
        let added = self
            .model
            .get_type_mut(owner)
            .is_some_and(|t| t.add_attribute(attribute));
        if !added {
            let reason = format!("attribute id {attribute_id} is already declared on {owner}");
            self.report_stub(property, "attribute collision", &reason);
            return Ok(());
        }
        tracing::debug!(%attribute_id, %owner, "attribute attached");
        if let Some(stub) = self.stubs.get_mut(property) {
            stub.attached = true;
            self.diagnostics.mark_processed(&stub.sources);
        }
        Ok(())
    }

    /// One ledger entry for a stub, carrying every fact folded into it.
    fn report_stub(&mut self, property: &str, what: &str, why: &str) {
        if let Some(stub) = self.stubs.get_mut(property) {
            stub.reported = true;
            let reason = format!("{what} for {}: {why}", stub.attribute.attribute_id);
            self.diagnostics
                .unresolved(reason, stub.sources.iter().cloned());
        }
    }

    // -- 7. restrictions ------------------------------------------------------

    fn restrictions(&mut self) -> CompileResult<()> {
        let hierarchy = self.model.hierarchy();
        let mut records: Vec<(usize, Restriction, FactRecord)> = self
            .facts
            .assignable_to(FactKind::Restriction)
            .into_iter()
            .filter_map(|record| match &record.fact {
                Fact::Restriction(r) => {
                    let depth = self
                        .class_ids
                        .get(&r.on_type)
                        .map_or(0, |id| hierarchy.depth(id));
                    Some((depth, r.clone(), record.clone()))
                }
                _ => None,
            })
            .collect();
        // Supertypes first, so inherited clones carry their ancestors' restrictions.
        // Within a depth the restriction itself is the key: fact ids follow
        // blank-node labels, which change from parse to parse.
        records.sort_by(|(da, ra, a), (db, rb, b)| (da, ra, a.id).cmp(&(db, rb, b.id)));

        for (_, restriction, record) in &records {
            let Some(type_id) = self.class_ids.get(&restriction.on_type).cloned() else {
                self.reject(
                    record,
                    format!("restriction on unresolved class <{}>", restriction.on_type),
                )?;
                continue;
            };
            let attribute_id = local_name(&restriction.on_property).to_string();
            if !self.materialize(&type_id, &attribute_id, &hierarchy) {
                let domains = self
                    .stubs
                    .get(&restriction.on_property)
                    .map(|s| s.domain_candidates.clone())
                    .unwrap_or_default();
                let supers = hierarchy.ancestors(&type_id);
                let reason = format!(
                    "{} on {type_id}.{attribute_id} has no compatible attribute \
                     (candidate domains: [{}], superclasses: [{}])",
                    shape_name(&restriction.shape),
                    join(&domains),
                    join(&supers),
                );
                self.reject(record, reason)?;
                continue;
            }
            match self.apply_shape(&type_id, &attribute_id, &restriction.shape) {
                Ok(()) => self.consume(record)?,
                Err(reason) => self.reject(
                    record,
                    format!("{} on {type_id}.{attribute_id}: {reason}", shape_name(&restriction.shape)),
                )?,
            }
        }
        Ok(())
    }

    /// Make sure `type_id` declares `attribute_id`, copying it from the nearest
    /// ancestor that does. Returns `false` if no ancestor declares it.
    fn materialize(&mut self, type_id: &str, attribute_id: &str, hierarchy: &ClassHierarchy) -> bool {
        let Some(type_def) = self.model.get_type(type_id) else {
            return false;
        };
        if type_def.has_attribute(attribute_id) {
            return true;
        }
        let inherited = hierarchy
            .ancestors_nearest_first(type_id)
            .iter()
            .filter_map(|ancestor| self.model.get_type(ancestor))
            .find_map(|t| t.get_attribute(attribute_id))
            .cloned();
        match inherited {
            Some(attribute) => {
                tracing::debug!(%attribute_id, from = %attribute.owner, to = %type_id, "attribute materialized");
                self.model
                    .get_type_mut(type_id)
                    .is_some_and(|t| t.add_attribute(attribute.clone_onto(type_id)))
            }
            None => false,
        }
    }

    fn apply_shape(
        &mut self,
        type_id: &str,
        attribute_id: &str,
        shape: &RestrictionShape,
    ) -> Result<(), String> {
        // Ranges are resolved before the attribute is borrowed mutably.
        let value_range = match shape {
            RestrictionShape::SomeValuesFrom(expr) | RestrictionShape::AllValuesFrom(expr) => {
                self.resolve_range(expr)?
            }
            RestrictionShape::QualifiedCardinality { qualification, .. }
            | RestrictionShape::MinQualifiedCardinality { qualification, .. }
            | RestrictionShape::MaxQualifiedCardinality { qualification, .. } => {
                self.resolve_range(qualification)?
            }
            _ => None,
        };
        let Some(attribute) = self
            .model
            .get_type_mut(type_id)
            .and_then(|t| t.get_attribute_mut(attribute_id))
        else {
            return Err("attribute disappeared".into());
        };

        match (shape, value_range) {
            (RestrictionShape::HasValue(value), _) => {
                if let Some(AttributeRule::HasValue(existing)) = attribute.get_rule(AttributeRuleKind::HasValue) {
                    if existing != value {
                        return Err(format!("conflicting hasValue {existing} and {value}"));
                    }
                }
                attribute.set_rule(AttributeRule::HasValue(value.clone()));
            }
            (RestrictionShape::SomeValuesFrom(_), None) => attribute.tighten_min(1),
            (RestrictionShape::SomeValuesFrom(_), Some(range)) => {
                let merged = match attribute.remove_rule(AttributeRuleKind::SomeValuesFrom) {
                    Some(AttributeRule::SomeValuesFrom(existing)) => existing.and(range),
                    _ => range,
                };
                attribute.set_rule(AttributeRule::SomeValuesFrom(merged));
            }
            (RestrictionShape::AllValuesFrom(_), None) => {}
            (RestrictionShape::AllValuesFrom(_), Some(range)) => {
                let merged = match attribute.remove_rule(AttributeRuleKind::AllValuesFrom) {
                    Some(AttributeRule::AllValuesFrom(existing)) => existing.and(range),
                    _ => range,
                };
                attribute.set_rule(AttributeRule::AllValuesFrom(merged));
            }
            (RestrictionShape::ExactCardinality(n), _) => set_exact(attribute, *n),
            (RestrictionShape::MinCardinality(n), _) => attribute.tighten_min(*n),
            (RestrictionShape::MaxCardinality(n), _) => attribute.tighten_max(*n),
            // A qualification of the top class qualifies nothing.
            (RestrictionShape::QualifiedCardinality { count, .. }, None) => set_exact(attribute, *count),
            (RestrictionShape::MinQualifiedCardinality { count, .. }, None) => attribute.tighten_min(*count),
            (RestrictionShape::MaxQualifiedCardinality { count, .. }, None) => attribute.tighten_max(*count),
            (RestrictionShape::QualifiedCardinality { count, .. }, Some(q)) => {
                set_qualified(attribute, AttributeRuleKind::QualifiedCardinality, *count, q)?
            }
            (RestrictionShape::MinQualifiedCardinality { count, .. }, Some(q)) => {
                set_qualified(attribute, AttributeRuleKind::MinQualifiedCardinality, *count, q)?
            }
            (RestrictionShape::MaxQualifiedCardinality { count, .. }, Some(q)) => {
                set_qualified(attribute, AttributeRuleKind::MaxQualifiedCardinality, *count, q)?
            }
        }
        Ok(())
    }

    // -- 8. annotations -------------------------------------------------------

    fn annotations(&mut self) -> CompileResult<()> {
        for record in self.records(FactKind::Extra) {
            let Fact::Extra {
                subject,
                predicate,
                value,
            } = &record.fact
            else {
                continue;
            };
            let subject_iri = subject.as_iri().unwrap_or_default();
            if vocab::is_annotation_predicate(predicate) {
                let target = if subject_iri == self.model.uri {
                    Some(&mut self.model.annotations)
                } else {
                    self.class_ids
                        .get(subject_iri)
                        .and_then(|id| self.model.get_type_mut(id))
                        .map(|t| &mut t.annotations)
                };
                if let Some(annotations) = target {
                    annotations
                        .entry(predicate.clone())
                        .or_default()
                        .insert(annotation_value(value));
                    self.consume(&record)?;
                    continue;
                }
            }
            self.reject(&record, format!("unrecognized predicate <{predicate}>"))?;
        }
        Ok(())
    }

    // -- 9. unattached properties ------------------------------------------------

    fn unattached(&mut self) -> CompileResult<()> {
        let pending: Vec<String> = self
            .stubs
            .iter()
            .filter(|(_, s)| !s.attached && !s.reported)
            .map(|(uri, _)| uri.clone())
            .collect();
        for uri in pending {
            self.report_stub(&uri, "unattached property", "no domain resolves to a type");
        }
        Ok(())
    }

    /// Any fact still active was not understood by a stage; report it.
    fn leftovers(&mut self) -> CompileResult<()> {
        let leftover: Vec<FactRecord> = self.facts.active_records().cloned().collect();
        for record in leftover {
            let reason = format!("unconsumed fact: {}", record.fact);
            self.reject(&record, reason)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn set_exact(attribute: &mut AttributeDef, n: u32) {
    let conflicting = matches!(
        attribute.get_rule(AttributeRuleKind::ExactCardinality),
        Some(AttributeRule::ExactCardinality(existing)) if *existing != n
    );
    if conflicting {
        // Two exact bounds: keep the new one as the tightest min/max.
        attribute.tighten_min(n);
        attribute.tighten_max(n);
    } else {
        attribute.set_rule(AttributeRule::ExactCardinality(n));
    }
}

fn set_qualified(
    attribute: &mut AttributeDef,
    kind: AttributeRuleKind,
    count: u32,
    qualification: RangeExpr,
) -> Result<(), String> {
    let rule = |count: u32, qualification: RangeExpr| match kind {
        AttributeRuleKind::MinQualifiedCardinality => {
            AttributeRule::MinQualifiedCardinality { count, qualification }
        }
        AttributeRuleKind::MaxQualifiedCardinality => {
            AttributeRule::MaxQualifiedCardinality { count, qualification }
        }
        _ => AttributeRule::QualifiedCardinality { count, qualification },
    };
    let existing = match attribute.get_rule(kind) {
        Some(
            AttributeRule::QualifiedCardinality { count, qualification }
            | AttributeRule::MinQualifiedCardinality { count, qualification }
            | AttributeRule::MaxQualifiedCardinality { count, qualification },
        ) => Some((*count, qualification.clone())),
        _ => None,
    };
    let merged = match existing {
        None => count,
        Some((old, ref q)) if *q == qualification => match kind {
            AttributeRuleKind::MinQualifiedCardinality => old.max(count),
            AttributeRuleKind::MaxQualifiedCardinality => old.min(count),
            _ if old == count => count,
            _ => return Err(format!("conflicting qualified cardinalities {old} and {count}")),
        },
        Some((_, q)) => {
            return Err(format!(
                "a second qualification {qualification} conflicts with {q}"
            ));
        }
    };
    attribute.set_rule(rule(merged, qualification));
    Ok(())
}

/// The id that is a subclass-or-equal of every other id.
fn most_specific(ids: &[String], hierarchy: &ClassHierarchy) -> Option<String> {
    ids.iter()
        .find(|c| ids.iter().all(|o| hierarchy.conforms_to(c, o)))
        .cloned()
}

/// The id that is a superclass-or-equal of every other id.
fn most_general(ids: &[String], hierarchy: &ClassHierarchy) -> Option<String> {
    ids.iter()
        .find(|c| ids.iter().all(|o| hierarchy.conforms_to(o, c)))
        .cloned()
}

/// Several ranges reduce only when all are related class ids.
fn most_specific_class(ranges: &[RangeExpr], hierarchy: &ClassHierarchy) -> Option<String> {
    let ids: Option<Vec<String>> = ranges
        .iter()
        .map(|r| r.as_class_id().map(str::to_string))
        .collect();
    most_specific(&ids?, hierarchy)
}

fn kind_from_range(range: &RangeExpr) -> PropertyKind {
    fn leaves(range: &RangeExpr, datatypes: &mut usize, others: &mut usize) {
        match range {
            RangeExpr::Datatype(_) => *datatypes += 1,
            RangeExpr::ClassId(_) | RangeExpr::ResourceReference(_) => *others += 1,
            RangeExpr::And(ops) | RangeExpr::Or(ops) => {
                ops.iter().for_each(|op| leaves(op, datatypes, others))
            }
            RangeExpr::Not(inner) => leaves(inner, datatypes, others),
        }
    }
    let (mut datatypes, mut others) = (0, 0);
    leaves(range, &mut datatypes, &mut others);
    match (datatypes, others) {
        (0, 0) => PropertyKind::Unknown,
        (_, 0) => PropertyKind::Datatype,
        (0, _) => PropertyKind::Object,
        _ => PropertyKind::Unknown,
    }
}

fn collect_named(expr: &ClassExpression, out: &mut BTreeSet<String>) {
    match expr {
        ClassExpression::Named(iri) if !vocab::is_top_class(iri) => {
            out.insert(iri.clone());
        }
        ClassExpression::Union(ops) | ClassExpression::Intersection(ops) => {
            ops.iter().for_each(|op| collect_named(op, out))
        }
        ClassExpression::Complement(inner) => collect_named(inner, out),
        _ => {}
    }
}

fn annotation_value(node: &Node) -> String {
    match node {
        Node::Literal(lit) => lit.value.clone(),
        Node::Named(iri) => iri.clone(),
        Node::Blank(id) => format!("_:{id}"),
    }
}

fn shape_name(shape: &RestrictionShape) -> &'static str {
    match shape {
        RestrictionShape::HasValue(_) => "hasValue",
        RestrictionShape::SomeValuesFrom(_) => "someValuesFrom",
        RestrictionShape::AllValuesFrom(_) => "allValuesFrom",
        RestrictionShape::ExactCardinality(_) => "cardinality",
        RestrictionShape::MinCardinality(_) => "minCardinality",
        RestrictionShape::MaxCardinality(_) => "maxCardinality",
        RestrictionShape::QualifiedCardinality { .. } => "qualifiedCardinality",
        RestrictionShape::MinQualifiedCardinality { .. } => "minQualifiedCardinality",
        RestrictionShape::MaxQualifiedCardinality { .. } => "maxQualifiedCardinality",
    }
}

fn join(ids: &BTreeSet<String>) -> String {
    ids.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::NodeClassifier;
    use crate::config::ClassificationConfig;
    use crate::graph::vocab::{rdfs, xsd};
    use crate::graph::{parse_graph, InputFormat};
    use crate::diagnostics::Severity;
    use crate::schema::TypeRuleKind;

    const PREFIXES: &str = "@prefix owl: <http://www.w3.org/2002/07/owl#> .\n\
        @prefix rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> .\n\
        @prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .\n\
        @prefix xsd: <http://www.w3.org/2001/XMLSchema#> .\n\
        @prefix ex: <http://ex.org/> .\n\
        ex:onto a owl:Ontology .\n";

    fn run(body: &str) -> (CompileResult<SchemaModel>, FactStore, Diagnostics) {
        let graph = parse_graph(&format!("{PREFIXES}{body}"), InputFormat::Turtle).unwrap();
        let mut diagnostics = Diagnostics::new();
        let mut facts =
            NodeClassifier::new(ClassificationConfig::default()).classify(&graph, &mut diagnostics);
        let model = resolve(&mut facts, &mut diagnostics);
        (model, facts, diagnostics)
    }

    fn resolved(body: &str) -> (SchemaModel, Diagnostics) {
        let (model, facts, diagnostics) = run(body);
        assert_eq!(facts.active_count(), 0, "every fact is consumed or retired");
        (model.unwrap(), diagnostics)
    }

    #[test]
    fn classes_properties_and_annotations() {
        let (model, diagnostics) = resolved(
            r#"
            ex:onto rdfs:label "Zoo" .
            ex:Animal a owl:Class ; rdfs:label "Animal" .
            ex:Dog a owl:Class ; rdfs:subClassOf ex:Animal .
            ex:name a owl:DatatypeProperty ; rdfs:domain ex:Animal ; rdfs:range xsd:string ;
                rdfs:comment "display name" .
            "#,
        );
        assert_eq!(model.uri, "http://ex.org/onto");
        assert_eq!(model.type_ids().collect::<Vec<_>>(), ["Animal", "Dog"]);
        assert!(model.conforms_to("Dog", "Animal"));
        assert_eq!(model.annotations[rdfs::LABEL], BTreeSet::from(["Zoo".to_string()]));

        let animal = model.get_type("Animal").unwrap();
        assert!(animal.annotations.contains_key(rdfs::LABEL));
        let name = animal.get_attribute("name").unwrap();
        assert_eq!(name.owner, "Animal");
        assert_eq!(name.kind, PropertyKind::Datatype);
        assert_eq!(name.range(), Some(&RangeExpr::datatype(xsd::STRING)));
        assert!(name.annotations.contains_key(rdfs::COMMENT));

        // Dog inherits by lookup, not by copy.
        assert!(!model.get_type("Dog").unwrap().has_attribute("name"));
        assert!(model.find_attribute("Dog", "name").is_some());
        assert_eq!(diagnostics.unresolved_count(), 0);
    }

    #[test]
    fn ontology_count_is_fatal() {
        let graph = parse_graph(
            "<http://ex.org/A> a <http://www.w3.org/2002/07/owl#Class> .",
            InputFormat::Turtle,
        )
        .unwrap();
        let mut diagnostics = Diagnostics::new();
        let mut facts =
            NodeClassifier::new(ClassificationConfig::default()).classify(&graph, &mut diagnostics);
        assert!(matches!(
            resolve(&mut facts, &mut diagnostics),
            Err(CompileError::MissingOntology)
        ));

        let (model, _, _) = run("ex:other a owl:Ontology .");
        assert!(matches!(model, Err(CompileError::MultipleOntologies { count: 2, .. })));
    }

    #[test]
    fn restriction_clones_inherited_attribute() {
        let (model, diagnostics) = resolved(
            r#"
            ex:Person a owl:Class .
            ex:Child a owl:Class ;
                rdfs:subClassOf ex:Person ,
                    [ a owl:Restriction ; owl:onProperty ex:age ;
                      owl:maxCardinality "1"^^xsd:nonNegativeInteger ] .
            ex:age a owl:DatatypeProperty ; rdfs:domain ex:Person ; rdfs:range xsd:integer .
            "#,
        );
        let child_age = model.get_type("Child").unwrap().get_attribute("age").unwrap();
        assert_eq!(child_age.owner, "Child");
        assert_eq!(child_age.max_cardinality(), Some(1));
        assert_eq!(child_age.range(), Some(&RangeExpr::datatype(xsd::INTEGER)));

        let person_age = model.get_type("Person").unwrap().get_attribute("age").unwrap();
        assert_eq!(person_age.max_cardinality(), None);
        assert_eq!(diagnostics.unresolved_count(), 0);
    }

    #[test]
    fn restriction_without_attribute_is_unresolved() {
        let (model, diagnostics) = resolved(
            r#"
            ex:Person a owl:Class ;
                rdfs:subClassOf [ a owl:Restriction ; owl:onProperty ex:age ;
                                  owl:minCardinality "1"^^xsd:nonNegativeInteger ] .
            ex:age a owl:DatatypeProperty .
            "#,
        );
        assert!(!model.get_type("Person").unwrap().has_attribute("age"));
        let reason = diagnostics
            .reasons(Severity::Unresolved)
            .find(|r| r.contains("no compatible attribute"))
            .unwrap();
        assert!(reason.starts_with("minCardinality on Person.age"));
    }

    #[test]
    fn unrelated_domains_are_one_entry_and_no_attachment() {
        let (model, diagnostics) = resolved(
            r#"
            ex:Cat a owl:Class .
            ex:Car a owl:Class .
            ex:owner a owl:ObjectProperty ; rdfs:domain ex:Cat , ex:Car .
            "#,
        );
        assert_eq!(model.types().map(|t| t.attributes().count()).sum::<usize>(), 0);
        assert_eq!(diagnostics.unresolved_count(), 1);
        let (reason, entry) = diagnostics.entries().next().unwrap();
        assert!(reason.starts_with("ambiguous domain for owner"));
        assert_eq!(entry.triples.len(), 3);
    }

    #[test]
    fn union_domain_reduces_to_common_superclass() {
        let (model, _) = resolved(
            r#"
            ex:Animal a owl:Class .
            ex:Dog a owl:Class ; rdfs:subClassOf ex:Animal .
            ex:legs a owl:DatatypeProperty ;
                rdfs:domain [ a owl:Class ; owl:unionOf ( ex:Dog ex:Animal ) ] .
            "#,
        );
        assert!(model.get_type("Animal").unwrap().has_attribute("legs"));
        assert!(!model.get_type("Dog").unwrap().has_attribute("legs"));
    }

    #[test]
    fn union_range_and_related_ranges() {
        let (model, diagnostics) = resolved(
            r#"
            ex:Animal a owl:Class .
            ex:Dog a owl:Class ; rdfs:subClassOf ex:Animal .
            ex:Person a owl:Class .
            ex:pet a owl:ObjectProperty ; rdfs:domain ex:Person ; rdfs:range ex:Animal , ex:Dog .
            ex:id a owl:DatatypeProperty ; rdfs:domain ex:Person ;
                rdfs:range [ a rdfs:Datatype ; owl:unionOf ( xsd:string xsd:integer ) ] .
            "#,
        );
        let person = model.get_type("Person").unwrap();
        assert_eq!(person.get_attribute("pet").unwrap().range(), Some(&RangeExpr::class("Dog")));
        assert_eq!(
            person.get_attribute("id").unwrap().range(),
            Some(&RangeExpr::Or(vec![
                RangeExpr::datatype(xsd::STRING),
                RangeExpr::datatype(xsd::INTEGER),
            ]))
        );
        assert_eq!(diagnostics.unresolved_count(), 0);
    }

    #[test]
    fn unrelated_ranges_are_unresolved() {
        let (model, diagnostics) = resolved(
            r#"
            ex:Person a owl:Class .
            ex:id a owl:DatatypeProperty ; rdfs:domain ex:Person ;
                rdfs:range xsd:string , xsd:integer .
            "#,
        );
        let id = model.get_type("Person").unwrap().get_attribute("id").unwrap();
        assert_eq!(id.range(), None);
        assert!(diagnostics
            .reasons(Severity::Unresolved)
            .any(|r| r.starts_with("ambiguous range for id")));
    }

    #[test]
    fn some_values_from_thing_is_a_lower_bound() {
        let (model, _) = resolved(
            r#"
            ex:Person a owl:Class ;
                rdfs:subClassOf [ a owl:Restriction ; owl:onProperty ex:knows ;
                                  owl:someValuesFrom owl:Thing ] .
            ex:knows a owl:ObjectProperty ; rdfs:domain ex:Person .
            "#,
        );
        let knows = model.get_type("Person").unwrap().get_attribute("knows").unwrap();
        assert_eq!(knows.min_cardinality(), Some(1));
        assert!(!knows.has_rule(AttributeRuleKind::SomeValuesFrom));
    }

    #[test]
    fn candidates_are_promoted() {
        let (model, facts, _) = run(
            r#"
            ex:Animal a owl:Class .
            ex:Cat rdfs:subClassOf ex:Animal .
            "#,
        );
        let model = model.unwrap();
        assert!(model.conforms_to("Cat", "Animal"));
        assert!(facts
            .derived()
            .any(|r| r.fact == Fact::ClassReference { uri: "http://ex.org/Cat".into() }));
    }

    #[test]
    fn unattached_and_unrecognized_are_reported() {
        let (_, diagnostics) = resolved(
            r#"
            ex:Animal a owl:Class ; ex:weird "x" .
            ex:floating a owl:DatatypeProperty ; rdfs:range xsd:string .
            "#,
        );
        let unresolved: Vec<&str> = diagnostics.reasons(Severity::Unresolved).collect();
        assert!(unresolved.contains(&"unrecognized predicate <http://ex.org/weird>"));
        let entry = diagnostics
            .by_reason("unattached property for floating: no domain resolves to a type")
            .unwrap();
        assert_eq!(entry.triples.len(), 2);
    }

    #[test]
    fn equivalent_and_disjoint_classes_become_type_rules() {
        let (model, diagnostics) = resolved(
            r#"
            ex:Animal a owl:Class .
            ex:Beast a owl:Class ; owl:equivalentClass ex:Animal .
            ex:Plant a owl:Class ; owl:disjointWith ex:Animal , owl:Thing .
            "#,
        );
        let ids = |class: &str, kind: TypeRuleKind| {
            model
                .get_type(class)
                .and_then(|t| t.rule(kind))
                .map(|rule| rule.ids().clone())
        };
        let animal = BTreeSet::from(["Animal".to_string()]);
        assert_eq!(ids("Beast", TypeRuleKind::EquivalentClass), Some(animal.clone()));
        assert_eq!(ids("Plant", TypeRuleKind::DisjointWith), Some(animal));
        assert_eq!(ids("Animal", TypeRuleKind::EquivalentClass), None);
        assert!(!model.has_type("Thing"));
        assert_eq!(diagnostics.unresolved_count(), 0);
    }

    #[test]
    fn property_axioms_become_attribute_rules() {
        let (model, diagnostics) = resolved(
            r#"
            ex:Person a owl:Class .
            ex:parent a owl:ObjectProperty , owl:FunctionalProperty ;
                rdfs:domain ex:Person ;
                owl:inverseOf ex:child , ex:offspring ;
                owl:equivalentProperty ex:progenitor .
            "#,
        );
        let parent = model.get_type("Person").unwrap().get_attribute("parent").unwrap();
        assert_eq!(parent.kind, PropertyKind::Object);
        assert_eq!(parent.max_cardinality(), Some(1));
        assert_eq!(
            parent.get_rule(AttributeRuleKind::InverseOf),
            Some(&AttributeRule::InverseOf("http://ex.org/child".into()))
        );
        assert_eq!(
            parent.get_rule(AttributeRuleKind::EquivalentProperty),
            Some(&AttributeRule::EquivalentProperty(BTreeSet::from([
                "http://ex.org/progenitor".to_string()
            ])))
        );
        let entry = diagnostics
            .by_reason(
                "conflicting inverseOf for parent: keeping <http://ex.org/child>, \
                 ignoring <http://ex.org/offspring>",
            )
            .unwrap();
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(entry.triples.len(), 1);
    }

    #[test]
    fn conflicting_restrictions_resolve_independently_of_node_labels() {
        let body = r#"
            ex:Dog a owl:Class ;
                rdfs:subClassOf [ a owl:Restriction ; owl:onProperty ex:species ;
                                  owl:hasValue ex:Lupus ] ,
                                [ a owl:Restriction ; owl:onProperty ex:species ;
                                  owl:hasValue ex:Canine ] .
            ex:species a owl:ObjectProperty ; rdfs:domain ex:Dog .
        "#;
        let (model, diagnostics) = resolved(body);
        let species = model.get_type("Dog").unwrap().get_attribute("species").unwrap();
        assert_eq!(
            species.get_rule(AttributeRuleKind::HasValue),
            Some(&AttributeRule::HasValue(Node::named("http://ex.org/Canine")))
        );
        assert!(diagnostics
            .by_reason(
                "hasValue on Dog.species: conflicting hasValue <http://ex.org/Canine> \
                 and <http://ex.org/Lupus>"
            )
            .is_some());
        for _ in 0..10 {
            assert_eq!(resolved(body).0, model);
        }
    }
}
