//! Property arena with reference edges.
//!
//! Properties live in a [`SlotMap`] and reference each other through
//! [`PropertyId`] handles. Edges point from the reading property to the
//! property it reads; the edge set is kept acyclic by [`PropertyGraph::link_reference`].
//!
//! # Usage
//!
//! ```ignore
//! let mut graph = PropertyGraph::new();
//! let base = graph.insert(base_property)?;
//! let tint = graph.insert(tint_property)?;
//! graph.link_reference(tint, base)?;
//!
//! let used = graph.used_properties(0);
//! let order = graph.sampling_order(&used)?; // [base, tint]
//! ```

use rustc_hash::{FxHashMap, FxHashSet};
use slotmap::{new_key_type, SecondaryMap, SlotMap};
use smallvec::SmallVec;

use shadergen_core::{Diagnostics, ReferenceRejection, Result, ShaderGenError};

use crate::implementation::{EmitEnv, Implementation};
use crate::property::Property;

new_key_type! {
    pub struct PropertyId;
}

type Edges = SmallVec<[PropertyId; 4]>;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

#[derive(Debug, Default, Clone)]
pub struct PropertyGraph {
    properties: SlotMap<PropertyId, Property>,
    /// Declaration order.
    order: Vec<PropertyId>,
    by_name: FxHashMap<String, PropertyId>,
    references: SecondaryMap<PropertyId, Edges>,
}

impl PropertyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property; names are unique.
    pub fn insert(&mut self, property: Property) -> Result<PropertyId> {
        if self.by_name.contains_key(&property.name) {
            return Err(ShaderGenError::InvalidPropertyDeclaration(format!(
                "duplicate property '{}'",
                property.name
            )));
        }
        let name = property.name.clone();
        let id = self.properties.insert(property);
        self.order.push(id);
        self.by_name.insert(name, id);
        self.references.insert(id, Edges::new());
        Ok(id)
    }

    /// Builds the graph from `(declaration, line)` pairs. References are
    /// linked separately, once pass usage is known.
    pub fn from_declarations<'a, I>(declarations: I, diagnostics: &mut Diagnostics) -> Self
    where
        I: IntoIterator<Item = (&'a str, usize)>,
    {
        let mut graph = Self::new();
        for (line, line_number) in declarations {
            match Property::parse_declaration(line, line_number).and_then(|p| graph.insert(p)) {
                Ok(_) => {}
                Err(err) => diagnostics.push(err, line_number),
            }
        }
        graph
    }

    #[inline]
    #[must_use]
    pub fn get(&self, id: PropertyId) -> Option<&Property> {
        self.properties.get(id)
    }

    #[inline]
    #[must_use]
    pub fn get_mut(&mut self, id: PropertyId) -> Option<&mut Property> {
        self.properties.get_mut(id)
    }

    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<PropertyId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&Property> {
        self.id_of(name).and_then(|id| self.properties.get(id))
    }

    /// Properties in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &Property)> {
        self.order.iter().filter_map(|&id| self.properties.get(id).map(|p| (id, p)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Properties read by `id`.
    #[must_use]
    pub fn references(&self, id: PropertyId) -> &[PropertyId] {
        self.references.get(id).map_or(&[], |edges| edges.as_slice())
    }

    /// Records that `pass` reads the property called `name`.
    pub fn mark_pass_usage(&mut self, name: &str, pass: usize) -> Result<()> {
        let id = self
            .id_of(name)
            .ok_or_else(|| ShaderGenError::UnknownProperty(name.to_string()))?;
        if let Some(property) = self.properties.get_mut(id) {
            property.mark_used_in_pass(pass);
        }
        Ok(())
    }

    /// Forgets every pass usage, before a rescan.
    pub fn clear_pass_usage(&mut self) {
        for property in self.properties.values_mut() {
            property.pass_usage = 0;
        }
    }

    // ------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------

    /// Checks whether `from` may read `to`. Cycles are checked separately.
    pub fn can_reference(&self, from: PropertyId, to: PropertyId) -> std::result::Result<(), ReferenceRejection> {
        let (Some(source), Some(target)) = (self.get(from), self.get(to)) else {
            return Err(ReferenceRejection::Prevented("(unknown property)".to_string()));
        };
        if from == to {
            return Err(ReferenceRejection::SelfReference);
        }
        if source.is_hook() || target.is_hook() {
            return Err(ReferenceRejection::Hook);
        }
        if target.is_fixed_function() {
            return Err(ReferenceRejection::FixedFunction);
        }
        if source.is_used() && target.is_used() && source.pass_usage & target.pass_usage == 0 {
            return Err(ReferenceRejection::DifferentPass);
        }
        if source.program != target.program {
            return Err(ReferenceRejection::DifferentStage(format!(
                "{} reads {}",
                source.program, target.program
            )));
        }
        if source.flags.contains(crate::property::PropertyFlags::CANT_REFERENCE) {
            return Err(ReferenceRejection::SourceCantReference);
        }
        if let Some(reason) = target.reference_prevention() {
            return Err(ReferenceRejection::Prevented(reason));
        }
        Ok(())
    }

    /// Adds the edge `from -> to`.
    ///
    /// Rejected without touching the graph when `from` is reachable from
    /// `to` (or is `to`), or when the reference rules forbid it.
    pub fn link_reference(&mut self, from: PropertyId, to: PropertyId) -> Result<()> {
        if !self.properties.contains_key(from) {
            return Err(ShaderGenError::UnknownProperty(format!("{from:?}")));
        }
        if from == to || self.is_reachable(to, from) {
            return Err(ShaderGenError::CyclicReference {
                from: self.name_of(from),
                to: self.name_of(to),
            });
        }
        if let Err(reason) = self.can_reference(from, to) {
            return Err(ShaderGenError::InvalidReference {
                from: self.name_of(from),
                to: self.name_of(to),
                reason,
            });
        }

        if let Some(edges) = self.references.get_mut(from)
            && !edges.contains(&to)
        {
            edges.push(to);
        }
        Ok(())
    }

    fn name_of(&self, id: PropertyId) -> String {
        self.get(id).map_or_else(String::new, |p| p.name.clone())
    }

    /// `true` when `target` can be reached from `start` through edges.
    #[must_use]
    pub fn is_reachable(&self, start: PropertyId, target: PropertyId) -> bool {
        let mut visited = FxHashSet::default();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if visited.insert(id) {
                stack.extend(self.references(id).iter().copied());
            }
        }
        false
    }

    /// Links every reference found in the implementations of all properties.
    ///
    /// An implementation whose link is rejected is removed from its property.
    pub fn link_declared_references(&mut self, diagnostics: &mut Diagnostics) {
        let ids: Vec<PropertyId> = self.order.clone();
        for id in ids {
            self.relink(id, diagnostics);
        }
    }

    /// Replaces the implementation list of `id` and rebuilds its edges.
    pub fn set_implementations(
        &mut self,
        id: PropertyId,
        implementations: Vec<Implementation>,
        diagnostics: &mut Diagnostics,
    ) -> Result<()> {
        let property = self
            .properties
            .get_mut(id)
            .ok_or_else(|| ShaderGenError::UnknownProperty(format!("{id:?}")))?;
        property.implementations = implementations;
        if let Some(edges) = self.references.get_mut(id) {
            edges.clear();
        }
        self.relink(id, diagnostics);
        Ok(())
    }

    fn relink(&mut self, id: PropertyId, diagnostics: &mut Diagnostics) {
        let Some(property) = self.properties.get(id) else { return };
        let line = property.line_number;
        let targets: Vec<(usize, String)> = property
            .implementations
            .iter()
            .enumerate()
            .filter_map(|(i, imp)| imp.referenced_property().map(|t| (i, t.to_string())))
            .collect();

        let mut rejected = Vec::new();
        for (index, target) in targets {
            let result = match self.id_of(&target) {
                Some(to) => self.link_reference(id, to),
                None => Err(ShaderGenError::UnknownProperty(target)),
            };
            if let Err(err) = result {
                diagnostics.push(err, line);
                rejected.push(index);
            }
        }

        if let Some(property) = self.properties.get_mut(id) {
            for index in rejected.into_iter().rev() {
                property.implementations.remove(index);
            }
        }
    }

    // ------------------------------------------------------------------
    // Per-pass queries
    // ------------------------------------------------------------------

    /// Properties read by `pass`, plus everything they reference, in
    /// declaration order.
    #[must_use]
    pub fn used_properties(&self, pass: usize) -> Vec<PropertyId> {
        let mut used = FxHashSet::default();
        let mut stack: Vec<PropertyId> = self
            .iter()
            .filter(|(_, p)| p.is_used_in_pass(pass))
            .map(|(id, _)| id)
            .collect();

        while let Some(id) = stack.pop() {
            if used.insert(id) {
                stack.extend(self.references(id).iter().copied());
            }
        }

        self.order.iter().copied().filter(|id| used.contains(id)).collect()
    }

    /// Orders `used` so that every property comes after the properties it reads.
    ///
    /// Edges leaving `used` are ignored. A cycle here means the graph was
    /// corrupted past [`link_reference`](Self::link_reference) and is an error.
    pub fn sampling_order(&self, used: &[PropertyId]) -> Result<Vec<PropertyId>> {
        let in_set: FxHashSet<PropertyId> = used.iter().copied().collect();
        let mut marks: SecondaryMap<PropertyId, Mark> = SecondaryMap::new();
        let mut order = Vec::with_capacity(used.len());

        for &id in used {
            self.visit(id, &in_set, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        id: PropertyId,
        in_set: &FxHashSet<PropertyId>,
        marks: &mut SecondaryMap<PropertyId, Mark>,
        order: &mut Vec<PropertyId>,
    ) -> Result<()> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let name = self.name_of(id);
                log::error!("Reference cycle through '{name}' found while ordering samples");
                return Err(ShaderGenError::SamplingOrderCycle(name));
            }
            None => {}
        }

        marks.insert(id, Mark::InProgress);
        for &dependency in self.references(id) {
            if in_set.contains(&dependency) {
                self.visit(dependency, in_set, marks, order)?;
            }
        }
        marks.insert(id, Mark::Done);
        order.push(id);
        Ok(())
    }

    /// Left fold of the implementations of `id`, see [`Property::combined_expression`].
    pub fn combined_expression(
        &self,
        id: PropertyId,
        env: &EmitEnv<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<String> {
        let property = self
            .get(id)
            .ok_or_else(|| ShaderGenError::UnknownProperty(format!("{id:?}")))?;
        property.combined_expression(env, diagnostics)
    }

    /// Feature tokens needed by the given properties, deduplicated.
    #[must_use]
    pub fn needed_features(
        &self,
        ids: &[PropertyId],
        custom: &[crate::implementation::CustomMaterialProperty],
    ) -> Vec<String> {
        let mut features: Vec<String> = ids
            .iter()
            .filter_map(|&id| self.get(id))
            .flat_map(|p| p.needed_features(custom))
            .collect();
        features.sort_unstable();
        features.dedup();
        features
    }

    /// Inserts an edge without any check, bypassing [`Self::link_reference`].
    /// Only meant for exercising the cycle detection of [`Self::sampling_order`].
    #[doc(hidden)]
    pub fn force_edge(&mut self, from: PropertyId, to: PropertyId) {
        if let Some(edges) = self.references.get_mut(from) {
            edges.push(to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::implementation::{Implementation, ImplementationKind};
    use crate::types::{ProgramStage, ValueType};

    fn float(name: &str) -> Property {
        Property::new(name, ValueType::Float, ProgramStage::Fragment)
            .with_implementation(Implementation::new(ImplementationKind::ConstantFloat { value: 1.0 }))
    }

    fn reference(name: &str, target: &str) -> Property {
        Property::new(name, ValueType::Float, ProgramStage::Fragment).with_implementation(Implementation::new(
            ImplementationKind::Reference {
                target: target.to_string(),
                swizzle: None,
            },
        ))
    }

    #[test]
    fn test_duplicate_names() {
        let mut graph = PropertyGraph::new();
        graph.insert(float("A")).unwrap();
        assert!(graph.insert(float("A")).is_err());
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_self_and_transitive_cycles() {
        let mut graph = PropertyGraph::new();
        let a = graph.insert(float("A")).unwrap();
        let b = graph.insert(float("B")).unwrap();
        let c = graph.insert(float("C")).unwrap();

        assert!(matches!(graph.link_reference(a, a), Err(ShaderGenError::CyclicReference { .. })));
        graph.link_reference(a, b).unwrap();
        graph.link_reference(b, c).unwrap();
        assert!(matches!(graph.link_reference(c, a), Err(ShaderGenError::CyclicReference { .. })));
        assert!(graph.references(c).is_empty());
        // linking twice keeps one edge
        graph.link_reference(a, b).unwrap();
        assert_eq!(graph.references(a), &[b]);
    }

    #[test]
    fn test_reference_rules() {
        let mut graph = PropertyGraph::new();
        let a = graph.insert(float("A")).unwrap();
        let hook = graph
            .insert(Property::new("H", ValueType::Float, ProgramStage::Fragment).with_implementation(
                Implementation::new(ImplementationKind::Hook { label: "h".into() }),
            ))
            .unwrap();
        let vertex = graph
            .insert(Property::new("V", ValueType::Float, ProgramStage::Vertex).with_implementation(
                Implementation::new(ImplementationKind::ConstantFloat { value: 0.0 }),
            ))
            .unwrap();
        let other_pass = graph.insert(float("P")).unwrap();
        graph.mark_pass_usage("A", 0).unwrap();
        graph.mark_pass_usage("P", 1).unwrap();

        assert_eq!(graph.can_reference(a, hook), Err(ReferenceRejection::Hook));
        assert!(matches!(graph.can_reference(a, vertex), Err(ReferenceRejection::DifferentStage(_))));
        assert_eq!(graph.can_reference(a, other_pass), Err(ReferenceRejection::DifferentPass));
        assert!(matches!(
            graph.link_reference(a, hook),
            Err(ShaderGenError::InvalidReference { reason: ReferenceRejection::Hook, .. })
        ));
        assert!(graph.references(a).is_empty());
    }

    #[test]
    fn test_used_properties_closure() {
        let mut graph = PropertyGraph::new();
        graph.insert(float("Base")).unwrap();
        graph.insert(reference("Tint", "Base")).unwrap();
        graph.insert(float("Unused")).unwrap();
        let mut diagnostics = Diagnostics::new();
        graph.link_declared_references(&mut diagnostics);
        assert!(diagnostics.is_empty());

        graph.mark_pass_usage("Tint", 0).unwrap();
        let used = graph.used_properties(0);
        let names: Vec<_> = used.iter().map(|&id| graph.get(id).unwrap().name.as_str()).collect();
        assert_eq!(names, vec!["Base", "Tint"]);
        assert!(graph.used_properties(1).is_empty());
    }

    #[test]
    fn test_sampling_order_puts_dependencies_first() {
        let mut graph = PropertyGraph::new();
        graph.insert(reference("C", "B")).unwrap();
        graph.insert(reference("B", "A")).unwrap();
        graph.insert(float("A")).unwrap();
        graph.link_declared_references(&mut Diagnostics::new());
        graph.mark_pass_usage("C", 0).unwrap();

        let order = graph.sampling_order(&graph.used_properties(0)).unwrap();
        let names: Vec<_> = order.iter().map(|&id| graph.get(id).unwrap().name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_sampling_order_detects_forced_cycle() {
        let mut graph = PropertyGraph::new();
        let a = graph.insert(float("A")).unwrap();
        let b = graph.insert(float("B")).unwrap();
        graph.link_reference(a, b).unwrap();
        graph.force_edge(b, a);

        let result = graph.sampling_order(&[a, b]);
        assert!(matches!(result, Err(ShaderGenError::SamplingOrderCycle(_))));
    }

    #[test]
    fn test_rejected_reference_removes_implementation() {
        let mut graph = PropertyGraph::new();
        graph.insert(reference("A", "Missing")).unwrap();
        let mut diagnostics = Diagnostics::new();
        graph.link_declared_references(&mut diagnostics);

        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.has_fatal());
        assert!(graph.get_by_name("A").unwrap().implementations.is_empty());
    }
}
