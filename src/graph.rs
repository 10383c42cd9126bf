//! The component-instance graph: schema-bound instances held in one owned
//! arena keyed by instance id, plus the data-flow edges between them.
//!
//! Everything the editing layer needs (values, checked state, wiring) is read
//! and written through [`Graph`], so exporting always sees one consistent tree.

use crate::ast::{Argument, Block, DocumentNode};
use crate::error::GraphError;
use crate::schema::{ArgumentSchema, BlockSchema, ComponentSchema, ExportSchema};
use crate::wiring::{is_list_type, merge_reference, remove_reference};
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display};

/// Length of generated labels for components dropped without one.
pub const GENERATED_LABEL_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentValue {
    pub name: String,
    pub arg_type: String,
    pub required: bool,
    pub default: Option<String>,
    pub value: String,
    /// The value came from parsed text rather than the schema default.
    pub set_on_load: bool,
    /// Included on export.
    pub checked: bool,
    /// Position among the parsed arguments of its parent, if it was loaded.
    #[serde(default)]
    pub load_order: Option<usize>,
}

impl ArgumentValue {
    pub fn from_schema(schema: &ArgumentSchema) -> Self {
        Self {
            name: schema.name.clone(),
            arg_type: schema.arg_type.clone(),
            required: schema.required,
            default: schema.default.clone(),
            value: schema.default.clone().unwrap_or_default(),
            set_on_load: false,
            checked: schema.required,
            load_order: None,
        }
    }

    /// Applies the parsed value found at `order` in its parent body.
    pub fn load(&mut self, value: &str, order: usize) {
        self.value = value.to_string();
        self.set_on_load = true;
        self.checked = true;
        self.load_order = Some(order);
    }

    fn reset(&mut self) {
        self.value = self.default.clone().unwrap_or_default();
        self.set_on_load = false;
        self.checked = self.required;
        self.load_order = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInstance {
    pub name: String,
    pub required: bool,
    pub repeatable: bool,
    pub set_on_load: bool,
    pub checked: bool,
    /// Position among the parsed blocks of its parent, if it was loaded.
    #[serde(default)]
    pub load_order: Option<usize>,
    pub arguments: Vec<ArgumentValue>,
    pub blocks: Vec<BlockInstance>,
}

impl BlockInstance {
    pub fn from_schema(schema: &BlockSchema) -> Self {
        Self {
            name: schema.name.clone(),
            required: schema.required,
            repeatable: schema.repeatable,
            set_on_load: false,
            checked: schema.required,
            load_order: None,
            arguments: schema.arguments.iter().map(ArgumentValue::from_schema).collect(),
            blocks: schema.blocks.iter().map(BlockInstance::from_schema).collect(),
        }
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentValue> {
        self.arguments.iter().find(|a| a.name == name)
    }

    /// Sibling blocks named `name`, in declaration order.
    pub fn blocks_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a BlockInstance> {
        self.blocks.iter().filter(move |b| b.name == name)
    }

    /// A fresh copy carrying only defaults, one template per nested block name.
    pub(crate) fn pristine(&self) -> Self {
        let mut seen = Vec::new();
        let blocks = self
            .blocks
            .iter()
            .filter(|b| {
                if seen.contains(&b.name) {
                    false
                } else {
                    seen.push(b.name.clone());
                    true
                }
            })
            .map(BlockInstance::pristine)
            .collect();
        let mut arguments = self.arguments.clone();
        arguments.iter_mut().for_each(ArgumentValue::reset);
        Self {
            name: self.name.clone(),
            required: self.required,
            repeatable: self.repeatable,
            set_on_load: false,
            checked: self.required,
            load_order: None,
            arguments,
            blocks,
        }
    }

    fn to_block(&self) -> Block {
        Block {
            name: self.name.clone(),
            arguments: exported_arguments(&self.arguments),
            blocks: exported_blocks(&self.blocks),
        }
    }
}

/// One step into a block subtree: the block name and its position among
/// siblings of the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockStep {
    pub name: String,
    pub index: usize,
}

impl BlockStep {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl Display for BlockStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.index)
        }
    }
}

/// Address of an argument slot inside an instance, written
/// `block[index].nested.argument` (index 0 is omitted).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ArgumentPath {
    pub blocks: Vec<BlockStep>,
    pub argument: String,
}

impl ArgumentPath {
    pub fn top(argument: impl Into<String>) -> Self {
        Self {
            blocks: Vec::new(),
            argument: argument.into(),
        }
    }

    pub fn nested(blocks: Vec<BlockStep>, argument: impl Into<String>) -> Self {
        Self {
            blocks,
            argument: argument.into(),
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let mut segments: Vec<&str> = text.split('.').collect();
        let argument = segments.pop().filter(|a| !a.is_empty())?;
        let blocks = segments
            .into_iter()
            .map(|segment| match segment.split_once('[') {
                Some((name, rest)) => {
                    let index = rest.strip_suffix(']')?.parse().ok()?;
                    Some(BlockStep::new(name, index))
                }
                None if !segment.is_empty() => Some(BlockStep::new(segment, 0)),
                None => None,
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self::nested(blocks, argument))
    }
}

impl Display for ArgumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.blocks {
            write!(f, "{step}.")?;
        }
        write!(f, "{}", self.argument)
    }
}

impl From<ArgumentPath> for String {
    fn from(path: ArgumentPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for ArgumentPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ArgumentPath::parse(&value).ok_or_else(|| format!("invalid argument path `{value}`"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInstance {
    pub id: String,
    pub name: String,
    pub label: Option<String>,
    pub has_label: bool,
    pub arguments: Vec<ArgumentValue>,
    pub exports: Vec<ExportSchema>,
    pub blocks: Vec<BlockInstance>,
}

impl ComponentInstance {
    /// Deep-copies the schema's default shape. Every argument and every
    /// declared block is present.
    pub fn from_schema(schema: &ComponentSchema, label: Option<String>) -> Self {
        Self {
            id: instance_id(&schema.name, label.as_deref(), schema.has_label),
            name: schema.name.clone(),
            label,
            has_label: schema.has_label,
            arguments: schema.arguments.iter().map(ArgumentValue::from_schema).collect(),
            exports: schema.exports.clone(),
            blocks: schema.blocks.iter().map(BlockInstance::from_schema).collect(),
        }
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentValue> {
        self.arguments.iter().find(|a| a.name == name)
    }

    pub fn export(&self, name: &str) -> Option<&ExportSchema> {
        self.exports.iter().find(|e| e.name == name)
    }

    pub fn blocks_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a BlockInstance> {
        self.blocks.iter().filter(move |b| b.name == name)
    }

    pub fn block_at(&self, steps: &[BlockStep]) -> Option<&BlockInstance> {
        let (first, rest) = steps.split_first()?;
        let mut block = nth_named(&self.blocks, first)?;
        for step in rest {
            block = nth_named(&block.blocks, step)?;
        }
        Some(block)
    }

    pub fn argument_at(&self, path: &ArgumentPath) -> Option<&ArgumentValue> {
        if path.blocks.is_empty() {
            return self.argument(&path.argument);
        }
        self.block_at(&path.blocks)?
            .arguments
            .iter()
            .find(|a| a.name == path.argument)
    }

    /// Mutable access to an argument slot. With `mark_blocks`, every block on
    /// the way is checked so that the slot is reachable on export.
    fn argument_at_mut(
        &mut self,
        path: &ArgumentPath,
        mark_blocks: bool,
    ) -> Option<&mut ArgumentValue> {
        let mut arguments = &mut self.arguments;
        let mut blocks = &mut self.blocks;
        for step in &path.blocks {
            let block = nth_named_mut(blocks, step)?;
            if mark_blocks {
                block.checked = true;
            }
            arguments = &mut block.arguments;
            blocks = &mut block.blocks;
        }
        arguments.iter_mut().find(|a| a.name == path.argument)
    }

    fn block_list_mut(&mut self, steps: &[BlockStep]) -> Option<&mut Vec<BlockInstance>> {
        let mut blocks = &mut self.blocks;
        for step in steps {
            blocks = &mut nth_named_mut(blocks, step)?.blocks;
        }
        Some(blocks)
    }

    /// Calls `f` for every argument at any depth with its full path.
    pub fn for_each_argument<F>(&self, mut f: F)
    where
        F: FnMut(ArgumentPath, &ArgumentValue),
    {
        fn walk<F>(arguments: &[ArgumentValue], blocks: &[BlockInstance], prefix: &mut Vec<BlockStep>, f: &mut F)
        where
            F: FnMut(ArgumentPath, &ArgumentValue),
        {
            for arg in arguments {
                f(ArgumentPath::nested(prefix.clone(), arg.name.clone()), arg);
            }
            let mut seen: HashMap<&str, usize> = HashMap::new();
            for block in blocks {
                let index = seen.entry(block.name.as_str()).or_insert(0);
                prefix.push(BlockStep::new(block.name.clone(), *index));
                *index += 1;
                walk(&block.arguments, &block.blocks, prefix, f);
                prefix.pop();
            }
        }
        walk(&self.arguments, &self.blocks, &mut Vec::new(), &mut f);
    }

    /// Export tree-walk: checked, non-empty arguments and checked blocks.
    pub fn to_document_node(&self) -> DocumentNode {
        DocumentNode {
            name: self.name.clone(),
            label: if self.has_label { self.label.clone() } else { None },
            arguments: exported_arguments(&self.arguments),
            blocks: exported_blocks(&self.blocks),
        }
    }
}

fn nth_named<'a>(blocks: &'a [BlockInstance], step: &BlockStep) -> Option<&'a BlockInstance> {
    blocks.iter().filter(|b| b.name == step.name).nth(step.index)
}

fn nth_named_mut<'a>(blocks: &'a mut [BlockInstance], step: &BlockStep) -> Option<&'a mut BlockInstance> {
    blocks.iter_mut().filter(|b| b.name == step.name).nth(step.index)
}

/// Loaded slots in parsed order, then the rest in schema order.
fn in_export_order<T>(slots: &[T], load_order: impl Fn(&T) -> Option<usize>) -> Vec<&T> {
    let mut ordered: Vec<&T> = slots.iter().collect();
    ordered.sort_by_key(|slot| load_order(*slot).map_or((1, 0), |i| (0, i)));
    ordered
}

fn exported_arguments(arguments: &[ArgumentValue]) -> Vec<Argument> {
    in_export_order(arguments, |a| a.load_order)
        .into_iter()
        .filter(|a| a.checked && !a.value.trim().is_empty())
        .map(|a| Argument::new(a.name.clone(), a.value.clone()))
        .collect()
}

fn exported_blocks(blocks: &[BlockInstance]) -> Vec<Block> {
    in_export_order(blocks, |b| b.load_order)
        .into_iter()
        .filter(|b| b.checked)
        .map(BlockInstance::to_block)
        .collect()
}

/// `name`, or `name.label` for labelable components.
pub fn instance_id(name: &str, label: Option<&str>, has_label: bool) -> String {
    match label {
        Some(label) if has_label => format!("{name}.{label}"),
        _ => name.to_string(),
    }
}

/// An inferred or user-made reference from an export to an argument slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub source_export: String,
    pub target: String,
    pub target_path: ArgumentPath,
}

impl Edge {
    pub fn target_argument(&self) -> &str {
        &self.target_path.argument
    }

    /// The text that appears in the target value, `<source>.<export>`.
    pub fn reference(&self) -> String {
        format!("{}.{}", self.source, self.source_export)
    }

    pub fn source_handle(&self) -> String {
        self.reference()
    }

    pub fn target_handle(&self) -> String {
        format!("{}.{}", self.target, self.target_path)
    }

    fn same_wire(&self, other: &Edge) -> bool {
        self.source == other.source
            && self.source_export == other.source_export
            && self.target == other.target
            && self.target_path == other.target_path
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Graph {
    instances: Vec<ComponentInstance>,
    edges: Vec<Edge>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    #[serde(skip)]
    next_edge: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instances(&self) -> &[ComponentInstance] {
        &self.instances
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ComponentInstance> {
        self.index.get(id).map(|&i| &self.instances[i])
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Edges wired into `target`'s `path` slot.
    pub fn edges_into<'a>(&'a self, target: &'a str, path: &'a ArgumentPath) -> impl Iterator<Item = &'a Edge> {
        self.edges
            .iter()
            .filter(move |e| e.target == target && &e.target_path == path)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut ComponentInstance, GraphError> {
        match self.index.get(id) {
            Some(&i) => Ok(&mut self.instances[i]),
            None => Err(GraphError::UnknownInstance { id: id.to_string() }),
        }
    }

    /// Adds an already materialized instance.
    ///
    /// # Errors
    /// Returns [`GraphError::DuplicateInstance`] if the id is taken.
    pub fn insert(&mut self, instance: ComponentInstance) -> Result<(), GraphError> {
        if self.contains(&instance.id) {
            return Err(GraphError::DuplicateInstance { id: instance.id });
        }
        self.index.insert(instance.id.clone(), self.instances.len());
        self.instances.push(instance);
        Ok(())
    }

    /// Drops a fresh default instance of `schema` into the graph and returns
    /// its id. Labelable components without a label get a random unique one.
    ///
    /// # Errors
    /// Returns [`GraphError::DuplicateInstance`] if the resulting id is taken.
    pub fn add_component(
        &mut self,
        schema: &ComponentSchema,
        label: Option<String>,
    ) -> Result<String, GraphError> {
        let label = match label {
            Some(label) => Some(label),
            None if schema.has_label => Some(self.unused_label(&schema.name)),
            None => None,
        };
        let instance = ComponentInstance::from_schema(schema, label);
        let id = instance.id.clone();
        self.insert(instance)?;
        debug!("added component {id}");
        Ok(id)
    }

    fn unused_label(&self, name: &str) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let label: String = (0..GENERATED_LABEL_LEN)
                .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
                .collect();
            if !self.contains(&instance_id(name, Some(&label), true)) {
                return label;
            }
        }
    }

    /// Removes an instance, the edges into it, and unwires everything it fed.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownInstance`] if there is no such instance.
    pub fn remove_component(&mut self, id: &str) -> Result<ComponentInstance, GraphError> {
        let position = *self
            .index
            .get(id)
            .ok_or_else(|| GraphError::UnknownInstance { id: id.to_string() })?;

        let outgoing: Vec<String> = self
            .edges
            .iter()
            .filter(|e| e.source == id && e.target != id)
            .map(|e| e.id.clone())
            .collect();
        for edge_id in outgoing {
            self.disconnect(&edge_id)?;
        }
        self.edges.retain(|e| e.target != id && e.source != id);

        let removed = self.instances.remove(position);
        self.reindex();
        debug!("removed component {id}");
        Ok(removed)
    }

    fn reindex(&mut self) {
        self.index = self
            .instances
            .iter()
            .enumerate()
            .map(|(i, inst)| (inst.id.clone(), i))
            .collect();
    }

    /// Sets an argument value and checks it (and its enclosing blocks).
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownInstance`] or [`GraphError::UnknownArgument`].
    pub fn set_value(
        &mut self,
        id: &str,
        path: &ArgumentPath,
        value: impl Into<String>,
    ) -> Result<(), GraphError> {
        let arg = self.argument_slot(id, path, true)?;
        arg.value = value.into();
        arg.checked = true;
        Ok(())
    }

    /// Includes or excludes an argument from export.
    ///
    /// # Errors
    /// Returns [`GraphError::RequiredSlot`] when unchecking a required argument.
    pub fn set_checked(&mut self, id: &str, path: &ArgumentPath, checked: bool) -> Result<(), GraphError> {
        let arg = self.argument_slot(id, path, checked)?;
        if arg.required && !checked {
            return Err(GraphError::RequiredSlot {
                instance: id.to_string(),
                path: path.to_string(),
            });
        }
        arg.checked = checked;
        Ok(())
    }

    /// Includes or excludes a block subtree from export.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownBlock`] or [`GraphError::RequiredSlot`].
    pub fn set_block_checked(&mut self, id: &str, steps: &[BlockStep], checked: bool) -> Result<(), GraphError> {
        let unknown = || GraphError::UnknownBlock {
            instance: id.to_string(),
            path: render_steps(steps),
        };
        let (last, parents) = steps.split_last().ok_or_else(unknown)?;
        let instance = self.get_mut(id)?;
        let siblings = instance.block_list_mut(parents).ok_or_else(unknown)?;
        let block = nth_named_mut(siblings, last).ok_or_else(unknown)?;
        if block.required && !checked {
            return Err(GraphError::RequiredSlot {
                instance: id.to_string(),
                path: render_steps(steps),
            });
        }
        block.checked = checked;
        Ok(())
    }

    /// Appends a new occurrence of a repeatable block after its siblings and
    /// returns its step.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownBlock`] or [`GraphError::NotRepeatable`].
    pub fn add_block(&mut self, id: &str, parent: &[BlockStep], name: &str) -> Result<BlockStep, GraphError> {
        let mut full = parent.to_vec();
        full.push(BlockStep::new(name, 0));
        let unknown = || GraphError::UnknownBlock {
            instance: id.to_string(),
            path: render_steps(&full),
        };
        let instance = self.get_mut(id)?;
        let siblings = instance.block_list_mut(parent).ok_or_else(unknown)?;
        let template = siblings.iter().find(|b| b.name == name).ok_or_else(unknown)?;
        if !template.repeatable {
            return Err(GraphError::NotRepeatable {
                instance: id.to_string(),
                path: render_steps(&full),
            });
        }
        let mut block = template.pristine();
        block.checked = true;
        let index = siblings.iter().filter(|b| b.name == name).count();
        siblings.push(block);
        Ok(BlockStep::new(name, index))
    }

    fn argument_slot(
        &mut self,
        id: &str,
        path: &ArgumentPath,
        mark_blocks: bool,
    ) -> Result<&mut ArgumentValue, GraphError> {
        self.get_mut(id)?
            .argument_at_mut(path, mark_blocks)
            .ok_or_else(|| GraphError::UnknownArgument {
                instance: id.to_string(),
                path: path.to_string(),
            })
    }

    /// Wires `source.export` into the `path` slot of `target`, rewriting the
    /// slot value according to the merge policy in [`crate::wiring`].
    ///
    /// # Errors
    /// Unknown ids, exports or arguments, a wire that already exists, and type
    /// mismatches on scalar arguments are rejected without changing anything.
    pub fn connect(
        &mut self,
        source: &str,
        export: &str,
        target: &str,
        path: &ArgumentPath,
    ) -> Result<Edge, GraphError> {
        let export_type = self
            .get(source)
            .ok_or_else(|| GraphError::UnknownInstance { id: source.to_string() })?
            .export(export)
            .ok_or_else(|| GraphError::UnknownExport {
                instance: source.to_string(),
                export: export.to_string(),
            })?
            .export_type
            .clone();

        let edge = Edge {
            id: String::new(),
            source: source.to_string(),
            source_export: export.to_string(),
            target: target.to_string(),
            target_path: path.clone(),
        };
        if self.edges.iter().any(|e| e.same_wire(&edge)) {
            return Err(GraphError::AlreadyConnected {
                from: edge.source_handle(),
                to: edge.target_handle(),
            });
        }

        let arg = self.argument_slot(target, path, false)?;
        let reference = edge.reference();
        let Some(merged) = merge_reference(&arg.value, &reference, &export_type, &arg.arg_type) else {
            let err = GraphError::TypeMismatch {
                from: edge.source_handle(),
                from_type: export_type,
                to: edge.target_handle(),
                to_type: arg.arg_type.clone(),
            };
            warn!("{err}");
            return Err(err);
        };
        let replaces = !is_list_type(&arg.arg_type);

        let arg = self.argument_slot(target, path, true)?;
        arg.value = merged;
        arg.checked = true;

        if replaces {
            // Last write wins: earlier wires into this scalar slot are gone.
            self.edges
                .retain(|e| !(e.target == target && &e.target_path == path));
        }
        let edge = self.push_edge(edge.source, edge.source_export, edge.target, edge.target_path);
        debug!("connected {} -> {}", edge.source_handle(), edge.target_handle());
        Ok(edge)
    }

    /// Removes an edge and takes its reference out of the target value. A
    /// slot left empty falls back to its required state.
    ///
    /// # Errors
    /// Returns [`GraphError::UnknownEdge`] if there is no such edge.
    pub fn disconnect(&mut self, edge_id: &str) -> Result<Edge, GraphError> {
        let position = self
            .edges
            .iter()
            .position(|e| e.id == edge_id)
            .ok_or_else(|| GraphError::UnknownEdge { id: edge_id.to_string() })?;
        let edge = self.edges.remove(position);
        let reference = edge.reference();

        if let Ok(arg) = self.argument_slot(&edge.target, &edge.target_path, false) {
            arg.value = remove_reference(&arg.value, &reference);
            if arg.value.is_empty() {
                arg.checked = arg.required;
            }
        }
        debug!("disconnected {} -> {}", edge.source_handle(), edge.target_handle());
        Ok(edge)
    }

    pub(crate) fn push_edge(
        &mut self,
        source: String,
        source_export: String,
        target: String,
        target_path: ArgumentPath,
    ) -> Edge {
        let edge = Edge {
            id: self.next_edge.to_string(),
            source,
            source_export,
            target,
            target_path,
        };
        self.next_edge += 1;
        self.edges.push(edge.clone());
        edge
    }

    /// Export tree-walk over the live graph.
    pub fn to_document(&self) -> Vec<DocumentNode> {
        self.instances
            .iter()
            .map(ComponentInstance::to_document_node)
            .collect()
    }
}

fn render_steps(steps: &[BlockStep]) -> String {
    steps
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}
