use crate::ast::{Argument, Block, DocumentNode};
use crate::error::{GraphError, SynthesisError};
use crate::graph::{ArgumentPath, ArgumentValue, BlockInstance, ComponentInstance, Graph};
use crate::schema::SchemaRegistry;
use log::{debug, warn};

/// A synthesized graph together with everything that had to be skipped to
/// build it.
#[derive(Debug, Clone, Default)]
pub struct Synthesis {
    pub graph: Graph,
    pub diagnostics: Vec<SynthesisError>,
}

impl Synthesis {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Binds a document forest to component schemas and infers the edges
/// between the resulting instances.
pub struct Synthesizer<'a> {
    registry: &'a SchemaRegistry,
    diagnostics: Vec<SynthesisError>,
}

impl<'a> Synthesizer<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Synthesizer {
            registry,
            diagnostics: Vec::new(),
        }
    }

    /// Materializes one instance per known node, then infers edges.
    ///
    /// Nothing here is fatal: unknown components, arguments and blocks are
    /// dropped and reported in [`Synthesis::diagnostics`].
    pub fn synthesize(mut self, nodes: &[DocumentNode]) -> Synthesis {
        let mut graph = Graph::new();

        for node in nodes {
            let Some(instance) = self.materialize(node) else {
                continue;
            };
            if let Err(GraphError::DuplicateInstance { id }) = graph.insert(instance) {
                self.report(SynthesisError::DuplicateInstance { id });
            }
        }

        infer_edges(&mut graph);
        debug!(
            "synthesized {} instances and {} edges",
            graph.len(),
            graph.edges().len()
        );
        Synthesis {
            graph,
            diagnostics: self.diagnostics,
        }
    }

    fn materialize(&mut self, node: &DocumentNode) -> Option<ComponentInstance> {
        let Some(schema) = self.registry.get(&node.name) else {
            self.report(SynthesisError::UnknownComponent {
                name: node.name.clone(),
            });
            return None;
        };
        if schema.has_label && node.label.is_none() {
            self.report(SynthesisError::MissingLabel {
                component: node.name.clone(),
            });
        }

        let mut instance = ComponentInstance::from_schema(schema, node.label.clone());
        self.overlay_arguments(&node.name, "", &mut instance.arguments, &node.arguments);
        self.overlay_blocks(&node.name, "", &mut instance.blocks, &node.blocks);
        debug!("materialized {}", instance.id);
        Some(instance)
    }

    fn overlay_arguments(
        &mut self,
        component: &str,
        prefix: &str,
        slots: &mut [ArgumentValue],
        parsed: &[Argument],
    ) {
        for (order, arg) in parsed.iter().enumerate() {
            match slots.iter_mut().find(|slot| slot.name == arg.name) {
                Some(slot) => slot.load(&arg.value, order),
                None => self.report(SynthesisError::UnknownArgument {
                    component: component.to_string(),
                    path: join(prefix, &arg.name),
                }),
            }
        }
    }

    fn overlay_blocks(
        &mut self,
        component: &str,
        prefix: &str,
        slots: &mut Vec<BlockInstance>,
        parsed: &[Block],
    ) {
        for (order, block) in parsed.iter().enumerate() {
            let path = join(prefix, &block.name);
            let Some(template) = slots.iter().position(|b| b.name == block.name) else {
                self.report(SynthesisError::UnknownBlock {
                    component: component.to_string(),
                    path,
                });
                continue;
            };

            if slots[template].repeatable {
                // The schema default stays as template; each occurrence is a
                // new sibling placed after the last one of the same name.
                let mut occurrence = slots[template].pristine();
                occurrence.set_on_load = true;
                occurrence.checked = true;
                occurrence.load_order = Some(order);
                self.overlay_block(component, &path, &mut occurrence, block);
                slots[template].checked = false;
                let after = slots
                    .iter()
                    .rposition(|b| b.name == block.name)
                    .map_or(slots.len(), |i| i + 1);
                slots.insert(after, occurrence);
            } else if slots[template].set_on_load {
                self.report(SynthesisError::DuplicateBlock {
                    component: component.to_string(),
                    path,
                });
            } else {
                let target = &mut slots[template];
                target.set_on_load = true;
                target.checked = true;
                target.load_order = Some(order);
                self.overlay_block(component, &path, target, block);
            }
        }
    }

    fn overlay_block(&mut self, component: &str, path: &str, target: &mut BlockInstance, parsed: &Block) {
        self.overlay_arguments(component, path, &mut target.arguments, &parsed.arguments);
        self.overlay_blocks(component, path, &mut target.blocks, &parsed.blocks);
    }

    fn report(&mut self, err: SynthesisError) {
        warn!("{err}");
        self.diagnostics.push(err);
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Convenience wrapper around [`Synthesizer`].
pub fn synthesize(nodes: &[DocumentNode], registry: &SchemaRegistry) -> Synthesis {
    Synthesizer::new(registry).synthesize(nodes)
}

/// Adds an edge for every `instance.export` key found as a literal substring
/// of any argument value, at any depth. One value may yield several edges.
pub fn infer_edges(graph: &mut Graph) {
    let keys: Vec<(String, String, String)> = graph
        .instances()
        .iter()
        .flat_map(|inst| {
            inst.exports
                .iter()
                .map(move |e| (format!("{}.{}", inst.id, e.name), inst.id.clone(), e.name.clone()))
        })
        .collect();

    let mut found: Vec<(String, String, String, ArgumentPath)> = Vec::new();
    for inst in graph.instances() {
        inst.for_each_argument(|path, arg| {
            for (key, source, export) in &keys {
                if arg.value.contains(key.as_str()) {
                    found.push((source.clone(), export.clone(), inst.id.clone(), path.clone()));
                }
            }
        });
    }

    for (source, export, target, path) in found {
        let edge = graph.push_edge(source, export, target, path);
        debug!("inferred {} -> {}", edge.source_handle(), edge.target_handle());
    }
}
