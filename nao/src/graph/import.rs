// Splicing a serialized snapshot back into a live graph

use super::{Graph, GraphDef, GraphError, NodeRef};
use std::collections::HashMap;

impl Graph {
    /// Import a renamed copy of `def` under a fresh scope derived from
    /// `scope`.
    ///
    /// Snapshot nodes named in `input_map` are not copied; their consumers are
    /// rewired to the supplied nodes instead. Returns the imported (or mapped)
    /// node for each name in `return_elements`, in order. Nodes created here
    /// are subject to any active control dependency frame.
    pub fn import_graph_def(
        &self,
        def: &GraphDef,
        scope: &str,
        input_map: &HashMap<String, NodeRef>,
        return_elements: &[String],
    ) -> Result<Vec<NodeRef>, GraphError> {
        for node in input_map.values() {
            self.check_owned(node)?;
        }

        let prefix = self.push_name_scope(scope);
        let result = self.import_nodes(def, &prefix, input_map, return_elements);
        self.pop_name_scope();

        tracing::debug!(
            scope = %prefix,
            nodes = def.len(),
            mapped = input_map.len(),
            "imported graph snapshot"
        );
        result
    }

    fn import_nodes(
        &self,
        def: &GraphDef,
        prefix: &str,
        input_map: &HashMap<String, NodeRef>,
        return_elements: &[String],
    ) -> Result<Vec<NodeRef>, GraphError> {
        let mut imported: HashMap<&str, NodeRef> = HashMap::new();

        for node in &def.nodes {
            if let Some(mapped) = input_map.get(&node.name) {
                imported.insert(&node.name, mapped.clone());
                continue;
            }

            let inputs = resolve_all(&imported, &node.name, &node.inputs)?;
            let control = resolve_all(&imported, &node.name, &node.control_inputs)?;
            let copy = self
                .op(&node.op)
                .name(&node.name)
                .inputs(inputs)
                .control_inputs(control)
                .attrs(node.attrs.clone())
                .build()?;
            imported.insert(&node.name, copy);
        }

        return_elements
            .iter()
            .map(|name| {
                imported
                    .get(name.as_str())
                    .cloned()
                    .ok_or_else(|| GraphError::MissingReturnElement {
                        scope: prefix.to_string(),
                        name: name.clone(),
                    })
            })
            .collect()
    }
}

fn resolve_all(
    imported: &HashMap<&str, NodeRef>,
    node: &str,
    names: &[String],
) -> Result<Vec<NodeRef>, GraphError> {
    names
        .iter()
        .map(|input| {
            imported
                .get(input.as_str())
                .cloned()
                .ok_or_else(|| GraphError::DanglingInput {
                    node: node.to_string(),
                    input: input.clone(),
                })
        })
        .collect()
}
