//! Backward traversal of the computation graph.

use super::GraphNode;
use crate::tensor::Result;
use std::collections::HashSet;
use std::rc::Rc;

/// Runs every node reachable from `root` in reverse topological order.
///
/// A node only runs after all nodes that consume its output have pushed their gradient
/// contributions into its cell.
pub fn backward(root: Option<Rc<dyn GraphNode>>) -> Result<()> {
    let Some(root) = root else { return Ok(()) };

    let mut topo = Vec::new();
    let mut visited = HashSet::new();
    build_topo(root, &mut topo, &mut visited);

    for node in topo.into_iter().rev() {
        node.backward()?;
    }
    Ok(())
}

fn build_topo(
    node: Rc<dyn GraphNode>,
    topo: &mut Vec<Rc<dyn GraphNode>>,
    visited: &mut HashSet<*const ()>,
) {
    // The data pointer of the trait object identifies the node.
    let ptr = Rc::as_ptr(&node) as *const ();
    if !visited.insert(ptr) {
        return;
    }

    for parent in node.parents() {
        build_topo(parent, topo, visited);
    }

    topo.push(node);
}
