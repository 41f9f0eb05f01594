use generational_arena::Index;
use termtree::Tree;
use tracing::instrument;

use crate::domain::arena::TreeArena;

pub trait TreeDisplay {
    fn to_tree_string(&self) -> Tree<String>;
}

impl TreeDisplay for TreeArena {
    #[instrument(level = "trace", skip(self))]
    fn to_tree_string(&self) -> Tree<String> {
        fn build_tree(arena: &TreeArena, node_idx: Index, parent_tree: &mut Tree<String>) {
            for &child_idx in arena.children(node_idx) {
                if let Some(child) = arena.get_node(child_idx) {
                    let mut child_tree = Tree::new(child.data.to_string());
                    build_tree(arena, child_idx, &mut child_tree);
                    parent_tree.push(child_tree);
                }
            }
        }

        let root = self.root();
        let label = self.key(root).unwrap_or_default();
        let mut tree = Tree::new(if label.is_empty() { "(root)".to_string() } else { label.to_string() });
        build_tree(self, root, &mut tree);
        tree
    }
}
