//! Model-tree traversal.

use crate::jacobian::SharedJacobian;

/// A node in a model tree: a group or a component.
pub trait System {
    /// Dotted path of this system from the model root.
    fn pathname(&self) -> &str;

    /// Jacobian this system stores its partials in. Groups and their
    /// children may hand out the same instance.
    fn jacobian(&self) -> SharedJacobian;

    /// Direct children, in execution order.
    fn subsystems(&self) -> Vec<&dyn System> {
        Vec::new()
    }
}

/// Pre-order walk of a model tree.
pub fn system_iter(root: &dyn System, include_self: bool) -> Vec<&dyn System> {
    let mut out = Vec::new();
    if include_self {
        out.push(root);
    }
    for child in root.subsystems() {
        out.extend(system_iter(child, true));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jacobian::Jacobian;

    struct Node {
        path: String,
        jac: SharedJacobian,
        children: Vec<Node>,
    }

    impl System for Node {
        fn pathname(&self) -> &str {
            &self.path
        }

        fn jacobian(&self) -> SharedJacobian {
            self.jac.clone()
        }

        fn subsystems(&self) -> Vec<&dyn System> {
            self.children.iter().map(|c| c as &dyn System).collect()
        }
    }

    fn leaf(path: &str) -> Node {
        Node {
            path: path.into(),
            jac: Jacobian::new().into_shared(),
            children: Vec::new(),
        }
    }

    #[test]
    fn walk_is_preorder() {
        let mut sub = leaf("model.sub");
        sub.children.push(leaf("model.sub.c1"));
        let mut root = leaf("model");
        root.children.push(sub);
        root.children.push(leaf("model.c2"));

        let paths: Vec<&str> = system_iter(&root, true)
            .into_iter()
            .map(|s| s.pathname())
            .collect();
        assert_eq!(paths, vec!["model", "model.sub", "model.sub.c1", "model.c2"]);

        let without_root = system_iter(&root, false);
        assert_eq!(without_root.len(), 3);
        assert_eq!(without_root[0].pathname(), "model.sub");
    }
}
