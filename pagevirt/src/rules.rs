use crate::{PageTree, Role};

/// How to classify the author role of a block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RoleRule {
    /// No classification; every block is [`Role::Unknown`].
    #[default]
    None,
    /// Read the role from an attribute on the block (e.g. `data-message-author-role`).
    Attribute(String),
    /// Blocks whose own or parent `class` contains `marker` have role `role`. Blocks without
    /// the marker are [`Role::Unknown`].
    ClassMarker { marker: String, role: Role },
}

/// A static, per-platform discovery rule set.
///
/// `selectors` are ordered most specific first. The engine never mutates a rule set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleSet {
    pub selectors: Vec<String>,
    pub role: RoleRule,
}

impl RuleSet {
    pub fn new<S: Into<String>>(selectors: impl IntoIterator<Item = S>) -> Self {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
            role: RoleRule::None,
        }
    }

    pub fn with_role_rule(mut self, role: RoleRule) -> Self {
        self.role = role;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn classify<T: PageTree>(&self, tree: &T, node: &T::Node) -> Role {
        match &self.role {
            RoleRule::None => Role::Unknown,
            RoleRule::Attribute(name) => tree
                .attribute(node, name)
                .map(|v| Role::parse(&v))
                .unwrap_or(Role::Unknown),
            RoleRule::ClassMarker { marker, role } => {
                let has_marker = |n: &T::Node| {
                    tree.attribute(n, "class")
                        .is_some_and(|c| c.contains(marker.as_str()))
                };
                let parent_has = tree.parent(node).is_some_and(|p| has_marker(&p));
                if has_marker(node) || parent_has {
                    *role
                } else {
                    Role::Unknown
                }
            }
        }
    }
}
