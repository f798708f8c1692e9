use std::collections::HashSet;

use crate::{Error, PageTree, Result, RuleFailure, RuleSet};

/// Finds the current top-level blocks of a page.
#[derive(Clone, Debug)]
pub struct Discovery {
    roots: Vec<String>,
    rules: RuleSet,
}

impl Discovery {
    pub fn new(roots: Vec<String>, rules: RuleSet) -> Self {
        Self { roots, rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// The first content root that exists, falling back to the document root.
    pub fn root<T: PageTree>(&self, tree: &T) -> T::Node {
        let doc = tree.document_root();
        for selector in &self.roots {
            match tree.select_all(&doc, selector) {
                Ok(found) => {
                    if let Some(first) = found.into_iter().next() {
                        return first;
                    }
                }
                Err(_err) => {
                    vdebug!(selector = %selector, error = %_err, "Discovery: root selector failed");
                }
            }
        }
        doc
    }

    /// Returns the top-level blocks in first-seen order.
    ///
    /// A rule that fails to evaluate is skipped. Only when every rule fails is
    /// [`Error::Discovery`] returned.
    pub fn find_blocks<T: PageTree>(&self, tree: &T) -> Result<Vec<T::Node>> {
        let root = self.root(tree);
        let mut collected = Vec::new();
        let mut seen = HashSet::new();
        let mut failures = Vec::new();

        for rule in &self.rules.selectors {
            match tree.select_all(&root, rule) {
                Ok(found) => {
                    for node in found {
                        if seen.insert(node.clone()) {
                            collected.push(node);
                        }
                    }
                }
                Err(err) => {
                    vdebug!(rule = %rule, error = %err, "Discovery: rule failed");
                    failures.push(RuleFailure {
                        rule: rule.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        if !failures.is_empty() && failures.len() == self.rules.selectors.len() {
            return Err(Error::Discovery { failures });
        }

        collected.retain(|node| {
            let mut cur = tree.parent(node);
            while let Some(p) = cur {
                if seen.contains(&p) {
                    return false;
                }
                cur = tree.parent(&p);
            }
            true
        });

        vtrace!(blocks = collected.len(), "Discovery::find_blocks");
        Ok(collected)
    }

    /// Whether `node` is, or contains, something the rule set matches.
    pub fn touches<T: PageTree>(&self, tree: &T, node: &T::Node) -> bool {
        self.rules.selectors.iter().any(|rule| {
            tree.matches(node, rule).unwrap_or(false)
                || tree.select_all(node, rule).is_ok_and(|found| !found.is_empty())
        })
    }

    /// `node` itself if it matches, otherwise every matching descendant.
    pub fn matching_within<T: PageTree>(&self, tree: &T, node: &T::Node) -> Vec<T::Node> {
        if self
            .rules
            .selectors
            .iter()
            .any(|rule| tree.matches(node, rule).unwrap_or(false))
        {
            return vec![node.clone()];
        }
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for rule in &self.rules.selectors {
            if let Ok(found) = tree.select_all(node, rule) {
                for n in found {
                    if seen.insert(n.clone()) {
                        out.push(n);
                    }
                }
            }
        }
        out
    }
}
