//! Scenario tree construction.
//!
//! The tree has one level per step. Every node is a branch: the path of option
//! groups chosen so far. A step with decisions fans each parent out into one
//! child per option group; a step without decisions passes each parent through
//! to exactly one child with the same path. Nodes live in an arena and are
//! addressed by [`BranchId`]; the path is the human-readable label only.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decision::{Decision, OptionId};
use crate::error::{StepError, StepResult};

/// Separator between options chosen together in one step.
pub const GROUP_SEPARATOR: &str = "-";
/// Label of the empty path.
pub const BASE_SCENARIO: &str = "base";

/// Options chosen together at one step, e.g. `1A0-1B1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OptionGroup {
    pub step: usize,
    pub options: Vec<OptionId>,
}

impl OptionGroup {
    pub fn label(&self) -> String {
        self.options
            .iter()
            .map(|o| format!("{}{}", self.step, o.label()))
            .collect::<Vec<_>>()
            .join(GROUP_SEPARATOR)
    }
}

impl fmt::Display for OptionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Ordered option groups from the first decision step to the current one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchPath(Vec<OptionGroup>);

impl BranchPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn groups(&self) -> &[OptionGroup] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extended(&self, group: OptionGroup) -> Self {
        let mut groups = self.0.clone();
        groups.push(group);
        Self(groups)
    }

    pub fn starts_with(&self, prefix: &BranchPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// One label per group, used as nested directory names.
    pub fn segments(&self) -> Vec<String> {
        self.0.iter().map(OptionGroup::label).collect()
    }

    /// All options along the path, in the order they are applied.
    pub fn options(&self) -> impl Iterator<Item = (usize, &OptionId)> {
        self.0
            .iter()
            .flat_map(|g| g.options.iter().map(move |o| (g.step, o)))
    }
}

impl fmt::Display for BranchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str(BASE_SCENARIO)
        } else {
            f.write_str(&self.segments().join("/"))
        }
    }
}

/// Stable arena index of a branch node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchId(pub usize);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchStatus {
    Live,
    /// The branch itself failed.
    Failed,
    /// An ancestor failed.
    Pruned,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchNode {
    pub id: BranchId,
    pub step: usize,
    pub path: BranchPath,
    pub parent: Option<BranchId>,
    pub children: Vec<BranchId>,
    pub status: BranchStatus,
}

impl BranchNode {
    pub fn is_live(&self) -> bool {
        self.status == BranchStatus::Live
    }
}

/// Option groups for one step.
///
/// **Algorithm:** decisions are ordered by name; the groups are the n-way
/// cross product picking one option from each decision, with groups holding
/// the same set of options collapsed to their first occurrence. A single
/// decision yields one group per option.
pub fn option_groups(step: usize, decisions: &[&Decision]) -> Vec<OptionGroup> {
    let mut ordered: Vec<&Decision> = decisions.to_vec();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    let mut combos: Vec<Vec<OptionId>> = vec![Vec::new()];
    for decision in ordered {
        combos = combos
            .into_iter()
            .flat_map(|prefix| {
                decision.options.iter().map(move |option| {
                    let mut combo = prefix.clone();
                    combo.push(option.clone());
                    combo
                })
            })
            .collect();
    }

    let mut seen: Vec<Vec<OptionId>> = Vec::new();
    let mut groups = Vec::new();
    for combo in combos {
        if combo.is_empty() {
            continue;
        }
        let mut as_set = combo.clone();
        as_set.sort();
        as_set.dedup();
        if seen.contains(&as_set) {
            continue;
        }
        seen.push(as_set);
        groups.push(OptionGroup {
            step,
            options: combo,
        });
    }
    groups
}

/// Arena of branch nodes, one level per step.
#[derive(Debug, Clone, Default)]
pub struct ScenarioTree {
    nodes: Vec<BranchNode>,
    levels: Vec<Vec<BranchId>>,
}

impl ScenarioTree {
    /// Build the full tree for `num_steps` steps.
    pub fn build(num_steps: usize, decisions: &[Decision]) -> StepResult<Self> {
        if num_steps == 0 {
            return Err(StepError::config("cannot build a scenario tree with zero steps"));
        }
        if let Some(late) = decisions.iter().find(|d| d.step >= num_steps) {
            return Err(StepError::config(format!(
                "decision {} targets step {} but the run has only {num_steps} steps",
                late.name, late.step
            )));
        }

        let mut by_step: BTreeMap<usize, Vec<&Decision>> = BTreeMap::new();
        for decision in decisions {
            by_step.entry(decision.step).or_default().push(decision);
        }

        let mut tree = ScenarioTree::default();
        for step in 0..num_steps {
            let groups = by_step
                .get(&step)
                .map(|ds| option_groups(step, ds))
                .unwrap_or_default();
            let parents: Vec<Option<BranchId>> = if step == 0 {
                vec![None]
            } else {
                tree.levels[step - 1].iter().copied().map(Some).collect()
            };

            let mut level = Vec::new();
            for parent in parents {
                let base = parent
                    .map(|id| tree.nodes[id.0].path.clone())
                    .unwrap_or_default();
                if groups.is_empty() {
                    level.push(tree.push_node(step, base, parent));
                } else {
                    for group in &groups {
                        level.push(tree.push_node(step, base.extended(group.clone()), parent));
                    }
                }
            }
            debug!(step, branches = level.len(), "planned step branches");
            tree.levels.push(level);
        }
        Ok(tree)
    }

    fn push_node(&mut self, step: usize, path: BranchPath, parent: Option<BranchId>) -> BranchId {
        let id = BranchId(self.nodes.len());
        self.nodes.push(BranchNode {
            id,
            step,
            path,
            parent,
            children: Vec::new(),
            status: BranchStatus::Live,
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    pub fn num_steps(&self) -> usize {
        self.levels.len()
    }

    pub fn node(&self, id: BranchId) -> &BranchNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[BranchNode] {
        &self.nodes
    }

    pub fn level(&self, step: usize) -> &[BranchId] {
        self.levels.get(step).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn live_branches(&self, step: usize) -> Vec<BranchId> {
        self.level(step)
            .iter()
            .copied()
            .filter(|id| self.node(*id).is_live())
            .collect()
    }

    pub fn find(&self, step: usize, path: &BranchPath) -> Option<BranchId> {
        self.level(step)
            .iter()
            .copied()
            .find(|id| &self.node(*id).path == path)
    }

    /// A failure here has no sibling that could survive it.
    pub fn is_root(&self, id: BranchId) -> bool {
        self.node(id).path.is_root()
    }

    /// Mark `id` failed and every descendant pruned. Returns the descendants
    /// that were live until now.
    pub fn mark_failed(&mut self, id: BranchId) -> Vec<BranchId> {
        self.nodes[id.0].status = BranchStatus::Failed;
        let mut pruned = Vec::new();
        let mut stack = self.nodes[id.0].children.clone();
        while let Some(child) = stack.pop() {
            let node = &mut self.nodes[child.0];
            if node.status == BranchStatus::Live {
                node.status = BranchStatus::Pruned;
                pruned.push(child);
            }
            stack.extend(node.children.iter().copied());
        }
        pruned.sort();
        pruned
    }

    /// Live final-step descendants of `id` (or `id` itself on the last step).
    pub fn scenarios_under(&self, id: BranchId) -> Vec<BranchId> {
        let last = self.num_steps().saturating_sub(1);
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node(current);
            if !node.is_live() {
                continue;
            }
            if node.step == last {
                leaves.push(current);
            } else {
                stack.extend(node.children.iter().copied());
            }
        }
        leaves.sort();
        leaves
    }

    /// Live final-step branches; their paths name the scenarios.
    pub fn scenarios(&self) -> Vec<BranchId> {
        self.live_branches(self.num_steps().saturating_sub(1))
    }
}
