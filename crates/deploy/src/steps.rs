//! Deployment steps and their ordering.
//!
//! Each step declares the tags that select it and the steps it depends on. A run
//! selects steps by tag, pulls in their dependencies and executes them in
//! dependency order.

use std::collections::{BTreeSet, VecDeque};

use anyhow::Result;

/// Selects which steps a run executes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Tag {
    All,
    Mocks,
    FundMe,
}

/// A deployment step.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum StepId {
    /// Deploy the mock price feed on local networks.
    Mocks,
    /// Deploy FundMe and verify it on public networks.
    FundMe,
}

/// Registration of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub id: StepId,
    pub tags: &'static [Tag],
    pub dependencies: &'static [StepId],
}

impl Step {
    fn is_selected_by(&self, tags: &[Tag]) -> bool {
        tags.is_empty() || tags.iter().any(|tag| self.tags.contains(tag))
    }
}

/// The steps of a FundMe deployment, in registration order.
pub const DEFAULT_STEPS: &[Step] = &[
    Step {
        id: StepId::Mocks,
        tags: &[Tag::All, Tag::Mocks],
        dependencies: &[],
    },
    Step {
        id: StepId::FundMe,
        tags: &[Tag::All, Tag::FundMe],
        dependencies: &[StepId::Mocks],
    },
];

/// Order the steps selected by `tags` so that every step runs after its dependencies.
///
/// No tag selects every step. Dependencies of a selected step are included even
/// when no tag selects them. Independent steps keep their registration order.
pub fn plan(steps: &[Step], tags: &[Tag]) -> Result<Vec<StepId>> {
    let find = |id: StepId| {
        steps
            .iter()
            .find(|step| step.id == id)
            .ok_or_else(|| anyhow::anyhow!("Step {} is not registered", id))
    };

    let mut selected = BTreeSet::new();
    let mut queue: VecDeque<StepId> = steps
        .iter()
        .filter(|step| step.is_selected_by(tags))
        .map(|step| step.id)
        .collect();
    while let Some(id) = queue.pop_front() {
        if selected.insert(id) {
            queue.extend(find(id)?.dependencies.iter().copied());
        }
    }

    // Kahn's algorithm, always picking the earliest registered ready step.
    let mut ordered = Vec::with_capacity(selected.len());
    let mut remaining: Vec<&Step> = steps
        .iter()
        .filter(|step| selected.contains(&step.id))
        .collect();
    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .position(|step| step.dependencies.iter().all(|dep| ordered.contains(dep)))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Dependency cycle between steps: {}",
                    remaining
                        .iter()
                        .map(|step| step.id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })?;
        ordered.push(remaining.remove(ready).id);
    }

    tracing::debug!(?tags, steps = ?ordered, "Deployment plan");
    Ok(ordered)
}
