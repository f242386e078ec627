// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Projection attribute sets and their superset relation

use log::debug;

use super::cache_config::{AttributeSetConfig, TemplateConfig};
use crate::query::AttributeSelection;

/// How two attribute lists relate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetRelation {
    Equal,
    Subset,
    Superset,
    Unrelated,
}

/// A configured attribute set
#[derive(Debug, Clone)]
pub struct AttributeSet {
    pub name: String,
    /// `None` stands for all user attributes
    pub attributes: Option<Vec<String>>,
    /// Indices of the sets strictly containing this one
    pub supersets: Vec<usize>,
    /// Whether any template uses this set
    pub referenced: bool,
}

impl AttributeSet {
    pub fn is_all(&self) -> bool {
        self.attributes.is_none()
    }

    /// Set equality with a requested attribute list, order ignored
    fn matches_selection(&self, selection: &AttributeSelection) -> bool {
        match &self.attributes {
            None => selection.is_unspecified(),
            Some(attrs) => {
                let requested = selection.attributes();
                !selection.is_unspecified()
                    && requested.len() == attrs.len()
                    && requested.iter().all(|a| attrs.contains(a))
            }
        }
    }
}

/// All attribute sets, with supersets computed at load time
#[derive(Debug, Clone, Default)]
pub struct AttributeSetRegistry {
    sets: Vec<AttributeSet>,
}

impl AttributeSetRegistry {
    pub fn new(configs: &[AttributeSetConfig], templates: &[TemplateConfig]) -> Self {
        let mut sets: Vec<AttributeSet> = configs
            .iter()
            .enumerate()
            .map(|(idx, config)| AttributeSet {
                name: if config.name.is_empty() {
                    format!("set{}", idx)
                } else {
                    config.name.clone()
                },
                attributes: if config.is_all() {
                    None
                } else {
                    let mut attrs: Vec<String> = Vec::with_capacity(config.attributes.len());
                    for attr in config.attributes.iter().map(|a| a.to_lowercase()) {
                        if !attrs.contains(&attr) {
                            attrs.push(attr);
                        }
                    }
                    Some(attrs)
                },
                supersets: Vec::new(),
                referenced: templates.iter().any(|t| t.attr_set == idx),
            })
            .collect();

        for i in 0..sets.len() {
            for j in (i + 1)..sets.len() {
                match compare_sets(&sets[i], &sets[j]) {
                    SetRelation::Subset => sets[i].supersets.push(j),
                    SetRelation::Superset => sets[j].supersets.push(i),
                    SetRelation::Equal => {
                        sets[i].supersets.push(j);
                        sets[j].supersets.push(i);
                    }
                    SetRelation::Unrelated => {}
                }
            }
        }

        for (idx, set) in sets.iter().enumerate() {
            debug!(
                "Attribute set {} ({}): supersets {:?}",
                idx, set.name, set.supersets
            );
        }

        Self { sets }
    }

    /// Index of the first set equal to the requested attribute list
    pub fn classify(&self, selection: &AttributeSelection) -> Option<usize> {
        self.sets.iter().position(|set| set.matches_selection(selection))
    }

    /// Whether results projected onto `candidate` can answer a query on `set`
    pub fn covers(&self, candidate: usize, set: usize) -> bool {
        candidate == set
            || self
                .sets
                .get(set)
                .is_some_and(|s| s.supersets.contains(&candidate))
    }

    pub fn get(&self, idx: usize) -> Option<&AttributeSet> {
        self.sets.get(idx)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeSet> {
        self.sets.iter()
    }
}

fn compare_sets(left: &AttributeSet, right: &AttributeSet) -> SetRelation {
    match (&left.attributes, &right.attributes) {
        (None, None) => SetRelation::Equal,
        (None, Some(_)) => SetRelation::Superset,
        (Some(_), None) => SetRelation::Subset,
        (Some(l), Some(r)) => {
            let l_in_r = l.iter().all(|a| r.contains(a));
            let r_in_l = r.iter().all(|a| l.contains(a));
            match (l_in_r, r_in_l) {
                (true, true) => SetRelation::Equal,
                (true, false) => SetRelation::Subset,
                (false, true) => SetRelation::Superset,
                (false, false) => SetRelation::Unrelated,
            }
        }
    }
}
