// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Template classification of incoming searches

use super::attr_set::AttributeSetRegistry;
use super::template::QueryTemplate;
use crate::query::Query;

/// Where a search fits among the configured templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Value-free shape of the search filter
    pub shape: String,
    /// Attributes the filter references
    pub filter_attributes: Vec<String>,
    /// Attribute set equal to the requested attributes
    pub attr_set: usize,
    /// Templates whose cached queries may answer the search, exact set first
    pub candidates: Vec<usize>,
    /// Template a live result would be admitted under
    pub admission_template: Option<usize>,
}

/// Classify a search. `None` means no template can answer or admit it.
pub fn classify(
    query: &Query,
    registry: &AttributeSetRegistry,
    templates: &[QueryTemplate],
) -> Option<Classification> {
    let attr_set = registry.classify(&query.attributes)?;

    let mut shape = String::new();
    let mut filter_attributes = Vec::new();
    query.filter.render_shape(&mut shape, &mut filter_attributes);

    let admission_template = templates
        .iter()
        .find(|t| t.attr_set == attr_set && t.shape == shape)
        .map(|t| t.id);

    let mut candidates: Vec<usize> = admission_template.into_iter().collect();
    candidates.extend(
        templates
            .iter()
            .filter(|t| t.attr_set != attr_set && t.shape == shape)
            .filter(|t| registry.covers(t.attr_set, attr_set))
            .map(|t| t.id),
    );

    if candidates.is_empty() {
        return None;
    }

    Some(Classification {
        shape,
        filter_attributes,
        attr_set,
        candidates,
        admission_template,
    })
}
