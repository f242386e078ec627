// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Global recency list over cached queries of every template
//!
//! Nodes are kept in a map keyed by query id with explicit prev/next links,
//! so unlinking from any position is O(1).

use std::collections::HashMap;

use super::template::QueryId;

#[derive(Debug, Clone, Copy)]
struct LruLink {
    prev: Option<QueryId>,
    next: Option<QueryId>,
    template_id: usize,
}

/// Doubly linked recency list. Head is most recently used.
#[derive(Debug, Default)]
pub struct LruList {
    links: HashMap<QueryId, LruLink>,
    head: Option<QueryId>,
    tail: Option<QueryId>,
}

impl LruList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_front(&mut self, id: QueryId, template_id: usize) {
        if self.links.contains_key(&id) {
            self.unlink(id);
        }
        let link = LruLink {
            prev: None,
            next: self.head,
            template_id,
        };
        if let Some(old_head) = self.head {
            if let Some(old) = self.links.get_mut(&old_head) {
                old.prev = Some(id);
            }
        } else {
            self.tail = Some(id);
        }
        self.head = Some(id);
        self.links.insert(id, link);
    }

    /// Remove a node; returns its template id if it was linked
    pub fn unlink(&mut self, id: QueryId) -> Option<usize> {
        let link = self.links.remove(&id)?;

        match link.prev {
            Some(prev) => {
                if let Some(p) = self.links.get_mut(&prev) {
                    p.next = link.next;
                }
            }
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => {
                if let Some(n) = self.links.get_mut(&next) {
                    n.prev = link.prev;
                }
            }
            None => self.tail = link.prev,
        }

        Some(link.template_id)
    }

    /// Move a node to the head. False when the node is not linked.
    pub fn promote(&mut self, id: QueryId) -> bool {
        if self.head == Some(id) {
            return true;
        }
        match self.unlink(id) {
            Some(template_id) => {
                self.push_front(id, template_id);
                true
            }
            None => false,
        }
    }

    /// Remove the least recently used node
    pub fn pop_back(&mut self) -> Option<(QueryId, usize)> {
        let tail = self.tail?;
        self.unlink(tail).map(|template_id| (tail, template_id))
    }

    /// Ids from most to least recently used
    pub fn order(&self) -> Vec<QueryId> {
        let mut order = Vec::with_capacity(self.links.len());
        let mut cursor = self.head;
        while let Some(id) = cursor {
            order.push(id);
            cursor = self.links.get(&id).and_then(|link| link.next);
        }
        order
    }
}
