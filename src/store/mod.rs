//! In-process document store.
//!
//! Each collection is a `DashMap` keyed by document id. `update_if` evaluates
//! the guard and applies the mutation while holding the shard write lock for
//! that document, which makes it an atomic compare-and-swap at the single
//! document level. Nothing here spans documents.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;

pub trait Document: Clone {
    fn id(&self) -> Uuid;
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<T> {
    Updated(T),
    /// The document exists but the guard rejected it; carries the current copy.
    NotModified(T),
    NotFound,
}

pub struct Collection<T> {
    name: &'static str,
    docs: DashMap<Uuid, T>,
}

impl<T: Document> Collection<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            docs: DashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn insert(&self, doc: T) -> Result<T, AppError> {
        match self.docs.entry(doc.id()) {
            Entry::Occupied(_) => Err(AppError::Internal(format!(
                "duplicate id {} in {}",
                doc.id(),
                self.name
            ))),
            Entry::Vacant(slot) => {
                slot.insert(doc.clone());
                Ok(doc)
            }
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.docs.get(id).map(|entry| entry.value().clone())
    }

    pub fn require(&self, id: &Uuid, what: &str) -> Result<T, AppError> {
        self.get(id)
            .ok_or_else(|| AppError::NotFound(format!("{what} {id} not found")))
    }

    pub fn find<F>(&self, predicate: F) -> Vec<T>
    where
        F: Fn(&T) -> bool,
    {
        self.docs
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn all(&self) -> Vec<T> {
        self.find(|_| true)
    }

    pub fn count<F>(&self, predicate: F) -> usize
    where
        F: Fn(&T) -> bool,
    {
        self.docs
            .iter()
            .filter(|entry| predicate(entry.value()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Removes the document iff `guard` holds, under the same shard lock.
    /// `Updated` carries the removed copy.
    pub fn remove_if<G>(&self, id: &Uuid, guard: G) -> UpdateOutcome<T>
    where
        G: FnOnce(&T) -> bool,
    {
        if let Some((_, doc)) = self.docs.remove_if(id, |_, doc| guard(doc)) {
            return UpdateOutcome::Updated(doc);
        }
        match self.get(id) {
            Some(doc) => UpdateOutcome::NotModified(doc),
            None => UpdateOutcome::NotFound,
        }
    }

    /// Applies `apply` iff `guard` holds for the current document.
    pub fn update_if<G, A>(&self, id: &Uuid, guard: G, apply: A) -> UpdateOutcome<T>
    where
        G: FnOnce(&T) -> bool,
        A: FnOnce(&mut T),
    {
        let Some(mut doc) = self.docs.get_mut(id) else {
            return UpdateOutcome::NotFound;
        };

        if !guard(doc.value()) {
            return UpdateOutcome::NotModified(doc.value().clone());
        }

        apply(doc.value_mut());
        UpdateOutcome::Updated(doc.value().clone())
    }

    /// Unguarded in-place update, for commutative counter increments.
    pub fn update<A>(&self, id: &Uuid, apply: A) -> Option<T>
    where
        A: FnOnce(&mut T),
    {
        let mut doc = self.docs.get_mut(id)?;
        apply(doc.value_mut());
        Some(doc.value().clone())
    }
}
