//! Order of the cards in a card view.
//!
//! Card ids are unique at all times. While a card is being created inline
//! the list also holds a placeholder with the unsaved id, which is replaced
//! by the saved id in place once the new work package has been saved.

use serde::Serialize;
use tracing::debug;

use crate::model::WorkPackageId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CardOrder {
    cards: Vec<WorkPackageId>,
}

impl CardOrder {
    #[must_use]
    pub fn new(ids: impl IntoIterator<Item = WorkPackageId>) -> Self {
        let mut order = Self::default();
        order.set_order(ids);
        order
    }

    /// Cards as displayed, placeholder included.
    #[must_use]
    pub fn cards(&self) -> &[WorkPackageId] {
        &self.cards
    }

    /// Order of the saved cards, without the placeholder.
    #[must_use]
    pub fn current_order(&self) -> Vec<WorkPackageId> {
        self.cards.iter().filter(|id| !id.is_new()).cloned().collect()
    }

    #[must_use]
    pub fn has_placeholder(&self) -> bool {
        self.cards.iter().any(WorkPackageId::is_new)
    }

    /// The placeholder card cannot be dragged.
    #[must_use]
    pub fn can_move(&self, id: &WorkPackageId) -> bool {
        !id.is_new() && self.cards.contains(id)
    }

    /// Replace the saved cards, keeping an active placeholder.
    pub fn set_order(&mut self, ids: impl IntoIterator<Item = WorkPackageId>) {
        let placeholder = self.cards.iter().position(WorkPackageId::is_new);
        let mut cards = Vec::new();
        for id in ids {
            if !id.is_new() && !cards.contains(&id) {
                cards.push(id);
            }
        }
        if let Some(index) = placeholder {
            cards.insert(index.min(cards.len()), WorkPackageId::unsaved());
        }
        self.cards = cards;
    }

    /// Move `id` to `to_index` among the saved cards.
    pub fn move_to(&mut self, id: &WorkPackageId, to_index: usize) {
        if id.is_new() {
            return;
        }
        let mut order = self.current_order();
        order.retain(|existing| existing != id);
        order.insert(to_index.min(order.len()), id.clone());
        self.set_order(order);
    }

    /// Add `id` at `to_index` (appended when `None`). Adding a card that is
    /// already shown moves it.
    pub fn add(&mut self, id: WorkPackageId, to_index: Option<usize>) {
        if id.is_new() {
            return;
        }
        let mut order = self.current_order();
        order.retain(|existing| existing != &id);
        let index = to_index.map_or(order.len(), |index| index.min(order.len()));
        order.insert(index, id);
        self.set_order(order);
    }

    pub fn remove(&mut self, id: &WorkPackageId) -> bool {
        let before = self.cards.len();
        self.cards.retain(|existing| existing != id);
        self.cards.len() != before
    }

    /// Show the inline-create placeholder at the front.
    pub fn add_new_card(&mut self) {
        if !self.has_placeholder() {
            self.cards.insert(0, WorkPackageId::unsaved());
        }
    }

    pub fn remove_new_card(&mut self) -> bool {
        self.remove(&WorkPackageId::unsaved())
    }

    /// Replace the placeholder with the id of the saved work package.
    /// Returns `false` when no placeholder was shown.
    pub fn on_card_saved(&mut self, saved: WorkPackageId) -> bool {
        let Some(index) = self.cards.iter().position(WorkPackageId::is_new) else {
            return false;
        };
        self.cards.remove(index);
        debug!(id = %saved, index, "inline-created card saved");
        self.add(saved, Some(index));
        true
    }
}
