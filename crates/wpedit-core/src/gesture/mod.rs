//! Gesture-to-edit mapping.
//!
//! Each gesture translates pointer interaction into writes on a change-set
//! and decides when to save or discard it:
//!
//! - [`group_by`]: dropping a row into another group of a grouped table.
//! - [`timeline`]: dragging or resizing a bar on the timeline.
//! - [`card_order`]: reordering cards in a card view.

pub mod card_order;
pub mod group_by;
pub mod timeline;

pub use card_order::CardOrder;
pub use group_by::{Group, GroupByDrag};
pub use timeline::{
    DateRenderer, DateValues, DragDirection, DragState, InvalidScale, TimelineDrag,
    TimelineDriver, TimelineIntent, TimelineOutcome, ViewParams, WorkPackageDateRenderer,
};
