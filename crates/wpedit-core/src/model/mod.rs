//! Domain types: work package snapshots, attribute values and schemas.

pub mod schema;
pub mod work_package;

pub use schema::{FieldKind, FieldSchema, Form, Schema};
pub use work_package::{
    AttrValue, DUE_DATE, LockVersion, Link, NEW_ID, PARENT, START_DATE, STATUS, SUBJECT, Snapshot,
    WorkPackageId,
};
