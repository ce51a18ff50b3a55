//! Attachments of a work package and their removal.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::WorkPackageApi;
use crate::error::EditError;
use crate::model::WorkPackageId;
use crate::notify::Notifier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub file_name: String,
}

impl Attachment {
    #[must_use]
    pub fn new(id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
        }
    }
}

/// The attachments currently listed for one work package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentCollection {
    pub work_package: WorkPackageId,
    pub elements: Vec<Attachment>,
}

impl AttachmentCollection {
    #[must_use]
    pub const fn new(work_package: WorkPackageId, elements: Vec<Attachment>) -> Self {
        Self {
            work_package,
            elements,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn contains(&self, attachment: &Attachment) -> bool {
        self.elements.iter().any(|a| a.id == attachment.id)
    }
}

/// Delete `attachment` through the API and drop it from `collection`.
///
/// On failure the collection is left as it was and the notifier receives
/// the error once. Returns whether the attachment was removed.
pub async fn remove_attachment(
    collection: &mut AttachmentCollection,
    attachment: &Attachment,
    api: &dyn WorkPackageApi,
    notifier: &dyn Notifier,
) -> bool {
    match api.delete_attachment(attachment).await {
        Ok(()) => {
            collection.elements.retain(|a| a.id != attachment.id);
            debug!(
                work_package = %collection.work_package,
                attachment = %attachment.id,
                "attachment removed"
            );
            true
        }
        Err(err) => {
            notifier.handle_raw_error(&EditError::Api(err), &collection.work_package);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::memory::{InMemoryApi, Operation};
    use crate::notify::RecordingNotifier;

    fn collection() -> AttachmentCollection {
        AttachmentCollection::new(
            WorkPackageId::new("7"),
            vec![Attachment::new("1", "plan.pdf"), Attachment::new("2", "logo.png")],
        )
    }

    #[tokio::test]
    async fn successful_delete_drops_element() {
        let api = InMemoryApi::new();
        let notifier = RecordingNotifier::new();
        let mut attachments = collection();
        let target = attachments.elements[0].clone();
        api.insert_attachment(&target);

        assert!(remove_attachment(&mut attachments, &target, &api, &notifier).await);
        assert_eq!(attachments.len(), 1);
        assert!(!attachments.contains(&target));
        assert_eq!(notifier.error_count(), 0);
    }

    #[tokio::test]
    async fn failed_delete_keeps_collection() {
        let api = InMemoryApi::new();
        let notifier = RecordingNotifier::new();
        let mut attachments = collection();
        let target = attachments.elements[1].clone();
        api.insert_attachment(&target);
        api.fail_next(
            Operation::DeleteAttachment,
            ApiError::Status {
                status: 500,
                message: "boom".into(),
            },
        );

        assert!(!remove_attachment(&mut attachments, &target, &api, &notifier).await);
        assert_eq!(attachments.elements, collection().elements);
        assert_eq!(notifier.error_count(), 1);
    }
}
