use crate::entity::RecipientId;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum NotifyError {
    #[error("Delivery to recipient {recipient} failed: {reason}")]
    Delivery {
        recipient: RecipientId,
        reason: String,
    },
}

impl NotifyError {
    pub fn delivery(recipient: RecipientId, reason: impl ToString) -> Self {
        NotifyError::Delivery {
            recipient,
            reason: reason.to_string(),
        }
    }
}
