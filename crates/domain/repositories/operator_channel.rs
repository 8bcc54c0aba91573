use mockall::automock;

use crate::domain::value_objects::operator_alerts::OperatorAlert;

#[automock]
pub trait OperatorChannel {
    /// Fire-and-forget. Must not block the caller.
    fn notify(&self, alert: OperatorAlert);
}
