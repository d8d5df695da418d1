//! Turns a finished batch into the message sent back to the model.

use crate::executor::BatchReport;

/// Message to feed back after `report`, or `None` for an empty batch.
///
/// When the last block succeeded the model sees every successful block's report, in order.
/// When the last block failed it sees only that failure, even if earlier blocks succeeded.
#[must_use]
pub fn compose_feedback(report: &BatchReport) -> Option<String> {
    let last = report.last()?;
    if last.success {
        Some(report.full_output())
    } else {
        Some(last.message.clone())
    }
}
