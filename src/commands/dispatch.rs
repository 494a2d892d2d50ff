//! Run the actions for a finalized utterance.

use super::table::CommandTable;
use crate::remote::{ActionError, RemoteClient};

/// Execute every entry `table` matches for `utterance`, in order.
///
/// Actions within an entry are awaited one after another.  `on_ack` receives
/// each matched entry's label once, right after that entry's first action
/// succeeds.  The first failing action aborts the whole dispatch; nothing is
/// retried.
///
/// Returns the number of entries executed.
pub async fn dispatch<F>(
    table: &CommandTable,
    client: &mut dyn RemoteClient,
    utterance: &str,
    mut on_ack: F,
) -> Result<usize, ActionError>
where
    F: FnMut(&str),
{
    let matched = table.lookup(utterance);
    if matched.is_empty() {
        log::debug!("commands: no match for \"{utterance}\"");
        return Ok(0);
    }

    for entry in &matched {
        log::info!("commands: \"{utterance}\" -> {}", entry.ack_label);
        if entry.actions.is_empty() {
            on_ack(&entry.ack_label);
            continue;
        }
        for (i, action) in entry.actions.iter().enumerate() {
            if let Err(e) = client.execute(*action).await {
                log::error!("commands: {action} failed: {e}");
                return Err(e);
            }
            if i == 0 {
                on_ack(&entry.ack_label);
            }
        }
    }

    Ok(matched.len())
}
