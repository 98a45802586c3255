//! Assembles the role-tagged message stack sent to the model.

use miled_core::{HistoryEntry, KernelFlags, Message, Role};

use crate::kernel::KernelFlag;

/// Seven conversational turns.
pub const HISTORY_LIMIT: usize = 14;

/// The most recent `HISTORY_LIMIT` entries, oldest dropped first.
pub fn trim_history(history: &[HistoryEntry]) -> &[HistoryEntry] {
    let start = history.len().saturating_sub(HISTORY_LIMIT);
    &history[start..]
}

/// Only `assistant` survives as-is. A claimed `system` role becomes
/// `assistant` under `preventRoleMutation`; everything else is `user`.
pub fn normalize_role(role: &str, flags: &KernelFlags) -> Role {
    match role {
        "assistant" => Role::Assistant,
        "system" if KernelFlag::PreventRoleMutation.is_set(flags) => Role::Assistant,
        _ => Role::User,
    }
}

/// System prompt, trimmed history, then the current message. The stack
/// holds exactly one system message.
pub fn build_message_stack(
    system_prompt: &str,
    history: &[HistoryEntry],
    message: &str,
    flags: &KernelFlags,
) -> Vec<Message> {
    let history = trim_history(history);
    let mut stack = Vec::with_capacity(history.len() + 2);

    stack.push(Message::system(system_prompt));
    stack.extend(
        history
            .iter()
            .map(|entry| Message::new(normalize_role(&entry.role, flags), entry.content.clone())),
    );
    stack.push(Message::user(message));

    stack
}
