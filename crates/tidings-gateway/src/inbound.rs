/// Inbound channel traffic: learn identity mappings from bot updates.
///
/// On the bot platform a user's id doubles as the chat id of their private
/// chat with the bot, so any message from a user reveals their address.

use tracing::debug;

use tidings_store::{ChannelStore, StoreError};
use tidings_types::events::{BotChat, BotUpdate, BotUser, ChatKind};

/// Apply everything `update` reveals to the store. Returns how many records
/// changed.
pub fn apply_update(store: &ChannelStore, update: &BotUpdate) -> Result<usize, StoreError> {
    let mut changed = 0;

    if let Some(msg) = update.any_message() {
        changed += upsert_chat(store, &msg.chat, msg.from.as_ref())?;
        if msg.chat.kind != ChatKind::Private {
            if let Some(from) = &msg.from {
                changed += upsert_user(store, from)? as usize;
            }
        }
    }

    if let Some(member) = &update.my_chat_member {
        changed += upsert_chat(store, &member.chat, Some(&member.from))?;
    }

    debug!(update_id = update.update_id, changed, "Bot update applied");
    Ok(changed)
}

fn upsert_chat(store: &ChannelStore, chat: &BotChat, from: Option<&BotUser>) -> Result<usize, StoreError> {
    match chat.kind {
        ChatKind::Private => match from {
            Some(user) => Ok(upsert_user(store, user)? as usize),
            None => {
                // No sender details: the chat itself is all we know
                let external_id = chat.username.clone().unwrap_or_else(|| chat.id.to_string());
                Ok(store.upsert_user(&external_id, &[external_id.clone()], chat.id)? as usize)
            }
        },
        ChatKind::Group | ChatKind::Supergroup | ChatKind::Channel => {
            let title = chat
                .title
                .clone()
                .or_else(|| chat.username.clone())
                .unwrap_or_else(|| chat.id.to_string());
            Ok(store.upsert_group(chat.id, &title, chat.invite_link.as_deref())? as usize)
        }
    }
}

fn upsert_user(store: &ChannelStore, user: &BotUser) -> Result<bool, StoreError> {
    if user.is_bot {
        return Ok(false);
    }
    let external_id = user.username.clone().unwrap_or_else(|| user.id.to_string());

    let mut names = Vec::new();
    let full = user.full_name();
    if !full.is_empty() {
        names.push(full);
    }
    if let Some(username) = &user.username {
        if !names.contains(username) {
            names.push(username.clone());
        }
    }

    store.upsert_user(&external_id, &names, user.id)
}
