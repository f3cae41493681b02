//! Conversation message pages.
//!
//! New messages land on the last page (the newest one fetched). Deletes and
//! updates search every page since a message may sit on any of them. After a
//! batch that touched messages, call [`sort_pages`]: updates can arrive out
//! of chronological order.

use std::sync::Arc;

use nbsync_types::{ConversationMessage, FieldMutation, MessageId, Page, Paginated};

use crate::error::Result;
use crate::fields::Patchable;

/// What a successful [`create_message`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageInsert {
    /// Appended to the last page.
    Appended,
    /// Same id was already on the last page; replaced in place.
    Replaced,
    /// No pages existed; a one-page list was created.
    Created,
}

/// Add (or upsert) a message on the last page.
pub fn create_message(
    pages: &mut Paginated<ConversationMessage>,
    message: ConversationMessage,
) -> MessageInsert {
    let Some(last) = pages.pages.last_mut() else {
        pages.pages.push(Page::from_results(vec![message]));
        return MessageInsert::Created;
    };

    if let Some(slot) = last.results.iter_mut().find(|m| m.uuid == message.uuid) {
        *slot = Arc::new(message);
        return MessageInsert::Replaced;
    }

    last.results.push(Arc::new(message));
    last.count += 1;
    MessageInsert::Appended
}

/// Apply a mutation to the message with `id`, wherever it is.
///
/// Returns `Ok(false)` when no page holds the id.
pub fn update_message(
    pages: &mut Paginated<ConversationMessage>,
    id: &MessageId,
    mutation: &FieldMutation,
) -> Result<bool> {
    let slot = pages
        .pages
        .iter_mut()
        .flat_map(|p| p.results.iter_mut())
        .find(|m| m.uuid == *id);
    let Some(slot) = slot else {
        return Ok(false);
    };

    let mut updated = ConversationMessage::clone(slot);
    updated.apply_mutation(mutation)?;
    *slot = Arc::new(updated);
    Ok(true)
}

/// Remove `id` from every page. Returns how many copies were removed.
pub fn delete_message(pages: &mut Paginated<ConversationMessage>, id: &MessageId) -> usize {
    let mut removed = 0;
    for page in &mut pages.pages {
        let before = page.results.len();
        page.results.retain(|m| m.uuid != *id);
        let n = before - page.results.len();
        page.count = page.count.saturating_sub(n);
        removed += n;
    }
    removed
}

/// Sort every page ascending by `created_at`.
///
/// Stable, so messages with equal timestamps keep their arrival order.
pub fn sort_pages(pages: &mut Paginated<ConversationMessage>) {
    for page in &mut pages.pages {
        if !page.results.is_sorted_by_key(|m| m.created_at) {
            page.results.sort_by_key(|m| m.created_at);
        }
    }
}

/// Check the chronological invariant.
pub fn pages_sorted(pages: &Paginated<ConversationMessage>) -> bool {
    pages
        .pages
        .iter()
        .all(|p| p.results.is_sorted_by_key(|m| m.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbsync_types::ConversationId;
    use serde_json::json;

    fn msg(created_at: u64) -> ConversationMessage {
        ConversationMessage::new(MessageId::new(), ConversationId(7), created_at)
    }

    #[test]
    fn test_create_on_empty_makes_one_page() {
        let mut pages = Paginated::default();
        assert_eq!(create_message(&mut pages, msg(1)), MessageInsert::Created);
        assert_eq!(pages.pages.len(), 1);
        assert_eq!(pages.pages[0].count, 1);
    }

    #[test]
    fn test_create_appends_to_last_page() {
        let older = msg(1);
        let mut pages = Paginated::new(vec![
            Page::from_results(vec![older.clone()]),
            Page::from_results(vec![msg(2)]),
        ]);
        assert_eq!(create_message(&mut pages, msg(3)), MessageInsert::Appended);
        assert_eq!(pages.pages[0].results.len(), 1);
        assert_eq!(pages.pages[1].results.len(), 2);
        assert_eq!(pages.pages[1].count, 2);
    }

    #[test]
    fn test_create_same_id_replaces() {
        let m = msg(1);
        let mut pages = Paginated::new(vec![Page::from_results(vec![m.clone()])]);
        let again = m.clone().with_content("edited");
        assert_eq!(create_message(&mut pages, again), MessageInsert::Replaced);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages.pages[0].count, 1);
        assert_eq!(pages.pages[0].results[0].content, "edited");
    }

    #[test]
    fn test_update_finds_message_on_older_page() {
        let old = msg(1).with_content("Hello");
        let id = old.uuid;
        let mut pages = Paginated::new(vec![
            Page::from_results(vec![old]),
            Page::from_results(vec![msg(2)]),
        ]);
        let m = FieldMutation::append(["content"], " world");
        assert_eq!(update_message(&mut pages, &id, &m), Ok(true));
        assert_eq!(pages.pages[0].results[0].content, "Hello world");
    }

    #[test]
    fn test_update_missing_is_noop() {
        let mut pages = Paginated::new(vec![Page::from_results(vec![msg(1)])]);
        let m = FieldMutation::replace(["status"], json!("complete"));
        assert_eq!(update_message(&mut pages, &MessageId::new(), &m), Ok(false));
    }

    #[test]
    fn test_delete_from_every_page() {
        let m = msg(1);
        let mut pages = Paginated::new(vec![
            Page::from_results(vec![m.clone(), msg(2)]),
            Page::from_results(vec![m.clone()]),
        ]);
        assert_eq!(delete_message(&mut pages, &m.uuid), 2);
        assert_eq!(pages.pages[0].count, 1);
        assert_eq!(pages.pages[1].count, 0);
        assert!(pages.iter().all(|x| x.uuid != m.uuid));
    }

    #[test]
    fn test_sort_pages() {
        let mut pages = Paginated::new(vec![Page::from_results(vec![msg(5), msg(1), msg(3)])]);
        assert!(!pages_sorted(&pages));
        sort_pages(&mut pages);
        assert!(pages_sorted(&pages));
        let times: Vec<u64> = pages.iter().map(|m| m.created_at).collect();
        assert_eq!(times, vec![1, 3, 5]);
    }
}
