use chrono::{DateTime, Local};
use serde::Deserialize;

/// Body of a broadcast notification event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub message: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

fn default_kind() -> String {
    "info".to_string()
}

#[derive(Debug, Clone)]
pub struct NotificationItem {
    pub id: u64,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub received_at: DateTime<Local>,
    pub sent_at: Option<String>,
}

impl NotificationItem {
    pub fn time_label(&self) -> String {
        self.received_at.format("%H:%M").to_string()
    }
}

/// Session-only notification list, newest first, with an unread counter.
///
/// The counter tracks arrivals since the last `mark_read` or `clear`. It is not derived
/// from the list, so evicting old entries leaves it untouched.
pub struct NotificationFeed {
    items: Vec<NotificationItem>,
    unread: usize,
    max_items: Option<usize>,
    last_id: u64,
}

impl NotificationFeed {
    /// `max_items == 0` keeps everything.
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            unread: 0,
            max_items: (max_items > 0).then_some(max_items),
            last_id: 0,
        }
    }

    pub fn items(&self) -> &[NotificationItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn add(&mut self, item: NotificationItem) {
        self.last_id = self.last_id.max(item.id);
        self.items.insert(0, item);
        self.unread += 1;
        if let Some(max) = self.max_items {
            self.items.truncate(max);
        }
    }

    pub fn push_payload(&mut self, payload: NotificationPayload) -> &NotificationItem {
        let received_at = Local::now();
        let item = NotificationItem {
            id: self.next_id(received_at),
            title: payload.title,
            message: payload.message,
            kind: if payload.kind.trim().is_empty() { default_kind() } else { payload.kind },
            received_at,
            sent_at: payload.timestamp,
        };
        self.add(item);
        &self.items[0]
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.unread = 0;
    }

    pub fn mark_read(&mut self) {
        self.unread = 0;
    }

    // Millisecond timestamps, bumped so that bursts still get distinct ids.
    fn next_id(&self, at: DateTime<Local>) -> u64 {
        let millis = at.timestamp_millis().max(0) as u64;
        millis.max(self.last_id + 1)
    }
}
