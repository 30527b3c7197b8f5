//! Window manager observations.
//!
//! The window manager under test reports what it did as [`WmEvent`]s. The
//! harness drains them on the primary loop into a [`Journal`], giving each a
//! sequence number so waits can tell fresh notifications from stale ones.

use std::collections::HashSet;

use serde::Serialize;

/// Window id assigned by the window manager.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct WindowId(pub u32);

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A window the window manager made visible.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ShownWindow {
    pub id: WindowId,
    pub geometry: Geometry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

/// Notifications from the window manager to the harness.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum WmEvent {
    /// The backend finished starting and screens can be enumerated
    #[serde(rename = "backend_ready")]
    BackendReady,
    /// A window became visible
    #[serde(rename = "window_shown")]
    WindowShown(ShownWindow),
    /// A window's client object was destroyed
    #[serde(rename = "window_closed")]
    WindowClosed { id: WindowId },
    /// The screen locker was engaged or released
    #[serde(rename = "lock_state")]
    LockStateChanged { locked: bool },
}

#[derive(Serialize, Clone, Debug)]
pub struct Entry {
    pub seq: u64,
    #[serde(flatten)]
    pub event: WmEvent,
}

/// Position in the journal. Entries recorded at or after a cursor are newer
/// than the moment the cursor was taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(u64);

#[derive(Debug, Default)]
pub struct Journal {
    entries: Vec<Entry>,
    next_seq: u64,
    closed: HashSet<WindowId>,
    backend_ready: bool,
}

impl Journal {
    pub fn record(&mut self, event: WmEvent) {
        match &event {
            WmEvent::BackendReady => self.backend_ready = true,
            WmEvent::WindowClosed { id } => {
                self.closed.insert(*id);
            }
            WmEvent::WindowShown(_) | WmEvent::LockStateChanged { .. } => {}
        }
        tracing::debug!("journal[{}]: {:?}", self.next_seq, event);
        self.entries.push(Entry {
            seq: self.next_seq,
            event,
        });
        self.next_seq += 1;
    }

    pub fn cursor(&self) -> Cursor {
        Cursor(self.next_seq)
    }

    /// Entries at or after `cursor`. Entries are ordered by `seq`.
    pub fn since(&self, cursor: Cursor) -> impl Iterator<Item = &Entry> {
        let start = self.entries.partition_point(|entry| entry.seq < cursor.0);
        self.entries[start..].iter()
    }

    /// First window shown at or after `cursor`.
    pub fn shown_since(&self, cursor: Cursor) -> Option<&ShownWindow> {
        self.since(cursor).find_map(|entry| match &entry.event {
            WmEvent::WindowShown(window) => Some(window),
            _ => None,
        })
    }

    pub fn is_closed(&self, id: WindowId) -> bool {
        self.closed.contains(&id)
    }

    pub fn backend_ready(&self) -> bool {
        self.backend_ready
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dumps the journal for failure diagnostics.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    fn shown(id: u32, width: i32, height: i32) -> WmEvent {
        WmEvent::WindowShown(ShownWindow {
            id: WindowId(id),
            geometry: Geometry {
                x: 0,
                y: 0,
                width,
                height,
            },
            title: None,
            app_id: None,
        })
    }

    #[test]
    fn test_cursor_excludes_earlier_windows() {
        let mut journal = Journal::default();
        journal.record(shown(1, 10, 10));
        let cursor = journal.cursor();
        assert!(journal.shown_since(cursor).is_none());

        journal.record(WmEvent::LockStateChanged { locked: true });
        journal.record(shown(2, 20, 20));
        journal.record(shown(3, 30, 30));
        assert_eq!(journal.shown_since(cursor).map(|w| w.id), Some(WindowId(2)));
    }

    #[test]
    fn test_since_starts_at_cursor() {
        let mut journal = Journal::default();
        journal.record(WmEvent::BackendReady);
        journal.record(shown(1, 10, 10));
        let cursor = journal.cursor();
        assert_eq!(journal.since(cursor).count(), 0);

        journal.record(WmEvent::WindowClosed { id: WindowId(1) });
        journal.record(shown(2, 10, 10));
        let seqs: Vec<u64> = journal.since(cursor).map(|entry| entry.seq).collect();
        assert_eq!(seqs, vec![2, 3]);
        assert_eq!(journal.since(Cursor(0)).count(), 4);
    }

    #[test]
    fn test_closed_windows_are_remembered() {
        let mut journal = Journal::default();
        assert!(!journal.is_closed(WindowId(4)));
        journal.record(WmEvent::WindowClosed { id: WindowId(4) });
        assert!(journal.is_closed(WindowId(4)));
        assert!(!journal.is_closed(WindowId(5)));
    }

    #[test]
    fn test_json_dump() {
        let mut journal = Journal::default();
        journal.record(WmEvent::BackendReady);
        journal.record(WmEvent::WindowShown(ShownWindow {
            id: WindowId(1),
            geometry: Geometry {
                x: 0,
                y: 0,
                width: 100,
                height: 50,
            },
            title: Some("term".into()),
            app_id: None,
        }));
        journal.record(WmEvent::WindowClosed { id: WindowId(1) });
        journal.record(WmEvent::LockStateChanged { locked: true });

        assert!(journal.backend_ready());
        assert_snapshot!(
            journal.to_json().unwrap(),
            @r#"[{"seq":0,"event":"backend_ready"},{"seq":1,"event":"window_shown","id":1,"geometry":{"x":0,"y":0,"width":100,"height":50},"title":"term"},{"seq":2,"event":"window_closed","id":1},{"seq":3,"event":"lock_state","locked":true}]"#
        );
    }
}
