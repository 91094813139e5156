use crate::events::{WindowHandle, WindowInfo, WindowSummary};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Поля окна, по которым сравниваются снимки
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub title: String,
    pub class: String,
}

pub type Snapshot = HashMap<WindowHandle, SnapshotEntry>;

/// Снимок из результата перечисления; окна без заголовка не отслеживаются.
pub fn snapshot_from_summaries(summaries: impl IntoIterator<Item = WindowSummary>) -> Snapshot {
    summaries
        .into_iter()
        .filter(|summary| !summary.title.is_empty())
        .map(|summary| {
            (
                summary.handle,
                SnapshotEntry {
                    title: summary.title,
                    class: summary.class,
                },
            )
        })
        .collect()
}

/// Снимок из состояния движка правил
pub fn snapshot_from_state(state: &BTreeMap<WindowHandle, WindowInfo>) -> Snapshot {
    state
        .values()
        .filter(|info| !info.title.is_empty())
        .map(|info| {
            (
                info.handle,
                SnapshotEntry {
                    title: info.title.clone(),
                    class: info.class.clone(),
                },
            )
        })
        .collect()
}

/// Разница между двумя снимками
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowDiff {
    pub created: BTreeSet<WindowHandle>,
    pub destroyed: BTreeSet<WindowHandle>,
    pub changed: BTreeSet<WindowHandle>,
}

impl WindowDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.destroyed.is_empty() && self.changed.is_empty()
    }

    pub fn len(&self) -> usize {
        self.created.len() + self.destroyed.len() + self.changed.len()
    }
}

pub fn diff(previous: &Snapshot, current: &Snapshot) -> WindowDiff {
    let mut result = WindowDiff::default();

    for (handle, entry) in current {
        match previous.get(handle) {
            None => {
                result.created.insert(*handle);
            }
            Some(old) if old != entry => {
                result.changed.insert(*handle);
            }
            Some(_) => {}
        }
    }

    result.destroyed = previous
        .keys()
        .filter(|handle| !current.contains_key(handle))
        .copied()
        .collect();

    result
}
