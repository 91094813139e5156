use crate::events::{EventKind, WindowEvent, WindowHandle, WindowInfo};
use crate::debug_if_enabled;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Текущее состояние отслеживаемых окон.
///
/// Все операции сериализуются одной блокировкой; наружу отдаются только копии.
#[derive(Debug, Default)]
pub struct WindowStore {
    windows: RwLock<BTreeMap<WindowHandle, WindowInfo>>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, info: WindowInfo) {
        self.windows.write().insert(info.handle, info);
    }

    pub fn remove(&self, handle: WindowHandle) -> Option<WindowInfo> {
        self.windows.write().remove(&handle)
    }

    pub fn get(&self, handle: WindowHandle) -> Option<WindowInfo> {
        self.windows.read().get(&handle).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<WindowHandle, WindowInfo> {
        self.windows.read().clone()
    }

    pub fn len(&self) -> usize {
        self.windows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.read().is_empty()
    }

    pub fn replace_all(&self, infos: impl IntoIterator<Item = WindowInfo>) {
        let fresh: BTreeMap<_, _> = infos.into_iter().map(|info| (info.handle, info)).collect();
        *self.windows.write() = fresh;
    }

    /// Окна, удовлетворяющие фильтру, в порядке возрастания идентификатора
    pub fn select(&self, mut filter: impl FnMut(&WindowInfo) -> bool) -> Vec<WindowInfo> {
        self.windows
            .read()
            .values()
            .filter(|info| filter(info))
            .cloned()
            .collect()
    }

    /// Применяет событие к состоянию
    pub fn apply(&self, event: &WindowEvent) {
        let handle = event.handle();
        match event.kind {
            EventKind::Created | EventKind::Shown => {
                self.upsert(event.window.clone());
                debug_if_enabled!("Окно {} добавлено/обновлено", handle);
            }
            EventKind::Destroyed | EventKind::Hidden => {
                if self.remove(handle).is_some() {
                    debug_if_enabled!("Окно {} удалено", handle);
                }
            }
            EventKind::NameChanged => {
                let mut windows = self.windows.write();
                match windows.get_mut(&handle) {
                    Some(existing) => existing.merge_from(&event.window),
                    None => {
                        windows.insert(handle, event.window.clone());
                    }
                }
                debug_if_enabled!("Информация об окне {} обновлена", handle);
            }
            EventKind::Foreground => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(handle: u64, title: &str) -> WindowInfo {
        WindowInfo::new(WindowHandle(handle), title).with_class("Cls")
    }

    #[test]
    fn created_replaces_entry_wholesale() {
        let store = WindowStore::new();
        store.upsert(info(1, "Old").with_pid(10).with_executable("/bin/old"));

        store.apply(&WindowEvent::created(info(1, "New")));

        let stored = store.get(WindowHandle(1)).unwrap();
        assert_eq!(stored.title, "New");
        assert_eq!(stored.owner_process_id, None);
    }

    #[test]
    fn name_change_merges_fields() {
        let store = WindowStore::new();
        store.upsert(info(1, "Old").with_pid(10).with_executable("/bin/app"));

        store.apply(&WindowEvent::name_changed(info(1, "Renamed")));

        let stored = store.get(WindowHandle(1)).unwrap();
        assert_eq!(stored.title, "Renamed");
        assert_eq!(stored.owner_process_id, Some(10));
        assert_eq!(stored.executable_path.as_deref(), Some("/bin/app"));
    }

    #[test]
    fn name_change_inserts_unknown_window() {
        let store = WindowStore::new();
        store.apply(&WindowEvent::name_changed(info(5, "Late")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn destroyed_and_hidden_remove_entry() {
        let store = WindowStore::new();
        store.upsert(info(1, "A"));
        store.upsert(info(2, "B"));

        store.apply(&WindowEvent::destroyed(WindowInfo::gone(WindowHandle(1), "A", "Cls")));
        store.apply(&WindowEvent::new(EventKind::Hidden, info(2, "B")));
        // Удаление неизвестного окна не является ошибкой
        store.apply(&WindowEvent::destroyed(WindowInfo::gone(WindowHandle(3), "C", "Cls")));

        assert!(store.is_empty());
    }

    #[test]
    fn foreground_leaves_state_untouched() {
        let store = WindowStore::new();
        store.upsert(info(1, "A"));
        store.apply(&WindowEvent::foreground(info(1, "Changed?")));
        assert_eq!(store.get(WindowHandle(1)).unwrap().title, "A");
    }

    #[test]
    fn snapshot_is_a_copy() {
        let store = WindowStore::new();
        store.upsert(info(1, "A"));
        let mut snapshot = store.snapshot();
        snapshot.clear();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn select_is_ordered_by_handle() {
        let store = WindowStore::new();
        store.replace_all(vec![info(3, "C"), info(1, "A"), info(2, "B").with_visibility(false)]);

        let visible: Vec<u64> = store
            .select(|w| w.is_visible)
            .iter()
            .map(|w| w.handle.value())
            .collect();
        assert_eq!(visible, vec![1, 3]);
    }
}
