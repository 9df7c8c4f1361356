// SPDX-License-Identifier: GPL-3.0-only

//! In-memory volume manager for tests

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use super::VolumeManager;

#[derive(Default)]
pub(crate) struct FakeVolumeManager {
    pub(crate) volumes: RefCell<Vec<(String, Option<i64>)>>,
    pub(crate) extent_size: Option<i64>,
    pub(crate) total_extents: Option<i64>,
    pub(crate) free_extents: Option<i64>,
    pub(crate) uuid: Option<String>,
    pub(crate) physical_volumes: Vec<String>,
    pub(crate) list_calls: Cell<usize>,
    pub(crate) size_calls: RefCell<HashMap<String, usize>>,
    /// Runs after every size query, e.g. to simulate a concurrent change
    pub(crate) after_size_query: Option<Box<dyn Fn(&FakeVolumeManager, &str)>>,
}

impl FakeVolumeManager {
    pub(crate) fn with_sizes(sizes: &[i64]) -> Self {
        let volumes = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| (format!("/dev/vg0/lv{i}"), Some(*size)))
            .collect();
        Self {
            volumes: RefCell::new(volumes),
            extent_size: Some(4 * 1024 * 1024),
            total_extents: Some(sizes.iter().sum::<i64>() + 50),
            free_extents: Some(50),
            uuid: Some("x9Qe2s-0000-vg0".to_string()),
            physical_volumes: vec!["/dev/sda2".to_string()],
            ..Self::default()
        }
    }

    pub(crate) fn set_size(&self, path: &str, size: Option<i64>) {
        if let Some(entry) = self
            .volumes
            .borrow_mut()
            .iter_mut()
            .find(|(p, _)| p == path)
        {
            entry.1 = size;
        }
    }

    pub(crate) fn size_calls_for(&self, path: &str) -> usize {
        self.size_calls.borrow().get(path).copied().unwrap_or(0)
    }

    pub(crate) fn total_size_calls(&self) -> usize {
        self.size_calls.borrow().values().sum()
    }
}

impl VolumeManager for FakeVolumeManager {
    fn list_volume_paths(&self, _group: &str) -> Vec<String> {
        self.list_calls.set(self.list_calls.get() + 1);
        self.volumes.borrow().iter().map(|(p, _)| p.clone()).collect()
    }

    fn volume_extent_count(&self, path: &str) -> Option<i64> {
        *self
            .size_calls
            .borrow_mut()
            .entry(path.to_string())
            .or_default() += 1;
        let size = self
            .volumes
            .borrow()
            .iter()
            .find(|(p, _)| p == path)
            .and_then(|(_, size)| *size);
        if let Some(hook) = &self.after_size_query {
            hook(self, path);
        }
        size
    }

    fn group_extent_size(&self, _group: &str) -> Option<i64> {
        self.extent_size
    }

    fn group_total_extents(&self, _group: &str) -> Option<i64> {
        self.total_extents
    }

    fn group_free_extents(&self, _group: &str) -> Option<i64> {
        self.free_extents
    }

    fn group_uuid(&self, _group: &str) -> Option<String> {
        self.uuid.clone()
    }

    fn physical_volume_paths(&self, _group: &str) -> Vec<String> {
        self.physical_volumes.clone()
    }
}
