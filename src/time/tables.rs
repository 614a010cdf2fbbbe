use crate::graph::{Graph, NodeId};
use crate::storage::{Properties, StorageError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Where calendar tables live and are persisted.
pub(crate) struct Backing {
    pub graph: Arc<Graph>,
    pub properties: Properties,
    pub owner: String,
}

impl Backing {
    fn load_ids(&self, key: &str) -> Option<Vec<NodeId>> {
        match self.properties.get_property::<Vec<u64>>(&self.owner, key) {
            Ok(ids) => ids.map(|ids| ids.into_iter().map(NodeId).collect()),
            Err(e) => {
                log::error!("Failed to load calendar table {}: {}", key, e);
                None
            }
        }
    }

    fn save_ids(&self, key: &str, ids: &[NodeId]) -> Result<(), StorageError> {
        let raw: Vec<u64> = ids.iter().map(|id| id.0).collect();
        self.properties.save_property(&self.owner, key, &raw)
    }

    /// Makes sure a cached constant still carries a pin.
    fn repair_pin(&self, id: NodeId) {
        if self.graph.usage(id) == Some(0) {
            log::debug!("re-pinning calendar node {:?}", id);
            self.graph.pin(id);
        }
    }
}

#[derive(Default)]
struct TableState {
    ids: Vec<NodeId>,
    loaded: bool,
    dirty: bool,
}

/// Fixed-size table of pinned integer constants; slot `i` holds `first + i`.
pub struct CalendarTable {
    key: &'static str,
    first: i64,
    len: usize,
    state: Mutex<TableState>,
}

impl CalendarTable {
    pub fn new(key: &'static str, first: i64, len: usize) -> Self {
        Self {
            key,
            first,
            len,
            state: Mutex::new(TableState::default()),
        }
    }

    pub fn key(&self) -> &'static str { self.key }
    pub fn len(&self) -> usize { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }

    fn is_valid(&self, ids: &[NodeId], graph: &Graph) -> bool {
        ids.len() >= self.len
            && ids
                .iter()
                .take(self.len)
                .enumerate()
                .all(|(i, id)| graph.int_value(*id) == Some(self.first + i as i64))
    }

    fn ensure(&self, state: &mut TableState, backing: &Backing) {
        if state.loaded {
            return;
        }
        state.loaded = true;

        if let Some(mut ids) = backing.load_ids(self.key) {
            if self.is_valid(&ids, &backing.graph) {
                ids.truncate(self.len);
                ids.iter().for_each(|id| backing.repair_pin(*id));
                state.ids = ids;
                return;
            }
            log::warn!("Calendar table {} is incomplete, rebuilding", self.key);
        }

        state.ids = (0..self.len)
            .map(|i| {
                let id = backing.graph.create_constant_int(self.first + i as i64);
                backing.graph.pin(id);
                id
            })
            .collect();
        state.dirty = true;
    }

    pub(crate) fn get(&self, index: usize, backing: &Backing) -> Option<NodeId> {
        let mut state = self.state.lock();
        self.ensure(&mut state, backing);
        state.ids.get(index).copied()
    }

    /// Node for a clock value, `None` when outside the table's range.
    pub(crate) fn for_value(&self, value: i64, backing: &Backing) -> Option<NodeId> {
        let index = value.checked_sub(self.first)?;
        if index < 0 {
            return None;
        }
        self.get(index as usize, backing)
    }

    pub(crate) fn ids(&self, backing: &Backing) -> Vec<NodeId> {
        let mut state = self.state.lock();
        self.ensure(&mut state, backing);
        state.ids.clone()
    }

    pub(crate) fn preload(&self, backing: &Backing) {
        let mut state = self.state.lock();
        self.ensure(&mut state, backing);
    }

    /// Writes the table when it changed since the last flush.
    pub(crate) fn flush(&self, backing: &Backing) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(false);
        }
        backing.save_ids(self.key, &state.ids)?;
        state.dirty = false;
        Ok(true)
    }

    pub(crate) fn reset(&self) {
        *self.state.lock() = TableState::default();
    }
}

#[derive(Default)]
struct YearState {
    years: HashMap<i32, NodeId>,
    loaded: bool,
    dirty: bool,
}

/// Open map of year -> pinned constant; one node per year for the whole process.
pub struct YearTable {
    state: Mutex<YearState>,
}

impl YearTable {
    pub const KEY: &'static str = "Years";

    pub fn new() -> Self {
        Self {
            state: Mutex::new(YearState::default()),
        }
    }

    fn ensure(state: &mut YearState, backing: &Backing) {
        if state.loaded {
            return;
        }
        state.loaded = true;

        for id in backing.load_ids(Self::KEY).unwrap_or_default() {
            match backing.graph.int_value(id).and_then(|v| i32::try_from(v).ok()) {
                Some(year) => {
                    backing.repair_pin(id);
                    state.years.insert(year, id);
                }
                None => state.dirty = true,
            }
        }
    }

    fn lookup(state: &mut YearState, year: i32, backing: &Backing) -> NodeId {
        if let Some(&id) = state.years.get(&year) {
            if backing.graph.contains(id) {
                backing.repair_pin(id);
                return id;
            }
        }
        // Dedicated node, never shared with ordinary integer literals.
        let id = backing.graph.create_constant_int(year as i64);
        backing.graph.pin(id);
        state.years.insert(year, id);
        state.dirty = true;
        id
    }

    pub(crate) fn get(&self, year: i32, backing: &Backing) -> NodeId {
        self.with_year(year, backing, |id| id)
    }

    /// Runs `f` with the year node while holding the table lock, so the node
    /// can't be reclaimed before `f` links it into a structure.
    pub(crate) fn with_year<R>(&self, year: i32, backing: &Backing, f: impl FnOnce(NodeId) -> R) -> R {
        let mut state = self.state.lock();
        Self::ensure(&mut state, backing);
        let id = Self::lookup(&mut state, year, backing);
        f(id)
    }

    /// Drops the year node when nothing refers to it any more. Ids the table
    /// doesn't own are left alone.
    pub(crate) fn release_if_unreferenced(&self, id: NodeId, backing: &Backing) -> bool {
        let mut state = self.state.lock();
        Self::ensure(&mut state, backing);
        if !state.years.values().any(|v| *v == id) {
            return false;
        }
        if !backing.graph.is_unreferenced(id) {
            return false;
        }
        if backing.graph.unpin(id) != Some(0) {
            return false;
        }
        state.years.retain(|_, v| *v != id);
        state.dirty = true;
        backing.graph.delete_node(id)
    }

    pub(crate) fn len(&self, backing: &Backing) -> usize {
        let mut state = self.state.lock();
        Self::ensure(&mut state, backing);
        state.years.len()
    }

    pub(crate) fn flush(&self, backing: &Backing) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(false);
        }
        let mut ids: Vec<NodeId> = state.years.values().copied().collect();
        ids.sort();
        backing.save_ids(Self::KEY, &ids)?;
        state.dirty = false;
        Ok(true)
    }

    pub(crate) fn preload(&self, backing: &Backing) {
        let mut state = self.state.lock();
        Self::ensure(&mut state, backing);
    }

    pub(crate) fn reset(&self) {
        *self.state.lock() = YearState::default();
    }
}

impl Default for YearTable {
    fn default() -> Self {
        Self::new()
    }
}
