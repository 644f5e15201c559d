//! Compact hash substrate: an integer-to-integer map with a selectable
//! open-addressing backend, used by [`crate::level_stack::LevelStack`] to
//! index cells at a single refinement level.

use crate::error::RemapError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU64, Ordering};

/// Probe sequences wrap modulo the table's capacity; this prime bounds the
/// multiplicative hash `h0` before it is folded into `[0, capacity)`.
const PRIME: u64 = 4294967291;
/// The jump multiplier for the prime-jump backend.
const PRIME_JUMP: u64 = 41;
/// Marks an empty slot's key in a compact table.
const EMPTY_KEY: i64 = -1;
/// Marks an unwritten slot in a perfect table, distinct from the `-1`
/// sentinel value a breadcrumb ancestor actually stores there.
const ABSENT_MARKER: i32 = i32::MIN;
/// Bound on probe attempts for a concurrent insert (§4.A).
const MAX_CONCURRENT_PROBES: u32 = 1000;

/// Which open-addressing backend a compact table uses, or `Perfect` for a
/// direct-indexed array, or `Auto` to defer the choice to the memory-ratio
/// heuristic at table creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HashKind {
    Perfect,
    Linear,
    Quadratic,
    PrimeJump,
    Auto,
}

/// Diagnostic verbosity, corresponding to `report_level ∈ {0,1,2,3}` in the
/// factory options. Unlike the donor source's textually duplicated
/// report-level functions, a single probe implementation checks this enum
/// and emits `log` records; it never changes the computed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum ReportLevel {
    Silent = 0,
    Collisions = 1,
    Verbose = 2,
    Trace = 3,
}

/// Which provision a concurrent insert uses to resolve contention on a
/// shared slot. Query is always lock-free in both modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// CAS the slot's key from empty to the new key; retry on loss.
    LockFree,
    /// Acquire the slot's per-slot lock, test-and-set, release.
    LockPerSlot,
}

/// Configuration for [`HashTable::create`], mirroring the `factory_opts`
/// of the external interface.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FactoryOptions {
    pub kind: HashKind,
    pub hash_mult: f64,
    pub mem_factor: f64,
    pub load_factor: f64,
    pub report_level: ReportLevel,
    pub mem_opt_factor: f64,
}

impl Default for FactoryOptions {
    fn default() -> Self {
        Self {
            kind: HashKind::Auto,
            hash_mult: 3.0,
            mem_factor: 20.0,
            load_factor: 1.0 / 3.0,
            report_level: ReportLevel::Silent,
            mem_opt_factor: 1.0,
        }
    }
}

/// Builder for [`FactoryOptions`], in the donor crate's fluent-builder
/// idiom (`KvStoreBuilder`/`VerifiedKvStoreBuilder`).
#[derive(Debug, Clone, Default)]
pub struct FactoryOptionsBuilder {
    opts: FactoryOptions,
}

impl FactoryOptionsBuilder {
    pub fn new() -> Self {
        Self {
            opts: FactoryOptions::default(),
        }
    }

    pub fn kind(mut self, kind: HashKind) -> Self {
        self.opts.kind = kind;
        self
    }

    pub fn hash_mult(mut self, hash_mult: f64) -> Self {
        self.opts.hash_mult = hash_mult;
        self.opts.load_factor = 1.0 / hash_mult;
        self
    }

    pub fn mem_factor(mut self, mem_factor: f64) -> Self {
        self.opts.mem_factor = mem_factor;
        self
    }

    pub fn mem_opt_factor(mut self, mem_opt_factor: f64) -> Self {
        self.opts.mem_opt_factor = mem_opt_factor;
        self
    }

    pub fn report_level(mut self, report_level: ReportLevel) -> Self {
        self.opts.report_level = report_level;
        self
    }

    pub fn build(self) -> FactoryOptions {
        self.opts
    }
}

/// The three states a probe can resolve to: a terminal leaf, an ancestor
/// breadcrumb ("descend further"), or no entry at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Leaf(i32),
    Sentinel,
    Absent,
}

impl Probe {
    pub fn is_leaf(self) -> bool {
        matches!(self, Probe::Leaf(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeKind {
    Linear,
    Quadratic,
    PrimeJump,
}

/// Generates successive probe positions for one key, per §4.A: linear
/// steps by 1, quadratic accumulates `n²` per collision, prime-jump
/// accumulates `n · jump`. All positions wrap modulo `capacity`.
struct ProbeSequence {
    pos: u64,
    capacity: u64,
    kind: ProbeKind,
    jump: u64,
    n: u64,
}

impl ProbeSequence {
    fn new(key: u64, a: u64, b: u64, capacity: usize, kind: ProbeKind) -> Self {
        let h0 = (((key as u128) * (a as u128) + (b as u128)) % PRIME as u128) % capacity as u128;
        Self {
            pos: h0 as u64,
            capacity: capacity as u64,
            kind,
            jump: 1 + key % PRIME_JUMP,
            n: 0,
        }
    }
}

impl Iterator for ProbeSequence {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let current = self.pos;
        self.n += 1;
        let step = match self.kind {
            ProbeKind::Linear => 1,
            ProbeKind::Quadratic => self.n * self.n,
            ProbeKind::PrimeJump => self.n * self.jump,
        };
        self.pos = (self.pos + step) % self.capacity;
        Some(current as usize)
    }
}

enum Backend {
    /// Direct-indexed array of size `size_hint`; slot = stored value.
    Perfect { slots: Vec<AtomicI32> },
    /// Open-addressed `(key, value)` pairs, capacity `compact`.
    Compact {
        keys: Vec<AtomicI64>,
        values: Vec<AtomicI32>,
        locks: Vec<parking_lot::Mutex<()>>,
        capacity: usize,
        probe_kind: ProbeKind,
        a: u64,
        b: u64,
    },
}

/// An integer-keyed hash table with a backend selected at creation time,
/// per the memory-ratio heuristic in §4.A.
pub struct HashTable {
    backend: Backend,
    resolved_kind: HashKind,
    report_level: ReportLevel,
    write_collisions: AtomicU64,
    read_collisions: AtomicU64,
}

impl HashTable {
    /// Chooses a backend and allocates storage.
    ///
    /// `size_hint` is the keyspace size for a perfect table (typically
    /// `stride² ` at the owning level); `ncells_hint` estimates the
    /// number of entries the table will actually hold.
    pub fn create(size_hint: usize, ncells_hint: usize, opts: &FactoryOptions) -> Self {
        let resolved_kind = Self::resolve_kind(size_hint, ncells_hint, opts);

        let backend = if resolved_kind == HashKind::Perfect {
            Backend::Perfect {
                slots: (0..size_hint).map(|_| AtomicI32::new(ABSENT_MARKER)).collect(),
            }
        } else {
            let capacity = ((ncells_hint as f64) * opts.hash_mult).ceil() as usize;
            let capacity = capacity.max(1);
            // Per-table RNG, not a process-global generator: two tables
            // created concurrently must not share (or contend over) state.
            let mut rng = ChaCha8Rng::from_os_rng();
            let a = rng.random_range(1..PRIME);
            let b = rng.random_range(1..PRIME);
            let probe_kind = match resolved_kind {
                HashKind::Linear => ProbeKind::Linear,
                HashKind::PrimeJump => ProbeKind::PrimeJump,
                _ => ProbeKind::Quadratic,
            };
            Backend::Compact {
                keys: (0..capacity).map(|_| AtomicI64::new(EMPTY_KEY)).collect(),
                values: (0..capacity).map(|_| AtomicI32::new(EMPTY_KEY as i32)).collect(),
                locks: (0..capacity).map(|_| parking_lot::Mutex::new(())).collect(),
                capacity,
                probe_kind,
                a,
                b,
            }
        };

        if opts.report_level >= ReportLevel::Verbose {
            log::debug!(
                "hash table created: kind={:?} size_hint={} ncells_hint={}",
                resolved_kind,
                size_hint,
                ncells_hint
            );
        }

        Self {
            backend,
            resolved_kind,
            report_level: opts.report_level,
            write_collisions: AtomicU64::new(0),
            read_collisions: AtomicU64::new(0),
        }
    }

    /// The memory-ratio heuristic: `perfect/compact < mem_factor` (scaled
    /// by `mem_opt_factor`) picks `PERFECT`, otherwise a compact backend
    /// (default `QUADRATIC`), unless the caller overrides via `opts.kind`.
    fn resolve_kind(size_hint: usize, ncells_hint: usize, opts: &FactoryOptions) -> HashKind {
        if opts.kind != HashKind::Auto {
            return opts.kind;
        }
        let perfect = size_hint.max(1) as f64;
        let compact = ((ncells_hint as f64) * opts.hash_mult).ceil().max(1.0);
        let mem_factor = if opts.mem_opt_factor != 1.0 {
            opts.mem_factor / (opts.mem_opt_factor * 0.2)
        } else {
            opts.mem_factor
        };
        if perfect / compact < mem_factor {
            HashKind::Perfect
        } else {
            HashKind::Quadratic
        }
    }

    /// The backend this table actually resolved to (never `Auto`).
    pub fn kind(&self) -> HashKind {
        self.resolved_kind
    }

    /// Clears the table back to the empty state. Cheap no-op immediately
    /// after `create`; useful when a table is reused across remaps.
    pub fn setup(&mut self) {
        match &mut self.backend {
            Backend::Perfect { slots } => {
                for slot in slots.iter_mut() {
                    *slot.get_mut() = ABSENT_MARKER;
                }
            }
            Backend::Compact { keys, values, .. } => {
                for key in keys.iter_mut() {
                    *key.get_mut() = EMPTY_KEY;
                }
                for value in values.iter_mut() {
                    *value.get_mut() = EMPTY_KEY as i32;
                }
            }
        }
        self.write_collisions.store(0, Ordering::Relaxed);
        self.read_collisions.store(0, Ordering::Relaxed);
    }

    /// Single-threaded upsert. Overwrites the value if `key` already has
    /// an entry. Bounded by the table's capacity to avoid looping
    /// forever on a misconfigured (overfull) table; callers should size
    /// the table such that load stays below 1, per §4.A.
    pub fn insert(&mut self, key: u64, value: i32) -> Result<(), RemapError> {
        match &mut self.backend {
            Backend::Perfect { slots } => {
                let idx = key as usize;
                if idx >= slots.len() {
                    return Err(RemapError::CapacityExceeded {
                        attempted: idx + 1,
                        capacity: slots.len(),
                    });
                }
                *slots[idx].get_mut() = value;
                Ok(())
            }
            Backend::Compact {
                keys,
                values,
                capacity,
                probe_kind,
                a,
                b,
                ..
            } => {
                let seq = ProbeSequence::new(key, *a, *b, *capacity, *probe_kind);
                let mut collisions = 0u64;
                for pos in seq.take(*capacity) {
                    let existing = *keys[pos].get_mut();
                    if existing == EMPTY_KEY || existing == key as i64 {
                        *keys[pos].get_mut() = key as i64;
                        *values[pos].get_mut() = value;
                        if self.report_level >= ReportLevel::Collisions {
                            self.write_collisions
                                .fetch_add(collisions, Ordering::Relaxed);
                        }
                        if self.report_level >= ReportLevel::Trace {
                            log::trace!(
                                "insert key={key} value={value} pos={pos} collisions={collisions}"
                            );
                        }
                        return Ok(());
                    }
                    collisions += 1;
                }
                Err(RemapError::CapacityExceeded {
                    attempted: collisions as usize + 1,
                    capacity: *capacity,
                })
            }
        }
    }

    /// Thread-safe upsert under the given concurrency policy. Bounded to
    /// 1000 probe attempts (§4.A); exceeding that bound surfaces
    /// `ContentionTimeout` rather than the donor source's silent drop.
    pub fn insert_concurrent(
        &self,
        key: u64,
        value: i32,
        policy: ConcurrencyPolicy,
    ) -> Result<(), RemapError> {
        match &self.backend {
            Backend::Perfect { slots } => {
                let idx = key as usize;
                if idx >= slots.len() {
                    return Err(RemapError::CapacityExceeded {
                        attempted: idx + 1,
                        capacity: slots.len(),
                    });
                }
                slots[idx].store(value, Ordering::Release);
                Ok(())
            }
            Backend::Compact {
                keys,
                values,
                locks,
                capacity,
                probe_kind,
                a,
                b,
            } => {
                let seq = ProbeSequence::new(key, *a, *b, *capacity, *probe_kind);
                let mut attempts = 0u32;
                for pos in seq.take(MAX_CONCURRENT_PROBES as usize) {
                    attempts += 1;
                    match policy {
                        ConcurrencyPolicy::LockFree => {
                            match keys[pos].compare_exchange(
                                EMPTY_KEY,
                                key as i64,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            ) {
                                Ok(_) => {
                                    values[pos].store(value, Ordering::Release);
                                    return Ok(());
                                }
                                Err(existing) if existing == key as i64 => {
                                    values[pos].store(value, Ordering::Release);
                                    return Ok(());
                                }
                                Err(_) => continue,
                            }
                        }
                        ConcurrencyPolicy::LockPerSlot => {
                            let _guard = locks[pos].lock();
                            let existing = keys[pos].load(Ordering::Acquire);
                            if existing == EMPTY_KEY || existing == key as i64 {
                                keys[pos].store(key as i64, Ordering::Release);
                                values[pos].store(value, Ordering::Release);
                                return Ok(());
                            }
                        }
                    }
                }
                if self.report_level >= ReportLevel::Collisions {
                    log::debug!("insert_concurrent contention: key={key} attempts={attempts}");
                }
                Err(RemapError::ContentionTimeout { key, attempts })
            }
        }
    }

    /// Lock-free lookup: probes from `h0(key)` until the slot's key
    /// matches (return its value) or an empty slot is found (absent).
    pub fn query(&self, key: u64) -> Probe {
        match &self.backend {
            Backend::Perfect { slots } => {
                let idx = key as usize;
                if idx >= slots.len() {
                    return Probe::Absent;
                }
                match slots[idx].load(Ordering::Acquire) {
                    ABSENT_MARKER => Probe::Absent,
                    v if v >= 0 => Probe::Leaf(v),
                    _ => Probe::Sentinel,
                }
            }
            Backend::Compact {
                keys,
                values,
                capacity,
                probe_kind,
                a,
                b,
                ..
            } => {
                let seq = ProbeSequence::new(key, *a, *b, *capacity, *probe_kind);
                let mut collisions = 0u64;
                for pos in seq.take(*capacity) {
                    let k = keys[pos].load(Ordering::Acquire);
                    if k == EMPTY_KEY {
                        if self.report_level >= ReportLevel::Collisions {
                            self.read_collisions.fetch_add(collisions, Ordering::Relaxed);
                        }
                        return Probe::Absent;
                    }
                    if k == key as i64 {
                        if self.report_level >= ReportLevel::Collisions {
                            self.read_collisions.fetch_add(collisions, Ordering::Relaxed);
                        }
                        let v = values[pos].load(Ordering::Acquire);
                        return if v >= 0 { Probe::Leaf(v) } else { Probe::Sentinel };
                    }
                    collisions += 1;
                }
                Probe::Absent
            }
        }
    }

    /// Accumulated write-side collision count (meaningful when
    /// `report_level >= Collisions`).
    pub fn write_collisions(&self) -> u64 {
        self.write_collisions.load(Ordering::Relaxed)
    }

    /// Accumulated read-side collision count (meaningful when
    /// `report_level >= Collisions`).
    pub fn read_collisions(&self) -> u64 {
        self.read_collisions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts_for(kind: HashKind) -> FactoryOptions {
        FactoryOptionsBuilder::new().kind(kind).build()
    }

    #[test]
    fn perfect_backend_roundtrip() {
        let mut table = HashTable::create(16, 4, &opts_for(HashKind::Perfect));
        table.setup();
        table.insert(3, 7).unwrap();
        table.insert(5, -1).unwrap();
        assert_eq!(table.query(3), Probe::Leaf(7));
        assert_eq!(table.query(5), Probe::Sentinel);
        assert_eq!(table.query(9), Probe::Absent);
    }

    #[test]
    fn each_compact_backend_roundtrips() {
        for kind in [HashKind::Linear, HashKind::Quadratic, HashKind::PrimeJump] {
            let mut table = HashTable::create(0, 100, &opts_for(kind));
            table.setup();
            for k in 0..100u64 {
                table.insert(k, k as i32).unwrap();
            }
            for k in 0..100u64 {
                assert_eq!(table.query(k), Probe::Leaf(k as i32), "kind={kind:?}");
            }
            assert_eq!(table.query(99999), Probe::Absent);
        }
    }

    #[test]
    fn insert_overwrites_existing_key() {
        let mut table = HashTable::create(0, 4, &opts_for(HashKind::Quadratic));
        table.setup();
        table.insert(42, 1).unwrap();
        table.insert(42, 2).unwrap();
        assert_eq!(table.query(42), Probe::Leaf(2));
    }

    #[test]
    fn auto_selects_perfect_for_small_dense_keyspace() {
        let opts = FactoryOptionsBuilder::new().build();
        let table = HashTable::create(16, 16, &opts);
        assert_eq!(table.kind(), HashKind::Perfect);
    }

    #[test]
    fn auto_selects_quadratic_for_sparse_keyspace() {
        let opts = FactoryOptionsBuilder::new().build();
        let table = HashTable::create(1_000_000, 10, &opts);
        assert_eq!(table.kind(), HashKind::Quadratic);
    }

    #[test]
    fn concurrent_insert_lock_free_matches_serial() {
        let opts = opts_for(HashKind::Quadratic);
        let table = HashTable::create(0, 1000, &opts);
        for k in 0..1000u64 {
            table
                .insert_concurrent(k, k as i32, ConcurrencyPolicy::LockFree)
                .unwrap();
        }
        for k in 0..1000u64 {
            assert_eq!(table.query(k), Probe::Leaf(k as i32));
        }
    }

    #[test]
    fn concurrent_insert_lock_per_slot_matches_serial() {
        let opts = opts_for(HashKind::Linear);
        let table = HashTable::create(0, 1000, &opts);
        for k in 0..1000u64 {
            table
                .insert_concurrent(k, k as i32, ConcurrencyPolicy::LockPerSlot)
                .unwrap();
        }
        for k in 0..1000u64 {
            assert_eq!(table.query(k), Probe::Leaf(k as i32));
        }
    }

    #[test]
    fn collision_stress_quadratic() {
        // S6: 10^5 cells at load ~0.33.
        let opts = opts_for(HashKind::Quadratic);
        let mut table = HashTable::create(0, 100_000, &opts);
        table.setup();
        for k in 0..100_000u64 {
            table.insert(k * 7 + 1, (k % i32::MAX as u64) as i32).unwrap();
        }
        for k in 0..100_000u64 {
            assert_eq!(table.query(k * 7 + 1), Probe::Leaf((k % i32::MAX as u64) as i32));
        }
    }

    #[test]
    fn overfull_compact_table_reports_capacity_exceeded() {
        let opts = FactoryOptionsBuilder::new()
            .kind(HashKind::Linear)
            .hash_mult(1.0)
            .build();
        let mut table = HashTable::create(0, 4, &opts);
        table.setup();
        for k in 0..4u64 {
            table.insert(k, k as i32).unwrap();
        }
        let result = table.insert(999, 0);
        assert!(matches!(result, Err(RemapError::CapacityExceeded { .. })));
    }

    #[test]
    fn factory_options_round_trip_json() {
        let opts = FactoryOptionsBuilder::new()
            .kind(HashKind::PrimeJump)
            .hash_mult(2.5)
            .report_level(ReportLevel::Verbose)
            .build();
        let json = serde_json::to_string(&opts).unwrap();
        let parsed: FactoryOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, opts.kind);
        assert_eq!(parsed.hash_mult, opts.hash_mult);
        assert_eq!(parsed.report_level, opts.report_level);
    }
}
