//! Per-level index over an input mesh: one [`HashTable`] per refinement
//! level, populated with leaf entries and ancestor "breadcrumb" sentinels.

use crate::cell_list::CellList;
use crate::error::RemapError;
use crate::hash_table::{ConcurrencyPolicy, FactoryOptions, HashTable, Probe};
use rayon::prelude::*;

/// An ordered stack of per-level hash tables built once from an input
/// mesh, queried read-only by the remap engine, and dropped at the end
/// of the remap call (its lifetime is scoped to a single `remap`).
pub struct LevelStack {
    tables: Vec<HashTable>,
}

impl LevelStack {
    /// Builds the stack serially: one table per level `0..=levmax`,
    /// pre-sized via the `num_at_level` propagation in §4.B, then
    /// populated with every input cell's leaf entry and its breadcrumb
    /// ancestor chain.
    pub fn build(input: &CellList, opts: &FactoryOptions) -> Result<Self, RemapError> {
        let num_at_level = Self::size_levels(input);
        let mut tables: Vec<HashTable> = (0..=input.levmax)
            .map(|lev| {
                let stride = input.stride(lev) as u64;
                let size_hint = (stride * stride) as usize;
                HashTable::create(size_hint, num_at_level[lev as usize], opts)
            })
            .collect();

        for n in 0..input.ncells() {
            Self::insert_cell(&mut tables, input, n)?;
        }

        Ok(Self { tables })
    }

    /// Builds the stack with cells inserted concurrently across a rayon
    /// thread pool, using the given concurrency policy for contested
    /// slots. Table sizing and creation remain single-threaded (it is
    /// proportional to `levmax`, not `ncells`); only the population
    /// phase is parallelized, per §5's scheduling model.
    pub fn build_parallel(
        input: &CellList,
        opts: &FactoryOptions,
        policy: ConcurrencyPolicy,
    ) -> Result<Self, RemapError> {
        let num_at_level = Self::size_levels(input);
        let tables: Vec<HashTable> = (0..=input.levmax)
            .map(|lev| {
                let stride = input.stride(lev) as u64;
                let size_hint = (stride * stride) as usize;
                HashTable::create(size_hint, num_at_level[lev as usize], opts)
            })
            .collect();

        (0..input.ncells()).into_par_iter().try_for_each(|n| {
            Self::insert_cell_concurrent(&tables, input, n, policy)
        })?;

        Ok(Self { tables })
    }

    /// `num_at_level[L]` for `L in 0..=levmax`: the count of input cells
    /// at level `L`, with upward propagation `num_at_level[L] +=
    /// num_at_level[L+1]/4` to bound sentinel occupancy (§4.B).
    fn size_levels(input: &CellList) -> Vec<usize> {
        let mut num_at_level = vec![0usize; input.levmax as usize + 1];
        for lev in &input.level {
            num_at_level[*lev as usize] += 1;
        }
        for lev in (0..input.levmax as usize).rev() {
            num_at_level[lev] += num_at_level[lev + 1] / 4;
        }
        num_at_level
    }

    fn insert_cell(tables: &mut [HashTable], input: &CellList, n: usize) -> Result<(), RemapError> {
        let mut i = input.i[n];
        let mut j = input.j[n];
        let mut lev = input.level[n];
        let key = input.key_at(i, j, lev);
        tables[lev as usize].insert(key, n as i32)?;

        while i % 2 == 0 && j % 2 == 0 && lev > 0 {
            i /= 2;
            j /= 2;
            lev -= 1;
            let key = input.key_at(i, j, lev);
            tables[lev as usize].insert(key, -1)?;
        }
        Ok(())
    }

    fn insert_cell_concurrent(
        tables: &[HashTable],
        input: &CellList,
        n: usize,
        policy: ConcurrencyPolicy,
    ) -> Result<(), RemapError> {
        let mut i = input.i[n];
        let mut j = input.j[n];
        let mut lev = input.level[n];
        let key = input.key_at(i, j, lev);
        tables[lev as usize].insert_concurrent(key, n as i32, policy)?;

        while i % 2 == 0 && j % 2 == 0 && lev > 0 {
            i /= 2;
            j /= 2;
            lev -= 1;
            let key = input.key_at(i, j, lev);
            tables[lev as usize].insert_concurrent(key, -1, policy)?;
        }
        Ok(())
    }

    /// Queries the level-`level` table for `key`. Returns `Probe::Absent`
    /// if `level` is out of range (no table was built for it).
    pub fn query(&self, level: u32, key: u64) -> Probe {
        match self.tables.get(level as usize) {
            Some(table) => table.query(key),
            None => Probe::Absent,
        }
    }

    pub fn levmax(&self) -> u32 {
        self.tables.len() as u32 - 1
    }
}
