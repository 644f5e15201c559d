//! The remap engine (§4.C): for each output cell, probe coarse-to-fine
//! for a containing input leaf, or descend fine-to-coarse and average
//! the input sub-cells that tile the output cell's area.

use crate::cell_list::CellList;
use crate::error::RemapError;
use crate::hash_table::{ConcurrencyPolicy, FactoryOptions, Probe};
use crate::level_stack::LevelStack;
use rayon::prelude::*;

/// Transfers values from `input` to `output` using the default (`AUTO`)
/// hash backend selection, single-threaded.
pub fn remap(input: &CellList, output: &mut CellList) -> Result<(), RemapError> {
    remap_compact(input, output, &FactoryOptions::default())
}

/// Transfers values from `input` to `output`, requesting the hash
/// backend named by `opts.kind` (or letting the memory-ratio heuristic
/// choose, under `AUTO`).
pub fn remap_compact(
    input: &CellList,
    output: &mut CellList,
    opts: &FactoryOptions,
) -> Result<(), RemapError> {
    input.validate()?;
    output.validate()?;

    let stack = LevelStack::build(input, opts)?;
    for n in 0..output.ncells() {
        output.values[n] =
            remap_one_cell(input, &stack, output.i[n], output.j[n], output.level[n])?;
    }
    Ok(())
}

/// Same semantics as [`remap_compact`], but the level-stack build and the
/// output sweep are each parallelized across a rayon thread pool, with
/// `policy` governing contention handling during concurrent insertion.
pub fn remap_parallel(
    input: &CellList,
    output: &mut CellList,
    opts: &FactoryOptions,
    policy: ConcurrencyPolicy,
) -> Result<(), RemapError> {
    input.validate()?;
    output.validate()?;

    let stack = LevelStack::build_parallel(input, opts, policy)?;
    let values: Result<Vec<f64>, RemapError> = (0..output.ncells())
        .into_par_iter()
        .map(|n| remap_one_cell(input, &stack, output.i[n], output.j[n], output.level[n]))
        .collect();
    output.values = values?;
    Ok(())
}

/// Resolves the value for a single output cell: a coarse-to-fine probe
/// first, falling back to sub-cell averaging when the input is finer
/// than the output at that location.
fn remap_one_cell(
    input: &CellList,
    stack: &LevelStack,
    oi: u32,
    oj: u32,
    olev: u32,
) -> Result<f64, RemapError> {
    match probe_coarse_to_fine(input, stack, oi, oj, olev) {
        Some(idx) => Ok(input.values[idx as usize]),
        None => avg_sub_cells(input, stack, oi, oj, olev),
    }
}

/// §4.C step 1: for `probe_lev = 0..=olev`, query the level-`probe_lev`
/// table for the ancestor of `(oi, oj)` at that level. Stops at the
/// first leaf found — the coarsest input cell containing the output
/// cell.
fn probe_coarse_to_fine(
    input: &CellList,
    stack: &LevelStack,
    oi: u32,
    oj: u32,
    olev: u32,
) -> Option<i32> {
    for probe_lev in 0..=olev {
        let levdiff = olev - probe_lev;
        let key = input.key_at(oi >> levdiff, oj >> levdiff, probe_lev);
        if let Probe::Leaf(idx) = stack.query(probe_lev, key) {
            return Some(idx);
        }
    }
    None
}

/// §4.C sub-cell averaging: an explicit-stack depth-first traversal of
/// the input quadtree under the output cell `(oi, oj, olev)`, summing
/// each leaf's value weighted by `1/4^depth`.
fn avg_sub_cells(
    input: &CellList,
    stack: &LevelStack,
    oi: u32,
    oj: u32,
    olev: u32,
) -> Result<f64, RemapError> {
    let startlev = olev;
    // queue[lev] tracks which of the 4 children at `lev` to resume at;
    // bounded by levmax - startlev + 1, 32 slots suffice in practice.
    let mut queue = vec![0u8; (input.levmax as usize + 2).max(32)];

    let mut lev = startlev + 1;
    let mut i = oi * 2;
    let mut j = oj * 2;
    let mut sum = 0.0f64;

    while lev > startlev {
        i -= i % 2;
        j -= j % 2;

        if queue[lev as usize] > 3 {
            lev -= 1;
            i /= 2;
            j /= 2;
            continue;
        }

        let istride = input.stride(lev) as u64;
        let base_key = j as u64 * istride + i as u64;
        let children = [base_key, base_key + 1, base_key + istride, base_key + istride + 1];

        let mut ic = queue[lev as usize];
        while ic < 4 {
            let key = children[ic as usize];
            match stack.query(lev, key) {
                Probe::Leaf(idx) => {
                    sum += input.values[idx as usize] / 4f64.powi((lev - startlev) as i32);
                    if ic == 3 {
                        lev -= 1;
                        i /= 2;
                        j /= 2;
                    }
                }
                Probe::Sentinel => {
                    queue[lev as usize] = ic + 1;
                    i = (key % istride) as u32;
                    j = (key / istride) as u32;
                    lev += 1;
                    i *= 2;
                    j *= 2;
                    queue[lev as usize] = 0;
                    break;
                }
                Probe::Absent => {
                    return Err(RemapError::MeshIntegrity { level: lev, key });
                }
            }
            ic += 1;
        }
    }

    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash_table::HashKind;

    fn cells(ibasesize: u32, levmax: u32, i: Vec<u32>, j: Vec<u32>, level: Vec<u32>, values: Vec<f64>) -> CellList {
        CellList::new(ibasesize, levmax, i, j, level, values).unwrap()
    }

    fn output(ibasesize: u32, levmax: u32, i: Vec<u32>, j: Vec<u32>, level: Vec<u32>) -> CellList {
        CellList::new_output(ibasesize, levmax, i, j, level).unwrap()
    }

    #[test]
    fn s1_same_grid_identity() {
        let input = cells(2, 0, vec![0, 1, 0, 1], vec![0, 0, 1, 1], vec![0, 0, 0, 0], vec![1.0, 2.0, 3.0, 4.0]);
        let mut out = output(2, 0, vec![0, 1, 0, 1], vec![0, 0, 1, 1], vec![0, 0, 0, 0]);
        remap(&input, &mut out).unwrap();
        assert_eq!(out.values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn s2_coarse_to_fine_refinement() {
        let input = cells(1, 0, vec![0], vec![0], vec![0], vec![10.0]);
        let mut out = output(1, 1, vec![0, 1, 0, 1], vec![0, 0, 1, 1], vec![1, 1, 1, 1]);
        remap(&input, &mut out).unwrap();
        assert_eq!(out.values, vec![10.0, 10.0, 10.0, 10.0]);
    }

    #[test]
    fn s3_fine_to_coarse_averaging() {
        let input = cells(
            1,
            1,
            vec![0, 1, 0, 1],
            vec![0, 0, 1, 1],
            vec![1, 1, 1, 1],
            vec![1.0, 3.0, 5.0, 7.0],
        );
        let mut out = output(1, 1, vec![0], vec![0], vec![0]);
        remap(&input, &mut out).unwrap();
        assert_eq!(out.values[0], 4.0);
    }

    #[test]
    fn s4_mixed_descent() {
        let input = cells(
            2,
            1,
            vec![0, 2, 3, 2, 3],
            vec![0, 0, 0, 1, 1],
            vec![0, 1, 1, 1, 1],
            vec![10.0, 2.0, 4.0, 6.0, 8.0],
        );
        let mut out = output(2, 1, vec![1], vec![0], vec![0]);
        remap(&input, &mut out).unwrap();
        assert_eq!(out.values[0], 5.0);
    }

    #[test]
    fn s5_deep_descent_16_leaves() {
        // Level-0 base cell (0,0) fully refined to level 2 (16 leaves, values 1..16).
        let mut i = Vec::new();
        let mut j = Vec::new();
        let mut level = Vec::new();
        let mut values = Vec::new();
        let mut v = 1.0;
        for jj in 0..4u32 {
            for ii in 0..4u32 {
                i.push(ii);
                j.push(jj);
                level.push(2);
                values.push(v);
                v += 1.0;
            }
        }
        let input = cells(1, 2, i, j, level, values);
        let mut out = output(1, 2, vec![0], vec![0], vec![0]);
        remap(&input, &mut out).unwrap();
        assert_eq!(out.values[0], 8.5);
    }

    #[test]
    fn identity_remap_preserves_values() {
        let input = cells(
            2,
            1,
            vec![0, 1, 2, 3, 0, 1],
            vec![0, 0, 0, 0, 1, 1],
            vec![0, 0, 1, 1, 0, 0],
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        );
        let mut out = output(
            2,
            1,
            vec![0, 1, 2, 3, 0, 1],
            vec![0, 0, 0, 0, 1, 1],
            vec![0, 0, 1, 1, 0, 0],
        );
        remap(&input, &mut out).unwrap();
        assert_eq!(out.values, input.values);
    }

    #[test]
    fn backend_equivalence_across_kinds() {
        let input = cells(
            1,
            1,
            vec![0, 1, 0, 1],
            vec![0, 0, 1, 1],
            vec![1, 1, 1, 1],
            vec![1.0, 3.0, 5.0, 7.0],
        );
        let mut baseline = output(1, 1, vec![0], vec![0], vec![0]);
        remap_compact(
            &input,
            &mut baseline,
            &FactoryOptions {
                kind: HashKind::Perfect,
                ..FactoryOptions::default()
            },
        )
        .unwrap();

        for kind in [HashKind::Linear, HashKind::Quadratic, HashKind::PrimeJump] {
            let mut out = output(1, 1, vec![0], vec![0], vec![0]);
            remap_compact(
                &input,
                &mut out,
                &FactoryOptions {
                    kind,
                    ..FactoryOptions::default()
                },
            )
            .unwrap();
            assert_eq!(out.values, baseline.values, "kind={kind:?}");
        }
    }

    #[test]
    fn lookup_totality_every_output_written() {
        let input = cells(2, 0, vec![0, 1, 0, 1], vec![0, 0, 1, 1], vec![0, 0, 0, 0], vec![1.0, 2.0, 3.0, 4.0]);
        let mut out = output(2, 1, vec![0, 1, 2, 3, 0, 1], vec![0, 0, 0, 0, 1, 1], vec![0, 0, 1, 1, 0, 0]);
        remap(&input, &mut out).unwrap();
        assert_eq!(out.values.len(), out.ncells());
        assert!(out.values.iter().all(|v| *v != 0.0));
    }

    #[test]
    fn parallel_remap_matches_serial() {
        let input = cells(
            2,
            1,
            vec![0, 1, 2, 3, 0, 1],
            vec![0, 0, 0, 0, 1, 1],
            vec![0, 0, 1, 1, 0, 0],
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        );
        let mut serial_out = output(2, 1, vec![0, 1, 2, 3, 0, 1], vec![0, 0, 0, 0, 1, 1], vec![0, 0, 1, 1, 0, 0]);
        remap(&input, &mut serial_out).unwrap();

        let mut parallel_out = output(2, 1, vec![0, 1, 2, 3, 0, 1], vec![0, 0, 0, 0, 1, 1], vec![0, 0, 1, 1, 0, 0]);
        remap_parallel(
            &input,
            &mut parallel_out,
            &FactoryOptions::default(),
            ConcurrencyPolicy::LockFree,
        )
        .unwrap();

        assert_eq!(serial_out.values, parallel_out.values);
    }

    #[test]
    fn invalid_output_level_rejected() {
        let input = cells(2, 0, vec![0], vec![0], vec![0], vec![1.0]);
        let mut out = output(2, 0, vec![0], vec![0], vec![5]);
        let result = remap(&input, &mut out);
        assert!(matches!(result, Err(RemapError::InvalidInput { .. })));
    }
}
