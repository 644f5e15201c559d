//! # hierarchical-remap
//!
//! A hierarchical remap engine for quadtree-structured 2D AMR meshes:
//! transfers cell-centered scalar values from one mesh (the input) onto
//! another covering the same logical domain (the output), in O(N) time
//! regardless of how irregularly either mesh is refined.
//!
//! ## How it works
//!
//! The input mesh is indexed once into a [`level_stack::LevelStack`]: one
//! [`hash_table::HashTable`] per refinement level, holding a leaf entry
//! for every input cell plus a "breadcrumb" sentinel at every ancestor of
//! a refined cell. Each output cell is then resolved by a coarse-to-fine
//! probe (find the coarsest input cell that contains it) or, when the
//! input is locally finer than the output, a sub-cell averaging descent
//! that tiles the output cell with input leaves and sums their
//! area-weighted contribution.
//!
//! ## Example
//!
//! ```rust
//! use hierarchical_remap::{CellList, remap};
//!
//! // One base-level cell refined into 4 level-1 children.
//! let input = CellList::new(
//!     1, 1,
//!     vec![0, 1, 0, 1],
//!     vec![0, 0, 1, 1],
//!     vec![1, 1, 1, 1],
//!     vec![1.0, 3.0, 5.0, 7.0],
//! ).unwrap();
//!
//! // A single level-0 output cell spanning all four input leaves.
//! let mut output = CellList::new_output(1, 1, vec![0], vec![0], vec![0]).unwrap();
//!
//! remap(&input, &mut output).unwrap();
//! assert_eq!(output.values[0], 4.0); // (1+3+5+7)/4
//! ```
//!
//! ## Hash backend selection
//!
//! By default the table backend (perfect, linear-probe, quadratic-probe,
//! prime-jump) is chosen automatically from a memory-ratio heuristic; use
//! [`remap_compact`] with a [`hash_table::FactoryOptions`] to force a
//! specific backend. All backends agree bit-for-bit on identical input
//! (no floating-point reordering across backends).

pub mod cell_list;
pub mod error;
pub mod hash_table;
pub mod level_stack;
pub mod remap;

pub use cell_list::CellList;
pub use error::RemapError;
pub use hash_table::{ConcurrencyPolicy, FactoryOptions, FactoryOptionsBuilder, HashKind, ReportLevel};
pub use level_stack::LevelStack;
pub use remap::{remap, remap_compact, remap_parallel};
