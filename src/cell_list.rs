use crate::error::RemapError;

/// A quadtree-structured 2D AMR mesh, stored as a structure-of-arrays.
///
/// Every cell is identified by its integer coordinates `(i, j)` expressed
/// in the finest grid on which that cell lies, plus its refinement level.
/// A well-formed `CellList` tiles the logical domain without overlap or
/// gap; see [`CellList::validate`].
#[derive(Debug, Clone)]
pub struct CellList {
    pub ibasesize: u32,
    pub levmax: u32,
    pub i: Vec<u32>,
    pub j: Vec<u32>,
    pub level: Vec<u32>,
    pub values: Vec<f64>,
}

impl CellList {
    /// Builds a `CellList` from parallel coordinate/level/value arrays.
    ///
    /// Does not validate the tiling invariant; call [`CellList::validate`]
    /// before using an externally constructed mesh as remap input.
    pub fn new(
        ibasesize: u32,
        levmax: u32,
        i: Vec<u32>,
        j: Vec<u32>,
        level: Vec<u32>,
        values: Vec<f64>,
    ) -> Result<Self, RemapError> {
        let n = i.len();
        if j.len() != n || level.len() != n || values.len() != n {
            return Err(RemapError::InvalidInput {
                reason: format!(
                    "mismatched array lengths: i={}, j={}, level={}, values={}",
                    n,
                    j.len(),
                    level.len(),
                    values.len()
                ),
            });
        }
        if ibasesize == 0 {
            return Err(RemapError::InvalidInput {
                reason: "ibasesize must be positive".to_string(),
            });
        }

        let list = Self {
            ibasesize,
            levmax,
            i,
            j,
            level,
            values,
        };
        list.validate()?;
        Ok(list)
    }

    /// Allocates an output `CellList` with the given coordinates/levels and
    /// `values` zero-filled, ready for [`crate::remap::remap`] to populate.
    pub fn new_output(
        ibasesize: u32,
        levmax: u32,
        i: Vec<u32>,
        j: Vec<u32>,
        level: Vec<u32>,
    ) -> Result<Self, RemapError> {
        let n = i.len();
        let values = vec![0.0; n];
        Self::new(ibasesize, levmax, i, j, level, values)
    }

    pub fn ncells(&self) -> usize {
        self.i.len()
    }

    pub fn is_empty(&self) -> bool {
        self.i.is_empty()
    }

    /// The linear dimension of the grid at level `lev`: `ibasesize * 2^lev`.
    pub fn stride(&self, lev: u32) -> u32 {
        self.ibasesize << lev
    }

    /// Checks every cell's level and coordinates are within range.
    ///
    /// Does not (and cannot, without an O(N log N) sweep) check that the
    /// mesh tiles the domain without overlap or gap; that invariant is a
    /// precondition on the caller, per the breadcrumb-construction
    /// rationale in the engine design notes.
    pub fn validate(&self) -> Result<(), RemapError> {
        for n in 0..self.ncells() {
            let lev = self.level[n];
            if lev > self.levmax {
                return Err(RemapError::InvalidInput {
                    reason: format!(
                        "cell {n} has level {lev}, exceeding levmax {}",
                        self.levmax
                    ),
                });
            }
            let bound = self.stride(lev);
            if self.i[n] >= bound || self.j[n] >= bound {
                return Err(RemapError::InvalidInput {
                    reason: format!(
                        "cell {n} coordinates ({}, {}) out of range for level {lev} (bound {bound})",
                        self.i[n], self.j[n]
                    ),
                });
            }
        }
        Ok(())
    }

    /// The key a cell at `(i, j, lev)` is stored under in the level-`lev`
    /// table: `j * stride(lev) + i`.
    pub fn key_at(&self, i: u32, j: u32, lev: u32) -> u64 {
        j as u64 * self.stride(lev) as u64 + i as u64
    }

    /// Area of a single cell at level `lev`, relative to a level-0 cell.
    pub fn area(&self, lev: u32) -> f64 {
        1.0 / 4f64.powi(lev as i32)
    }
}
