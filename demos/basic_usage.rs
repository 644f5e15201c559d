//! Builds a small irregular mesh and remaps it onto a uniform grid.

use hierarchical_remap::{remap, CellList};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Base-level 2x2 mesh, with cell (1,0) refined into 4 children.
    let input = CellList::new(
        2,
        1,
        vec![0, 2, 3, 2, 3, 0, 1],
        vec![0, 0, 0, 1, 1, 1, 1],
        vec![0, 1, 1, 1, 1, 0, 0],
        vec![10.0, 2.0, 4.0, 6.0, 8.0, 20.0, 30.0],
    )?;

    let mut output = CellList::new_output(2, 1, vec![0, 1], vec![0, 1], vec![0, 0])?;
    remap(&input, &mut output)?;

    for n in 0..output.ncells() {
        println!(
            "output cell ({}, {}) @ level {} = {}",
            output.i[n], output.j[n], output.level[n], output.values[n]
        );
    }
    Ok(())
}
