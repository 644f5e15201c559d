use hierarchical_remap::hash_table::{FactoryOptionsBuilder, HashKind, ReportLevel};
use hierarchical_remap::{remap, remap_compact, CellList};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Hierarchical Remap Engine Demo");
    println!("==============================");

    // A 2x2 base mesh where cell (1,0) has been refined once more.
    let input = CellList::new(
        2,
        1,
        vec![0, 2, 3, 2, 3, 0, 1],
        vec![0, 0, 0, 1, 1, 1, 1],
        vec![0, 1, 1, 1, 1, 0, 0],
        vec![10.0, 2.0, 4.0, 6.0, 8.0, 20.0, 30.0],
    )?;
    println!("Input mesh: {} cells, levmax={}", input.ncells(), input.levmax);

    let mut output = CellList::new_output(2, 1, vec![0, 1], vec![0, 1], vec![0, 0])?;
    remap(&input, &mut output)?;
    println!("Remapped (auto backend): {:?}", output.values);

    let opts = FactoryOptionsBuilder::new()
        .kind(HashKind::Quadratic)
        .report_level(ReportLevel::Collisions)
        .build();
    let mut explicit_output = CellList::new_output(2, 1, vec![0, 1], vec![0, 1], vec![0, 0])?;
    remap_compact(&input, &mut explicit_output, &opts)?;
    println!("Remapped (quadratic backend): {:?}", explicit_output.values);

    Ok(())
}
