use strata_core::{BaseTensor, Cpu, DimensionRange, DimensionType, Result, Tensor, ALL};

fn main() -> Result<()> {
    strata_core::logging::init_logging();

    let mut images = Tensor::<f32, Cpu>::new(
        [8, 3, 4, 4].into(),
        [
            DimensionType::Sample,
            DimensionType::Channel,
            DimensionType::Spatial,
            DimensionType::Spatial,
        ]
        .into(),
    )?;

    // The green channel of sample 2, rows 1..3.
    let mut patch = images.view_of(&[
        DimensionRange::Index(2),
        DimensionRange::Index(1),
        DimensionRange::range(1, 3),
        ALL,
    ])?;
    println!("patch: {patch:?}");
    patch.set(&[0, 0], 1.5)?;

    println!("images[2, 1, 1, 0] = {}", images.get(&[2, 1, 1, 0])?);
    println!("patch contiguous: {}", patch.is_contiguous());
    Ok(())
}
