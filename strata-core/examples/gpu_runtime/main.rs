use strata_core::{gpu, BaseTensor, DimensionType, Gpu, Result, Tensor};

fn main() -> Result<()> {
    strata_core::logging::init_logging();

    gpu::init_runtime();
    println!("bound to gpu {} of {}", gpu::current_gpu(), gpu::num_gpus());

    let stream = gpu::make_queue_nonblocking();
    let done = gpu::make_marker_no_timing();

    let mut t = Tensor::<f32, Gpu>::new([4, 4].into(), [DimensionType::Spatial; 2].into())?;
    t.set(&[1, 2], 2.0)?;
    gpu::record_marker(&done, &stream);
    gpu::sync_marker(&done);
    println!("t[1, 2] = {}", t.get(&[1, 2])?);

    gpu::destroy_marker(done);
    gpu::destroy_queue(stream);
    drop(t);
    gpu::finalize_runtime();
    Ok(())
}
