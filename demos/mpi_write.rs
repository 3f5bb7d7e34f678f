// Writes a small VLSV file from every MPI rank and prints the footer on the
// coordinator. Run with:
//   mpirun -n 4 cargo run --example mpi_write --features mpi-support -- out.vlsv
use std::collections::BTreeMap;
use vlsv_par::prelude::*;

fn main() -> Result<(), VlsvError> {
    let (_universe, group) = MpiGroup::init()?;
    let path = std::env::args().nth(1).unwrap_or_else(|| "out.vlsv".into());
    let rank = group.rank();

    // Each rank owns 10 * (rank + 1) cells with 3-component coordinates.
    let n = 10 * (rank + 1);
    let ids: Vec<u64> = (0..n as u64).map(|i| i + 1000 * rank as u64).collect();
    let coords: Vec<f64> = (0..3 * n).map(|i| i as f64 * 0.5).collect();

    let mut writer: Writer<MpiGroup> = Writer::new(WriterConfig::default());

    // Size the file up front with a dry run.
    writer.start_dry_run()?;
    write_all(&mut writer, &path, &group, &ids, &coords)?;
    writer.end_dry_run()?;
    // Only the coordinator tracks the total.
    let size = group.all_reduce_max(writer.bytes_written());

    writer.open(&path, &group)?;
    writer.set_size(size)?;
    write_arrays(&mut writer, &ids, &coords)?;
    if let Some(footer) = writer.footer() {
        print!("{}", footer.to_xml());
    }
    writer.close()?;
    if rank == writer.config().coordinator {
        println!("rank {rank}: wrote {} bytes in {:?}", writer.bytes_written(), writer.write_time());
    }
    Ok(())
}

fn write_all(
    writer: &mut Writer<MpiGroup>,
    path: &str,
    group: &MpiGroup,
    ids: &[u64],
    coords: &[f64],
) -> Result<(), VlsvError> {
    writer.open(path, group)?;
    write_arrays(writer, ids, coords)?;
    writer.close()
}

fn write_arrays(writer: &mut Writer<MpiGroup>, ids: &[u64], coords: &[f64]) -> Result<(), VlsvError> {
    let named = |name: &str| {
        BTreeMap::from([
            ("name".to_string(), name.to_string()),
            ("mesh".to_string(), "grid".to_string()),
        ])
    };
    writer.write_slice("MESH", &named("grid"), 1, ids)?;

    // The coordinates go through an explicit multiwrite in two halves.
    let half = coords.len() / 6 * 3;
    let (front, back) = coords.split_at(half);
    let mut mw = writer.multiwrite();
    mw.start(Datatype::Float, (coords.len() / 3) as u64, 3, 8)?;
    mw.add_typed_unit(front, (front.len() / 3) as u64)?;
    mw.add_typed_unit(back, (back.len() / 3) as u64)?;
    mw.end("VARIABLE", &named("coordinates"))
}
