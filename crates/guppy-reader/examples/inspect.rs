//! Print the header of a Guppy file and the first particles of some variables
//!
//! ```text
//! RUST_LOG=guppy_reader=debug cargo run --example inspect -- snap.gup x "v[2]" id
//! ```

use guppy_reader::{OutputBuffer, Reader, ReaderConfig, RockstarParticle, WorkerSelector};
use tracing_subscriber::EnvFilter;

const SHOWN: usize = 5;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: inspect <file.gup> [expression...]");
        std::process::exit(2);
    };

    let reader = Reader::new(ReaderConfig::default())?;
    let header = reader.read_header(&path)?;

    println!("=== {path} ===");
    println!("version {} ({:?} endian)", header.version, header.endian);
    println!("particles: {} of {}", header.n, header.n_tot);
    println!(
        "span {:?} origin {:?} of {:?}",
        header.span, header.origin, header.total_span
    );
    println!(
        "z = {}, Omega_m = {}, Omega_L = {}, h = {}, L = {} Mpc/h, mp = {:e} Msun/h",
        header.z, header.omega_m, header.omega_l, header.h100, header.l, header.mass
    );
    for ((name, scalar), width) in header.names.iter().zip(&header.types).zip(&header.widths) {
        println!("  {name:<12} {scalar} x{width}");
    }

    let n = header.len();
    for expression in args {
        let shown = n.min(SHOWN);
        let auto = WorkerSelector::Auto;
        if expression.ends_with("RockstarParticle]") || expression.ends_with("RockstarParticle}") {
            let mut records = vec![RockstarParticle::default(); n];
            reader.read_var(&path, &expression, auto, OutputBuffer::from(&mut records))?;
            println!("{expression}: {:?}", &records[..shown]);
        } else if header.find(&expression).is_some_and(|j| header.is_vector(j)) {
            let mut values = vec![[0.0f64; 3]; n];
            reader.read_var(&path, &expression, auto, OutputBuffer::from(&mut values))?;
            println!("{expression}: {:?}", &values[..shown]);
        } else {
            let mut values = vec![0.0f64; n];
            reader.read_var(&path, &expression, auto, OutputBuffer::from(&mut values))?;
            println!("{expression}: {:?}", &values[..shown]);
        }
    }

    Ok(())
}
