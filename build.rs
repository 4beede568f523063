use std::env;
use std::fs::File;
use std::io::Write;
use std::path::Path;

//RCU_BATCH_THRESHOLD

fn main() {
    println!("cargo:rerun-if-env-changed=RCU_BATCH_THRESHOLD");

    let out_dir = env::var("OUT_DIR").expect("no out directory");
    let dest = Path::new(&out_dir).join("build_constants.rs");

    let mut file = File::create(&dest).expect("could not create file");

    let batch: u32 = env::var("RCU_BATCH_THRESHOLD")
        .ok()
        .map_or(Ok(128), |var| var.parse())
        .expect("failed to parse env variable RCU_BATCH_THRESHOLD");

    if batch == 0 {
        panic!("invalid RCU_BATCH_THRESHOLD value (0)");
    }

    write!(&mut file, "const DEFAULT_BATCH_THRESHOLD: u32 = {};", batch)
        .expect("could not write to file");
}
