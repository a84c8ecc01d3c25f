extern crate rustc_version;
use rustc_version::{Version, version};

fn main() {
    let version = version().expect("Failed to get rustc version.");
    if version < Version::new(1, 75, 0) {
        eprintln!(
            "\n\nrpki-validator needs at least Rust 1.75.\n\
             Found version {} instead.\n\
             Build aborted.\n\n",
             version);
        panic!();
    }
}
