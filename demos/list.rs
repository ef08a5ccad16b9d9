//! An example of listing the members of an archive.
//!
//! Takes a tarball on the command line and prints out all of its member
//! paths and sizes, without ever materializing member data.

extern crate streamtar;

use std::env::args;
use std::fs::File;

use streamtar::Archive;

fn main() {
    let path = args().nth(1).expect("usage: list <archive.tar>");
    let file = File::open(path).unwrap();

    let mut archive = Archive::new(file);
    let mut entries = archive.entries().unwrap();
    for entry in &mut entries {
        let entry = entry.unwrap();
        println!(
            "{:>9}  {}",
            entry.size(),
            String::from_utf8_lossy(&entry.path_bytes())
        );
    }
    if let Some(err) = entries.error() {
        eprintln!("archive terminated early: {}", err);
    }
}
