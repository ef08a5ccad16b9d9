//! An example of inspecting extended metadata: xattrs, POSIX ACLs, and
//! sparse descriptors.

extern crate streamtar;

use std::env::args;
use std::fs::File;

use streamtar::Archive;

fn main() {
    let path = args().nth(1).expect("usage: xattrs <archive.tar>");
    let file = File::open(path).unwrap();

    let mut archive = Archive::new(file);
    for entry in archive.entries().unwrap() {
        let entry = entry.unwrap();
        println!("{}", String::from_utf8_lossy(&entry.path_bytes()));

        for (name, value) in entry.xattrs() {
            println!("  xattr {} = {}", name, String::from_utf8_lossy(value));
        }
        for acl in entry.acl_access() {
            println!("  acl(access) {:?} id={} perms={:03b}", acl.tag, acl.id, acl.perms);
        }
        for acl in entry.acl_default() {
            println!("  acl(default) {:?} id={} perms={:03b}", acl.tag, acl.id, acl.perms);
        }
        if let Some(sparse) = entry.sparse() {
            println!(
                "  sparse: {} bytes logical, {} stored in {} segments",
                sparse.real_size(),
                sparse.physical_size(),
                sparse.segments().len()
            );
        }
    }
}
