//! Raw archive construction for the integration tests.
//!
//! Writing archives is not part of the library, so the tests assemble
//! their inputs block by block through `Header`'s encoding setters.

use streamtar::{EntryType, Header};

/// Pads the archive out to the next 512-byte record boundary.
pub fn pad_to_block(ar: &mut Vec<u8>) {
    while ar.len() % 512 != 0 {
        ar.push(0);
    }
}

/// Appends a header record, its payload, and the payload padding.
pub fn append(ar: &mut Vec<u8>, header: &Header, data: &[u8]) {
    ar.extend_from_slice(header.as_bytes());
    ar.extend_from_slice(data);
    pad_to_block(ar);
}

/// A ready-to-append ustar header for a regular file.
pub fn file_header(path: &str, size: u64) -> Header {
    let mut header = Header::new_ustar();
    header.set_path(path).unwrap();
    header.set_size(size);
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o644);
    header.set_mtime(1234567890);
    header.set_cksum();
    header
}

/// Appends a regular file member.
pub fn append_file(ar: &mut Vec<u8>, path: &str, data: &[u8]) {
    let header = file_header(path, data.len() as u64);
    append(ar, &header, data);
}

/// Appends a GNU `L`/`K` extension record carrying `payload` (typically a
/// NUL-terminated long name).
pub fn append_gnu_extension(ar: &mut Vec<u8>, ty: EntryType, payload: &[u8]) {
    let mut header = Header::new_gnu();
    header.set_path("././@LongLink").unwrap();
    header.set_size(payload.len() as u64);
    header.set_entry_type(ty);
    header.set_cksum();
    append(ar, &header, payload);
}

/// Appends a PAX extended header (`x`) whose payload is `records`.
pub fn append_pax(ar: &mut Vec<u8>, records: &[u8]) {
    let mut header = Header::new_ustar();
    header.set_path("PaxHeaders.0/member").unwrap();
    header.set_size(records.len() as u64);
    header.set_entry_type(EntryType::XHeader);
    header.set_cksum();
    append(ar, &header, records);
}

/// Encodes one `<len> <key>=<value>\n` PAX record with a correct length
/// field.
pub fn pax_record(key: &str, value: &[u8]) -> Vec<u8> {
    // space + '=' + '\n'
    let base = key.len() + value.len() + 3;
    let mut total = base + 1;
    while total != base + total.to_string().len() {
        total = base + total.to_string().len();
    }
    let mut record = format!("{} {}=", total, key).into_bytes();
    record.extend_from_slice(value);
    record.push(b'\n');
    assert_eq!(record.len(), total);
    record
}

/// Appends the two-zero-record archive terminator.
pub fn terminator(ar: &mut Vec<u8>) {
    ar.extend_from_slice(&[0; 1024]);
}
