//! Data across close/reopen sessions: files persist, shared memory does not.

use std::fs;

use disk_region::{BufferOptions, ReadbackMode, RegionOptions, SliceAllocator};
use tempfile::tempdir;

fn write_session(alloc: &SliceAllocator, byte: u8) {
    let opts = BufferOptions::default();
    let buf = alloc.allocate(1024, &opts).expect("allocate");
    alloc.write_in(&buf, &[byte; 1024]).expect("write_in");
    alloc.free(buf, &opts).expect("free");
    assert!(!alloc.region().is_open());
}

fn read_session(alloc: &SliceAllocator) -> Vec<u8> {
    let opts = BufferOptions::default();
    let buf = alloc.allocate(1024, &opts).expect("allocate");
    let mut out = vec![0u8; 1024];
    alloc.read_out(&mut out, &buf).expect("read_out");
    alloc.free(buf, &opts).expect("free");
    out
}

#[test]
fn file_contents_survive_close_and_reopen() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("durable.bin");
    let alloc = SliceAllocator::open(&format!("disk:{}", path.display())).expect("open device");

    write_session(&alloc, 0xAB);
    assert_eq!(fs::metadata(&path).expect("metadata").len(), 1024);
    assert!(read_session(&alloc).iter().all(|&b| b == 0xAB));

    // the bytes are the file's bytes
    assert!(fs::read(&path).expect("read file").iter().all(|&b| b == 0xAB));
}

#[test]
fn file_contents_visible_to_a_second_region() {
    let dir = tempdir().expect("tempdir");
    let device = format!("disk:{}", dir.path().join("shared.bin").display());

    let writer = SliceAllocator::open(&device).expect("open device");
    write_session(&writer, 0x5A);

    let reader =
        SliceAllocator::with_options(&device, RegionOptions::new().readback(ReadbackMode::File)).expect("open device");
    assert!(read_session(&reader).iter().all(|&b| b == 0x5A));
}

#[test]
fn existing_file_prefix_is_mapped() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("prefilled.bin");
    let mut content = vec![0u8; 4096];
    content[..4].copy_from_slice(b"HEAD");
    fs::write(&path, &content).expect("prefill");

    let alloc = SliceAllocator::open(&format!("disk:{}", path.display())).expect("open device");
    let data = read_session(&alloc);
    assert_eq!(&data[..4], b"HEAD");
    // never truncated down to the requested capacity
    assert_eq!(fs::metadata(&path).expect("metadata").len(), 4096);
}

#[test]
#[cfg(unix)]
fn shared_memory_is_reinitialized_after_close() {
    let device = format!("disk:shm:disk_region_persist_{}", std::process::id());
    let alloc = SliceAllocator::open(&device).expect("open device");

    write_session(&alloc, 0xAB);
    assert!(read_session(&alloc).iter().all(|&b| b == 0));
}
