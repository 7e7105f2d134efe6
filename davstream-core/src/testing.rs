//! Fixtures shared by unit tests and the integration test crate.

use std::io::Cursor;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

pub use crate::remote::{MemoryStore, StoreFault};

/// Writes an executable shell script standing in for the encoder binary.
pub fn write_script_encoder(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write encoder script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("make encoder script executable");
    path
}

/// PNG of pseudo-random pixels; noise keeps it from compressing well.
pub fn noisy_png(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9;
    let image = image::RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        image::Rgb([r, g, b])
    });

    let mut out = Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode test png");
    out.into_inner()
}

/// Deterministic byte pattern where every offset is recognisable.
pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
