//! The `SPLT` binary splat container.
//!
//! Little-endian layout:
//!
//! | offset | size | field |
//! |--------|------|-------|
//! | 0      | 4    | magic `"SPLT"` |
//! | 4      | 4    | version = 1 |
//! | 8      | 4    | splat count, 1..=65536 |
//! | 12     | 4    | reserved = 0 |
//! | 16     | 36 x count | splat records |
//!
//! A record is position (3 x i32 Q16.16), covariance mantissas
//! (9 x i16 Q8.8), block exponent (u8), RGB (3 x u8), opacity (u8) and
//! one pad byte.

use std::path::Path;

use crate::error::{FormatError, Result};
use crate::fixed::{Fx, Fx8};
use crate::splat::Splat3D;

pub const MAGIC: [u8; 4] = *b"SPLT";
pub const VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 16;
pub const RECORD_SIZE: usize = 36;
pub const MAX_COUNT: u32 = 65536;

/// Parses a splat container from memory. Header fields are validated
/// in order: magic, version, count, payload length.
pub fn load(bytes: &[u8]) -> Result<Vec<Splat3D>> {
    if bytes.len() < HEADER_SIZE {
        return Err(FormatError::ShortRead {
            expected: HEADER_SIZE,
            actual: bytes.len(),
        }
        .into());
    }
    if bytes[0..4] != MAGIC {
        let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        return Err(FormatError::BadMagic(magic).into());
    }
    let version = read_u32(bytes, 4);
    if version != VERSION {
        return Err(FormatError::BadVersion(version).into());
    }
    let count = read_u32(bytes, 8);
    if count == 0 || count > MAX_COUNT {
        return Err(FormatError::BadCount(count).into());
    }
    let expected = HEADER_SIZE + count as usize * RECORD_SIZE;
    if bytes.len() < expected {
        return Err(FormatError::ShortRead {
            expected,
            actual: bytes.len(),
        }
        .into());
    }

    let mut splats = Vec::with_capacity(count as usize);
    for i in 0..count as usize {
        splats.push(read_record(&bytes[HEADER_SIZE + i * RECORD_SIZE..]));
    }
    Ok(splats)
}

pub fn load_file(path: impl AsRef<Path>) -> Result<Vec<Splat3D>> {
    load(&std::fs::read(path)?)
}

/// Serializes splats into the container layout. The inverse of [`load`]
/// bit for bit.
pub fn save(splats: &[Splat3D]) -> Result<Vec<u8>> {
    let count = splats.len() as u32;
    if count == 0 || count > MAX_COUNT {
        return Err(FormatError::BadCount(count).into());
    }
    let mut out = Vec::with_capacity(HEADER_SIZE + splats.len() * RECORD_SIZE);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    for splat in splats {
        write_record(&mut out, splat);
    }
    Ok(out)
}

pub fn save_file(path: impl AsRef<Path>, splats: &[Splat3D]) -> Result<()> {
    std::fs::write(path, save(splats)?)?;
    Ok(())
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

fn read_record(r: &[u8]) -> Splat3D {
    let mut pos = [Fx::ZERO; 3];
    for i in 0..3 {
        pos[i] = Fx(i32::from_le_bytes([
            r[i * 4],
            r[i * 4 + 1],
            r[i * 4 + 2],
            r[i * 4 + 3],
        ]));
    }
    let mut cov_mant = [Fx8::ZERO; 9];
    for i in 0..9 {
        cov_mant[i] = Fx8(i16::from_le_bytes([r[12 + i * 2], r[13 + i * 2]]));
    }
    Splat3D {
        pos,
        cov_mant,
        cov_exp: r[30] & 0x0f,
        color: [r[31], r[32], r[33]],
        opacity: r[34],
    }
}

fn write_record(out: &mut Vec<u8>, splat: &Splat3D) {
    for p in splat.pos {
        out.extend_from_slice(&p.0.to_le_bytes());
    }
    for m in splat.cov_mant {
        out.extend_from_slice(&m.0.to_le_bytes());
    }
    out.push(splat.cov_exp & 0x0f);
    out.extend_from_slice(&splat.color);
    out.push(splat.opacity);
    out.push(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sample(n: usize) -> Vec<Splat3D> {
        (0..n)
            .map(|i| Splat3D {
                pos: [
                    Fx::from_int(i as i32),
                    Fx::from_f32(-0.5 * i as f32),
                    Fx(i as i32 * 7919),
                ],
                cov_mant: [Fx8((i as i16).wrapping_mul(31)); 9],
                cov_exp: (i % 16) as u8,
                color: [i as u8, (i >> 8) as u8, 0xab],
                opacity: 200,
            })
            .collect()
    }

    fn format_err(e: Error) -> FormatError {
        match e {
            Error::AssetFormat(f) => f,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn round_trip_is_bit_exact() {
        let splats = sample(37);
        let bytes = save(&splats).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 37 * RECORD_SIZE);
        assert_eq!(load(&bytes).unwrap(), splats);
    }

    #[test]
    fn boundary_counts_accepted() {
        let one = sample(1);
        assert_eq!(load(&save(&one).unwrap()).unwrap(), one);
        let max = sample(MAX_COUNT as usize);
        assert_eq!(load(&save(&max).unwrap()).unwrap().len(), MAX_COUNT as usize);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = save(&sample(1)).unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            format_err(load(&bytes).unwrap_err()),
            FormatError::BadMagic(_)
        ));
    }

    #[test]
    fn rejects_bad_version() {
        let mut bytes = save(&sample(1)).unwrap();
        bytes[4] = 2;
        assert_eq!(
            format_err(load(&bytes).unwrap_err()),
            FormatError::BadVersion(2)
        );
    }

    #[test]
    fn rejects_bad_count() {
        let mut bytes = save(&sample(1)).unwrap();
        bytes[8..12].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(format_err(load(&bytes).unwrap_err()), FormatError::BadCount(0));

        bytes[8..12].copy_from_slice(&(MAX_COUNT + 1).to_le_bytes());
        assert_eq!(
            format_err(load(&bytes).unwrap_err()),
            FormatError::BadCount(MAX_COUNT + 1)
        );
        assert!(matches!(
            save(&[]).unwrap_err(),
            Error::AssetFormat(FormatError::BadCount(0))
        ));
    }

    #[test]
    fn rejects_short_read() {
        let bytes = save(&sample(3)).unwrap();
        let truncated = &bytes[..bytes.len() - 1];
        assert!(matches!(
            format_err(load(truncated).unwrap_err()),
            FormatError::ShortRead { .. }
        ));
        assert!(matches!(
            format_err(load(&bytes[..7]).unwrap_err()),
            FormatError::ShortRead { .. }
        ));
    }
}
