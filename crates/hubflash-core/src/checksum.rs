//! Checksums used when flashing a hub
//!
//! Whole-image checksums are computed over 32-bit little-endian words as the
//! firmware's own integrity check sees them: the image followed by erased
//! (all ones) flash up to the end of the checked region.

/// Seed of the running XOR checksum kept by the bootloader
pub const XOR8_SEED: u8 = 0xFF;

/// CRC-32 polynomial of the STM32 CRC unit
pub const CRC32_POLY: u32 = 0x04C1_1DB7;

/// Value of erased flash
const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Iterate `data` as little-endian words, padded with erased flash
///
/// A trailing partial word is filled up with `0xFF` bytes, then whole erased
/// words follow until `max_size` bytes have been produced.
pub fn padded_words(data: &[u8], max_size: usize) -> impl Iterator<Item = u32> + '_ {
    let data_words = data.chunks(4).map(|chunk| {
        let mut word = [0xFF; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        u32::from_le_bytes(word)
    });
    let padded_len = data.len().div_ceil(4) * 4;
    let erased = max_size.saturating_sub(padded_len).div_ceil(4);
    data_words.chain(core::iter::repeat(ERASED_WORD).take(erased))
}

/// Two's complement of the wrapping sum of all words
///
/// Adding the result to the sum of the words gives zero.
pub fn sum_complement_32<I: IntoIterator<Item = u32>>(words: I) -> u32 {
    words
        .into_iter()
        .fold(0u32, |total, word| total.wrapping_add(word))
        .wrapping_neg()
}

/// Word oriented CRC-32 as computed by the STM32 CRC unit
///
/// Initial value `0xFFFFFFFF`, each word fed most significant bit first,
/// no reflection and no final XOR.
pub fn crc32<I: IntoIterator<Item = u32>>(words: I) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for word in words {
        crc ^= word;
        for _ in 0..32 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ CRC32_POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// XOR of all bytes, starting from [`XOR8_SEED`]
pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(XOR8_SEED, |acc, b| acc ^ b)
}

/// Running XOR checksum matching the one the bootloader keeps while programming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningXor(u8);

impl RunningXor {
    /// Start a new accumulator
    pub const fn new() -> Self {
        Self(XOR8_SEED)
    }

    /// Fold in more bytes
    pub fn update(&mut self, data: &[u8]) {
        self.0 = data.iter().fold(self.0, |acc, b| acc ^ b);
    }

    /// Current value
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl Default for RunningXor {
    fn default() -> Self {
        Self::new()
    }
}
