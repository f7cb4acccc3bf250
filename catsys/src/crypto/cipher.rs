use crate::error::CatError;
use blowfish::{
    cipher::{BlockCipher, NewBlockCipher},
    BlowfishLE,
};

/// Blowfish keyed with the archive file key. Blocks are read as two
/// little-endian words.
#[derive(Clone)]
pub struct KifCipher {
    key: u32,
    blowfish: BlowfishLE,
}

impl std::fmt::Debug for KifCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KifCipher")
            .field("key", &format_args!("{:#010X}", self.key))
            .finish()
    }
}

impl KifCipher {
    pub fn new(key: u32) -> anyhow::Result<Self> {
        let blowfish = BlowfishLE::new_varkey(&key.to_le_bytes()).map_err(|_| {
            CatError::Custom(String::from("Invalid blowfish key length"))
        })?;
        Ok(Self { key, blowfish })
    }

    pub fn key(&self) -> u32 {
        self.key
    }

    pub fn decrypt_block(&self, block: &mut [u8; 8]) {
        self.blowfish.decrypt_block(block.into());
    }

    pub fn encrypt_block(&self, block: &mut [u8; 8]) {
        self.blowfish.encrypt_block(block.into());
    }

    /// Decrypt every whole block of `buf`. A trailing partial block is left
    /// as stored.
    pub fn decrypt(&self, buf: &mut [u8]) {
        for chunk in buf.chunks_exact_mut(8) {
            let mut block = [0; 8];
            block.copy_from_slice(chunk);
            self.decrypt_block(&mut block);
            chunk.copy_from_slice(&block);
        }
    }

    pub fn encrypt(&self, buf: &mut [u8]) {
        for chunk in buf.chunks_exact_mut(8) {
            let mut block = [0; 8];
            block.copy_from_slice(chunk);
            self.encrypt_block(&mut block);
            chunk.copy_from_slice(&block);
        }
    }

    /// Decrypt an entry's offset and length pair.
    pub fn decrypt_pair(&self, offset: u32, length: u32) -> (u32, u32) {
        let mut block = pair_block(offset, length);
        self.decrypt_block(&mut block);
        split_block(&block)
    }

    pub fn encrypt_pair(&self, offset: u32, length: u32) -> (u32, u32) {
        let mut block = pair_block(offset, length);
        self.encrypt_block(&mut block);
        split_block(&block)
    }
}

fn pair_block(offset: u32, length: u32) -> [u8; 8] {
    let mut block = [0; 8];
    block[..4].copy_from_slice(&offset.to_le_bytes());
    block[4..].copy_from_slice(&length.to_le_bytes());
    block
}

fn split_block(block: &[u8; 8]) -> (u32, u32) {
    let mut offset = [0; 4];
    let mut length = [0; 4];
    offset.copy_from_slice(&block[..4]);
    length.copy_from_slice(&block[4..]);
    (u32::from_le_bytes(offset), u32::from_le_bytes(length))
}
