use crate::crypto::KifCipher;
use bytes::Bytes;
use positioned_io::{RandomAccessFile, ReadAt};
use std::{
    cmp::min,
    io::{self, Cursor, Read, Seek, SeekFrom},
};

const READ_CHUNK: u64 = 64 * 1024;

/// Reader over one stored file.
#[derive(Debug)]
pub enum EntryReader<'a> {
    Memory(Cursor<Bytes>),
    Stream(EntryStream<'a, RandomAccessFile>),
}

impl<'a> EntryReader<'a> {
    pub(crate) fn memory(buf: Bytes) -> Self {
        Self::Memory(Cursor::new(buf))
    }
    pub(crate) fn stream(
        file: &'a RandomAccessFile,
        cipher: Option<&'a KifCipher>,
        offset: u64,
        len: u64,
    ) -> Self {
        Self::Stream(EntryStream::new(file, cipher, offset, len))
    }
}

impl Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Memory(cursor) => cursor.read(buf),
            Self::Stream(stream) => stream.read(buf),
        }
    }
}

impl Seek for EntryReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::Memory(cursor) => cursor.seek(pos),
            Self::Stream(stream) => stream.seek(pos),
        }
    }
}

/// Decrypts an entry block by block while reading. Only whole blocks are
/// decrypted; a trailing partial block is returned as stored.
#[derive(Debug)]
pub struct EntryStream<'a, R> {
    file: &'a R,
    cipher: Option<&'a KifCipher>,
    offset: u64,
    len: u64,
    pos: u64,
}

impl<'a, R: ReadAt> EntryStream<'a, R> {
    pub fn new(
        file: &'a R,
        cipher: Option<&'a KifCipher>,
        offset: u64,
        len: u64,
    ) -> Self {
        Self {
            file,
            cipher,
            offset,
            len,
            pos: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn decrypted_len(&self) -> u64 {
        match self.cipher {
            Some(_) => self.len & !7,
            None => 0,
        }
    }
}

impl<R: ReadAt> Read for EntryStream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let cutoff = self.decrypted_len();
        let want = min(buf.len() as u64, READ_CHUNK);
        match self.cipher {
            Some(cipher) if self.pos < cutoff => {
                let end = min(self.pos + want, cutoff);
                let block_start = self.pos & !7;
                let block_end = (end + 7) & !7;
                let mut blocks = vec![0; (block_end - block_start) as usize];
                self.file
                    .read_exact_at(self.offset + block_start, &mut blocks)?;
                cipher.decrypt(&mut blocks);

                let skip = (self.pos - block_start) as usize;
                let n = (end - self.pos) as usize;
                buf[..n].copy_from_slice(&blocks[skip..skip + n]);
                self.pos += n as u64;
                Ok(n)
            }
            _ => {
                let n = min(want, self.len - self.pos) as usize;
                self.file
                    .read_exact_at(self.offset + self.pos, &mut buf[..n])?;
                self.pos += n as u64;
                Ok(n)
            }
        }
    }
}

impl<R> Seek for EntryStream<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(n) => offset_by(self.len, n),
            SeekFrom::Current(n) => offset_by(self.pos, n),
        };
        match new_pos {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Invalid seek to a negative or overflowing position",
            )),
        }
    }
}

fn offset_by(base: u64, n: i64) -> Option<u64> {
    if n >= 0 {
        base.checked_add(n as u64)
    } else {
        base.checked_sub(n.unsigned_abs())
    }
}
