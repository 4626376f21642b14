// Copyright (c) 2022-2023 The MobileCoin Foundation

//! encdec helper modules for fields without native encodings

/// Encoding helper for fixed-length byte arrays (pending nightly array constructors)
pub(crate) mod arr {
    use encdec::Error;

    pub fn enc<const N: usize>(d: &[u8; N], buff: &mut [u8]) -> Result<usize, Error> {
        if buff.len() < d.len() {
            return Err(Error::Length);
        }

        buff[..d.len()].copy_from_slice(&d[..]);

        Ok(d.len())
    }

    pub fn enc_len<const N: usize>(d: &[u8; N]) -> Result<usize, Error> {
        Ok(d.len())
    }

    pub fn dec<const N: usize>(buff: &[u8]) -> Result<([u8; N], usize), Error> {
        if buff.len() < N {
            return Err(Error::Length);
        }

        let mut d = [0u8; N];
        d.copy_from_slice(&buff[..N]);

        Ok((d, N))
    }
}

/// Encoding helper for bounded byte vectors, prefixed with a u16 length
pub(crate) mod bytes {
    use encdec::Error;
    use heapless::Vec;

    pub fn enc<const N: usize>(d: &Vec<u8, N>, buff: &mut [u8]) -> Result<usize, Error> {
        if buff.len() < 2 + d.len() {
            return Err(Error::Length);
        }

        buff[..2].copy_from_slice(&(d.len() as u16).to_le_bytes());
        buff[2..][..d.len()].copy_from_slice(d);

        Ok(2 + d.len())
    }

    pub fn enc_len<const N: usize>(d: &Vec<u8, N>) -> Result<usize, Error> {
        Ok(2 + d.len())
    }

    pub fn dec<const N: usize>(buff: &[u8]) -> Result<(Vec<u8, N>, usize), Error> {
        if buff.len() < 2 {
            return Err(Error::Length);
        }

        let n = u16::from_le_bytes([buff[0], buff[1]]) as usize;
        if n > N || buff.len() < 2 + n {
            return Err(Error::Length);
        }

        let d = Vec::from_slice(&buff[2..][..n]).map_err(|_| Error::Length)?;

        Ok((d, 2 + n))
    }
}

/// Encoding helper for derivation paths, prefixed with a u8 component count
pub(crate) mod path {
    use encdec::Error;

    use crate::{DerivationPath, MAX_PATH_DEPTH};

    pub fn enc(p: &DerivationPath, buff: &mut [u8]) -> Result<usize, Error> {
        if buff.len() < 1 + p.len() * 4 {
            return Err(Error::Length);
        }

        buff[0] = p.len() as u8;
        for (i, c) in p.iter().enumerate() {
            buff[1 + i * 4..][..4].copy_from_slice(&c.to_le_bytes());
        }

        Ok(1 + p.len() * 4)
    }

    pub fn enc_len(p: &DerivationPath) -> Result<usize, Error> {
        Ok(1 + p.len() * 4)
    }

    pub fn dec(buff: &[u8]) -> Result<(DerivationPath, usize), Error> {
        if buff.is_empty() {
            return Err(Error::Length);
        }

        let n = buff[0] as usize;
        if n > MAX_PATH_DEPTH || buff.len() < 1 + n * 4 {
            return Err(Error::Length);
        }

        let mut p = DerivationPath::new();
        for i in 0..n {
            let mut c = [0u8; 4];
            c.copy_from_slice(&buff[1 + i * 4..][..4]);
            // Capacity checked above
            let _ = p.push(u32::from_le_bytes(c));
        }

        Ok((p, 1 + n * 4))
    }
}
