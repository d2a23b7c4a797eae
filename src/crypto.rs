//! Symmetric encryption context derived from the server handshake.
//!
//! The cipher is negotiated out-of-band (both sides configure the same
//! method id); the server only supplies the per-connection IV.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cipher {
    None,
    Xor,
}

impl Cipher {
    pub fn from_id(id: u8) -> std::io::Result<Self> {
        match id {
            0 => Ok(Cipher::None),
            1 => Ok(Cipher::Xor),
            unknown => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unsupported encryption method id: {unknown}"),
            )),
        }
    }
}

impl TryFrom<&str> for Cipher {
    type Error = std::io::Error;

    fn try_from(name: &str) -> std::io::Result<Self> {
        match name {
            "" | "none" | "0" => Ok(Cipher::None),
            "xor" | "1" => Ok(Cipher::Xor),
            unknown => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unsupported encryption method: {unknown}"),
            )),
        }
    }
}

/// Per-connection encryption capability. Owned by a single handshake
/// session, never reused: the IV is connection-specific.
pub struct EncryptionContext {
    cipher: Cipher,
    password: Box<[u8]>,
    iv: Box<[u8]>,
}

impl EncryptionContext {
    pub fn new(password: &str, cipher: Cipher, iv: &[u8]) -> std::io::Result<Self> {
        if cipher != Cipher::None && iv.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "empty initialization vector",
            ));
        }
        Ok(Self {
            cipher,
            password: password.as_bytes().to_vec().into_boxed_slice(),
            iv: iv.to_vec().into_boxed_slice(),
        })
    }

    pub fn encrypt_in_place(&self, buf: &mut [u8]) {
        match self.cipher {
            Cipher::None => (),
            Cipher::Xor => self.xor_in_place(buf),
        }
    }

    pub fn decrypt_in_place(&self, buf: &mut [u8]) {
        // Both supported ciphers are involutions.
        self.encrypt_in_place(buf);
    }

    fn xor_in_place(&self, buf: &mut [u8]) {
        // Rotate over the transmitted IV, then over the shared secret.
        for (i, b) in buf.iter_mut().enumerate() {
            *b ^= self.iv[i % self.iv.len()];
        }
        if !self.password.is_empty() {
            for (i, b) in buf.iter_mut().enumerate() {
                *b ^= self.password[i % self.password.len()];
            }
        }
    }
}

impl std::fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("EncryptionContext")
            .field("cipher", &self.cipher)
            .field("iv_len", &self.iv.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_names() {
        assert_eq!(Cipher::try_from("none").unwrap(), Cipher::None);
        assert_eq!(Cipher::try_from("xor").unwrap(), Cipher::Xor);
        assert_eq!(Cipher::try_from("1").unwrap(), Cipher::Xor);
        assert!(Cipher::try_from("blowfish").is_err());
        assert!(Cipher::from_id(14).is_err());
    }

    #[test]
    fn test_xor_round_trip() {
        let iv = [0x5a; 128];
        let ctx = EncryptionContext::new("secret", Cipher::Xor, &iv).unwrap();
        let original: Vec<u8> = (0u8..=255).collect();
        let mut buf = original.clone();
        ctx.encrypt_in_place(&mut buf);
        assert_ne!(buf, original);
        ctx.decrypt_in_place(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_xor_depends_on_iv_and_password() {
        let ctx1 = EncryptionContext::new("secret", Cipher::Xor, &[1u8; 16]).unwrap();
        let ctx2 = EncryptionContext::new("secret", Cipher::Xor, &[2u8; 16]).unwrap();
        let ctx3 = EncryptionContext::new("other", Cipher::Xor, &[1u8; 16]).unwrap();

        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        let mut c = [0u8; 32];
        ctx1.encrypt_in_place(&mut a);
        ctx2.encrypt_in_place(&mut b);
        ctx3.encrypt_in_place(&mut c);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_none_is_passthrough() {
        let ctx = EncryptionContext::new("secret", Cipher::None, &[]).unwrap();
        let mut buf = [7u8; 16];
        ctx.encrypt_in_place(&mut buf);
        assert_eq!(buf, [7u8; 16]);
    }

    #[test]
    fn test_empty_iv_rejected() {
        assert!(EncryptionContext::new("secret", Cipher::Xor, &[]).is_err());
    }
}
