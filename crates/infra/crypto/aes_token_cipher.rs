use aes::Aes256;
use anyhow::{Context, Result, anyhow, bail};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};

use crate::domain::{
    repositories::token_cipher::TokenCipher, value_objects::bot_instances::BotToken,
};

type Decryptor = cbc::Decryptor<Aes256>;
type Encryptor = cbc::Encryptor<Aes256>;

pub const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// AES-256-CBC with PKCS#7 padding. Sealed form is `hex(iv):hex(ciphertext)`.
pub struct AesTokenCipher {
    key: [u8; KEY_LEN],
}

impl AesTokenCipher {
    /// `key` is used as raw bytes and must be exactly 32 of them.
    pub fn new(key: &str) -> Result<Self> {
        let key: [u8; KEY_LEN] = key
            .as_bytes()
            .try_into()
            .map_err(|_| anyhow!("token encryption key must be exactly {KEY_LEN} bytes"))?;
        Ok(Self { key })
    }

    pub fn seal(&self, token: &str, iv: [u8; IV_LEN]) -> String {
        let ciphertext = Encryptor::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(token.as_bytes());
        format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
    }
}

impl TokenCipher for AesTokenCipher {
    fn reveal(&self, sealed: &BotToken) -> Result<BotToken> {
        let Some((iv, ciphertext)) = sealed.expose().split_once(':') else {
            bail!("sealed token is not in iv:ciphertext form");
        };
        let iv: [u8; IV_LEN] = hex::decode(iv)
            .context("sealed token iv is not hex")?
            .try_into()
            .map_err(|_| anyhow!("sealed token iv must be {IV_LEN} bytes"))?;
        let ciphertext = hex::decode(ciphertext).context("sealed token body is not hex")?;

        let plain = Decryptor::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| anyhow!("sealed token does not decrypt with this key"))?;
        let token = String::from_utf8(plain).context("decrypted token is not utf-8")?;
        Ok(BotToken::new(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn sealed_token_reveals_the_original() {
        let cipher = AesTokenCipher::new(KEY).unwrap();
        let sealed = cipher.seal("MTIz.discord.token", [7; IV_LEN]);

        assert!(sealed.starts_with("07070707070707070707070707070707:"));
        let revealed = cipher.reveal(&BotToken::new(sealed)).unwrap();
        assert_eq!(revealed.expose(), "MTIz.discord.token");
    }

    #[test]
    fn key_must_be_32_bytes() {
        assert!(AesTokenCipher::new("short").is_err());
        assert!(AesTokenCipher::new(&format!("{KEY}x")).is_err());
    }

    #[test]
    fn wrong_key_or_shape_is_an_error() {
        let sealed = AesTokenCipher::new(KEY).unwrap().seal("token", [1; IV_LEN]);
        let other = AesTokenCipher::new("ffffffffffffffffffffffffffffffff").unwrap();

        assert!(other.reveal(&BotToken::new(sealed)).is_err());
        assert!(other.reveal(&BotToken::new("plain-token")).is_err());
        assert!(other.reveal(&BotToken::new("abcd:00")).is_err());
    }
}
