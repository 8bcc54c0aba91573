pub mod aes_token_cipher;
