pub mod connection;
pub mod constants;
pub mod custodian;
pub mod ephemeral;
pub mod nonce;
pub mod signer;
pub mod status;
pub mod submitter;
