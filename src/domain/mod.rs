//! Domain types: PE layout, certificates, signed messages, policy and verdicts.

pub mod asn1;
pub mod candidate;
pub mod constants;
pub mod crypto;
pub mod pe;
pub mod pkcs7;
pub mod policy;
pub mod verdict;
