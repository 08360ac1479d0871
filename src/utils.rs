//! Utility functions for identity generation

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique participant id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Checks that `hrp` can prefix a bech32 address.
pub fn is_valid_hrp(hrp: &str) -> bool {
    bech32::Hrp::parse(hrp).is_ok()
}
