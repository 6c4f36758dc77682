use sha2::{Digest, Sha256};

/// Merkle root over an ordered list of action hashes. Concatenation at each
/// reduction step is of the hex strings, not the raw bytes — this is part of
/// the contract, not an implementation detail.
pub fn merkle_root(action_hashes: &[String]) -> String {
    if action_hashes.is_empty() {
        return hex::encode(Sha256::digest(b"empty"));
    }

    let mut level = action_hashes.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level.last().cloned().expect("level is non-empty");
            level.push(last);
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let combined = format!("{}{}", pair[0], pair[1]);
                hex::encode(Sha256::digest(combined.as_bytes()))
            })
            .collect();
    }

    level.into_iter().next().expect("level reduces to exactly one root")
}
