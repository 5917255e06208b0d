//! Shamir 2-of-2 over GF(256), backed by `sharks`.
//!
//! Part format (base64 of): `[1 byte: share index][N bytes: y values]`,
//! index `0x01` for the stored part and `0x02` for the project part.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sharks::{Share, Sharks};
use zeroize::Zeroizing;

use super::compat::{tag_unversioned_part, PartKind};
use super::{decode_key, decode_part, SplitKey, SPLIT_RETRIES};
use crate::error::{CryptoError, CryptoResult};

const THRESHOLD: u8 = 2;

/// Split a base64 key, verifying every attempt by reconstructing it.
pub fn split(key: &str) -> CryptoResult<SplitKey> {
    let secret = decode_key(key)?;
    split_with(&secret, deal)
}

type DealtParts = (Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>);

/// Deal with `deal` until a pair recombines to `secret`, at most
/// [`SPLIT_RETRIES`] times.
fn split_with(secret: &[u8], mut deal: impl FnMut(&[u8]) -> DealtParts) -> CryptoResult<SplitKey> {
    for attempt in 1..=SPLIT_RETRIES {
        let (stored, project) = deal(secret);

        match combine(stored.clone(), project.clone()) {
            Ok(recovered) if *recovered == *secret => {
                return Ok(SplitKey {
                    stored_part: STANDARD.encode(&*stored),
                    project_part: STANDARD.encode(&*project),
                });
            }
            Ok(_) => {
                tracing::warn!(attempt, "split self-verification mismatch, retrying");
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "split self-verification failed, retrying");
            }
        }
    }

    Err(CryptoError::FailedToSplitKey {
        attempts: SPLIT_RETRIES,
    })
}

/// Rebuild a base64 key from a stored and a project part.
pub fn reconstruct(stored_part: &str, project_part: &str) -> CryptoResult<String> {
    let stored = decode_part(stored_part, PartKind::Stored.label())?;
    let project = decode_part(project_part, PartKind::Project.label())?;

    let stored = tag_unversioned_part(stored, PartKind::Stored);
    let project = tag_unversioned_part(project, PartKind::Project);

    let secret = combine(stored, project)?;
    Ok(STANDARD.encode(&*secret))
}

/// Deal the two shares of a fresh polynomial per byte.
fn deal(secret: &[u8]) -> DealtParts {
    let mut dealer = Sharks(THRESHOLD).dealer(secret);
    let mut next = || {
        dealer
            .next()
            .map(|share| Zeroizing::new(Vec::from(&share)))
            .unwrap_or_default()
    };
    let stored = next();
    let project = next();
    (stored, project)
}

fn combine(
    stored: Zeroizing<Vec<u8>>,
    project: Zeroizing<Vec<u8>>,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let stored = to_share(&stored, PartKind::Stored)?;
    let project = to_share(&project, PartKind::Project)?;

    Sharks(THRESHOLD)
        .recover(&[stored, project])
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::CombineFailed(e.to_string()))
}

fn to_share(bytes: &[u8], kind: PartKind) -> CryptoResult<Share> {
    match bytes.first() {
        None => Err(CryptoError::CombineFailed(format!(
            "{} part is empty",
            kind.label()
        ))),
        Some(0) => Err(CryptoError::CombineFailed(format!(
            "{} part has share index 0",
            kind.label()
        ))),
        Some(_) => Share::try_from(bytes)
            .map_err(|e| CryptoError::CombineFailed(format!("{} part: {e}", kind.label()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::generate_key;
    use crate::sharing::compat::{PROJECT_PART_TAG, STORED_PART_TAG, UNVERSIONED_PART_LEN};

    fn decoded(part: &str) -> Vec<u8> {
        STANDARD.decode(part).unwrap()
    }

    #[test]
    fn test_parts_are_tagged() {
        let parts = split(&generate_key()).unwrap();
        let stored = decoded(&parts.stored_part);
        let project = decoded(&parts.project_part);

        assert_eq!(stored.len(), UNVERSIONED_PART_LEN + 1);
        assert_eq!(project.len(), UNVERSIONED_PART_LEN + 1);
        assert_eq!(stored[0], STORED_PART_TAG);
        assert_eq!(project[0], PROJECT_PART_TAG);
    }

    #[test]
    fn test_unversioned_parts_reconstruct() {
        let key = generate_key();
        let parts = split(&key).unwrap();

        // Strip the index byte to get the pre-versioning format
        let bare_stored = STANDARD.encode(&decoded(&parts.stored_part)[1..]);
        let bare_project = STANDARD.encode(&decoded(&parts.project_part)[1..]);

        assert_eq!(reconstruct(&bare_stored, &bare_project).unwrap(), key);
        assert_eq!(reconstruct(&bare_stored, &parts.project_part).unwrap(), key);
        assert_eq!(reconstruct(&parts.stored_part, &bare_project).unwrap(), key);
    }

    #[test]
    fn test_same_part_twice_fails() {
        let parts = split(&generate_key()).unwrap();
        let result = reconstruct(&parts.stored_part, &parts.stored_part);
        assert!(matches!(result, Err(CryptoError::CombineFailed(_))));
    }

    #[test]
    fn test_missing_part_fails() {
        let parts = split(&generate_key()).unwrap();
        let result = reconstruct(&parts.stored_part, "");
        assert!(matches!(result, Err(CryptoError::CombineFailed(_))));
    }

    #[test]
    fn test_length_mismatch_fails() {
        let parts = split(&generate_key()).unwrap();
        let truncated = STANDARD.encode(&decoded(&parts.project_part)[..10]);
        let result = reconstruct(&parts.stored_part, &truncated);
        assert!(matches!(result, Err(CryptoError::CombineFailed(_))));
    }

    #[test]
    fn test_zero_index_rejected() {
        let parts = split(&generate_key()).unwrap();
        let mut project = decoded(&parts.project_part);
        project[0] = 0;
        let result = reconstruct(&parts.stored_part, &STANDARD.encode(project));
        assert!(matches!(result, Err(CryptoError::CombineFailed(_))));
    }

    #[test]
    fn test_split_rejects_bad_key() {
        assert!(matches!(
            split("@@@"),
            Err(CryptoError::InvalidEncryptionKey(_))
        ));
        assert!(matches!(
            split(""),
            Err(CryptoError::InvalidEncryptionKey(_))
        ));
    }

    #[test]
    fn test_split_gives_up_after_retries() {
        let secret = [7u8; 32];
        let mut calls = 0;
        // parts of an all-zero polynomial recombine to the wrong secret
        let result = split_with(&secret, |_| {
            calls += 1;
            let mut stored = vec![STORED_PART_TAG];
            stored.extend_from_slice(&[0u8; UNVERSIONED_PART_LEN]);
            let mut project = vec![PROJECT_PART_TAG];
            project.extend_from_slice(&[0u8; UNVERSIONED_PART_LEN]);
            (Zeroizing::new(stored), Zeroizing::new(project))
        });

        assert!(matches!(
            result,
            Err(CryptoError::FailedToSplitKey { attempts: SPLIT_RETRIES })
        ));
        assert_eq!(calls, SPLIT_RETRIES);
        assert_eq!(SPLIT_RETRIES, 5);
    }

    #[test]
    fn test_split_retries_after_unusable_deal() {
        let secret = [7u8; 32];
        let mut calls = 0;
        let parts = split_with(&secret, |s| {
            calls += 1;
            if calls == 1 {
                (Zeroizing::new(Vec::new()), Zeroizing::new(Vec::new()))
            } else {
                deal(s)
            }
        })
        .unwrap();

        assert_eq!(calls, 2);
        assert_eq!(
            reconstruct(&parts.stored_part, &parts.project_part).unwrap(),
            STANDARD.encode(secret)
        );
    }

    #[test]
    fn test_split_is_randomised() {
        let key = generate_key();
        let a = split(&key).unwrap();
        let b = split(&key).unwrap();
        assert_ne!(a.stored_part, b.stored_part);
    }
}
