//! SHA256 digest utilities for content-addressed blobs and manifests

use crate::error::{MirrorError, Result};
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, PoisonError};

const SHA256_PREFIX: &str = "sha256:";

/// Utilities for working with `sha256:<hex>` digests
pub struct DigestUtils;

impl DigestUtils {
    /// Compute the hex SHA256 of byte data
    pub fn compute_sha256(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Compute a full digest (with `sha256:` prefix) from byte data
    pub fn compute_docker_digest(data: &[u8]) -> String {
        format!("{}{}", SHA256_PREFIX, Self::compute_sha256(data))
    }

    /// Check downloaded content against the digest it was requested by.
    ///
    /// Digests using another algorithm are accepted unchecked.
    pub fn verify(expected: &str, data: &[u8]) -> Result<()> {
        if !expected.starts_with(SHA256_PREFIX) {
            return Ok(());
        }
        let actual = Self::compute_docker_digest(data);
        if actual != expected {
            return Err(MirrorError::DigestMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    /// Hash `content` while it is being read.
    ///
    /// The digest is checked as soon as `size` bytes went through, so a
    /// mismatch replaces the final chunk with an error and a consumer never
    /// sees the complete bad content. Content longer than `size` is an error
    /// too. The returned [`StreamVerification`] keeps the failure for callers
    /// that only see the consumer's own error.
    pub fn verify_stream<S>(
        expected: &str,
        size: u64,
        content: S,
    ) -> (BoxStream<'static, Result<Bytes>>, StreamVerification)
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        let verification = StreamVerification::default();
        if !expected.starts_with(SHA256_PREFIX) {
            return (content.boxed(), verification);
        }

        let hashing = Hashing {
            content: content.boxed(),
            hasher: Sha256::new(),
            expected: expected.to_string(),
            size,
            received: 0,
            verified: false,
            verification: verification.clone(),
        };
        let verified = stream::unfold(Some(hashing), |state| async move {
            let Some(mut state) = state else {
                return None;
            };
            match state.content.next().await {
                Some(Ok(chunk)) => {
                    if state.verified {
                        let error = state.verification.fail(MirrorError::Validation(format!(
                            "blob {} is longer than its declared {} bytes",
                            state.expected, state.size
                        )));
                        return Some((Err(error), None));
                    }
                    state.hasher.update(&chunk);
                    state.received += chunk.len() as u64;
                    if state.received >= state.size {
                        if let Err(e) = state.finish() {
                            return Some((Err(e), None));
                        }
                    }
                    Some((Ok(chunk), Some(state)))
                }
                Some(Err(e)) => Some((Err(e), None)),
                None if state.verified => None,
                None => state.finish().err().map(|e| (Err(e), None)),
            }
        });
        (verified.boxed(), verification)
    }
}

/// Outcome of a [`DigestUtils::verify_stream`] run
#[derive(Clone, Default)]
pub struct StreamVerification(Arc<Mutex<Option<MirrorError>>>);

impl StreamVerification {
    fn fail(&self, error: MirrorError) -> MirrorError {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.clone());
        error
    }

    /// The digest or length error seen while streaming, if any
    pub fn result(&self) -> Result<()> {
        match self.0.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

struct Hashing {
    content: BoxStream<'static, Result<Bytes>>,
    hasher: Sha256,
    expected: String,
    size: u64,
    received: u64,
    verified: bool,
    verification: StreamVerification,
}

impl Hashing {
    fn finish(&mut self) -> Result<()> {
        self.verified = true;
        let actual = format!("{}{}", SHA256_PREFIX, hex::encode(self.hasher.finalize_reset()));
        if actual != self.expected {
            return Err(self.verification.fail(MirrorError::DigestMismatch {
                expected: self.expected.clone(),
                actual,
            }));
        }
        Ok(())
    }
}
