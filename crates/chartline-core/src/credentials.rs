//! Rotating pool of client-credential pairs

use serde::Deserialize;

/// One API client id/secret pair.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialPair {
    pub client_id: String,
    pub client_secret: String,
}

impl CredentialPair {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl std::fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialPair")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Fixed round-robin over a non-empty set of credentials.
///
/// Rotation never removes or reorders entries; after `len()` rotations the
/// pool is back on the credential it started with.
#[derive(Debug, Clone)]
pub struct CredentialPool {
    pairs: Vec<CredentialPair>,
    index: usize,
}

impl CredentialPool {
    pub fn new(pairs: Vec<CredentialPair>) -> anyhow::Result<Self> {
        anyhow::ensure!(!pairs.is_empty(), "at least one API credential is required");
        Ok(Self { pairs, index: 0 })
    }

    pub fn current(&self) -> &CredentialPair {
        &self.pairs[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Advance to the next credential, wrapping to the first.
    pub fn rotate(&mut self) {
        self.index = (self.index + 1) % self.pairs.len();
        log::info!("Switched to client ID: {}", self.current().client_id);
    }
}
