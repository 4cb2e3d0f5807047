use parking_lot::Mutex;

use warden_store::DistributedToken;

/// Distributed tokens this process currently owns and has not yet released.
///
/// Consulted on controlled shutdown so every outstanding token can be pushed
/// back to the store.
#[derive(Debug, Default)]
pub struct HeldMutexRegistry {
    tokens: Mutex<Vec<DistributedToken>>,
}

impl HeldMutexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, token: DistributedToken) {
        self.tokens.lock().push(token);
    }

    /// Remove `token`; returns `false` (and does nothing) if it was not recorded
    pub fn forget(&self, token: &DistributedToken) -> bool {
        let mut tokens = self.tokens.lock();
        match tokens.iter().position(|held| held == token) {
            Some(index) => {
                tokens.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, token: &DistributedToken) -> bool {
        self.tokens.lock().contains(token)
    }

    pub fn snapshot(&self) -> Vec<DistributedToken> {
        self.tokens.lock().clone()
    }

    pub fn clear(&self) {
        self.tokens.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }
}
