//! Memory accounts.
//!
//! The joiner holds two allocators. The build allocator may be bounded and
//! refuses charges past its limit with [`VecJoinError::MemoryLimitExceeded`].
//! The output allocator is always unbounded, so output already handed out is
//! never invalidated by the build budget.

use vecjoin_error::{Result, VecJoinError};

/// Byte counter with an optional limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryAccount {
    name: String,
    used: usize,
    peak: usize,
    limit: Option<usize>,
}

impl MemoryAccount {
    pub fn new(name: impl Into<String>, limit: Option<usize>) -> Self {
        Self {
            name: name.into(),
            used: 0,
            peak: 0,
            limit,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    #[must_use]
    pub const fn peak(&self) -> usize {
        self.peak
    }

    #[must_use]
    pub const fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Charge `bytes`. A refused charge leaves the account untouched.
    ///
    /// # Errors
    ///
    /// [`VecJoinError::MemoryLimitExceeded`] when the limit would be passed.
    pub fn grow(&mut self, bytes: usize) -> Result<()> {
        let next = self.used.saturating_add(bytes);
        if let Some(limit) = self.limit {
            if next > limit {
                return Err(VecJoinError::MemoryLimitExceeded {
                    account: self.name.clone(),
                    requested: bytes,
                    used: self.used,
                    limit,
                });
            }
        }
        self.used = next;
        self.peak = self.peak.max(next);
        Ok(())
    }

    pub fn shrink(&mut self, bytes: usize) {
        self.used = self.used.saturating_sub(bytes);
    }

    pub fn clear(&mut self) {
        self.used = 0;
    }
}

/// Allocation policy wrapped around one [`MemoryAccount`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocator {
    account: MemoryAccount,
}

impl Allocator {
    pub fn bounded(name: impl Into<String>, limit: usize) -> Self {
        Self {
            account: MemoryAccount::new(name, Some(limit)),
        }
    }

    pub fn unbounded(name: impl Into<String>) -> Self {
        Self {
            account: MemoryAccount::new(name, None),
        }
    }

    #[must_use]
    pub const fn is_bounded(&self) -> bool {
        self.account.limit.is_some()
    }

    #[must_use]
    pub const fn account(&self) -> &MemoryAccount {
        &self.account
    }

    #[must_use]
    pub const fn used(&self) -> usize {
        self.account.used
    }

    /// Account for a structure that changed size from `before` to `after`
    /// bytes.
    ///
    /// # Errors
    ///
    /// [`VecJoinError::MemoryLimitExceeded`] when growth is refused.
    pub fn adjust(&mut self, before: usize, after: usize) -> Result<()> {
        if after >= before {
            self.account.grow(after - before)
        } else {
            self.account.shrink(before - after);
            Ok(())
        }
    }

    /// Give back `bytes` previously charged.
    pub fn release(&mut self, bytes: usize) {
        self.account.shrink(bytes);
    }

    pub fn release_all(&mut self) {
        self.account.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_refusal_does_not_charge() {
        let mut alloc = Allocator::bounded("build", 100);
        alloc.adjust(0, 60).unwrap();
        let err = alloc.adjust(60, 120).unwrap_err();
        assert!(err.is_memory_limit());
        assert_eq!(alloc.used(), 60);
        match err {
            VecJoinError::MemoryLimitExceeded {
                requested, used, limit, ..
            } => {
                assert_eq!((requested, used, limit), (60, 60, 100));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn shrink_and_peak() {
        let mut alloc = Allocator::unbounded("output");
        alloc.adjust(0, 500).unwrap();
        alloc.adjust(500, 200).unwrap();
        assert_eq!(alloc.used(), 200);
        assert_eq!(alloc.account().peak(), 500);
        alloc.release_all();
        assert_eq!(alloc.used(), 0);
        assert!(!alloc.is_bounded());
    }
}
