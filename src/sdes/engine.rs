//! Boundary to the SRTP engine that owns random generation and media policies.
//!
//! The negotiator never touches packets itself. It asks an [`SrtpEngine`] for
//! randomness and policy objects, and hands configured policies to the
//! [`MediaTransport`] of the stream being keyed.

use std::sync::Arc;

use thiserror::Error;

use super::error::SdesError;
use super::suite::CryptoSuite;

/// Failure reported by an engine or transport implementation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Which way a policy protects traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Packets we send, keyed with our local key.
    Outbound,
    /// Packets we receive, keyed with the remote key.
    Inbound,
}

/// SRTP engine capability.
pub trait SrtpEngine {
    type Policy;

    /// Fill `buf` from the engine's random source.
    fn fill_random(&self, buf: &mut [u8]) -> Result<(), EngineError>;

    fn alloc_policy(&self) -> Result<Self::Policy, EngineError>;

    fn set_master_key(
        &self,
        policy: &mut Self::Policy,
        key: &[u8],
        salt: &[u8],
    ) -> Result<(), EngineError>;

    fn set_suite(&self, policy: &mut Self::Policy, suite: CryptoSuite) -> Result<(), EngineError>;

    fn set_ssrc(&self, policy: &mut Self::Policy, ssrc: u32, direction: Direction);

    fn release_policy(&self, policy: Self::Policy);
}

/// Media stream that SRTP policies are installed on.
pub trait MediaTransport<P> {
    /// SSRC this stream sends with.
    fn local_ssrc(&self) -> Result<u32, EngineError>;

    /// Install both policies together; neither is kept if this fails.
    fn add_srtp_policy(&mut self, remote: &P, local: &P) -> Result<(), EngineError>;
}

/// Process-wide engine registration, read-only to the negotiator.
///
/// Built once at startup and cloned into whatever needs it. An unregistered
/// handle makes every negotiation entry point fail with
/// [`SdesError::EngineUnavailable`].
#[derive(Debug)]
pub struct EngineHandle<E> {
    engine: Option<Arc<E>>,
}

impl<E> EngineHandle<E> {
    pub fn registered(engine: E) -> Self {
        Self {
            engine: Some(Arc::new(engine)),
        }
    }

    pub fn unregistered() -> Self {
        Self { engine: None }
    }

    pub fn is_registered(&self) -> bool {
        self.engine.is_some()
    }

    pub fn get(&self) -> Result<&E, SdesError> {
        self.engine.as_deref().ok_or(SdesError::EngineUnavailable)
    }
}

impl<E> Clone for EngineHandle<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

/// Allocated policy that is handed back to the engine when dropped.
pub(crate) struct PolicyGuard<'a, E: SrtpEngine> {
    engine: &'a E,
    policy: Option<E::Policy>,
}

impl<'a, E: SrtpEngine> PolicyGuard<'a, E> {
    pub(crate) fn alloc(engine: &'a E) -> Result<Self, EngineError> {
        let policy = engine.alloc_policy()?;
        Ok(Self {
            engine,
            policy: Some(policy),
        })
    }

    /// Set key, suite and SSRC in one go.
    pub(crate) fn configure(
        &mut self,
        suite: CryptoSuite,
        key: &[u8],
        salt: &[u8],
        ssrc: u32,
        direction: Direction,
    ) -> Result<(), EngineError> {
        let engine = self.engine;
        let policy = self.policy_mut()?;
        engine.set_master_key(policy, key, salt)?;
        engine.set_suite(policy, suite).map_err(|e| {
            tracing::warn!("Could not set {:?} SRTP suite: {}", direction, e);
            e
        })?;
        engine.set_ssrc(policy, ssrc, direction);
        Ok(())
    }

    pub(crate) fn policy(&self) -> Result<&E::Policy, EngineError> {
        self.policy
            .as_ref()
            .ok_or_else(|| EngineError::new("policy already released"))
    }

    fn policy_mut(&mut self) -> Result<&mut E::Policy, EngineError> {
        self.policy
            .as_mut()
            .ok_or_else(|| EngineError::new("policy already released"))
    }
}

impl<E: SrtpEngine> Drop for PolicyGuard<'_, E> {
    fn drop(&mut self) {
        if let Some(policy) = self.policy.take() {
            self.engine.release_policy(policy);
        }
    }
}

/// Scriptable engine and transport for negotiation tests.
#[cfg(test)]
pub(crate) mod mock {
    use std::cell::{Cell, RefCell};

    use super::*;

    /// Step at which the mock should fail.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FailAt {
        Nothing,
        Random,
        FirstAlloc,
        SecondAlloc,
        SetKey,
        SetSuite,
        LocalSsrc,
        Install,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    pub struct MockPolicy {
        pub id: usize,
        pub key: Vec<u8>,
        pub salt: Vec<u8>,
        pub suite: Option<CryptoSuite>,
        pub ssrc: u32,
        pub direction: Option<Direction>,
    }

    /// Engine producing a predictable byte pattern instead of real randomness.
    #[derive(Debug)]
    pub struct MockEngine {
        pub fail_at: Cell<FailAt>,
        pub seed: Cell<u8>,
        pub allocated: Cell<usize>,
        pub released: Cell<usize>,
    }

    impl MockEngine {
        pub fn new() -> Self {
            Self::seeded(1)
        }

        pub fn seeded(seed: u8) -> Self {
            Self {
                fail_at: Cell::new(FailAt::Nothing),
                seed: Cell::new(seed),
                allocated: Cell::new(0),
                released: Cell::new(0),
            }
        }

        pub fn failing_at(step: FailAt) -> Self {
            let engine = Self::new();
            engine.fail_at.set(step);
            engine
        }

        pub fn outstanding(&self) -> usize {
            self.allocated.get() - self.released.get()
        }
    }

    impl SrtpEngine for MockEngine {
        type Policy = MockPolicy;

        fn fill_random(&self, buf: &mut [u8]) -> Result<(), EngineError> {
            if self.fail_at.get() == FailAt::Random {
                return Err(EngineError::new("entropy exhausted"));
            }
            let seed = self.seed.get();
            for (i, b) in buf.iter_mut().enumerate() {
                *b = seed.wrapping_add(i as u8);
            }
            self.seed.set(seed.wrapping_add(1));
            Ok(())
        }

        fn alloc_policy(&self) -> Result<MockPolicy, EngineError> {
            let n = self.allocated.get();
            let fail = match self.fail_at.get() {
                FailAt::FirstAlloc => n == 0,
                FailAt::SecondAlloc => n == 1,
                _ => false,
            };
            if fail {
                return Err(EngineError::new("policy allocation failed"));
            }
            self.allocated.set(n + 1);
            Ok(MockPolicy {
                id: n,
                ..MockPolicy::default()
            })
        }

        fn set_master_key(
            &self,
            policy: &mut MockPolicy,
            key: &[u8],
            salt: &[u8],
        ) -> Result<(), EngineError> {
            if self.fail_at.get() == FailAt::SetKey {
                return Err(EngineError::new("bad master key"));
            }
            policy.key = key.to_vec();
            policy.salt = salt.to_vec();
            Ok(())
        }

        fn set_suite(&self, policy: &mut MockPolicy, suite: CryptoSuite) -> Result<(), EngineError> {
            if self.fail_at.get() == FailAt::SetSuite {
                return Err(EngineError::new("suite not compiled in"));
            }
            policy.suite = Some(suite);
            Ok(())
        }

        fn set_ssrc(&self, policy: &mut MockPolicy, ssrc: u32, direction: Direction) {
            policy.ssrc = ssrc;
            policy.direction = Some(direction);
        }

        fn release_policy(&self, _policy: MockPolicy) {
            self.released.set(self.released.get() + 1);
        }
    }

    /// Transport that records installed policy pairs.
    #[derive(Debug)]
    pub struct MockTransport {
        pub ssrc: u32,
        pub fail_ssrc: bool,
        pub fail_install: bool,
        pub installed: RefCell<Vec<(MockPolicy, MockPolicy)>>,
    }

    impl MockTransport {
        pub fn new(ssrc: u32) -> Self {
            Self {
                ssrc,
                fail_ssrc: false,
                fail_install: false,
                installed: RefCell::new(Vec::new()),
            }
        }

        pub fn for_engine(engine: &MockEngine, ssrc: u32) -> Self {
            let mut transport = Self::new(ssrc);
            transport.fail_ssrc = engine.fail_at.get() == FailAt::LocalSsrc;
            transport.fail_install = engine.fail_at.get() == FailAt::Install;
            transport
        }
    }

    impl MediaTransport<MockPolicy> for MockTransport {
        fn local_ssrc(&self) -> Result<u32, EngineError> {
            if self.fail_ssrc {
                return Err(EngineError::new("no stats for stream"));
            }
            Ok(self.ssrc)
        }

        fn add_srtp_policy(
            &mut self,
            remote: &MockPolicy,
            local: &MockPolicy,
        ) -> Result<(), EngineError> {
            if self.fail_install {
                return Err(EngineError::new("transport refused policies"));
            }
            self.installed
                .borrow_mut()
                .push((remote.clone(), local.clone()));
            Ok(())
        }
    }
}
