//! Offer/answer handling for SDES-keyed streams.
//!
//! A [`Negotiator`] is built from the process-wide [`EngineHandle`]. Each
//! media stream gets its own [`CryptoContext`] from [`Negotiator::setup`];
//! the caller renders offers from it and feeds remote `a=crypto` answers back
//! through [`Negotiator::accept_answer`], which installs SRTP policies on the
//! stream whenever the remote key changes.

use super::context::CryptoContext;
use super::engine::{Direction, EngineError, EngineHandle, MediaTransport, PolicyGuard, SrtpEngine};
use super::error::SdesError;
use super::key::MasterKey;
use super::parser::{self, CryptoAnswer};
use super::suite::CryptoSuite;

/// Default tag for offers made before any answer chose one.
const DEFAULT_TAG: &str = "1";

/// What [`Negotiator::accept_answer`] did with an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// Same remote key as before; nothing was touched.
    Unchanged,
    /// New key accepted and policies installed.
    Activated { suite: CryptoSuite, tag: String },
}

/// Drives SDES negotiation for any number of independent contexts.
#[derive(Debug)]
pub struct Negotiator<E> {
    engine: EngineHandle<E>,
}

impl<E> Clone for Negotiator<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<E: SrtpEngine> Negotiator<E> {
    pub fn new(engine: EngineHandle<E>) -> Self {
        Self { engine }
    }

    /// Create a context with a fresh local key.
    pub fn setup(&self) -> Result<CryptoContext, SdesError> {
        let engine = self.engine.get()?;
        CryptoContext::create(engine)
    }

    /// Render `a=crypto:<tag> <suite> inline:<key>\r\n` for `ctx`.
    ///
    /// Uses the adopted tag (or 1) and the negotiated suite (or the strongest
    /// one). Output only changes when an accepted answer changes the context.
    pub fn render_offer<'c>(&self, ctx: &'c mut CryptoContext) -> Result<&'c str, SdesError> {
        self.engine.get()?;
        let suite = ctx.suite_or_default();
        let line = format!(
            "a=crypto:{} {} inline:{}\r\n",
            ctx.tag().unwrap_or(DEFAULT_TAG),
            suite,
            ctx.local_key_b64()
        );
        tracing::debug!("Crypto line: {}", line.trim_end());
        Ok(ctx.set_offer_line(line))
    }

    /// Process a remote `a=crypto` answer for the stream behind `transport`.
    ///
    /// Parse errors leave `ctx` untouched. An answer repeating the current
    /// remote key is accepted without side effects. Otherwise the new suite
    /// and key are stored first and then installed; if installation fails
    /// the stored values are not rolled back.
    pub fn accept_answer<T>(
        &self,
        ctx: &mut CryptoContext,
        raw_line: &str,
        transport: &mut T,
    ) -> Result<Acceptance, SdesError>
    where
        T: MediaTransport<E::Policy> + ?Sized,
    {
        let engine = self.engine.get()?;

        let CryptoAnswer {
            tag,
            suite,
            remote_key,
        } = parser::parse_answer(raw_line)?;

        if ctx.remote_key_matches(&remote_key) {
            tracing::debug!("SRTP remote key unchanged; maintaining current policy");
            return Ok(Acceptance::Unchanged);
        }

        // TODO: decide with call control whether a failed install should
        // restore the previously accepted key and suite.
        ctx.store_remote(suite, remote_key);

        activate_policy(engine, ctx.local_key(), suite, &remote_key, transport).map_err(|e| {
            tracing::warn!("Could not set SRTP policies: {}", e);
            SdesError::PolicyActivationFailure(e)
        })?;
        tracing::debug!("SRTP policy activated");

        if ctx.adopt_tag(&tag) {
            tracing::debug!("Accepting crypto tag {}", tag);
        }

        self.render_offer(ctx)?;

        Ok(Acceptance::Activated {
            suite,
            tag: ctx.tag().map(str::to_string).unwrap_or(tag),
        })
    }
}

/// Build the local (outbound) and remote (inbound) policies and install them.
///
/// Both policy handles go back to the engine on every path out of here.
fn activate_policy<E, T>(
    engine: &E,
    local_key: &MasterKey,
    suite: CryptoSuite,
    remote_key: &MasterKey,
    transport: &mut T,
) -> Result<(), EngineError>
where
    E: SrtpEngine,
    T: MediaTransport<E::Policy> + ?Sized,
{
    let mut local = PolicyGuard::alloc(engine)?;
    let mut remote = PolicyGuard::alloc(engine)?;

    let ssrc = transport.local_ssrc()?;

    local.configure(
        suite,
        &local_key.key(),
        &local_key.salt(),
        ssrc,
        Direction::Outbound,
    )?;
    remote.configure(
        suite,
        &remote_key.key(),
        &remote_key.salt(),
        0,
        Direction::Inbound,
    )?;

    transport.add_srtp_policy(remote.policy()?, local.policy()?)
}
