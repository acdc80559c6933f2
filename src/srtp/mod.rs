//! In-process SRTP engine.
//!
//! [`SoftwareSrtp`] provides randomness and policy objects to the SDES
//! negotiator; [`SrtpStream`] is the media side that policies are installed
//! on and that protects/unprotects packets once keyed.

pub mod rtp;
mod session;

use anyhow::{anyhow, bail, Result};

use crate::sdes::{CryptoSuite, Direction, EngineError, MasterKey, MediaTransport, SrtpEngine};

pub use session::{SessionKeys, SrtpSession};

/// One direction of SRTP keying, as configured by the negotiator.
#[derive(Debug, Clone, Default)]
pub struct SrtpPolicy {
    key: Option<MasterKey>,
    suite: Option<CryptoSuite>,
    ssrc: u32,
    direction: Option<Direction>,
}

impl SrtpPolicy {
    pub fn suite(&self) -> Option<CryptoSuite> {
        self.suite
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    fn complete(&self, expected: Direction) -> Result<(MasterKey, CryptoSuite), EngineError> {
        let key = self
            .key
            .ok_or_else(|| EngineError::new("policy has no master key"))?;
        let suite = self
            .suite
            .ok_or_else(|| EngineError::new("policy has no crypto suite"))?;
        if self.direction != Some(expected) {
            return Err(EngineError::new(format!(
                "expected {:?} policy, got {:?}",
                expected, self.direction
            )));
        }
        Ok((key, suite))
    }
}

/// Software SRTP engine backed by the OS CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareSrtp;

impl SrtpEngine for SoftwareSrtp {
    type Policy = SrtpPolicy;

    fn fill_random(&self, buf: &mut [u8]) -> Result<(), EngineError> {
        getrandom::getrandom(buf).map_err(|e| EngineError::new(format!("OS CSPRNG failed: {}", e)))
    }

    fn alloc_policy(&self) -> Result<SrtpPolicy, EngineError> {
        Ok(SrtpPolicy::default())
    }

    fn set_master_key(
        &self,
        policy: &mut SrtpPolicy,
        key: &[u8],
        salt: &[u8],
    ) -> Result<(), EngineError> {
        let joined = [key, salt].concat();
        let master = MasterKey::from_slice(&joined).ok_or_else(|| {
            EngineError::new(format!(
                "master key+salt is {} bytes ({} + {})",
                joined.len(),
                key.len(),
                salt.len()
            ))
        })?;
        policy.key = Some(master);
        Ok(())
    }

    fn set_suite(&self, policy: &mut SrtpPolicy, suite: CryptoSuite) -> Result<(), EngineError> {
        policy.suite = Some(suite);
        Ok(())
    }

    fn set_ssrc(&self, policy: &mut SrtpPolicy, ssrc: u32, direction: Direction) {
        policy.ssrc = ssrc;
        policy.direction = Some(direction);
    }

    fn release_policy(&self, _policy: SrtpPolicy) {}
}

/// A single RTP stream that sends with `local_ssrc`.
pub struct SrtpStream {
    local_ssrc: u32,
    session: Option<SrtpSession>,
}

impl SrtpStream {
    pub fn new(local_ssrc: u32) -> Self {
        Self {
            local_ssrc,
            session: None,
        }
    }

    /// Stream with a random non-zero SSRC.
    pub fn with_random_ssrc() -> Result<Self> {
        let mut buf = [0u8; 4];
        loop {
            getrandom::getrandom(&mut buf).map_err(|e| anyhow!("OS CSPRNG failed: {}", e))?;
            let ssrc = u32::from_be_bytes(buf);
            if ssrc != 0 {
                return Ok(Self::new(ssrc));
            }
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.local_ssrc
    }

    /// Suite of the installed policies, `None` while unkeyed.
    pub fn suite(&self) -> Option<CryptoSuite> {
        self.session.as_ref().map(SrtpSession::suite)
    }

    pub fn is_secured(&self) -> bool {
        self.session.is_some()
    }

    fn session_mut(&mut self) -> Result<&mut SrtpSession> {
        match self.session.as_mut() {
            Some(session) => Ok(session),
            None => bail!("no SRTP policy installed on stream {:08x}", self.local_ssrc),
        }
    }

    /// Protect an outgoing RTP packet, which must carry this stream's SSRC.
    pub fn protect(&mut self, rtp_packet: &[u8]) -> Result<Vec<u8>> {
        if rtp_packet.len() >= rtp::RTP_HEADER_SIZE {
            let ssrc = rtp::rtp_ssrc(rtp_packet);
            if ssrc != self.local_ssrc {
                bail!(
                    "packet SSRC {:08x} does not belong to stream {:08x}",
                    ssrc,
                    self.local_ssrc
                );
            }
        }
        self.session_mut()?.protect(rtp_packet)
    }

    pub fn unprotect(&mut self, srtp_packet: &[u8]) -> Result<Vec<u8>> {
        self.session_mut()?.unprotect(srtp_packet)
    }

    pub fn protect_rtcp(&mut self, rtcp_packet: &[u8]) -> Result<Vec<u8>> {
        self.session_mut()?.protect_rtcp(rtcp_packet)
    }

    pub fn unprotect_rtcp(&mut self, srtcp_packet: &[u8]) -> Result<Vec<u8>> {
        self.session_mut()?.unprotect_rtcp(srtcp_packet)
    }
}

impl MediaTransport<SrtpPolicy> for SrtpStream {
    fn local_ssrc(&self) -> Result<u32, EngineError> {
        Ok(self.local_ssrc)
    }

    fn add_srtp_policy(&mut self, remote: &SrtpPolicy, local: &SrtpPolicy) -> Result<(), EngineError> {
        let (remote_key, remote_suite) = remote.complete(Direction::Inbound)?;
        let (local_key, local_suite) = local.complete(Direction::Outbound)?;
        if remote_suite != local_suite {
            return Err(EngineError::new(format!(
                "suite mismatch: inbound {} outbound {}",
                remote_suite, local_suite
            )));
        }
        if local.ssrc != self.local_ssrc {
            return Err(EngineError::new(format!(
                "outbound policy SSRC {:08x} does not match stream {:08x}",
                local.ssrc, self.local_ssrc
            )));
        }

        // Replaces any earlier keying; counters restart with the new keys.
        self.session = Some(SrtpSession::new(local_suite, &local_key, &remote_key));
        tracing::debug!(
            "SRTP policies installed on stream {:08x} ({})",
            self.local_ssrc,
            local_suite
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_policy(
        engine: &SoftwareSrtp,
        fill: u8,
        suite: CryptoSuite,
        ssrc: u32,
        direction: Direction,
    ) -> SrtpPolicy {
        let mut policy = engine.alloc_policy().unwrap();
        engine
            .set_master_key(&mut policy, &[fill; 16], &[fill; 14])
            .unwrap();
        engine.set_suite(&mut policy, suite).unwrap();
        engine.set_ssrc(&mut policy, ssrc, direction);
        policy
    }

    #[test]
    fn test_fill_random() {
        let mut a = [0u8; 30];
        let mut b = [0u8; 30];
        SoftwareSrtp.fill_random(&mut a).unwrap();
        SoftwareSrtp.fill_random(&mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_set_master_key_length_checked() {
        let mut policy = SoftwareSrtp.alloc_policy().unwrap();
        assert!(SoftwareSrtp
            .set_master_key(&mut policy, &[0u8; 16], &[0u8; 12])
            .is_err());
        assert!(SoftwareSrtp
            .set_master_key(&mut policy, &[0u8; 16], &[0u8; 14])
            .is_ok());
    }

    #[test]
    fn test_unkeyed_stream_refuses_packets() {
        let mut stream = SrtpStream::new(5);
        assert!(!stream.is_secured());
        assert!(stream.protect(&rtp::encode(0, 1, 0, 5, &[0; 10])).is_err());
        assert!(stream.unprotect(&[0u8; 40]).is_err());
    }

    #[test]
    fn test_install_and_protect() {
        let engine = SoftwareSrtp;
        let suite = CryptoSuite::AesCm128HmacSha1_80;
        let mut alice = SrtpStream::new(0x1111);
        let mut bob = SrtpStream::new(0x2222);

        alice
            .add_srtp_policy(
                &make_policy(&engine, 2, suite, 0, Direction::Inbound),
                &make_policy(&engine, 1, suite, 0x1111, Direction::Outbound),
            )
            .unwrap();
        bob.add_srtp_policy(
            &make_policy(&engine, 1, suite, 0, Direction::Inbound),
            &make_policy(&engine, 2, suite, 0x2222, Direction::Outbound),
        )
        .unwrap();
        assert_eq!(alice.suite(), Some(suite));

        let packet = rtp::encode(0, 10, 1600, 0x1111, b"hello bob");
        let srtp = alice.protect(&packet).unwrap();
        assert_eq!(bob.unprotect(&srtp).unwrap(), packet);

        let reply = rtp::encode(0, 77, 3200, 0x2222, b"hello alice");
        let srtp = bob.protect(&reply).unwrap();
        assert_eq!(alice.unprotect(&srtp).unwrap(), reply);
    }

    #[test]
    fn test_protect_rejects_foreign_ssrc() {
        let engine = SoftwareSrtp;
        let suite = CryptoSuite::AesCm128HmacSha1_32;
        let mut stream = SrtpStream::new(0x1111);
        stream
            .add_srtp_policy(
                &make_policy(&engine, 2, suite, 0, Direction::Inbound),
                &make_policy(&engine, 1, suite, 0x1111, Direction::Outbound),
            )
            .unwrap();
        assert!(stream.protect(&rtp::encode(0, 1, 0, 0x9999, &[0; 8])).is_err());
    }

    #[test]
    fn test_install_rejects_inconsistent_policies() {
        let engine = SoftwareSrtp;
        let mut stream = SrtpStream::new(0x1111);
        let inbound = make_policy(&engine, 2, CryptoSuite::AesCm128HmacSha1_80, 0, Direction::Inbound);

        // Suite mismatch
        let outbound = make_policy(
            &engine,
            1,
            CryptoSuite::AesCm128HmacSha1_32,
            0x1111,
            Direction::Outbound,
        );
        assert!(stream.add_srtp_policy(&inbound, &outbound).is_err());

        // Swapped directions
        let outbound = make_policy(
            &engine,
            1,
            CryptoSuite::AesCm128HmacSha1_80,
            0x1111,
            Direction::Outbound,
        );
        assert!(stream.add_srtp_policy(&outbound, &inbound).is_err());

        // Missing key
        assert!(stream
            .add_srtp_policy(&SrtpPolicy::default(), &outbound)
            .is_err());

        assert!(!stream.is_secured());
    }

    #[test]
    fn test_negotiated_streams_interoperate() {
        use crate::sdes::{Acceptance, EngineHandle, Negotiator};

        let negotiator = Negotiator::new(EngineHandle::registered(SoftwareSrtp));
        let mut alice = negotiator.setup().unwrap();
        let mut bob = negotiator.setup().unwrap();
        let mut alice_stream = SrtpStream::new(0xA11CE);
        let mut bob_stream = SrtpStream::new(0xB0B);

        // Bob's preference gives way to the suite Alice offered.
        bob.prefer_suite(CryptoSuite::AesCm128HmacSha1_32);
        let offer = negotiator.render_offer(&mut alice).unwrap().to_string();
        negotiator
            .accept_answer(&mut bob, &offer, &mut bob_stream)
            .unwrap();
        let answer = negotiator.render_offer(&mut bob).unwrap().to_string();
        let outcome = negotiator
            .accept_answer(&mut alice, &answer, &mut alice_stream)
            .unwrap();
        assert_eq!(
            outcome,
            Acceptance::Activated {
                suite: CryptoSuite::AesCm128HmacSha1_80,
                tag: "1".into()
            }
        );

        let packet = rtp::encode(0, 500, 80_000, 0xA11CE, &[0x7F; 160]);
        let srtp = alice_stream.protect(&packet).unwrap();
        assert_eq!(bob_stream.unprotect(&srtp).unwrap(), packet);

        let rtcp = {
            let mut pkt = vec![0u8; 28];
            pkt[0] = 0x80;
            pkt[1] = 200;
            pkt[3] = 6;
            pkt[4..8].copy_from_slice(&0xB0Bu32.to_be_bytes());
            pkt
        };
        let srtcp = bob_stream.protect_rtcp(&rtcp).unwrap();
        assert_eq!(alice_stream.unprotect_rtcp(&srtcp).unwrap(), rtcp);
    }
}
