//! SRTP/SRTCP packet protection with AES-128-CM and HMAC-SHA1 (RFC 3711).
//!
//! Session keys are derived from the negotiated master key and salt; the
//! authentication tag is truncated according to the negotiated suite.

use aes::cipher::{KeyIvInit, StreamCipher};
use anyhow::{anyhow, bail, Context, Result};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::rtp;
use crate::sdes::{CryptoSuite, MasterKey};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type HmacSha1 = Hmac<Sha1>;

/// SRTP key derivation labels (RFC 3711, section 4.3.1).
const LABEL_CIPHER_KEY: u8 = 0x00;
const LABEL_AUTH_KEY: u8 = 0x01;
const LABEL_SALT: u8 = 0x02;

/// SRTCP key derivation labels (RFC 3711, section 3.4).
const LABEL_SRTCP_CIPHER_KEY: u8 = 0x03;
const LABEL_SRTCP_AUTH_KEY: u8 = 0x04;
const LABEL_SRTCP_SALT: u8 = 0x05;

/// Size of the SRTCP E||index trailer.
const SRTCP_INDEX_LEN: usize = 4;

/// Derived session keys for one direction of SRTP or SRTCP.
#[derive(Clone)]
pub struct SessionKeys {
    pub cipher_key: [u8; 16],
    pub auth_key: [u8; 20], // HMAC-SHA1 uses 160-bit key
    pub salt: [u8; 14],
}

impl SessionKeys {
    /// SRTP session keys (labels 0x00-0x02).
    pub fn srtp(master: &MasterKey) -> Self {
        Self::derive(master, [LABEL_CIPHER_KEY, LABEL_AUTH_KEY, LABEL_SALT])
    }

    /// SRTCP session keys (labels 0x03-0x05).
    pub fn srtcp(master: &MasterKey) -> Self {
        Self::derive(
            master,
            [LABEL_SRTCP_CIPHER_KEY, LABEL_SRTCP_AUTH_KEY, LABEL_SRTCP_SALT],
        )
    }

    fn derive(master: &MasterKey, labels: [u8; 3]) -> Self {
        let key = master.key();
        let master_salt = master.salt();

        let mut keys = Self {
            cipher_key: [0u8; 16],
            auth_key: [0u8; 20],
            salt: [0u8; 14],
        };
        prf_derive(&key, &master_salt, labels[0], &mut keys.cipher_key);
        prf_derive(&key, &master_salt, labels[1], &mut keys.auth_key);
        prf_derive(&key, &master_salt, labels[2], &mut keys.salt);
        keys
    }
}

/// PRF for key derivation: AES-128-CM with label and index=0 (RFC 3711, 4.3.1).
///
/// key_derivation_rate = 0, so index DIV key_derivation_rate = 0.
fn prf_derive(master_key: &[u8; 16], master_salt: &[u8; 14], label: u8, output: &mut [u8]) {
    // IV = (master_salt XOR (label at byte 7)) || 0x0000
    let mut iv = [0u8; 16];
    iv[..14].copy_from_slice(master_salt);
    iv[7] ^= label;

    output.fill(0);
    let mut cipher = Aes128Ctr::new(master_key.into(), &iv.into());
    cipher.apply_keystream(output);
}

/// Keys and counters for an installed inbound/outbound policy pair.
#[derive(Clone)]
pub struct SrtpSession {
    suite: CryptoSuite,
    local_keys: SessionKeys,
    remote_keys: SessionKeys,
    local_srtcp_keys: SessionKeys,
    remote_srtcp_keys: SessionKeys,
    /// Rollover counter for outbound packets.
    local_roc: u32,
    /// Rollover counter for inbound packets.
    remote_roc: u32,
    /// Highest sequence number seen inbound.
    remote_highest_seq: u16,
    /// SRTCP index for outbound packets (31-bit).
    local_srtcp_index: u32,
    /// Next expected SRTCP index for inbound packets (31-bit).
    remote_srtcp_index: u32,
}

impl SrtpSession {
    pub fn new(suite: CryptoSuite, local: &MasterKey, remote: &MasterKey) -> Self {
        Self {
            suite,
            local_keys: SessionKeys::srtp(local),
            remote_keys: SessionKeys::srtp(remote),
            local_srtcp_keys: SessionKeys::srtcp(local),
            remote_srtcp_keys: SessionKeys::srtcp(remote),
            local_roc: 0,
            remote_roc: 0,
            remote_highest_seq: 0,
            local_srtcp_index: 0,
            remote_srtcp_index: 0,
        }
    }

    pub fn suite(&self) -> CryptoSuite {
        self.suite
    }

    /// Encrypt an RTP packet.
    ///
    /// Returns: RTP header || encrypted payload || auth tag.
    pub fn protect(&mut self, rtp_packet: &[u8]) -> Result<Vec<u8>> {
        let header_len = rtp::full_header_len(rtp_packet)
            .context("RTP packet too short for SRTP protection")?;
        let tag_len = self.suite.srtp_auth_tag_len();

        let header = &rtp_packet[..header_len];
        let ssrc = rtp::rtp_ssrc(rtp_packet);
        let seq = rtp::sequence_number(rtp_packet);

        let iv = build_iv(&self.local_keys.salt, ssrc, self.local_roc, seq);
        let mut payload = rtp_packet[header_len..].to_vec();
        let mut cipher = Aes128Ctr::new((&self.local_keys.cipher_key).into(), &iv.into());
        cipher.apply_keystream(&mut payload);

        let mut srtp_packet = Vec::with_capacity(header_len + payload.len() + tag_len);
        srtp_packet.extend_from_slice(header);
        srtp_packet.extend_from_slice(&payload);

        // Auth tag over header || encrypted payload || ROC
        let mac = srtp_mac(&self.local_keys.auth_key, &srtp_packet, self.local_roc)?;
        srtp_packet.extend_from_slice(&mac.finalize().into_bytes()[..tag_len]);

        if seq == 0xFFFF {
            self.local_roc = self.local_roc.wrapping_add(1);
        }

        Ok(srtp_packet)
    }

    /// Verify and decrypt an SRTP packet.
    ///
    /// Returns the plain RTP packet (header + payload).
    pub fn unprotect(&mut self, srtp_packet: &[u8]) -> Result<Vec<u8>> {
        let tag_len = self.suite.srtp_auth_tag_len();
        if srtp_packet.len() < rtp::RTP_HEADER_SIZE + tag_len {
            bail!("SRTP packet too short");
        }

        let auth_tag_offset = srtp_packet.len() - tag_len;
        let received_tag = &srtp_packet[auth_tag_offset..];
        let authenticated_portion = &srtp_packet[..auth_tag_offset];

        let seq = rtp::sequence_number(srtp_packet);
        let ssrc = rtp::rtp_ssrc(srtp_packet);
        let estimated_roc = estimate_roc(self.remote_roc, self.remote_highest_seq, seq);

        srtp_mac(&self.remote_keys.auth_key, authenticated_portion, estimated_roc)?
            .verify_truncated_left(received_tag)
            .map_err(|_| anyhow!("SRTP auth tag mismatch"))?;

        let header_len = rtp::full_header_len(authenticated_portion)
            .context("SRTP packet has truncated RTP header")?;

        let iv = build_iv(&self.remote_keys.salt, ssrc, estimated_roc, seq);
        let mut rtp_packet = authenticated_portion.to_vec();
        let mut cipher = Aes128Ctr::new((&self.remote_keys.cipher_key).into(), &iv.into());
        cipher.apply_keystream(&mut rtp_packet[header_len..]);

        if seq > self.remote_highest_seq || estimated_roc > self.remote_roc {
            self.remote_highest_seq = seq;
            self.remote_roc = estimated_roc;
        }

        Ok(rtp_packet)
    }

    /// Encrypt an RTCP packet (RFC 3711 §3.4).
    ///
    /// Returns: `rtcp_header(8) || encrypted_payload || E||index(4) || auth_tag(10)`.
    pub fn protect_rtcp(&mut self, rtcp_packet: &[u8]) -> Result<Vec<u8>> {
        if rtcp_packet.len() < rtp::RTCP_HEADER_SIZE {
            bail!("RTCP packet too short for SRTCP protection");
        }
        let tag_len = self.suite.srtcp_auth_tag_len();

        let header = &rtcp_packet[..rtp::RTCP_HEADER_SIZE];
        let ssrc = rtp::rtcp_ssrc(rtcp_packet);
        let index = self.local_srtcp_index;

        let iv = build_srtcp_iv(&self.local_srtcp_keys.salt, ssrc, index);
        let mut payload = rtcp_packet[rtp::RTCP_HEADER_SIZE..].to_vec();
        if !payload.is_empty() {
            let mut cipher = Aes128Ctr::new((&self.local_srtcp_keys.cipher_key).into(), &iv.into());
            cipher.apply_keystream(&mut payload);
        }

        // E flag (1) | srtcp_index (31 bits)
        let e_index: u32 = 0x8000_0000 | (index & 0x7FFF_FFFF);

        let mut srtcp =
            Vec::with_capacity(rtcp_packet.len() + SRTCP_INDEX_LEN + tag_len);
        srtcp.extend_from_slice(header);
        srtcp.extend_from_slice(&payload);
        srtcp.extend_from_slice(&e_index.to_be_bytes());

        let mac = srtcp_mac(&self.local_srtcp_keys.auth_key, &srtcp)?;
        srtcp.extend_from_slice(&mac.finalize().into_bytes()[..tag_len]);

        self.local_srtcp_index = index.wrapping_add(1) & 0x7FFF_FFFF;

        Ok(srtcp)
    }

    /// Verify and decrypt an SRTCP packet.
    pub fn unprotect_rtcp(&mut self, srtcp_packet: &[u8]) -> Result<Vec<u8>> {
        let tag_len = self.suite.srtcp_auth_tag_len();
        if srtcp_packet.len() < rtp::RTCP_HEADER_SIZE + SRTCP_INDEX_LEN + tag_len {
            bail!("SRTCP packet too short");
        }

        let auth_tag_offset = srtcp_packet.len() - tag_len;
        let received_tag = &srtcp_packet[auth_tag_offset..];
        let authenticated_portion = &srtcp_packet[..auth_tag_offset];

        srtcp_mac(&self.remote_srtcp_keys.auth_key, authenticated_portion)?
            .verify_truncated_left(received_tag)
            .map_err(|_| anyhow!("SRTCP auth tag mismatch"))?;

        let ei_offset = auth_tag_offset - SRTCP_INDEX_LEN;
        let e_index = u32::from_be_bytes([
            srtcp_packet[ei_offset],
            srtcp_packet[ei_offset + 1],
            srtcp_packet[ei_offset + 2],
            srtcp_packet[ei_offset + 3],
        ]);
        let encrypted = (e_index & 0x8000_0000) != 0;
        let srtcp_index = e_index & 0x7FFF_FFFF;

        let ssrc = rtp::rtcp_ssrc(srtcp_packet);
        let mut rtcp = srtcp_packet[..ei_offset].to_vec();
        if encrypted && rtcp.len() > rtp::RTCP_HEADER_SIZE {
            let iv = build_srtcp_iv(&self.remote_srtcp_keys.salt, ssrc, srtcp_index);
            let mut cipher =
                Aes128Ctr::new((&self.remote_srtcp_keys.cipher_key).into(), &iv.into());
            cipher.apply_keystream(&mut rtcp[rtp::RTCP_HEADER_SIZE..]);
        }

        if srtcp_index >= self.remote_srtcp_index {
            self.remote_srtcp_index = srtcp_index.wrapping_add(1) & 0x7FFF_FFFF;
        }

        Ok(rtcp)
    }
}

/// Build the AES-128-CM IV for SRTP (RFC 3711, 4.1.1).
///
/// IV = (session_salt XOR (SSRC || packet_index)) padded to 16 bytes.
/// Packet index = ROC << 16 | seq.
fn build_iv(salt: &[u8; 14], ssrc: u32, roc: u32, seq: u16) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[4..8].copy_from_slice(&ssrc.to_be_bytes());
    iv[8..12].copy_from_slice(&roc.to_be_bytes());
    iv[12..14].copy_from_slice(&seq.to_be_bytes());
    for (b, s) in iv.iter_mut().zip(salt) {
        *b ^= s;
    }
    iv
}

/// Build the AES-128-CM IV for SRTCP.
///
/// The SRTCP index sits right-aligned in the 48-bit packet index field.
fn build_srtcp_iv(salt: &[u8; 14], ssrc: u32, srtcp_index: u32) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[4..8].copy_from_slice(&ssrc.to_be_bytes());
    iv[10..14].copy_from_slice(&srtcp_index.to_be_bytes());
    for (b, s) in iv.iter_mut().zip(salt) {
        *b ^= s;
    }
    iv
}

/// HMAC-SHA1 over authenticated_portion || ROC.
fn srtp_mac(auth_key: &[u8; 20], authenticated_portion: &[u8], roc: u32) -> Result<HmacSha1> {
    let mut mac = srtcp_mac(auth_key, authenticated_portion)?;
    mac.update(&roc.to_be_bytes());
    Ok(mac)
}

/// HMAC-SHA1 over authenticated_portion (no ROC, unlike SRTP).
fn srtcp_mac(auth_key: &[u8; 20], authenticated_portion: &[u8]) -> Result<HmacSha1> {
    let mut mac =
        HmacSha1::new_from_slice(auth_key).map_err(|_| anyhow!("invalid HMAC key length"))?;
    mac.update(authenticated_portion);
    Ok(mac)
}

/// Estimate ROC for incoming packet (RFC 3711, appendix A).
fn estimate_roc(current_roc: u32, highest_seq: u16, received_seq: u16) -> u32 {
    if highest_seq == 0 && current_roc == 0 {
        return 0;
    }

    let diff = (received_seq as i32) - (highest_seq as i32);
    if diff < -0x7FFF {
        // Sequence wrapped forward
        current_roc.wrapping_add(1)
    } else if diff > 0x7FFF {
        // Late packet from previous ROC
        current_roc.wrapping_sub(1)
    } else {
        current_roc
    }
}
