//! SDES key negotiation for SRTP media streams.
//!
//! [`sdes`] holds the negotiation core; [`srtp`] is an in-process engine the
//! core can drive; [`config`] loads the command line tool's settings.

pub mod config;
pub mod sdes;
pub mod srtp;
