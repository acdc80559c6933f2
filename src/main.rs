//! sdes-srtp - SDES key negotiation for SRTP
//!
//! Generates `a=crypto` offers and processes answers from the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sdes_srtp::config::Config;
use sdes_srtp::sdes::{self, Acceptance, CryptoContext, EngineHandle, Negotiator};
use sdes_srtp::srtp::{rtp, SoftwareSrtp, SrtpStream};

#[derive(Parser)]
#[command(name = "sdes-srtp")]
#[command(about = "SDES (RFC 4568) key negotiation for SRTP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a fresh key and print its a=crypto offer line
    Offer,

    /// Parse an a=crypto attribute and show its key parameters
    Inspect {
        /// Attribute text, with or without the `a=crypto:` prefix
        line: String,
    },

    /// Accept an a=crypto answer against a fresh local stream
    Negotiate {
        /// Remote answer, with or without the `a=crypto:` prefix
        line: String,
    },

    /// Negotiate two local endpoints and exchange a protected packet
    Loopback,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Initialize logging
    let filter = if cli.verbose {
        "debug".to_string()
    } else {
        config.log_filter.clone().unwrap_or_else(|| "info".to_string())
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let negotiator = Negotiator::new(EngineHandle::registered(SoftwareSrtp));

    match cli.command {
        Commands::Offer => {
            let mut ctx = new_context(&negotiator, &config)?;
            print!("{}", negotiator.render_offer(&mut ctx)?);
        }
        Commands::Inspect { line } => {
            inspect(&line)?;
        }
        Commands::Negotiate { line } => {
            negotiate(&negotiator, &config, &line)?;
        }
        Commands::Loopback => {
            loopback(&negotiator, &config)?;
        }
    }

    Ok(())
}

fn new_context(negotiator: &Negotiator<SoftwareSrtp>, config: &Config) -> Result<CryptoContext> {
    let mut ctx = negotiator
        .setup()
        .context("Failed to set up crypto context")?;
    if let Some(suite) = config.offer_suite()? {
        ctx.prefer_suite(suite);
    }
    Ok(ctx)
}

fn new_stream(config: &Config) -> Result<SrtpStream> {
    match config.local_ssrc {
        Some(ssrc) => Ok(SrtpStream::new(ssrc)),
        None => SrtpStream::with_random_ssrc(),
    }
}

fn inspect(line: &str) -> Result<()> {
    let attr = sdes::parse_attribute(line).context("Attribute rejected")?;
    println!("tag:   {}", attr.tag);
    println!("suite: {}", attr.suite);
    for (i, param) in attr.key_params.iter().enumerate() {
        let marker = if param.is_usable() { "*" } else { " " };
        println!(
            "{} [{}] method={} key={} lifetime={} mki={}",
            marker,
            i,
            param.method,
            param.key_salt.unwrap_or("-"),
            param
                .lifetime
                .map(|l| match l.packets {
                    Some(n) => format!("{} ({} packets)", l.raw, n),
                    None => l.raw.to_string(),
                })
                .unwrap_or_else(|| "-".to_string()),
            param.mki.unwrap_or("-"),
        );
    }

    let answer = sdes::parse_answer(line).context("Key parameter rejected")?;
    println!("key:   {} bytes, accepted", answer.remote_key.as_bytes().len());
    Ok(())
}

fn negotiate(negotiator: &Negotiator<SoftwareSrtp>, config: &Config, line: &str) -> Result<()> {
    let mut ctx = new_context(negotiator, config)?;
    let mut stream = new_stream(config)?;

    match negotiator.accept_answer(&mut ctx, line, &mut stream)? {
        Acceptance::Activated { suite, tag } => {
            println!(
                "Accepted tag {} with {} on stream {:08x}",
                tag,
                suite,
                stream.ssrc()
            );
        }
        Acceptance::Unchanged => println!("Remote key unchanged"),
    }
    print!("{}", negotiator.render_offer(&mut ctx)?);
    Ok(())
}

fn loopback(negotiator: &Negotiator<SoftwareSrtp>, config: &Config) -> Result<()> {
    let mut alice = new_context(negotiator, config)?;
    let mut bob = new_context(negotiator, config)?;
    let mut alice_stream = SrtpStream::with_random_ssrc()?;
    let mut bob_stream = SrtpStream::with_random_ssrc()?;

    let alice_offer = negotiator.render_offer(&mut alice)?.to_string();
    tracing::info!("Alice offers {}", alice_offer.trim_end());

    negotiator
        .accept_answer(&mut bob, &alice_offer, &mut bob_stream)
        .context("Bob rejected Alice's offer")?;
    let bob_answer = negotiator.render_offer(&mut bob)?.to_string();
    tracing::info!("Bob answers {}", bob_answer.trim_end());

    negotiator
        .accept_answer(&mut alice, &bob_answer, &mut alice_stream)
        .context("Alice rejected Bob's answer")?;

    let packet = rtp::encode(0, 1, 160, alice_stream.ssrc(), b"loopback payload");
    let protected = alice_stream.protect(&packet)?;
    let recovered = bob_stream.unprotect(&protected)?;
    anyhow::ensure!(recovered == packet, "Decrypted packet differs from original");

    println!(
        "Protected {} byte RTP packet into {} bytes with {}; Bob recovered it",
        packet.len(),
        protected.len(),
        alice_stream.suite().map(|s| s.as_str()).unwrap_or("-")
    );
    Ok(())
}
