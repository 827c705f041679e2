//! Codeplug engine, radio-model registry, and programming protocol stack for Motorola business
//! and professional two-way radios.
//!
//! A caller asks the [`model`] registry for a [`model::RadioModel`], gets a default
//! [`codeplug::Codeplug`] (or opens one from the [`container`] file format, or reads one live off
//! a radio via [`program`]), mutates fields through the codeplug's schema-validated setter, runs
//! [`codeplug::Codeplug::validate`], and either saves back to the file container or drives
//! [`program::write_codeplug`] over a [`transport::Transport`]. The `cps` binary (`src/bin/cps.rs`)
//! is one such caller, wiring argument parsing and environment configuration to the same API
//! available to any embedder.
//!
//! Layering, leaves first: [`bits`] (bit-addressed codec) underlies [`field`] (typed field
//! descriptors) and [`node`] (how fields group into a tree), which [`model`] assembles into
//! per-radio schemas that [`codeplug`] interprets against a raw buffer. [`transforms`] is a
//! separate, pure layer UI code uses to present raw field values in human terms. [`container`]
//! persists a codeplug to disk; [`transport`], [`xnl`], and [`xcmp`] carry one to and from a radio,
//! orchestrated by [`program`]. [`discovery`] finds radios to connect to. [`error`] is the error
//! type every fallible operation in this crate returns.

pub mod bits;
pub mod codeplug;
pub mod container;
pub mod discovery;
pub mod error;
pub mod field;
pub mod model;
pub mod node;
pub mod program;
pub mod transforms;
pub mod transport;
pub mod xcmp;
pub mod xnl;

pub use self::codeplug::Codeplug;
pub use self::error::Error;
pub use self::model::RadioModel;
