//! Storage service client.
//!
//! Speaks the storage REST API (upload links, completion, completion
//! futures, abort) and the raw part uploads against pre-signed URLs, and
//! plugs into the upload engine as a [`partload_upload::StorageTransport`].

pub mod client;

pub use client::{Client, Error};
