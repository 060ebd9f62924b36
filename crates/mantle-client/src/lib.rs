mod client;

pub use client::{Client, ClientError, first_batch};
