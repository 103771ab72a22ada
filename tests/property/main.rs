// tests/property/main.rs

mod fingerprint;
mod merge;
