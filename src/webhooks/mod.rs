//! Webhook boundary concerns: payload signature verification.

mod signature;

pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify_signature,
};
