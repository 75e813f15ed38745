//! HTTP-backed implementations of the pipeline's capabilities.
//!
//! [`HttpInference`] talks to the assistant service; [`CloudApiDelivery`]
//! sends through the WhatsApp Cloud API. Both are cheap to clone.

mod delivery;
mod inference;

pub use delivery::{ChannelCredentials, CloudApiDelivery, parse_send_response, send_payload};
pub use inference::{HttpInference, InferenceConfig, parse_reply, request_body};
