//! inspo - streaming AI visual analysis of images.
//!
//! Sends an image to a vision model (Google Gemini or Volcengine Ark),
//! follows the streamed answer with live progress, and turns it into a
//! structured breakdown: classification, tags, style references, search
//! suggestions and a drawing prompt.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod http_client;
pub mod provider;
pub mod storage;
