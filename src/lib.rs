//! OCR gateway for remote text recognition backends.
//!
//! An image (URL or bytes) is submitted to the configured backend, a deferred
//! job is polled to completion when the backend works that way, the result is
//! normalized into [`engine::RecognitionResult`], and the detected line
//! polygons can be drawn onto the image and stored as a PNG.

pub mod annotation;
pub mod backends;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod normalizer;
pub mod ocr;
pub mod poller;
pub mod server;
pub mod store;
