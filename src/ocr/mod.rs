//! Text recognition through an external worker process.
//!
//! This module provides:
//! - The JSON-lines wire format (`protocol`)
//! - Worker process spawning and transport (`worker`)
//! - The shared, reference-counted gateway used by every sampler (`gateway`)
//! - Parsers turning recognized text into field values (`parse`)

pub mod gateway;
pub mod parse;
pub mod protocol;
pub mod worker;

pub use gateway::OcrGateway;
pub use parse::{
    exp_from_response, fix_ocr_confusions, parse_exp_percent, parse_hp, parse_level,
    parse_name_level, parse_text, NameLevel,
};
pub use protocol::{OcrRequest, OcrResponse, Recognition, RecognitionHint};
pub use worker::{validate_program, ProcessSpawner, WorkerConnection, WorkerSpawner};
