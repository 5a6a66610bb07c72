//! Converts backend payloads into the canonical `RecognitionResult`.
//!
//! Block grouping is flattened away; line order is the backend's reading
//! order and polygon vertices are copied as-is.

use crate::backends::payload::{AnalysisPayload, TextLine};
use crate::engine::{LineResult, RecognitionResult, WordResult};

pub fn normalize(payload: AnalysisPayload) -> RecognitionResult {
    let lines: Vec<LineResult> = match payload {
        AnalysisPayload::Blocks(None) | AnalysisPayload::Lines(None) => {
            return RecognitionResult::no_text();
        }
        AnalysisPayload::Blocks(Some(blocks)) => blocks
            .into_iter()
            .flat_map(|block| block.lines)
            .map(convert_line)
            .collect(),
        AnalysisPayload::Lines(Some(lines)) => lines.into_iter().map(convert_line).collect(),
    };

    RecognitionResult::from_lines(lines)
}

fn convert_line(line: TextLine) -> LineResult {
    let words = line
        .words
        .unwrap_or_default()
        .into_iter()
        .map(|word| WordResult {
            text: word.text,
            confidence: word.confidence,
        })
        .collect();

    LineResult {
        text: line.text,
        bounding_polygon: line.bounding_polygon.0,
        words,
    }
}
