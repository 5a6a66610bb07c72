//! Wire shapes shared by the recognition backends.
//!
//! Both APIs describe a line the same way apart from the polygon encoding
//! (`boundingPolygon: [{x, y}]` versus `boundingBox: [x1, y1, x2, y2, ...]`),
//! so one set of types covers them. Polygons are converted to points while
//! parsing; nothing downstream re-orders or drops vertices.

use crate::engine::Point;
use serde::Deserialize;

/// Terminal analysis content in one of the shapes the backends produce.
///
/// `None` means the backend did not return a text region collection at all.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisPayload {
    /// Lines grouped into blocks
    Blocks(Option<Vec<TextBlock>>),
    /// Lines of a single page, ungrouped
    Lines(Option<Vec<TextLine>>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextBlock {
    #[serde(default)]
    pub lines: Vec<TextLine>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextLine {
    pub text: String,
    #[serde(alias = "boundingBox")]
    pub bounding_polygon: Polygon,
    pub words: Option<Vec<TextWord>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextWord {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "PolygonRepr")]
pub struct Polygon(pub Vec<Point>);

#[derive(Deserialize)]
#[serde(untagged)]
enum PolygonRepr {
    Points(Vec<Point>),
    Flat(Vec<f32>),
}

impl TryFrom<PolygonRepr> for Polygon {
    type Error = String;

    fn try_from(repr: PolygonRepr) -> Result<Self, Self::Error> {
        match repr {
            PolygonRepr::Points(points) => Ok(Self(points)),
            PolygonRepr::Flat(coords) => {
                if coords.len() % 2 != 0 {
                    return Err(format!(
                        "flat bounding box has an odd number of coordinates ({})",
                        coords.len()
                    ));
                }
                Ok(Self(
                    coords
                        .chunks_exact(2)
                        .map(|pair| Point::new(pair[0], pair[1]))
                        .collect(),
                ))
            }
        }
    }
}

/// Error envelope returned by the backend on non-2xx responses
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
