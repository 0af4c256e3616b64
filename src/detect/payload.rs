//! Detection service payload decoding.
//!
//! Two response shapes are accepted:
//! - a bare JSON array of records with `bbox: [x1, y1, x2, y2]` corners
//! - an object `{ "predictions": [...] }` whose records carry center-based
//!   `x`, `y`, `width`, `height`
//!
//! Records missing a class, confidence, or box are dropped individually; they
//! never abort the frame.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::detect::result::Detection;
use crate::geometry::BoundingBox;

const CLASS_FIELDS: [&str; 2] = ["class", "label"];
const CONFIDENCE_FIELDS: [&str; 2] = ["confidence", "score"];

/// Native box convention of a detection service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxFormat {
    /// `bbox: [x1, y1, x2, y2]` or `box: { x1, y1, x2, y2 }`.
    Corners,
    /// `x`, `y` (center), `width`, `height`.
    CenterSize,
    /// Decide per record from the fields present.
    #[default]
    Auto,
}

impl BoxFormat {
    pub fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "corners" | "xyxy" => Ok(Self::Corners),
            "center_size" | "xywh" => Ok(Self::CenterSize),
            "auto" => Ok(Self::Auto),
            other => Err(anyhow!(
                "unknown box format '{}'; expected corners, center_size or auto",
                other
            )),
        }
    }
}

/// Decoded service response.
#[derive(Clone, Debug, Default)]
pub struct ParsedPayload {
    pub detections: Vec<Detection>,
    /// Records rejected as malformed.
    pub dropped: usize,
}

/// Decode one detection-service response into canonical detections.
///
/// Fails only when the envelope itself is unusable; bad records are counted in
/// [`ParsedPayload::dropped`].
pub fn parse_detections(payload: &Value, format: BoxFormat) -> Result<ParsedPayload> {
    let records = match payload {
        Value::Array(records) => records,
        Value::Object(obj) => obj
            .get("predictions")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("payload object has no 'predictions' array"))?,
        _ => return Err(anyhow!("payload must be an array or an object")),
    };

    let mut parsed = ParsedPayload::default();
    for (index, record) in records.iter().enumerate() {
        match parse_record(record, format) {
            Ok(detection) => parsed.detections.push(detection),
            Err(err) => {
                log::warn!("dropping detection record #{}: {}", index, err);
                parsed.dropped += 1;
            }
        }
    }
    Ok(parsed)
}

fn parse_record(value: &Value, format: BoxFormat) -> Result<Detection> {
    let obj = value
        .as_object()
        .ok_or_else(|| anyhow!("record must be a JSON object"))?;

    let class = first_field(obj, &CLASS_FIELDS)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|class| !class.is_empty())
        .ok_or_else(|| anyhow!("class must be a non-empty string"))?
        .to_string();

    let confidence = first_field(obj, &CONFIDENCE_FIELDS)
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("confidence must be a number"))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(anyhow!("confidence {} outside [0, 1]", confidence));
    }

    let bbox = match format {
        BoxFormat::Corners => parse_corners(obj)?,
        BoxFormat::CenterSize => parse_center_size(obj)?,
        BoxFormat::Auto => {
            if obj.contains_key("bbox") || obj.contains_key("box") {
                parse_corners(obj)?
            } else {
                parse_center_size(obj)?
            }
        }
    };

    Ok(Detection::new(class, confidence as f32, bbox))
}

fn first_field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| obj.get(*name))
}

fn parse_corners(obj: &Map<String, Value>) -> Result<BoundingBox> {
    if let Some(bbox) = obj.get("bbox") {
        let coords = bbox
            .as_array()
            .ok_or_else(|| anyhow!("bbox must be an array"))?;
        if coords.len() != 4 {
            return Err(anyhow!("bbox must have 4 coordinates, got {}", coords.len()));
        }
        let mut values = [0.0f32; 4];
        for (slot, coord) in values.iter_mut().zip(coords) {
            *slot = coord
                .as_f64()
                .ok_or_else(|| anyhow!("bbox coordinates must be numbers"))? as f32;
        }
        return Ok(BoundingBox::from_corners(
            values[0], values[1], values[2], values[3],
        ));
    }

    let corners = obj
        .get("box")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("missing corner box ('bbox' or 'box')"))?;
    Ok(BoundingBox::from_corners(
        number(corners, "x1")?,
        number(corners, "y1")?,
        number(corners, "x2")?,
        number(corners, "y2")?,
    ))
}

fn parse_center_size(obj: &Map<String, Value>) -> Result<BoundingBox> {
    Ok(BoundingBox::from_center_size(
        number(obj, "x")?,
        number(obj, "y")?,
        number(obj, "width")?,
        number(obj, "height")?,
    ))
}

fn number(obj: &Map<String, Value>, field: &str) -> Result<f32> {
    obj.get(field)
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .ok_or_else(|| anyhow!("{} must be a number", field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_corner_array_response() -> Result<()> {
        let payload = json!([
            {"class": "Coke", "confidence": 0.91, "bbox": [10, 20, 110, 220]},
            {"class": "Ariel", "confidence": 0.7, "bbox": [0.5, 1.5, 2.5, 3.5]}
        ]);
        let parsed = parse_detections(&payload, BoxFormat::Corners)?;
        assert_eq!(parsed.dropped, 0);
        assert_eq!(parsed.detections.len(), 2);
        assert_eq!(parsed.detections[0].class, "Coke");
        assert_eq!(
            parsed.detections[0].bbox,
            BoundingBox::from_corners(10.0, 20.0, 110.0, 220.0)
        );
        Ok(())
    }

    #[test]
    fn converts_center_size_predictions() -> Result<()> {
        let payload = json!({
            "predictions": [
                {"class": "Wai Wai", "confidence": 0.8, "x": 50, "y": 40, "width": 20, "height": 10}
            ]
        });
        let parsed = parse_detections(&payload, BoxFormat::CenterSize)?;
        assert_eq!(
            parsed.detections[0].bbox,
            BoundingBox::from_corners(40.0, 35.0, 60.0, 45.0)
        );
        Ok(())
    }

    #[test]
    fn auto_format_decides_per_record() -> Result<()> {
        let payload = json!([
            {"label": "Coke", "score": 0.9, "box": {"x1": 0, "y1": 0, "x2": 4, "y2": 4}},
            {"class": "Coke", "confidence": 0.9, "x": 2, "y": 2, "width": 4, "height": 4}
        ]);
        let parsed = parse_detections(&payload, BoxFormat::Auto)?;
        assert_eq!(parsed.detections.len(), 2);
        assert_eq!(parsed.detections[0].bbox, parsed.detections[1].bbox);
        Ok(())
    }

    #[test]
    fn malformed_records_are_dropped_not_fatal() -> Result<()> {
        let payload = json!([
            {"confidence": 0.9, "bbox": [0, 0, 1, 1]},
            {"class": "Coke", "bbox": [0, 0, 1, 1]},
            {"class": "Coke", "confidence": 0.9},
            {"class": "Coke", "confidence": 1.7, "bbox": [0, 0, 1, 1]},
            {"class": "Coke", "confidence": 0.9, "bbox": [0, 0, 1]},
            "not an object",
            {"class": "Dettol", "confidence": 0.6, "bbox": [0, 0, 5, 5]}
        ]);
        let parsed = parse_detections(&payload, BoxFormat::Corners)?;
        assert_eq!(parsed.dropped, 6);
        assert_eq!(parsed.detections.len(), 1);
        assert_eq!(parsed.detections[0].class, "Dettol");
        Ok(())
    }

    #[test]
    fn rejects_unusable_envelope() {
        assert!(parse_detections(&json!({"boxes": []}), BoxFormat::Auto).is_err());
        assert!(parse_detections(&json!("nope"), BoxFormat::Auto).is_err());
    }

    #[test]
    fn box_format_names() -> Result<()> {
        assert_eq!(BoxFormat::from_str("xyxy")?, BoxFormat::Corners);
        assert_eq!(BoxFormat::from_str("Center_Size")?, BoxFormat::CenterSize);
        assert!(BoxFormat::from_str("polygon").is_err());
        Ok(())
    }
}
