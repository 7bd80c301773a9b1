//! Wire format spoken with the recognition worker.
//!
//! One JSON object per line in each direction. Requests carry the crop as a
//! base64 PNG and a hint telling the worker what kind of text to expect.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RecognitionError;
use crate::regions::RegionKey;

/// What kind of text a crop contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecognitionHint {
    /// A percentage with four decimals.
    Exp,
    /// "Name Lv N".
    #[serde(rename = "namelevel")]
    NameLevel,
    Lvl,
    Lauftext,
    EnemyName,
    EnemyHp,
}

impl RecognitionHint {
    /// The hint used when sampling a given field.
    pub fn for_key(key: RegionKey) -> Self {
        match key {
            RegionKey::Exp | RegionKey::RmExp => Self::Exp,
            RegionKey::Charname => Self::NameLevel,
            RegionKey::Lvl => Self::Lvl,
            RegionKey::Lauftext => Self::Lauftext,
            RegionKey::EnemyName => Self::EnemyName,
            RegionKey::EnemyHp => Self::EnemyHp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrRequest {
    pub id: u64,
    pub png_b64: String,
    pub kind: RecognitionHint,
}

impl OcrRequest {
    pub fn new(id: u64, png: &[u8], kind: RecognitionHint) -> Self {
        Self {
            id,
            png_b64: STANDARD.encode(png),
            kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrResponse {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub raw: Option<String>,
    /// Structured value; workers send either a string or a number.
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Result of one recognition call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recognition {
    pub raw: String,
    pub value: Option<String>,
}

impl OcrResponse {
    /// Converts a worker answer into a recognition, or the worker's error.
    pub fn into_recognition(self) -> Result<Recognition, RecognitionError> {
        if !self.ok {
            return Err(RecognitionError::Worker(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        let value = match self.value {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Ok(Recognition {
            raw: self.raw.unwrap_or_default(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let req = OcrRequest::new(3, b"png", RecognitionHint::NameLevel);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["png_b64"], "cG5n");
        assert_eq!(json["kind"], "namelevel");
    }

    #[test]
    fn test_hint_names() {
        let names: Vec<String> = [
            RecognitionHint::Exp,
            RecognitionHint::Lvl,
            RecognitionHint::EnemyName,
            RecognitionHint::EnemyHp,
        ]
        .iter()
        .map(|h| serde_json::to_value(h).unwrap().as_str().unwrap().to_string())
        .collect();
        assert_eq!(names, vec!["exp", "lvl", "enemyName", "enemyHp"]);
    }

    #[test]
    fn test_response_value_forms() {
        let r: OcrResponse =
            serde_json::from_str(r#"{"id":1,"ok":true,"raw":"75.0000%","value":"75.0000"}"#)
                .unwrap();
        assert_eq!(r.into_recognition().unwrap().value.as_deref(), Some("75.0000"));

        let r: OcrResponse = serde_json::from_str(r#"{"id":1,"ok":true,"value":12}"#).unwrap();
        let rec = r.into_recognition().unwrap();
        assert_eq!(rec.raw, "");
        assert_eq!(rec.value.as_deref(), Some("12"));
    }

    #[test]
    fn test_response_error() {
        let r: OcrResponse =
            serde_json::from_str(r#"{"id":1,"ok":false,"error":"bad image"}"#).unwrap();
        assert!(matches!(
            r.into_recognition(),
            Err(RecognitionError::Worker(msg)) if msg == "bad image"
        ));
    }

    #[test]
    fn test_support_field_uses_percentage_hint() {
        assert_eq!(RecognitionHint::for_key(RegionKey::RmExp), RecognitionHint::Exp);
        assert_eq!(
            RecognitionHint::for_key(RegionKey::Charname),
            RecognitionHint::NameLevel
        );
    }
}
