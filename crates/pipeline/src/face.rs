//! Face engine seam and its HTTP sidecar client.
//!
//! Detection and swapping run in a separate inference service that keeps
//! its models loaded; this crate only exchanges file paths and opaque face
//! descriptors with it.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A detected face.
///
/// Only `bbox` and `score` are interpreted here; everything else the
/// engine returns (landmarks, embeddings) is kept in `attributes` and sent
/// back verbatim on swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    /// Bounding box `[x1, y1, x2, y2]` in pixels.
    pub bbox: [f32; 4],
    /// Detector confidence.
    #[serde(default)]
    pub score: f32,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Errors from the face engine layer.
#[derive(Debug, thiserror::Error)]
pub enum FaceEngineError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("face engine error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// The engine could not read or write an image.
    #[error("image error: {0}")]
    Image(String),
}

/// Face detection and per-frame swap capability.
#[async_trait]
pub trait FaceEngine: Send + Sync {
    /// Detect faces in the image at `image`, in the engine's native order.
    async fn detect(&self, image: &Path) -> Result<Vec<Face>, FaceEngineError>;

    /// Replace `source_face` in `frame` with `target_face`, writing the
    /// result to `output` (which may equal `frame`).
    async fn swap(
        &self,
        frame: &Path,
        source_face: &Face,
        target_face: &Face,
        output: &Path,
    ) -> Result<(), FaceEngineError>;
}

/// Pick the face to work with from a detection result.
///
/// The policy is the first face in the detector's native order, with no
/// ranking by size or score.
pub fn select_primary_face(faces: Vec<Face>) -> Option<Face> {
    faces.into_iter().next()
}

// ---------------------------------------------------------------------------
// HTTP sidecar client
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DetectResponse {
    faces: Vec<Face>,
}

/// Face engine reached over HTTP.
///
/// ```text
/// POST {base}/detect  {"image_path"}                                   -> {"faces": [...]}
/// POST {base}/swap    {"frame_path", "source_face", "target_face",
///                      "output_path"}                                  -> 2xx
/// ```
pub struct HttpFaceEngine {
    client: reqwest::Client,
    api_url: String,
}

impl HttpFaceEngine {
    /// * `api_url` - Base HTTP URL, e.g. `http://127.0.0.1:7860`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, FaceEngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            return Err(FaceEngineError::Image(body));
        }
        Err(FaceEngineError::ApiError {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl FaceEngine for HttpFaceEngine {
    async fn detect(&self, image: &Path) -> Result<Vec<Face>, FaceEngineError> {
        let body = serde_json::json!({
            "image_path": image.to_string_lossy(),
        });

        let response = self
            .client
            .post(format!("{}/detect", self.api_url))
            .json(&body)
            .send()
            .await?;

        let parsed: DetectResponse = Self::check_status(response).await?.json().await?;
        Ok(parsed.faces)
    }

    async fn swap(
        &self,
        frame: &Path,
        source_face: &Face,
        target_face: &Face,
        output: &Path,
    ) -> Result<(), FaceEngineError> {
        let body = serde_json::json!({
            "frame_path": frame.to_string_lossy(),
            "source_face": source_face,
            "target_face": target_face,
            "output_path": output.to_string_lossy(),
        });

        let response = self
            .client
            .post(format!("{}/swap", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32) -> Face {
        Face {
            bbox: [x, 0.0, x + 10.0, 10.0],
            score: 0.5,
            attributes: Default::default(),
        }
    }

    #[test]
    fn primary_face_is_first_in_detector_order() {
        // Second face has the higher score and the larger box; order wins.
        let mut big = face(100.0);
        big.score = 0.99;
        big.bbox[2] = 400.0;
        let picked = select_primary_face(vec![face(1.0), big]).unwrap();
        assert_eq!(picked.bbox[0], 1.0);
    }

    #[test]
    fn no_faces_selects_nothing() {
        assert!(select_primary_face(Vec::new()).is_none());
    }

    #[test]
    fn unknown_attributes_round_trip() {
        let json = r#"{"bbox":[1,2,3,4],"score":0.9,"kps":[[1,1],[2,2]],"embedding":[0.1]}"#;
        let parsed: Face = serde_json::from_str(json).unwrap();
        assert!(parsed.attributes.contains_key("kps"));
        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back["embedding"][0], 0.1);
    }
}
