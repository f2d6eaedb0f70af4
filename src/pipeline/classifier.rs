use chrono::Utc;
use futures::future::BoxFuture;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Cursor;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::timeout::error::Elapsed;
use tower::util::BoxCloneService;
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};
use tracing::debug;

use crate::common::{
    FailureReason, LandmarkSet, Observation, Prediction, PredictionOutcome,
};
use crate::config::{Configuration, WireFormat};
use crate::error::{ClassifyError, PipelineError};

#[derive(Serialize)]
struct PredictRequest<'a> {
    landmarks: &'a LandmarkSet,
}

#[derive(Deserialize)]
struct PredictResponse {
    prediction: String,
    confidence: f64,
}

/// Posts observations to `{API_BASE}/predict`.
#[derive(Clone)]
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
    wire_format: WireFormat,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>, wire_format: WireFormat) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
            wire_format,
        })
    }

    pub fn from_config(configuration: &Configuration) -> Result<Self, PipelineError> {
        Self::new(configuration.predict_url(), configuration.wire_format)
    }

    async fn post(
        client: reqwest::Client,
        url: String,
        wire_format: WireFormat,
        observation: Observation,
    ) -> Result<Prediction, ClassifyError> {
        let request = client.post(&url);
        let request = match wire_format {
            WireFormat::Landmarks => request.json(&PredictRequest {
                landmarks: observation.landmarks(),
            }),
            WireFormat::Image => {
                let jpeg = encode_hand_image(&observation)?;
                let part = reqwest::multipart::Part::bytes(jpeg)
                    .file_name("hand.jpg")
                    .mime_str("image/jpeg")?;
                request.multipart(reqwest::multipart::Form::new().part("image", part))
            }
        };
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        debug!(
            "Classification of frame {} answered {} after {}ms",
            observation.frame_sequence(),
            status,
            (Utc::now() - observation.captured_at()).num_milliseconds()
        );
        parse_response(status, &body)
    }
}

impl Service<Observation> for HttpClassifier {
    type Response = Prediction;
    type Error = ClassifyError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, observation: Observation) -> Self::Future {
        let client = self.client.clone();
        let url = self.url.clone();
        let wire_format = self.wire_format;
        Box::pin(Self::post(client, url, wire_format, observation))
    }
}

fn parse_response(status: u16, body: &[u8]) -> Result<Prediction, ClassifyError> {
    if !(200..300).contains(&status) {
        return Err(ClassifyError::Status(status));
    }
    let response: PredictResponse =
        serde_json::from_slice(body).map_err(|e| ClassifyError::Malformed(e.to_string()))?;
    if !response.confidence.is_finite() || !(0.0..=1.0).contains(&response.confidence) {
        return Err(ClassifyError::Malformed(format!(
            "confidence {} outside [0, 1]",
            response.confidence
        )));
    }
    Ok(Prediction {
        label: response.prediction,
        confidence: response.confidence as f32,
    })
}

/// Crops the hand's bounding box out of the source frame as JPEG.
fn encode_hand_image(observation: &Observation) -> Result<Vec<u8>, ClassifyError> {
    let image = observation
        .image()
        .ok_or_else(|| ClassifyError::Encoding("observation carries no frame".to_string()))?;
    let (width, height) = image.dimensions();
    let (x, y, w, h) = observation.landmarks().bounding_box().to_pixels(width, height);
    if w == 0 || h == 0 {
        return Err(ClassifyError::Encoding("hand region is empty".to_string()));
    }
    let crop = image::imageops::crop_imm(&**image, x, y, w, h).to_image();
    let mut jpeg = Vec::new();
    DynamicImage::ImageRgb8(crop)
        .write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)
        .map_err(|e| ClassifyError::Encoding(e.to_string()))?;
    Ok(jpeg)
}

fn failure_reason(err: &BoxError) -> FailureReason {
    let err: &(dyn std::error::Error + Send + Sync + 'static) = err.as_ref();
    if err.is::<Elapsed>() {
        FailureReason::Timeout
    } else if let Some(err) = err.downcast_ref::<ClassifyError>() {
        err.reason()
    } else {
        FailureReason::Network
    }
}

/// Turns observations into typed outcomes. Every error path, the timeout
/// included, resolves to [`PredictionOutcome::Failure`]. No retries.
#[derive(Clone)]
pub struct ClassifierClient {
    service: BoxCloneService<Observation, Prediction, BoxError>,
}

impl ClassifierClient {
    pub fn new<S>(service: S, timeout: Duration) -> Self
    where
        S: Service<Observation, Response = Prediction> + Clone + Send + 'static,
        S::Error: Into<BoxError>,
        S::Future: Send + 'static,
    {
        let service = ServiceBuilder::new().timeout(timeout).service(service);
        Self {
            service: BoxCloneService::new(service),
        }
    }

    pub fn from_config(configuration: &Configuration) -> Result<Self, PipelineError> {
        Ok(Self::new(
            HttpClassifier::from_config(configuration)?,
            configuration.request_timeout(),
        ))
    }

    pub fn classify(
        &self,
        observation: Observation,
    ) -> impl Future<Output = PredictionOutcome> + Send + 'static {
        let service = self.service.clone();
        async move {
            match service.oneshot(observation).await {
                Ok(prediction) => PredictionOutcome::Success(prediction),
                Err(err) => {
                    debug!("Classification error: {}", err);
                    PredictionOutcome::failure(failure_reason(&err))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::landmark::sample_hand;
    use image::{Rgb, RgbImage};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn observation(with_image: bool) -> Observation {
        let image = with_image.then(|| Arc::new(RgbImage::from_pixel(640, 480, Rgb([90, 60, 30]))));
        Observation::new(sample_hand(), 3, Utc::now(), image)
    }

    fn header_end(buf: &[u8]) -> Option<usize> {
        buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
    }

    fn content_length(headers: &str) -> usize {
        headers
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse().ok())
                    .flatten()
            })
            .unwrap_or(0)
    }

    /// Answers a single request and hands back what it received.
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/predict", listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let read = stream.read(&mut chunk).await.unwrap();
                if read == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..read]);
                if let Some(end) = header_end(&buf) {
                    let headers = String::from_utf8_lossy(&buf[..end]).to_string();
                    if buf.len() >= end + content_length(&headers) {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
            String::from_utf8_lossy(&buf).to_string()
        });
        (url, task)
    }

    fn client(url: &str, wire_format: WireFormat) -> ClassifierClient {
        ClassifierClient::new(
            HttpClassifier::new(url, wire_format).unwrap(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn posts_landmarks_and_parses_prediction() {
        let (url, server) = serve_once("200 OK", r#"{"prediction":"A","confidence":0.93}"#).await;
        let outcome = client(&url, WireFormat::Landmarks)
            .classify(observation(false))
            .await;
        assert_eq!(outcome, PredictionOutcome::success("A", 0.93));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /predict "));
        let body = &request[header_end(request.as_bytes()).unwrap()..];
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        let landmarks = json["landmarks"].as_array().unwrap();
        assert_eq!(landmarks.len(), 21);
        let hand = sample_hand();
        for (sent, expected) in landmarks.iter().zip(hand.points()) {
            assert_eq!(sent["x"].as_f64().unwrap() as f32, expected.x);
            assert_eq!(sent["y"].as_f64().unwrap() as f32, expected.y);
            assert_eq!(sent["z"].as_f64().unwrap() as f32, expected.z);
        }
    }

    #[tokio::test]
    async fn server_error_is_a_failure() {
        let (url, _server) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let outcome = client(&url, WireFormat::Landmarks)
            .classify(observation(false))
            .await;
        assert_eq!(outcome, PredictionOutcome::failure(FailureReason::ServerError));
    }

    #[tokio::test]
    async fn bad_request_is_rejected() {
        let (url, _server) = serve_once("400 Bad Request", r#"{"error":"No landmarks provided"}"#).await;
        let outcome = client(&url, WireFormat::Landmarks)
            .classify(observation(false))
            .await;
        assert_eq!(outcome, PredictionOutcome::failure(FailureReason::Rejected));
    }

    #[tokio::test]
    async fn malformed_body_is_a_failure() {
        let (url, _server) = serve_once("200 OK", r#"{"label":"A"}"#).await;
        let outcome = client(&url, WireFormat::Landmarks)
            .classify(observation(false))
            .await;
        assert_eq!(
            outcome,
            PredictionOutcome::failure(FailureReason::MalformedResponse)
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_a_network_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/predict", listener.local_addr().unwrap());
        drop(listener);
        let outcome = client(&url, WireFormat::Landmarks)
            .classify(observation(false))
            .await;
        assert_eq!(outcome, PredictionOutcome::failure(FailureReason::Network));
    }

    #[tokio::test]
    async fn posts_hand_crop_as_multipart() {
        let (url, server) = serve_once("200 OK", r#"{"prediction":"B","confidence":0.5}"#).await;
        let outcome = client(&url, WireFormat::Image)
            .classify(observation(true))
            .await;
        assert_eq!(outcome, PredictionOutcome::success("B", 0.5));
        let request = server.await.unwrap();
        assert!(request.contains("multipart/form-data"));
        assert!(request.contains("name=\"image\""));
        assert!(request.contains("filename=\"hand.jpg\""));
    }

    #[tokio::test]
    async fn image_format_without_frame_fails_locally() {
        let outcome = client("http://127.0.0.1:9/predict", WireFormat::Image)
            .classify(observation(false))
            .await;
        assert_eq!(outcome, PredictionOutcome::failure(FailureReason::Encoding));
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let slow = tower::service_fn(|_obs: Observation| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ClassifyError>(Prediction {
                label: "never".to_string(),
                confidence: 1.0,
            })
        });
        let client = ClassifierClient::new(slow, Duration::from_millis(20));
        let outcome = client.classify(observation(false)).await;
        assert_eq!(outcome, PredictionOutcome::failure(FailureReason::Timeout));
    }

    #[test]
    fn confidence_must_be_a_probability() {
        assert!(matches!(
            parse_response(200, br#"{"prediction":"A","confidence":1.7}"#),
            Err(ClassifyError::Malformed(_))
        ));
        assert!(matches!(
            parse_response(200, br#"{"prediction":3,"confidence":0.4}"#),
            Err(ClassifyError::Malformed(_))
        ));
        assert_eq!(
            parse_response(204, br#"{"prediction":"Y","confidence":0.0}"#).unwrap(),
            Prediction {
                label: "Y".to_string(),
                confidence: 0.0
            }
        );
    }

    #[test]
    fn hand_crop_is_valid_jpeg() {
        let jpeg = encode_hand_image(&observation(true)).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (128, 48));
    }
}
