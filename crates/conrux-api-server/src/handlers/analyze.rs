use crate::models::chat::{ApiResponse, DocumentAnalysis, ImageAnalysis};
use crate::pipeline::context::round_ms;
use crate::services::model_client::ImageInput;
use crate::state::AppState;
use crate::utils::error::ApiError;
use axum::{
    extract::{Multipart, State},
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const DEFAULT_IMAGE_PROMPT: &str = "Describe this image in detail.";
const DEFAULT_DOCUMENT_QUERY: &str = "Summarize this document.";

const IMAGE_SYSTEM_INSTRUCTION: &str = "You are an expert image analyst powered by Gemini 2.0 Flash. \
Provide detailed, accurate, and insightful analysis of the provided image. \
Be descriptive about objects, colors, composition, context, and any text visible.";

const DOCUMENT_SYSTEM_INSTRUCTION: &str = "You are an expert document analyst powered by Gemini 2.0 Flash. \
Analyze the provided document content thoroughly and answer the user's query with precision. \
Extract key information, provide structured insights, and reference specific sections when relevant.";

/// A multipart upload: the `file` part plus any text fields
struct UploadForm {
    filename: String,
    data: Vec<u8>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    async fn parse(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut filename: Option<String> = None;
        let mut data: Option<Vec<u8>> = None;
        let mut fields = HashMap::new();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))?
        {
            let field_name = field.name().unwrap_or("").to_string();
            match field_name.as_str() {
                "file" => {
                    filename = field.file_name().map(|s| s.to_string());
                    data = Some(
                        field
                            .bytes()
                            .await
                            .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {}", e)))?
                            .to_vec(),
                    );
                }
                "" => {}
                _ => {
                    let text = field.text().await.map_err(|e| {
                        ApiError::BadRequest(format!("Invalid {}: {}", field_name, e))
                    })?;
                    fields.insert(field_name, text);
                }
            }
        }

        let data = data.ok_or_else(|| ApiError::BadRequest("file required".to_string()))?;
        let filename =
            filename.ok_or_else(|| ApiError::BadRequest("filename required".to_string()))?;

        Ok(Self {
            filename,
            data,
            fields,
        })
    }

    /// Lowercased extension, empty when the name has none
    fn extension(&self) -> String {
        self.filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default()
    }

    fn field_or(&self, name: &str, default: &str) -> String {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .unwrap_or(default)
            .to_string()
    }

    fn session_id(&self) -> String {
        self.fields
            .get("session_id")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    fn size_kb(&self) -> f64 {
        (self.data.len() as f64 / 1024.0 * 100.0).round() / 100.0
    }
}

fn ensure_size(state: &AppState, form: &UploadForm) -> Result<(), ApiError> {
    if form.data.len() > state.settings.max_upload_bytes() {
        return Err(ApiError::PayloadTooLarge(format!(
            "File exceeds {}MB limit.",
            state.settings.server.max_upload_mb
        )));
    }
    Ok(())
}

fn ensure_format(ext: &str, supported: &[String], kind: &str) -> Result<(), ApiError> {
    if !supported.iter().any(|s| s.eq_ignore_ascii_case(ext)) {
        return Err(ApiError::UnsupportedMediaType(format!(
            "Unsupported {} format: {}. Supported: {}",
            kind,
            ext,
            supported.join(", ")
        )));
    }
    Ok(())
}

pub async fn analyze_image_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<ImageAnalysis>>, ApiError> {
    let start = Instant::now();
    let form = UploadForm::parse(multipart).await?;
    let ext = form.extension();

    ensure_format(&ext, &state.settings.files.image_formats, "image")?;
    ensure_size(&state, &form)?;

    let session_id = form.session_id();
    let prompt = form.field_or("prompt", DEFAULT_IMAGE_PROMPT);
    info!(
        "Image analysis request: session={}, file={}, size={}B",
        session_id,
        form.filename,
        form.data.len()
    );

    let image = ImageInput {
        mime_type: mime_guess::from_ext(&ext).first_or_octet_stream().to_string(),
        data: form.data.clone(),
    };
    let analysis = state
        .model_client
        .analyze_image(&image, &prompt, Some(IMAGE_SYSTEM_INSTRUCTION))
        .await?;

    Ok(Json(ApiResponse::success(ImageAnalysis {
        fallback: analysis.is_fallback(),
        analysis: analysis.into_text(),
        session_id,
        file_size_kb: form.size_kb(),
        filename: form.filename,
        model: state.model_client.vision_model().to_string(),
        latency_ms: round_ms(start.elapsed().as_secs_f64() * 1000.0),
    })))
}

pub async fn analyze_document_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<DocumentAnalysis>>, ApiError> {
    let start = Instant::now();
    let form = UploadForm::parse(multipart).await?;
    let ext = form.extension();

    ensure_size(&state, &form)?;
    ensure_format(&ext, &state.settings.files.text_formats, "document")?;

    let session_id = form.session_id();
    let query = form.field_or("query", DEFAULT_DOCUMENT_QUERY);
    info!(
        "Document analysis request: session={}, file={}, size={}B",
        session_id,
        form.filename,
        form.data.len()
    );

    let content = state.extractor.extract(&form.data, &ext)?;
    debug!("Extracted {} characters from {}", content.chars().count(), form.filename);

    let analysis = state
        .model_client
        .analyze_document(&content, &query, &ext, Some(DOCUMENT_SYSTEM_INSTRUCTION))
        .await?;

    Ok(Json(ApiResponse::success(DocumentAnalysis {
        fallback: analysis.is_fallback(),
        analysis: analysis.into_text(),
        session_id,
        file_size_kb: form.size_kb(),
        file_type: ext.to_uppercase(),
        filename: form.filename,
        model: state.model_client.text_model().to_string(),
        latency_ms: round_ms(start.elapsed().as_secs_f64() * 1000.0),
    })))
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::{body_json, test_app, text_response};
    use crate::services::gemini::MockGenerativeBackend;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    const BOUNDARY: &str = "conrux-test-boundary";

    fn multipart(uri: &str, filename: &str, data: &[u8], fields: &[(&str, &str)]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_image_analysis_sends_inline_image() {
        let mut mock = MockGenerativeBackend::new();
        mock.expect_generate_content()
            .withf(|_, req| {
                let parts = &req.contents[0].parts;
                parts[0].text.as_deref() == Some("What is this?")
                    && parts[1].inline_data.as_ref().map(|d| d.mime_type.as_str())
                        == Some("image/png")
            })
            .times(1)
            .returning(|_, _| Ok(text_response("A red square.")));
        let (app, _) = test_app(mock);

        let response = app
            .oneshot(multipart(
                "/api/v1/analyze/image",
                "square.PNG",
                &[0x89, b'P', b'N', b'G'],
                &[("prompt", "What is this?"), ("session_id", "img-1")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["analysis"], "A red square.");
        assert_eq!(body["data"]["session_id"], "img-1");
        assert_eq!(body["data"]["fallback"], false);
    }

    #[tokio::test]
    async fn test_image_unsupported_extension_is_415() {
        let (app, _) = test_app(MockGenerativeBackend::new());
        let response = app
            .oneshot(multipart("/api/v1/analyze/image", "notes.txt", b"hi", &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_413() {
        let (app, state) = test_app(MockGenerativeBackend::new());
        let data = vec![b'a'; state.settings.max_upload_bytes() + 1];
        let response = app
            .oneshot(multipart("/api/v1/analyze/document", "big.txt", &data, &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_document_analysis_uses_extracted_text() {
        let mut mock = MockGenerativeBackend::new();
        mock.expect_generate_content()
            .withf(|_, req| {
                let prompt = req.contents[0].parts[0].text.clone().unwrap_or_default();
                prompt.starts_with("Document Type: CSV")
                    && prompt.contains("name,age")
                    && prompt.contains("User Query: Summarize this document.")
            })
            .times(1)
            .returning(|_, _| Ok(text_response("Two columns.")));
        let (app, _) = test_app(mock);

        let response = app
            .oneshot(multipart(
                "/api/v1/analyze/document",
                "people.csv",
                b"name,age\nada,36",
                &[],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["analysis"], "Two columns.");
        assert_eq!(body["data"]["file_type"], "CSV");
    }

    #[tokio::test]
    async fn test_document_extraction_failure_is_422() {
        let (app, _) = test_app(MockGenerativeBackend::new());
        let response = app
            .oneshot(multipart("/api/v1/analyze/document", "report.pdf", b"%PDF-1.7", &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
