//! AWS Textract cloud adapter.
//!
//! Sends the prepared image to `DetectDocumentText` and assembles the LINE
//! blocks into plain text. Credentials and region come from process
//! configuration through the standard AWS chain; nothing auth-related is ever
//! read from the request or echoed into a response message.

use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_textract::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_textract::operation::detect_document_text::DetectDocumentTextError;
use aws_sdk_textract::primitives::Blob;
use aws_sdk_textract::types::{Block, BlockType, Document};
use tracing::{debug, info, warn};

use super::{encode_png, BackendKind, Extracted, OcrBackend};
use crate::config::Settings;
use crate::error::DispatchError;
use crate::validator::DecodedImage;

pub struct TextractBackend {
    client: aws_sdk_textract::Client,
    credentials_hint: bool,
}

impl TextractBackend {
    /// Build the shared AWS config and Textract client. Region precedence:
    /// explicit setting, then the ambient provider chain, then us-east-1.
    pub async fn from_settings(settings: &Settings) -> Self {
        let region_provider = aws_config::meta::region::RegionProviderChain::first_try(
            settings.aws_region.clone().map(Region::new),
        )
        .or_default_provider()
        .or_else(Region::new("us-east-1"));

        let mut loader = aws_config::from_env().region(region_provider);
        if let Some(endpoint) = &settings.textract_endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let shared_config = loader.load().await;

        // Startup hint only; call-time errors are authoritative. Profiles and
        // instance roles still work even when this is false.
        let credentials_hint = std::env::var("AWS_ACCESS_KEY_ID").is_ok()
            && std::env::var("AWS_SECRET_ACCESS_KEY").is_ok();
        if credentials_hint {
            info!(region = ?shared_config.region(), "textract client ready");
        } else {
            warn!(
                region = ?shared_config.region(),
                "no AWS access keys in the environment, cloud recognition may fail until credentials are configured"
            );
        }

        Self {
            client: aws_sdk_textract::Client::new(&shared_config),
            credentials_hint,
        }
    }
}

#[async_trait]
impl OcrBackend for TextractBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cloud
    }

    fn is_available(&self) -> bool {
        self.credentials_hint
    }

    async fn extract_text(&self, image: &DecodedImage) -> Result<Extracted, DispatchError> {
        let png = encode_png(image).await?;
        debug!(bytes = png.len(), "sending document to textract");

        let output = self
            .client
            .detect_document_text()
            .document(Document::builder().bytes(Blob::new(png)).build())
            .send()
            .await
            .map_err(|err| {
                warn!(error = ?err, "textract call failed");
                classify_sdk_error(err)
            })?;

        Ok(assemble_lines(output.blocks()))
    }
}

/// Join the LINE blocks into the recognized text, averaging their reported
/// confidences.
fn assemble_lines(blocks: &[Block]) -> Extracted {
    let mut lines: Vec<&str> = Vec::new();
    let mut confidences: Vec<f32> = Vec::new();

    for block in blocks {
        if block.block_type() != Some(&BlockType::Line) {
            continue;
        }
        if let Some(text) = block.text() {
            lines.push(text);
        }
        if let Some(confidence) = block.confidence() {
            confidences.push(confidence);
        }
    }

    let text = lines.join("\n").trim().to_string();
    let confidence = if confidences.is_empty() {
        None
    } else {
        Some(confidences.iter().sum::<f32>() / confidences.len() as f32)
    };

    Extracted { text, confidence }
}

/// Map an SDK failure into the taxonomy: transport problems are network
/// failures, credential rejections are auth failures, throttling is quota,
/// and anything else is internal with the SDK error as the cause.
fn classify_sdk_error<R>(err: SdkError<DetectDocumentTextError, R>) -> DispatchError
where
    R: std::fmt::Debug + Send + Sync + 'static,
{
    match err {
        SdkError::TimeoutError(_) => {
            DispatchError::NetworkFailure("timed out talking to the cloud recognition service".into())
        }
        SdkError::DispatchFailure(_) => {
            DispatchError::NetworkFailure("could not reach the cloud recognition service".into())
        }
        SdkError::ServiceError(ctx) => classify_service_error(ctx.err()),
        other => DispatchError::internal_with("unexpected cloud recognition failure", other),
    }
}

/// Credential and throttle rejections that Textract's model leaves unmodeled
/// arrive as generic errors; they are recognized by their error code.
const AUTH_ERROR_CODES: [&str; 5] = [
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "ExpiredTokenException",
    "MissingAuthenticationTokenException",
    "IncompleteSignatureException",
];

const QUOTA_ERROR_CODES: [&str; 2] = ["TooManyRequestsException", "LimitExceededException"];

fn classify_service_error(err: &DetectDocumentTextError) -> DispatchError {
    match err {
        DetectDocumentTextError::AccessDeniedException(_) => {
            DispatchError::AuthFailure("cloud recognition service rejected the configured credentials".into())
        }
        DetectDocumentTextError::ThrottlingException(_)
        | DetectDocumentTextError::ProvisionedThroughputExceededException(_) => {
            DispatchError::QuotaExceeded("cloud recognition service is throttling requests".into())
        }
        other => match other.code() {
            Some(code) if AUTH_ERROR_CODES.contains(&code) => DispatchError::AuthFailure(
                "cloud recognition service rejected the configured credentials".into(),
            ),
            Some(code) if QUOTA_ERROR_CODES.contains(&code) => DispatchError::QuotaExceeded(
                "cloud recognition service is throttling requests".into(),
            ),
            _ => DispatchError::internal_with(
                "cloud recognition service returned an unexpected error",
                format!("{:?}", other),
            ),
        },
    }
}
