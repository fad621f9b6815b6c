//! Image and audio generation, editing and analysis.
//!
//! Generation and transcription go through an OpenAI-compatible HTTP API.
//! Editing and analysis are local: raster filters via `image`, PCM WAV edits
//! via `hound`.

use crate::error::HandlerError;
use crate::handler::CapabilityHandler;
use crate::params::{require, MediaParams, ParamRecord};
use crate::registry::OperationGroup;
use async_trait::async_trait;
use base64::Engine;
use deskpilot_core::{Arguments, ToolCallResult};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
const DEFAULT_VOICE: &str = "alloy";

/// Largest width or height accepted by a resize edit.
const MAX_RESIZE_DIMENSION: u32 = 16_384;

/// Voices accepted by the speech endpoint.
pub const SPEECH_VOICES: &[&str] = &[
    "alloy", "ash", "ballad", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer", "verse",
];

#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Where generated images and audio are written.
    pub output_dir: PathBuf,
    pub image_model: String,
    pub speech_model: String,
    pub transcription_model: String,
    pub request_timeout: Duration,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            output_dir: PathBuf::from("."),
            image_model: "dall-e-2".to_string(),
            speech_model: "tts-1".to_string(),
            transcription_model: "whisper-1".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    b64_json: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// One step of an `edit_image` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageEdit {
    Grayscale,
    Blur,
    Sharpen,
    Invert,
    Rotate(u32),
    FlipHorizontal,
    FlipVertical,
    Resize(u32, u32),
}

impl ImageEdit {
    /// Parse "grayscale, rotate 90 and resize 200x100" into edit steps.
    fn parse_instruction(instruction: &str) -> Result<Vec<Self>, HandlerError> {
        let lowered = instruction.to_lowercase().replace(" and ", ",").replace(" then ", ",");
        let mut edits = Vec::new();
        for step in lowered.split([',', ';']).map(str::trim).filter(|s| !s.is_empty()) {
            edits.push(Self::parse_step(step)?);
        }
        if edits.is_empty() {
            return Err(HandlerError::InvalidArgument("instruction is empty".into()));
        }
        Ok(edits)
    }

    fn parse_step(step: &str) -> Result<Self, HandlerError> {
        let number = step
            .split(|c: char| !c.is_ascii_digit() && c != 'x')
            .find(|w| w.chars().next().is_some_and(|c| c.is_ascii_digit()));
        if step.contains("gray") || step.contains("grey") || step.contains("black and white") {
            Ok(Self::Grayscale)
        } else if step.contains("blur") {
            Ok(Self::Blur)
        } else if step.contains("sharpen") {
            Ok(Self::Sharpen)
        } else if step.contains("invert") || step.contains("negative") {
            Ok(Self::Invert)
        } else if step.contains("rotate") {
            let degrees = number.and_then(|n| n.parse().ok()).unwrap_or(90);
            match degrees {
                90 | 180 | 270 => Ok(Self::Rotate(degrees)),
                other => Err(HandlerError::InvalidArgument(format!(
                    "rotation must be 90, 180 or 270 degrees, got {other}"
                ))),
            }
        } else if step.contains("flip") || step.contains("mirror") {
            if step.contains("vertical") || step.contains("upside") {
                Ok(Self::FlipVertical)
            } else {
                Ok(Self::FlipHorizontal)
            }
        } else if step.contains("resize") || step.contains("scale") {
            let dims = number
                .and_then(|n| n.split_once('x'))
                .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)));
            match dims {
                Some((w, h)) if w > MAX_RESIZE_DIMENSION || h > MAX_RESIZE_DIMENSION => {
                    Err(HandlerError::InvalidArgument(format!(
                        "resize dimensions {w}x{h} exceed the {MAX_RESIZE_DIMENSION} pixel limit"
                    )))
                }
                Some((w, h)) if w > 0 && h > 0 => Ok(Self::Resize(w, h)),
                _ => Err(HandlerError::InvalidArgument(
                    "resize needs dimensions like 'resize 640x480'".into(),
                )),
            }
        } else {
            Err(HandlerError::InvalidArgument(format!(
                "unsupported image edit '{step}' (supported: grayscale, blur, sharpen, invert, rotate, flip, resize)"
            )))
        }
    }

    fn apply(self, img: DynamicImage) -> DynamicImage {
        match self {
            Self::Grayscale => img.grayscale(),
            Self::Blur => img.blur(2.0),
            Self::Sharpen => img.unsharpen(1.5, 2),
            Self::Invert => {
                let mut img = img;
                img.invert();
                img
            }
            Self::Rotate(90) => img.rotate90(),
            Self::Rotate(180) => img.rotate180(),
            Self::Rotate(_) => img.rotate270(),
            Self::FlipHorizontal => img.fliph(),
            Self::FlipVertical => img.flipv(),
            Self::Resize(w, h) => img.resize_exact(w, h, FilterType::Lanczos3),
        }
    }
}

/// One step of an `edit_audio` instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
enum AudioEdit {
    Gain(f32),
    Reverse,
    Trim(f32),
}

impl AudioEdit {
    fn parse(instruction: &str) -> Result<Self, HandlerError> {
        let lowered = instruction.trim().to_lowercase();
        if lowered.contains("louder") || lowered.contains("increase volume") {
            Ok(Self::Gain(1.5))
        } else if lowered.contains("quieter") || lowered.contains("decrease volume") {
            Ok(Self::Gain(0.5))
        } else if lowered.contains("reverse") {
            Ok(Self::Reverse)
        } else if lowered.starts_with("trim") {
            let seconds: f32 = lowered
                .split_whitespace()
                .nth(1)
                .map(|s| s.trim_end_matches('s'))
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    HandlerError::InvalidArgument("trim needs a duration like 'trim 5'".into())
                })?;
            if seconds <= 0.0 {
                return Err(HandlerError::InvalidArgument(
                    "trim duration must be positive".into(),
                ));
            }
            Ok(Self::Trim(seconds))
        } else {
            Err(HandlerError::InvalidArgument(format!(
                "unsupported audio edit '{instruction}' (supported: louder, quieter, reverse, trim N)"
            )))
        }
    }

    /// Apply to interleaved samples with `channels` channels.
    fn apply(self, mut samples: Vec<i16>, channels: usize, sample_rate: u32) -> Vec<i16> {
        let channels = channels.max(1);
        match self {
            Self::Gain(factor) => {
                for s in samples.iter_mut() {
                    *s = (*s as f32 * factor).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                }
                samples
            }
            Self::Reverse => samples
                .chunks(channels)
                .rev()
                .flat_map(|frame| frame.iter().copied())
                .collect(),
            Self::Trim(seconds) => {
                let keep = (seconds * sample_rate as f32) as usize * channels;
                samples.truncate(keep);
                samples
            }
        }
    }
}

pub struct MediaHandler {
    client: Client,
    config: MediaConfig,
}

impl MediaHandler {
    pub fn new(config: MediaConfig) -> Result<Self, HandlerError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    fn api_key(&self) -> Option<&str> {
        self.config.api_key.as_deref().filter(|k| !k.is_empty())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn ensure_output_dir(&self) -> Result<(), HandlerError> {
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(HandlerError::io(format!(
                "Error creating {}",
                self.config.output_dir.display()
            )))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, HandlerError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(HandlerError::Failed(format!("{status}: {body}")))
    }

    async fn generate_image(&self, p: MediaParams) -> Result<ToolCallResult, HandlerError> {
        let prompt = require(p.prompt, "prompt")?;
        let size = p.size.unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string());
        let Some(key) = self.api_key() else {
            return Ok(no_api_key());
        };

        let response = self
            .client
            .post(self.endpoint("images/generations"))
            .bearer_auth(key)
            .json(&json!({
                "model": self.config.image_model,
                "prompt": prompt,
                "n": 1,
                "size": size,
                "response_format": "b64_json",
            }))
            .send()
            .await?;
        let parsed: ImageResponse = Self::check(response).await?.json().await?;
        let encoded = parsed
            .data
            .into_iter()
            .find_map(|d| d.b64_json)
            .ok_or_else(|| HandlerError::Failed("image response contained no data".into()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| HandlerError::Failed(format!("invalid image data: {e}")))?;

        self.ensure_output_dir().await?;
        let path = self
            .config
            .output_dir
            .join(format!("generated_{}.png", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(HandlerError::io(format!("Error saving {}", path.display())))?;
        info!("generated image saved to {}", path.display());

        let mut data = Map::new();
        data.insert("path".into(), json!(path.display().to_string()));
        Ok(ToolCallResult::success_with(
            format!("Image generated successfully. Saved to {}", path.display()),
            data,
        ))
    }

    async fn generate_audio(&self, p: MediaParams) -> Result<ToolCallResult, HandlerError> {
        let text = require(p.text, "text")?;
        let voice = p
            .voice
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());
        if !SPEECH_VOICES.contains(&voice.as_str()) {
            return Err(HandlerError::InvalidArgument(format!(
                "unknown voice '{voice}' (expected one of {})",
                SPEECH_VOICES.join(", ")
            )));
        }
        let Some(key) = self.api_key() else {
            return Ok(no_api_key());
        };

        let response = self
            .client
            .post(self.endpoint("audio/speech"))
            .bearer_auth(key)
            .json(&json!({
                "model": self.config.speech_model,
                "voice": voice,
                "input": text,
            }))
            .send()
            .await?;
        let bytes = Self::check(response).await?.bytes().await?;

        self.ensure_output_dir().await?;
        let path = self
            .config
            .output_dir
            .join(format!("generated_audio_{voice}.mp3"));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(HandlerError::io(format!("Error saving {}", path.display())))?;

        let mut data = Map::new();
        data.insert("path".into(), json!(path.display().to_string()));
        Ok(ToolCallResult::success_with(
            format!("Audio generated successfully. Saved to {}", path.display()),
            data,
        ))
    }

    async fn transcribe_audio(&self, p: MediaParams) -> Result<ToolCallResult, HandlerError> {
        let path = PathBuf::from(require(p.path, "path")?);
        let Some(key) = self.api_key() else {
            return Ok(no_api_key());
        };
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(HandlerError::io(format!("Error reading {}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let form = Form::new()
            .text("model", self.config.transcription_model.clone())
            .part("file", Part::bytes(bytes).file_name(file_name));
        let response = self
            .client
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await?;
        let parsed: TranscriptionResponse = Self::check(response).await?.json().await?;
        Ok(ToolCallResult::success(parsed.text))
    }

    async fn edit_image(&self, p: MediaParams) -> Result<ToolCallResult, HandlerError> {
        let path = PathBuf::from(require(p.path, "path")?);
        let edits = ImageEdit::parse_instruction(&require(p.instruction, "instruction")?)?;
        let output = derived_path(&path, "_processed", None);

        let source = path.clone();
        let target = output.clone();
        tokio::task::spawn_blocking(move || -> Result<(), HandlerError> {
            let img = image::open(&source).map_err(|e| {
                HandlerError::Failed(format!(
                    "Error: Could not read image from {}: {e}",
                    source.display()
                ))
            })?;
            let edited = edits.into_iter().fold(img, |img, edit| edit.apply(img));
            edited
                .save(&target)
                .map_err(|e| HandlerError::Failed(format!("Error saving image: {e}")))
        })
        .await
        .map_err(|e| HandlerError::Failed(e.to_string()))??;

        let mut data = Map::new();
        data.insert("path".into(), json!(output.display().to_string()));
        Ok(ToolCallResult::success_with(
            format!("Image processed successfully. Saved to {}", output.display()),
            data,
        ))
    }

    async fn analyze_image(&self, p: MediaParams) -> Result<ToolCallResult, HandlerError> {
        let path = PathBuf::from(require(p.path, "path")?);
        let source = path.clone();
        let analysis = tokio::task::spawn_blocking(move || -> Result<_, HandlerError> {
            let img = image::open(&source).map_err(|e| {
                HandlerError::Failed(format!(
                    "Error: Could not read image from {}: {e}",
                    source.display()
                ))
            })?;
            let (width, height) = img.dimensions();
            let rgb = img.to_rgb8();
            let count = (rgb.width() as u64 * rgb.height() as u64).max(1);
            let mut sums = [0u64; 3];
            for pixel in rgb.pixels() {
                for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                    *sum += channel as u64;
                }
            }
            let average = sums.map(|s| (s / count) as u8);
            Ok((width, height, format!("{:?}", img.color()), average))
        })
        .await
        .map_err(|e| HandlerError::Failed(e.to_string()))??;

        let (width, height, color, [r, g, b]) = analysis;
        let mut data = Map::new();
        data.insert("width".into(), json!(width));
        data.insert("height".into(), json!(height));
        data.insert("color_type".into(), json!(color));
        data.insert("average_color".into(), json!([r, g, b]));
        Ok(ToolCallResult::success_with(
            format!(
                "Image {}: {width}x{height}, {color}, average color #{r:02x}{g:02x}{b:02x}",
                path.display()
            ),
            data,
        ))
    }

    async fn edit_audio(&self, p: MediaParams) -> Result<ToolCallResult, HandlerError> {
        let path = PathBuf::from(require(p.path, "path")?);
        let edit = AudioEdit::parse(&require(p.instruction, "instruction")?)?;
        let output = derived_path(&path, "_edited", Some("wav"));

        let source = path.clone();
        let target = output.clone();
        tokio::task::spawn_blocking(move || -> Result<(), HandlerError> {
            let wav_error = |e: hound::Error| HandlerError::Failed(format!("WAV error: {e}"));
            let mut reader = hound::WavReader::open(&source).map_err(wav_error)?;
            let spec = reader.spec();
            if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
                return Err(HandlerError::InvalidArgument(format!(
                    "only 16-bit PCM WAV is supported ({} bits, {:?})",
                    spec.bits_per_sample, spec.sample_format
                )));
            }
            let samples = reader
                .samples::<i16>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(wav_error)?;
            let edited = edit.apply(samples, spec.channels as usize, spec.sample_rate);

            let mut writer = hound::WavWriter::create(&target, spec).map_err(wav_error)?;
            for sample in edited {
                writer.write_sample(sample).map_err(wav_error)?;
            }
            writer.finalize().map_err(wav_error)
        })
        .await
        .map_err(|e| HandlerError::Failed(e.to_string()))??;

        let mut data = Map::new();
        data.insert("path".into(), json!(output.display().to_string()));
        Ok(ToolCallResult::success_with(
            format!("Audio processed successfully. Saved to {}", output.display()),
            data,
        ))
    }
}

fn no_api_key() -> ToolCallResult {
    ToolCallResult::failure("OpenAI API key is not configured")
}

/// `dir/name.ext` -> `dir/name<suffix>.ext`, optionally forcing the extension.
fn derived_path(path: &Path, suffix: &str, extension: Option<&str>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = extension
        .map(str::to_string)
        .or_else(|| path.extension().map(|e| e.to_string_lossy().into_owned()));
    let name = match extension {
        Some(ext) => format!("{stem}{suffix}.{ext}"),
        None => format!("{stem}{suffix}"),
    };
    path.with_file_name(name)
}

#[async_trait]
impl CapabilityHandler for MediaHandler {
    fn group(&self) -> OperationGroup {
        OperationGroup::Media
    }

    async fn execute(
        &self,
        operation: &str,
        params: &Arguments,
    ) -> Result<ToolCallResult, HandlerError> {
        let p = MediaParams::from_args(params);
        match operation {
            "generate_image" => self.generate_image(p).await,
            "edit_image" => self.edit_image(p).await,
            "analyze_image" => self.analyze_image(p).await,
            "generate_audio" => self.generate_audio(p).await,
            "transcribe_audio" => self.transcribe_audio(p).await,
            "edit_audio" => self.edit_audio(p).await,
            other => Err(HandlerError::UnsupportedOperation(other.to_string())),
        }
    }
}
