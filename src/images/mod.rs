//! # Image Composition
//!
//! Personalised marketing images rendered as SVG documents. A template is
//! a fixed-size canvas with an ordered element list; each record supplies
//! the field values substituted into variable elements. Remote images are
//! embedded as base64 data URIs so the output is self-contained.

pub mod batch;
pub mod render;
pub mod source;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::image_template;

pub use batch::{ImageGenerator, ImageRecord, ImageResult};
pub use render::compose;
pub use source::{HttpImageSource, ImageSource, LoadedImage};

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid image template: {0}")]
    InvalidTemplate(String),
    #[error("field '{0}' does not hold an image URL")]
    MissingImageField(String),
    #[error("failed to load image {url}: {message}")]
    Load { url: String, message: String },
    #[error("image task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Start,
    Middle,
    End,
}

impl TextAlign {
    pub fn as_svg(self) -> &'static str {
        match self {
            TextAlign::Start => "start",
            TextAlign::Middle => "middle",
            TextAlign::End => "end",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(default)]
    pub align: TextAlign,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            color: default_color(),
            font_family: default_font_family(),
            font_weight: None,
            align: TextAlign::default(),
        }
    }
}

fn default_font_size() -> u32 {
    24
}

fn default_color() -> String {
    "#000000".to_string()
}

fn default_font_family() -> String {
    "sans-serif".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One drawable element, in paint order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageElement {
    StaticText {
        text: String,
        x: i32,
        y: i32,
        #[serde(flatten)]
        style: TextStyle,
    },
    /// `field` is either a bare field name or text with `{{field}}`
    /// placeholders.
    VariableText {
        field: String,
        x: i32,
        y: i32,
        #[serde(flatten)]
        style: TextStyle,
    },
    StaticImage {
        url: String,
        #[serde(flatten)]
        frame: Frame,
    },
    /// `field` names the record field holding the image URL.
    VariableImage {
        field: String,
        #[serde(flatten)]
        frame: Frame,
    },
}

impl ImageElement {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ImageElement::StaticText { style, .. } => validate_style(style),
            ImageElement::VariableText { field, style, .. } => {
                if field.trim().is_empty() {
                    return Err("variable_text requires a field".to_string());
                }
                validate_style(style)
            }
            ImageElement::StaticImage { url, frame } => {
                if url.trim().is_empty() {
                    return Err("static_image requires a url".to_string());
                }
                validate_frame(frame)
            }
            ImageElement::VariableImage { field, frame } => {
                if field.trim().is_empty() {
                    return Err("variable_image requires a field".to_string());
                }
                validate_frame(frame)
            }
        }
    }
}

fn validate_style(style: &TextStyle) -> Result<(), String> {
    if style.font_size == 0 || style.font_size > 1024 {
        return Err("font_size must be between 1 and 1024".to_string());
    }
    Ok(())
}

fn validate_frame(frame: &Frame) -> Result<(), String> {
    if frame.width == 0 || frame.height == 0 {
        return Err("image elements need a non-zero width and height".to_string());
    }
    Ok(())
}

/// Canvas description used by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTemplateSpec {
    pub width: u32,
    pub height: u32,
    pub background: Option<String>,
    pub elements: Vec<ImageElement>,
}

impl TryFrom<&image_template::Model> for ImageTemplateSpec {
    type Error = ImageError;

    fn try_from(model: &image_template::Model) -> Result<Self, Self::Error> {
        let elements = model
            .parsed_elements()
            .map_err(|err| ImageError::InvalidTemplate(err.to_string()))?;
        let width = u32::try_from(model.width)
            .map_err(|_| ImageError::InvalidTemplate("negative width".to_string()))?;
        let height = u32::try_from(model.height)
            .map_err(|_| ImageError::InvalidTemplate("negative height".to_string()))?;

        Ok(Self {
            width,
            height,
            background: model.background.clone(),
            elements,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RenderedImage {
    #[serde(skip)]
    pub svg: String,
    pub width: u32,
    pub height: u32,
    /// Hex SHA-256 of the SVG document
    pub checksum: String,
}

impl RenderedImage {
    pub fn data_uri(&self) -> String {
        format!("data:image/svg+xml;base64,{}", STANDARD.encode(&self.svg))
    }
}
