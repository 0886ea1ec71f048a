//! SVG rendering of a single record.

use std::fmt::Write as _;
use std::sync::Arc;

use lru::LruCache;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::source::{ImageSource, LoadedImage};
use super::{Frame, ImageElement, ImageError, ImageTemplateSpec, RenderedImage, TextStyle};
use crate::mail::template::{lookup, render as render_placeholders};

/// Static images shared between the records of one batch.
pub type ImageCache = RwLock<LruCache<String, Arc<LoadedImage>>>;

/// Renders `spec` for one record. Any image that fails to load fails the
/// whole record.
pub async fn compose(
    spec: &ImageTemplateSpec,
    fields: &JsonValue,
    source: &dyn ImageSource,
) -> Result<RenderedImage, ImageError> {
    compose_with_cache(spec, fields, source, None).await
}

pub async fn compose_with_cache(
    spec: &ImageTemplateSpec,
    fields: &JsonValue,
    source: &dyn ImageSource,
    cache: Option<&ImageCache>,
) -> Result<RenderedImage, ImageError> {
    let mut svg = String::with_capacity(1024);
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = spec.width,
        h = spec.height,
    );

    if let Some(background) = spec.background.as_deref() {
        let _ = write!(
            svg,
            r#"<rect width="100%" height="100%" fill="{}"/>"#,
            escape_xml(background)
        );
    }

    for element in &spec.elements {
        match element {
            ImageElement::StaticText { text, x, y, style } => {
                push_text(&mut svg, text, *x, *y, style);
            }
            ImageElement::VariableText { field, x, y, style } => {
                let text = resolve_text(field, fields);
                push_text(&mut svg, &text, *x, *y, style);
            }
            ImageElement::StaticImage { url, frame } => {
                let image = load_cached(url, source, cache).await?;
                push_image(&mut svg, &image, frame);
            }
            ImageElement::VariableImage { field, frame } => {
                let url = lookup(fields, field)
                    .and_then(JsonValue::as_str)
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .ok_or_else(|| ImageError::MissingImageField(field.clone()))?;
                let image = source.load(url).await?;
                push_image(&mut svg, &image, frame);
            }
        }
    }

    svg.push_str("</svg>");

    let checksum = hex::encode(Sha256::digest(svg.as_bytes()));
    Ok(RenderedImage {
        svg,
        width: spec.width,
        height: spec.height,
        checksum,
    })
}

/// `{{field}}` placeholders are substituted; a bare name is looked up.
fn resolve_text(field: &str, fields: &JsonValue) -> String {
    if field.contains("{{") {
        return render_placeholders(field, fields);
    }
    match lookup(fields, field.trim()) {
        Some(JsonValue::String(value)) => value.clone(),
        Some(JsonValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

async fn load_cached(
    url: &str,
    source: &dyn ImageSource,
    cache: Option<&ImageCache>,
) -> Result<Arc<LoadedImage>, ImageError> {
    let Some(cache) = cache else {
        return source.load(url).await.map(Arc::new);
    };

    {
        let mut cache = cache.write().await;
        if let Some(image) = cache.get(url) {
            return Ok(Arc::clone(image));
        }
    }

    let image = Arc::new(source.load(url).await?);
    cache
        .write()
        .await
        .put(url.to_string(), Arc::clone(&image));
    Ok(image)
}

fn push_text(svg: &mut String, text: &str, x: i32, y: i32, style: &TextStyle) {
    let _ = write!(
        svg,
        r#"<text x="{x}" y="{y}" font-family="{}" font-size="{}" fill="{}" text-anchor="{}" dominant-baseline="hanging""#,
        escape_xml(&style.font_family),
        style.font_size,
        escape_xml(&style.color),
        style.align.as_svg(),
    );
    if let Some(weight) = style.font_weight.as_deref() {
        let _ = write!(svg, r#" font-weight="{}""#, escape_xml(weight));
    }
    let _ = write!(svg, ">{}</text>", escape_xml(text));
}

fn push_image(svg: &mut String, image: &LoadedImage, frame: &Frame) {
    let _ = write!(
        svg,
        r#"<image x="{}" y="{}" width="{}" height="{}" preserveAspectRatio="xMidYMid slice" href="{}"/>"#,
        frame.x,
        frame.y,
        frame.width,
        frame.height,
        escape_xml(&image.data_uri()),
    );
}

pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::images::HttpImageSource;

    struct CountingSource {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl ImageSource for CountingSource {
        async fn load(&self, url: &str) -> Result<LoadedImage, ImageError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if url.contains("broken") {
                return Err(ImageError::Load {
                    url: url.to_string(),
                    message: "HTTP 500".to_string(),
                });
            }
            Ok(LoadedImage {
                content_type: "image/png".to_string(),
                bytes: vec![0x89, 0x50],
            })
        }
    }

    fn source() -> CountingSource {
        CountingSource {
            loads: AtomicUsize::new(0),
        }
    }

    fn spec(elements: Vec<ImageElement>) -> ImageTemplateSpec {
        ImageTemplateSpec {
            width: 800,
            height: 418,
            background: Some("#ffffff".to_string()),
            elements,
        }
    }

    fn frame() -> Frame {
        Frame {
            x: 0,
            y: 0,
            width: 100,
            height: 100,
        }
    }

    #[tokio::test]
    async fn variable_text_is_substituted_and_escaped() {
        let spec = spec(vec![
            ImageElement::StaticText {
                text: "Speaker".to_string(),
                x: 10,
                y: 10,
                style: TextStyle::default(),
            },
            ImageElement::VariableText {
                field: "{{first_name}} {{last_name}}".to_string(),
                x: 10,
                y: 50,
                style: TextStyle::default(),
            },
            ImageElement::VariableText {
                field: "company".to_string(),
                x: 10,
                y: 90,
                style: TextStyle::default(),
            },
        ]);
        let fields = json!({"first_name": "Ana", "last_name": "Lima", "company": "R&D <Labs>"});

        let image = compose(&spec, &fields, &source()).await.unwrap();

        assert!(image.svg.starts_with("<svg"));
        assert!(image.svg.contains(r#"width="800" height="418""#));
        assert!(image.svg.contains(">Speaker</text>"));
        assert!(image.svg.contains(">Ana Lima</text>"));
        assert!(image.svg.contains(">R&amp;D &lt;Labs&gt;</text>"));
        assert_eq!(image.checksum.len(), 64);
    }

    #[tokio::test]
    async fn elements_keep_paint_order() {
        let spec = spec(vec![
            ImageElement::StaticImage {
                url: "https://cdn.test/bg.png".to_string(),
                frame: frame(),
            },
            ImageElement::StaticText {
                text: "on top".to_string(),
                x: 0,
                y: 0,
                style: TextStyle::default(),
            },
        ]);

        let image = compose(&spec, &json!({}), &source()).await.unwrap();
        let image_at = image.svg.find("<image").unwrap();
        let text_at = image.svg.find("<text").unwrap();
        assert!(image_at < text_at);
        assert!(image.svg.contains("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn missing_variable_image_fails_the_record() {
        let spec = spec(vec![ImageElement::VariableImage {
            field: "photo_url".to_string(),
            frame: frame(),
        }]);

        let err = compose(&spec, &json!({"photo_url": ""}), &source())
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::MissingImageField(field) if field == "photo_url"));

        let err = compose(&spec, &json!({"photo_url": "https://broken.test/a.png"}), &source())
            .await
            .unwrap_err();
        assert!(matches!(err, ImageError::Load { .. }));
    }

    #[tokio::test]
    async fn static_images_hit_the_cache() {
        let spec = spec(vec![ImageElement::StaticImage {
            url: "https://cdn.test/logo.png".to_string(),
            frame: frame(),
        }]);
        let source = source();
        let cache: ImageCache = RwLock::new(LruCache::new(NonZeroUsize::new(4).unwrap()));

        for _ in 0..3 {
            compose_with_cache(&spec, &json!({}), &source, Some(&cache))
                .await
                .unwrap();
        }
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    struct HostileSource;

    #[async_trait]
    impl ImageSource for HostileSource {
        async fn load(&self, _url: &str) -> Result<LoadedImage, ImageError> {
            Ok(LoadedImage {
                content_type: "image/x\"/><script>alert(1)</script><x y=\"".to_string(),
                bytes: vec![0],
            })
        }
    }

    #[tokio::test]
    async fn image_href_cannot_break_out_of_the_attribute() {
        let spec = spec(vec![ImageElement::VariableImage {
            field: "photo".to_string(),
            frame: frame(),
        }]);
        let fields = json!({"photo": "data:image/x\"/><script>alert(1)</script><x y=\";base64,AAAA"});

        // Rejected at decode time by the media type allow-list
        let http = HttpImageSource::new(Duration::from_secs(1), false).unwrap();
        let err = compose(&spec, &fields, &http).await.unwrap_err();
        assert!(matches!(err, ImageError::Load { .. }));

        // A source that lets it through still cannot inject markup
        let image = compose(&spec, &fields, &HostileSource).await.unwrap();
        assert!(!image.svg.contains("<script>"));
        assert!(image.svg.contains("href=\"data:image/x&quot;/&gt;&lt;script&gt;"));
        assert_eq!(image.svg.matches("<image").count(), 1);
    }

    #[test]
    fn xml_escapes_quotes() {
        assert_eq!(escape_xml(r#"a"b'c"#), "a&quot;b&apos;c");
    }
}
