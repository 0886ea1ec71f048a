//! Loading images referenced by templates and records.
//!
//! Remote fetches only reach public addresses unless private hosts are
//! explicitly allowed: IP-literal hosts are checked before the request,
//! resolved names are filtered by [`PublicResolver`], and redirects are
//! re-checked. Bodies are streamed and abandoned once they pass the cap.

use std::error::Error as StdError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::{Client, redirect};
use url::{Host, Url};

use super::ImageError;

/// Images larger than this are rejected rather than embedded.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

const MAX_REDIRECTS: usize = 5;

/// Media types that may be embedded into generated SVGs.
pub const ALLOWED_IMAGE_TYPES: [&str; 5] = [
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/svg+xml",
];

/// Maps a declared media type onto the allow-list, ignoring case.
pub fn allowed_content_type(value: &str) -> Option<&'static str> {
    let value = value.trim();
    ALLOWED_IMAGE_TYPES
        .iter()
        .copied()
        .find(|allowed| allowed.eq_ignore_ascii_case(value))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl LoadedImage {
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn load(&self, url: &str) -> Result<LoadedImage, ImageError>;
}

/// Whether `ip` is routable on the public internet.
pub fn is_public_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_public_v4(v4),
            None => is_public_v6(v6),
        },
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    let shared = a == 100 && (64..128).contains(&b);
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || shared
        || a == 0)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = first & 0xfe00 == 0xfc00;
    let link_local = first & 0xffc0 == 0xfe80;
    let documentation = first == 0x2001 && ip.segments()[1] == 0x0db8;
    !(ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        || unique_local
        || link_local
        || documentation)
}

/// Resolver that drops every non-public address, failing the lookup when
/// nothing is left.
#[derive(Debug, Default, Clone)]
pub struct PublicResolver;

impl Resolve for PublicResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(resolve_public(name.as_str().to_string()))
    }
}

async fn resolve_public(host: String) -> Result<Addrs, Box<dyn StdError + Send + Sync>> {
    let resolved: Vec<SocketAddr> = tokio::net::lookup_host((host.as_str(), 0))
        .await?
        .filter(|addr| is_public_ip(addr.ip()))
        .collect();
    if resolved.is_empty() {
        return Err(format!("host '{host}' has no public address").into());
    }
    Ok(Box::new(resolved.into_iter()))
}

/// Rejects URLs whose host is a non-public IP literal.
fn check_literal_host(url: &Url) -> Result<(), String> {
    let ip = match url.host() {
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
        Some(Host::Domain(_)) => return Ok(()),
        None => return Err("URL has no host".to_string()),
    };
    if is_public_ip(ip) {
        Ok(())
    } else {
        Err(format!("address {ip} is not public"))
    }
}

/// Fetches `http(s)` URLs with reqwest and decodes inline `data:` URIs.
#[derive(Debug, Clone)]
pub struct HttpImageSource {
    client: Client,
    allow_private_hosts: bool,
    max_bytes: usize,
}

impl HttpImageSource {
    pub fn new(timeout: Duration, allow_private_hosts: bool) -> Result<Self, ImageError> {
        let mut builder = Client::builder().timeout(timeout);
        if allow_private_hosts {
            builder = builder.redirect(redirect::Policy::limited(MAX_REDIRECTS));
        } else {
            builder = builder
                .dns_resolver(Arc::new(PublicResolver))
                .redirect(redirect::Policy::custom(|attempt| {
                    if attempt.previous().len() >= MAX_REDIRECTS {
                        return attempt.error("too many redirects");
                    }
                    match check_literal_host(attempt.url()) {
                        Ok(()) => attempt.follow(),
                        Err(message) => attempt.error(message),
                    }
                }));
        }
        let client = builder.build().map_err(|err| ImageError::Load {
            url: String::new(),
            message: err.to_string(),
        })?;
        Ok(Self {
            client,
            allow_private_hosts,
            max_bytes: MAX_IMAGE_BYTES,
        })
    }

    /// Overrides the per-image size cap.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn load(&self, url: &str) -> Result<LoadedImage, ImageError> {
        if url.starts_with("data:") {
            let image = decode_data_uri(url)?;
            if image.bytes.len() > self.max_bytes {
                return Err(ImageError::Load {
                    url: "data:".to_string(),
                    message: format!("image exceeds {} bytes", self.max_bytes),
                });
            }
            return Ok(image);
        }

        let load_err = |message: String| ImageError::Load {
            url: url.to_string(),
            message,
        };
        let too_large = || load_err(format!("image exceeds {} bytes", self.max_bytes));

        let parsed = Url::parse(url).map_err(|err| load_err(err.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(load_err(format!("unsupported scheme '{}'", parsed.scheme())));
        }
        if !self.allow_private_hosts {
            check_literal_host(&parsed).map_err(load_err)?;
        }

        let mut response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|err| load_err(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(load_err(format!("HTTP {}", status.as_u16())));
        }

        let declared = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).to_string())
            .unwrap_or_default();
        let content_type = allowed_content_type(&declared)
            .ok_or_else(|| load_err(format!("unsupported content type '{declared}'")))?;

        if response
            .content_length()
            .is_some_and(|length| length > self.max_bytes as u64)
        {
            return Err(too_large());
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| load_err(err.to_string()))?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(LoadedImage {
            content_type: content_type.to_string(),
            bytes,
        })
    }
}

/// Decodes `data:<mime>;base64,<payload>`.
pub fn decode_data_uri(uri: &str) -> Result<LoadedImage, ImageError> {
    let invalid = |message: &str| ImageError::Load {
        url: "data:".to_string(),
        message: message.to_string(),
    };

    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| invalid("not a data URI"))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("missing payload"))?;
    let content_type = meta
        .strip_suffix(";base64")
        .ok_or_else(|| invalid("only base64 data URIs are supported"))?;
    let content_type =
        allowed_content_type(content_type).ok_or_else(|| invalid("unsupported image type"))?;

    let bytes = general_purpose::STANDARD
        .decode(payload)
        .map_err(|err| invalid(&err.to_string()))?;

    Ok(LoadedImage {
        content_type: content_type.to_string(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn data_uris_decode() {
        let image = decode_data_uri("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.bytes, b"hello");
        assert_eq!(image.data_uri(), "data:image/png;base64,aGVsbG8=");

        assert!(decode_data_uri("data:text/plain;base64,aGVsbG8=").is_err());
        assert!(decode_data_uri("data:image/png,raw").is_err());
        assert_eq!(
            decode_data_uri("data:IMAGE/PNG;base64,aGVsbG8=")
                .unwrap()
                .content_type,
            "image/png"
        );
    }

    #[test]
    fn data_uri_media_type_must_be_allow_listed() {
        let hostile = "data:image/x\"/><script>alert(1)</script><x y=\";base64,AAAA";
        assert!(decode_data_uri(hostile).is_err());
        assert!(decode_data_uri("data:image/tiff;base64,AAAA").is_err());
        assert_eq!(allowed_content_type(" image/webp "), Some("image/webp"));
        assert_eq!(allowed_content_type("image/png\"/>"), None);
    }

    #[test]
    fn only_global_addresses_are_public() {
        for ip in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.1",
            "192.168.1.1",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "255.255.255.255",
            "::1",
            "fc00::1",
            "fe80::1",
            "::ffff:127.0.0.1",
        ] {
            assert!(!is_public_ip(ip.parse().unwrap()), "{ip} should be private");
        }
        for ip in ["93.184.216.34", "1.1.1.1", "2606:4700::1111"] {
            assert!(is_public_ip(ip.parse().unwrap()), "{ip} should be public");
        }
    }

    #[tokio::test]
    async fn http_source_fetches_images() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![1u8, 2, 3]),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = HttpImageSource::new(Duration::from_secs(5), true).unwrap();
        let image = source
            .load(&format!("{}/logo.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.bytes, vec![1, 2, 3]);

        let missing = source.load(&format!("{}/missing.png", server.uri())).await;
        assert!(matches!(missing, Err(ImageError::Load { .. })));
    }

    #[tokio::test]
    async fn non_http_schemes_are_rejected() {
        let source = HttpImageSource::new(Duration::from_secs(1), false).unwrap();
        assert!(source.load("file:///etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn private_hosts_are_refused_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![1u8]),
            )
            .expect(0)
            .mount(&server)
            .await;
        let port = server.address().port();
        let source = HttpImageSource::new(Duration::from_secs(2), false).unwrap();

        let literal = source
            .load(&format!("http://127.0.0.1:{port}/a.png"))
            .await
            .unwrap_err();
        assert!(literal.to_string().contains("not public"));

        let named = source.load(&format!("http://localhost:{port}/a.png")).await;
        assert!(matches!(named, Err(ImageError::Load { .. })));

        let metadata = source
            .load("http://169.254.169.254/latest/meta-data")
            .await;
        assert!(matches!(metadata, Err(ImageError::Load { .. })));
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/png")
                    .set_body_bytes(vec![0u8; 4096]),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string("<html></html>"),
            )
            .mount(&server)
            .await;

        let source = HttpImageSource::new(Duration::from_secs(5), true)
            .unwrap()
            .with_max_bytes(1024);
        let err = source
            .load(&format!("{}/big.png", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exceeds 1024 bytes"));

        let html = source.load(&format!("{}/html", server.uri())).await;
        assert!(matches!(html, Err(ImageError::Load { .. })));

        let roomy = HttpImageSource::new(Duration::from_secs(5), true)
            .unwrap()
            .with_max_bytes(8192);
        let image = roomy
            .load(&format!("{}/big.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(image.bytes.len(), 4096);
    }
}
